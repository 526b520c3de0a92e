use clap::Parser;
use eyre::WrapErr;
use figment::Figment;
use figment::providers::{Format, Json, Yaml};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use warren_db::WorldState;
use warren_kernel::checkpoint::{self, CheckpointMsg};
use warren_kernel::config::Config;
use warren_kernel::tasks::Scheduler;

mod args;
mod connections;
mod host;

use args::Args;
use connections::Connections;

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = load_config(&args)?;
    if let Some(base_dir) = &args.base_dir {
        config.base_dir = base_dir.clone();
    }
    if let Some(core_db) = &args.core_db {
        config.core_db = Some(core_db.clone());
    }
    std::fs::create_dir_all(&config.base_dir)
        .wrap_err_with(|| format!("creating base dir {:?}", config.base_dir))?;
    if let Some(binary_dir) = &config.binary_dir {
        std::fs::create_dir_all(binary_dir)
            .wrap_err_with(|| format!("creating binary dir {binary_dir:?}"))?;
    }
    let config = Arc::new(config);

    // Database: snapshot, else core db, else the bootstrap world.
    let store = checkpoint::load_on_startup(&config);
    info!(
        "world loaded: {} objects, max_object #{}",
        store.object_count(),
        store.max_object()
    );
    let world = WorldState::new(store);

    let (checkpoint_handle, checkpoint_tx) =
        checkpoint::spawn_checkpoint_thread(world.clone(), config.clone());

    let scheduler = Scheduler::new(world, config.clone(), checkpoint_tx.clone());
    let connections = Arc::new(Connections::new());

    // Host listener.
    {
        let scheduler = scheduler.clone();
        let connections = connections.clone();
        let listen = args.listen.clone();
        std::thread::Builder::new()
            .name("warren-host".to_string())
            .spawn(move || {
                if let Err(e) = host::run_listener(&listen, scheduler, connections) {
                    warn!("listener failed: {e}");
                }
            })
            .wrap_err("spawning host listener")?;
    }

    // Signals translate into a scheduler stop.
    {
        let scheduler = scheduler.clone();
        let mut signals = Signals::new([SIGINT, SIGTERM]).wrap_err("installing signals")?;
        std::thread::Builder::new()
            .name("warren-signals".to_string())
            .spawn(move || {
                if signals.forever().next().is_some() {
                    info!("signal received; stopping");
                    scheduler.stop();
                }
            })
            .wrap_err("spawning signal thread")?;
    }

    // The scheduler loop runs on the main thread until shutdown.
    let shutdown_msg = scheduler.run();
    let reason = shutdown_msg.unwrap_or_else(|| "server going down".to_string());
    host::broadcast_shutdown(&connections, &reason);

    // Final checkpoint per policy, then wait for the writer to finish.
    let _ = checkpoint_tx.send(CheckpointMsg::Shutdown);
    drop(checkpoint_tx);
    if checkpoint_handle.join().is_err() {
        warn!("checkpoint thread panicked during shutdown");
    }

    info!("bye");
    // The accept loop blocks forever; exit rather than wait on it.
    std::process::exit(0);
}

fn load_config(args: &Args) -> eyre::Result<Config> {
    let Some(path) = &args.config_file else {
        return Ok(Config::default());
    };
    let figment = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => Figment::new().merge(Yaml::file(path)),
        _ => Figment::new().merge(Json::file(path)),
    };
    figment
        .extract()
        .wrap_err_with(|| format!("loading config from {path:?}"))
}
