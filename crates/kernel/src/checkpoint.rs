//! The checkpoint subsystem: a dedicated thread that periodically snapshots
//! the object graph to disk in the internal (bincode) format, emits a
//! portable Format-4 dump every Nth snapshot, prunes per the retention
//! policy, and handles the startup-load and shutdown-write policies.
//! Checkpoint failures are logged and never fatal.

use crate::config::{CheckpointConfig, Config, LoadOnStartup};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{error, info, warn};
use warren_db::{ObjectStore, StoreSnapshot, WorldState};
use warren_textdump::{TextdumpReader, TextdumpWriter, load_textdump, make_textdump};

pub const SNAPSHOT_SUFFIX: &str = ".snapshot";
pub const PORTABLE_SUFFIX: &str = ".moo";

pub enum CheckpointMsg {
    /// Write an internal snapshot now (`dump_database()`).
    CheckpointNow,
    /// Final write (when configured) and thread exit.
    Shutdown,
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Spawn the checkpoint thread. The returned sender accepts on-demand
/// checkpoint requests and the shutdown order.
pub fn spawn_checkpoint_thread(
    world: WorldState,
    config: Arc<Config>,
) -> (std::thread::JoinHandle<()>, flume::Sender<CheckpointMsg>) {
    let (sender, receiver) = flume::unbounded();
    let handle = std::thread::Builder::new()
        .name("warren-checkpoint".to_string())
        .spawn(move || checkpoint_loop(world, config, receiver))
        .expect("spawn checkpoint thread");
    (handle, sender)
}

fn checkpoint_loop(
    world: WorldState,
    config: Arc<Config>,
    receiver: flume::Receiver<CheckpointMsg>,
) {
    let ck = &config.checkpoint;
    let dir = ck.resolved_dir(&config.base_dir);
    if let Err(e) = fs::create_dir_all(&dir) {
        error!("cannot create checkpoint directory {dir:?}: {e}");
        return;
    }
    info!(
        "checkpointing to {dir:?} every {:?} (portable every {} snapshots)",
        ck.interval(),
        ck.portable_interval
    );

    let mut since_portable = 0usize;
    loop {
        match receiver.recv_timeout(ck.interval()) {
            Ok(CheckpointMsg::CheckpointNow) => {
                write_round(&world, ck, &dir, &mut since_portable);
            }
            Ok(CheckpointMsg::Shutdown) => {
                if ck.on_shutdown {
                    info!("writing shutdown checkpoint");
                    write_round(&world, ck, &dir, &mut since_portable);
                }
                return;
            }
            Err(flume::RecvTimeoutError::Timeout) => {
                write_round(&world, ck, &dir, &mut since_portable);
            }
            Err(flume::RecvTimeoutError::Disconnected) => {
                if ck.on_shutdown {
                    write_round(&world, ck, &dir, &mut since_portable);
                }
                return;
            }
        }
    }
}

/// One checkpoint round: internal snapshot, the portable dump when due,
/// then retention pruning.
fn write_round(
    world: &WorldState,
    ck: &CheckpointConfig,
    dir: &Path,
    since_portable: &mut usize,
) {
    let snapshot = world.snapshot();
    match write_internal_snapshot(&snapshot, dir) {
        Ok(path) => info!("checkpoint written: {path:?}"),
        Err(e) => {
            error!("checkpoint failed: {e}");
            return;
        }
    }
    *since_portable += 1;
    if ck.portable_interval > 0 && *since_portable >= ck.portable_interval {
        match write_portable_dump(&snapshot.store, dir) {
            Ok(path) => {
                info!("portable dump written: {path:?}");
                *since_portable = 0;
            }
            Err(e) => error!("portable dump failed: {e}"),
        }
    }
    prune(dir, SNAPSHOT_SUFFIX, ck.keep_last_internal);
    prune(dir, PORTABLE_SUFFIX, ck.keep_last_portable);
}

fn stamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Write `name.part`, then rename into place; the snapshot appears
/// atomically or not at all.
pub fn write_internal_snapshot(
    snapshot: &StoreSnapshot,
    dir: &Path,
) -> Result<PathBuf, CheckpointError> {
    let final_path = dir.join(format!("warren-{:012}{SNAPSHOT_SUFFIX}", stamp()));
    let part_path = final_path.with_extension("snapshot.part");
    let bytes = bincode::encode_to_vec(snapshot, bincode::config::standard())
        .map_err(|e| CheckpointError::Encode(e.to_string()))?;
    fs::write(&part_path, bytes)?;
    fs::rename(&part_path, &final_path)?;
    Ok(final_path)
}

pub fn write_portable_dump(store: &ObjectStore, dir: &Path) -> Result<PathBuf, CheckpointError> {
    let final_path = dir.join(format!("warren-{:012}{PORTABLE_SUFFIX}", stamp()));
    let part_path = final_path.with_extension("moo.part");
    let td = make_textdump(store);
    let file = fs::File::create(&part_path)?;
    let mut writer = TextdumpWriter::new(std::io::BufWriter::new(file));
    writer
        .write_textdump(&td)
        .map_err(|e| CheckpointError::Encode(e.to_string()))?;
    fs::rename(&part_path, &final_path)?;
    Ok(final_path)
}

/// Delete the oldest files with `suffix` beyond `keep`; 0 keeps everything.
fn prune(dir: &Path, suffix: &str, keep: usize) {
    if keep == 0 {
        return;
    }
    let mut files = snapshot_files(dir, suffix);
    while files.len() > keep {
        let oldest = files.remove(0);
        match fs::remove_file(&oldest) {
            Ok(()) => info!("pruned old checkpoint {oldest:?}"),
            Err(e) => warn!("could not prune {oldest:?}: {e}"),
        }
    }
}

/// Files with the given suffix, oldest first. The embedded timestamps sort
/// lexically.
fn snapshot_files(dir: &Path, suffix: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.to_string_lossy().ends_with(suffix))
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}

pub fn load_internal_snapshot(path: &Path) -> Result<StoreSnapshot, CheckpointError> {
    let bytes = fs::read(path)?;
    let (snapshot, _): (StoreSnapshot, usize) =
        bincode::decode_from_slice(&bytes, bincode::config::standard())
            .map_err(|e| CheckpointError::Decode(e.to_string()))?;
    if snapshot.version != warren_db::SNAPSHOT_VERSION {
        return Err(CheckpointError::Decode(format!(
            "snapshot version {} unsupported",
            snapshot.version
        )));
    }
    Ok(snapshot)
}

/// Resolve the startup database per the checkpoint policy: the chosen
/// snapshot, else the configured portable core database, else the minimal
/// bootstrap world.
pub fn load_on_startup(config: &Config) -> ObjectStore {
    let dir = config.checkpoint.resolved_dir(&config.base_dir);
    let chosen = match &config.checkpoint.load_on_startup {
        LoadOnStartup::None => None,
        LoadOnStartup::Latest => snapshot_files(&dir, SNAPSHOT_SUFFIX).pop(),
        LoadOnStartup::File(name) => {
            let path = if name.is_absolute() {
                name.clone()
            } else {
                dir.join(name)
            };
            Some(path)
        }
    };

    if let Some(path) = chosen {
        match load_internal_snapshot(&path) {
            Ok(snapshot) => {
                info!(
                    "loaded snapshot {path:?} ({} objects)",
                    snapshot.store.object_count()
                );
                return snapshot.store;
            }
            Err(e) => {
                warn!("could not load snapshot {path:?}: {e}; falling back");
            }
        }
    }

    if let Some(core_db) = &config.core_db {
        match load_core_db(core_db) {
            Ok(store) => {
                info!(
                    "loaded core database {core_db:?} ({} objects)",
                    store.object_count()
                );
                return store;
            }
            Err(e) => {
                warn!("could not load core database {core_db:?}: {e}; starting empty");
            }
        }
    }

    info!("starting with the minimal bootstrap world");
    ObjectStore::bootstrap_minimal()
}

fn load_core_db(path: &Path) -> Result<ObjectStore, CheckpointError> {
    let file = fs::File::open(path)?;
    let reader = TextdumpReader::new(std::io::BufReader::new(file));
    let td = reader
        .read_textdump()
        .map_err(|e| CheckpointError::Decode(e.to_string()))?;
    load_textdump(td).map_err(|e| CheckpointError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use warren_var::{NOTHING, Obj};

    fn test_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.base_dir = dir.to_path_buf();
        config.checkpoint.dir = PathBuf::from("checkpoints");
        config
    }

    #[test]
    fn snapshot_write_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        let dir = config.checkpoint.resolved_dir(&config.base_dir);
        fs::create_dir_all(&dir).unwrap();

        let mut store = ObjectStore::bootstrap_minimal();
        let obj = store.create_object(NOTHING, Obj::mk_id(1)).unwrap();
        let world = WorldState::new(store);

        let path = write_internal_snapshot(&world.snapshot(), &dir).unwrap();
        assert!(path.to_string_lossy().ends_with(SNAPSHOT_SUFFIX));

        let loaded = load_internal_snapshot(&path).unwrap();
        assert!(loaded.store.valid(obj));
        assert_eq!(loaded.store.max_object(), 2);
    }

    #[test]
    fn startup_prefers_latest_snapshot_and_falls_back() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        let dir = config.checkpoint.resolved_dir(&config.base_dir);
        fs::create_dir_all(&dir).unwrap();

        // No snapshots at all: bootstrap world.
        let store = load_on_startup(&config);
        assert_eq!(store.max_object(), 1);

        // Write one snapshot with an extra object; startup finds it.
        let mut seeded = ObjectStore::bootstrap_minimal();
        seeded.create_object(NOTHING, Obj::mk_id(1)).unwrap();
        let world = WorldState::new(seeded);
        write_internal_snapshot(&world.snapshot(), &dir).unwrap();
        let store = load_on_startup(&config);
        assert_eq!(store.max_object(), 2);

        // A corrupt latest snapshot falls back rather than dying.
        fs::write(dir.join("warren-999999999999.snapshot"), b"garbage").unwrap();
        let store = load_on_startup(&config);
        assert_eq!(store.max_object(), 1);
    }

    #[test]
    fn retention_prunes_oldest() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        for i in 0..5 {
            fs::write(dir.join(format!("warren-{i:012}.snapshot")), b"x").unwrap();
        }
        prune(dir, SNAPSHOT_SUFFIX, 2);
        let left = snapshot_files(dir, SNAPSHOT_SUFFIX);
        assert_eq!(left.len(), 2);
        assert!(left[0].to_string_lossy().contains("000000000003"));

        // Zero keeps everything.
        prune(dir, SNAPSHOT_SUFFIX, 0);
        assert_eq!(snapshot_files(dir, SNAPSHOT_SUFFIX).len(), 2);
    }
}
