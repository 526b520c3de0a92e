use clap::builder::ValueHint;
use clap_derive::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "warren-daemon", about = "A LambdaMOO-compatible world server")]
pub struct Args {
    #[arg(
        short,
        long,
        value_name = "config",
        help = "Path to configuration (json/yaml) file to use, if any. If not specified, \
                defaults are used. Configuration file values can be overridden by command \
                line arguments.",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[arg(
        short,
        long,
        value_name = "base-dir",
        help = "Root directory for all writable server state",
        value_hint = ValueHint::DirPath
    )]
    pub base_dir: Option<PathBuf>,

    #[arg(
        long,
        value_name = "core-db",
        help = "Initial portable-format (Format 4) database to load when no snapshot exists",
        value_hint = ValueHint::FilePath
    )]
    pub core_db: Option<PathBuf>,

    #[arg(
        short,
        long,
        value_name = "listen",
        help = "TCP listen address for the line-based host",
        default_value = "0.0.0.0:7777"
    )]
    pub listen: String,

    #[arg(long, help = "Enable debug logging", default_value = "false")]
    pub debug: bool,
}
