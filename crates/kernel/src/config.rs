use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration, merged from a config file and command-line
/// overrides by the host binary. Every field has a usable default.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root for all writable state; created on startup.
    pub base_dir: PathBuf,
    /// Initial portable-format database to load when there is no snapshot.
    pub core_db: Option<PathBuf>,
    pub checkpoint: CheckpointConfig,
    /// Per-task tick budget.
    pub default_tick_quota: usize,
    /// Per-task wall-clock budget, seconds.
    pub max_task_seconds: u64,
    /// Concurrent task cap per player.
    pub max_tasks_per_player: usize,
    /// Root for `read_binary`-style file access, when enabled.
    pub binary_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("warren-data"),
            core_db: None,
            checkpoint: CheckpointConfig::default(),
            default_tick_quota: 10_000,
            max_task_seconds: 30,
            max_tasks_per_player: 10,
            binary_dir: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Snapshot directory, relative to `base_dir` unless absolute.
    pub dir: PathBuf,
    /// Period between internal snapshots.
    pub interval_ms: u64,
    /// How many internal snapshots to retain; 0 keeps all.
    pub keep_last_internal: usize,
    /// Emit a portable dump every Nth internal snapshot; 0 disables.
    pub portable_interval: usize,
    /// How many portable dumps to retain; 0 keeps all.
    pub keep_last_portable: usize,
    pub load_on_startup: LoadOnStartup,
    /// Write one final snapshot before exit.
    pub on_shutdown: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("checkpoints"),
            interval_ms: 307_000,
            keep_last_internal: 3,
            portable_interval: 4,
            keep_last_portable: 2,
            load_on_startup: LoadOnStartup::Latest,
            on_shutdown: true,
        }
    }
}

impl CheckpointConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn resolved_dir(&self, base_dir: &std::path::Path) -> PathBuf {
        if self.dir.is_absolute() {
            self.dir.clone()
        } else {
            base_dir.join(&self.dir)
        }
    }
}

/// `latest` loads the most recent internal snapshot, `none` skips loading,
/// anything else names a specific snapshot file.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum LoadOnStartup {
    Latest,
    None,
    File(PathBuf),
}

impl From<String> for LoadOnStartup {
    fn from(s: String) -> Self {
        match s.as_str() {
            "latest" => LoadOnStartup::Latest,
            "none" => LoadOnStartup::None,
            _ => LoadOnStartup::File(PathBuf::from(s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_spec_defaults() {
        let c = Config::default();
        assert_eq!(c.default_tick_quota, 10_000);
        assert_eq!(c.max_task_seconds, 30);
        assert_eq!(c.max_tasks_per_player, 10);
        assert_eq!(c.checkpoint.interval_ms, 307_000);
        assert_eq!(c.checkpoint.load_on_startup, LoadOnStartup::Latest);
    }

    #[test]
    fn load_on_startup_parses() {
        let c: Config = serde_json::from_str(
            r#"{"checkpoint": {"load_on_startup": "none"}}"#,
        )
        .unwrap();
        assert_eq!(c.checkpoint.load_on_startup, LoadOnStartup::None);
        let c: Config = serde_json::from_str(
            r#"{"checkpoint": {"load_on_startup": "snaps/warren-5.snapshot"}}"#,
        )
        .unwrap();
        assert_eq!(
            c.checkpoint.load_on_startup,
            LoadOnStartup::File(PathBuf::from("snaps/warren-5.snapshot"))
        );
    }
}
