use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILENAME: &str = "config.toml";
const CONFIG_DIR: &str = ".chatcheck";

fn default_program() -> String {
    "./process".to_string()
}

fn default_teardown() -> String {
    "./stopall".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_settle_secs() -> u64 {
    1
}

fn default_recovery_secs() -> u64 {
    2
}

fn default_grace_secs() -> u64 {
    2
}

fn default_watchdog_secs() -> u64 {
    6000
}

fn default_shutdown_wait_secs() -> u64 {
    30
}

/// The cluster under test: how to launch a node, how to tear everything
/// down, and where to reach the nodes.
#[derive(Debug, Deserialize)]
pub struct ClusterConfig {
    /// Node executable, invoked as `program <nodeId> <configArg> <port>`.
    #[serde(default = "default_program")]
    pub program: String,
    /// Shell command that kills any still-running node processes.
    #[serde(default = "default_teardown")]
    pub teardown: String,
    /// Host the nodes listen on.
    #[serde(default = "default_host")]
    pub host: String,
    /// Pass node stdout/stderr through to the harness's own streams instead
    /// of discarding them.
    #[serde(default)]
    pub passthrough: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            teardown: default_teardown(),
            host: default_host(),
            passthrough: false,
        }
    }
}

/// Fixed delays of the run, in whole seconds.
///
/// `settle` is the boot window after launching a node and the quiet-period
/// window before a fresh `get`; `recovery` throttles a restart of a
/// previously started node id; `grace` lets in-flight responses land during
/// shutdown; `watchdog` bounds the whole run; `shutdown_wait` bounds the
/// non-forced wait for an outstanding read.
#[derive(Debug, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    #[serde(default = "default_recovery_secs")]
    pub recovery_secs: u64,
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
    #[serde(default = "default_watchdog_secs")]
    pub watchdog_secs: u64,
    #[serde(default = "default_shutdown_wait_secs")]
    pub shutdown_wait_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_secs: default_settle_secs(),
            recovery_secs: default_recovery_secs(),
            grace_secs: default_grace_secs(),
            watchdog_secs: default_watchdog_secs(),
            shutdown_wait_secs: default_shutdown_wait_secs(),
        }
    }
}

impl TimingConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub fn recovery(&self) -> Duration {
        Duration::from_secs(self.recovery_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    pub fn watchdog(&self) -> Duration {
        Duration::from_secs(self.watchdog_secs)
    }

    pub fn shutdown_wait(&self) -> Duration {
        Duration::from_secs(self.shutdown_wait_secs)
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct HarnessConfig {
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

impl HarnessConfig {
    /// Search upward from `start` for a `.chatcheck/config.toml` file and
    /// load it. Returns the default config if no file is found.
    pub fn load(start: &Path) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = Self::find_config_file(start) {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let config: HarnessConfig = toml::from_str(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            Ok((config, Some(path)))
        } else {
            Ok((HarnessConfig::default(), None))
        }
    }

    fn find_config_file(start: &Path) -> Option<PathBuf> {
        let mut dir = start.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_DIR).join(CONFIG_FILENAME);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !dir.pop() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn default_config_values() {
        let config = HarnessConfig::default();
        assert_eq!(config.cluster.program, "./process");
        assert_eq!(config.cluster.teardown, "./stopall");
        assert_eq!(config.cluster.host, "127.0.0.1");
        assert!(!config.cluster.passthrough);
        assert_eq!(config.timing.settle_secs, 1);
        assert_eq!(config.timing.recovery_secs, 2);
        assert_eq!(config.timing.grace_secs, 2);
        assert_eq!(config.timing.watchdog_secs, 6000);
        assert_eq!(config.timing.shutdown_wait_secs, 30);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[cluster]
program = "./build/node"
teardown = "./scripts/stopall.sh"
host = "0.0.0.0"
passthrough = true

[timing]
settle_secs = 2
recovery_secs = 3
grace_secs = 1
watchdog_secs = 120
shutdown_wait_secs = 10
"#;
        let config: HarnessConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.cluster.program, "./build/node");
        assert_eq!(config.cluster.teardown, "./scripts/stopall.sh");
        assert_eq!(config.cluster.host, "0.0.0.0");
        assert!(config.cluster.passthrough);
        assert_eq!(config.timing.settle_secs, 2);
        assert_eq!(config.timing.recovery_secs, 3);
        assert_eq!(config.timing.grace_secs, 1);
        assert_eq!(config.timing.watchdog_secs, 120);
        assert_eq!(config.timing.shutdown_wait_secs, 10);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[cluster]
program = "./node"
"#;
        let config: HarnessConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.cluster.program, "./node");
        assert_eq!(config.cluster.teardown, "./stopall");
        assert_eq!(config.timing.settle_secs, 1);
    }

    #[test]
    fn durations_convert_from_seconds() {
        let timing = TimingConfig::default();
        assert_eq!(timing.settle(), Duration::from_secs(1));
        assert_eq!(timing.recovery(), Duration::from_secs(2));
        assert_eq!(timing.watchdog(), Duration::from_secs(6000));
    }

    #[test]
    fn load_from_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join(".chatcheck");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("config.toml"),
            r#"
[cluster]
program = "./raftnode"
"#,
        )
        .unwrap();

        let (config, path) = HarnessConfig::load(tmp.path()).unwrap();
        assert!(path.is_some());
        assert_eq!(config.cluster.program, "./raftnode");
    }

    #[test]
    fn load_returns_default_when_no_file() {
        let tmp = tempfile::tempdir().unwrap();
        let (config, path) = HarnessConfig::load(tmp.path()).unwrap();
        assert!(path.is_none());
        assert_eq!(config.cluster.program, "./process");
    }

    #[test]
    fn load_walks_up_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join(".chatcheck");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("config.toml"),
            r#"
[timing]
watchdog_secs = 60
"#,
        )
        .unwrap();

        let nested = tmp.path().join("tests").join("deep").join("nested");
        fs::create_dir_all(&nested).unwrap();

        let (config, path) = HarnessConfig::load(&nested).unwrap();
        assert!(path.is_some());
        assert_eq!(config.timing.watchdog_secs, 60);
    }
}
