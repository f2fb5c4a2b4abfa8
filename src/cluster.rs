//! External cluster collaborators: node launch and cluster teardown.
//!
//! The node binary and the stop-everything script are supplied by the
//! project under test; the harness only invokes them. Both sit behind traits
//! so the dispatcher and shutdown sequencing can be exercised with fakes.

use std::process::{Child, Command, Stdio};

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// Launches one node process. Invoked as `program <nodeId> <configArg> <port>`.
pub trait NodeLauncher: Send + Sync {
    fn launch(&self, node: u32, config_arg: &str, port: u16) -> Result<Option<Child>>;
}

/// Production launcher backed by `std::process::Command`.
pub struct ProcessLauncher {
    program: String,
    passthrough: bool,
}

impl ProcessLauncher {
    /// `passthrough` routes node stdout/stderr to the harness's own streams
    /// for diagnostics; otherwise both are discarded so node chatter cannot
    /// pollute the captured output.
    pub fn new(program: impl Into<String>, passthrough: bool) -> Self {
        Self {
            program: program.into(),
            passthrough,
        }
    }
}

impl NodeLauncher for ProcessLauncher {
    fn launch(&self, node: u32, config_arg: &str, port: u16) -> Result<Option<Child>> {
        let mut cmd = Command::new(&self.program);
        cmd.arg(node.to_string()).arg(config_arg).arg(port.to_string());
        if self.passthrough {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        let child = cmd
            .spawn()
            .with_context(|| format!("failed to launch node {node} via {}", self.program))?;
        debug!(node, port, pid = child.id(), "node process launched");
        Ok(Some(child))
    }
}

/// Kills any still-running node processes at the end of a run.
pub trait ClusterTeardown: Send + Sync {
    fn tear_down(&self);
}

/// Production teardown: run the configured shell command, fire-and-forget.
/// The shutdown sequence's grace delay gives it time to act.
pub struct ScriptTeardown {
    command: String,
}

impl ScriptTeardown {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl ClusterTeardown for ScriptTeardown {
    fn tear_down(&self) {
        let result = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match result {
            Ok(child) => debug!(pid = child.id(), command = %self.command, "teardown invoked"),
            Err(e) => warn!(command = %self.command, "teardown failed to start: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn launcher_spawns_with_positional_args() {
        let tmp = tempfile::tempdir().unwrap();
        let marker = tmp.path().join("args.txt");
        let script = tmp.path().join("node.sh");
        std::fs::write(&script, format!("#!/bin/sh\necho \"$1 $2 $3\" > {}\n", marker.display()))
            .unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let launcher = ProcessLauncher::new(script.display().to_string(), false);
        let child = launcher.launch(3, "config.txt", 20003).unwrap();
        child.unwrap().wait().unwrap();

        let recorded = std::fs::read_to_string(&marker).unwrap();
        assert_eq!(recorded.trim(), "3 config.txt 20003");
    }

    #[test]
    fn launcher_propagates_spawn_failure() {
        let launcher = ProcessLauncher::new("/nonexistent/definitely-not-a-node", false);
        assert!(launcher.launch(0, "config.txt", 20000).is_err());
    }

    #[test]
    fn teardown_runs_shell_command() {
        let tmp = tempfile::tempdir().unwrap();
        let marker = tmp.path().join("stopped");
        let teardown = ScriptTeardown::new(format!("touch {}", marker.display()));
        teardown.tear_down();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !marker.exists() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(marker.exists());
    }

    #[test]
    fn teardown_tolerates_failing_command() {
        let teardown = ScriptTeardown::new("exit 7");
        teardown.tear_down();
    }
}
