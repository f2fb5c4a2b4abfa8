//! Structured run log — JSON lines per harness run.
//!
//! When `--log-file` is given, every noteworthy event of a run is appended as
//! a self-contained JSON object with a timestamp: node launches, forwarded
//! commands, chat-log responses, protocol violations, connection closes, and
//! shutdown milestones. The captured chat-log output on stdout stays pristine
//! for grading; this file is the diagnostic record.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

/// Unix timestamp, seconds since epoch.
fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// One line of the run log.
#[derive(Debug, Clone, Serialize)]
struct LogEntry {
    timestamp: u64,
    #[serde(flatten)]
    event: RunEvent,
}

/// All event types that can appear in the run log.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum RunEvent {
    /// A node process was launched.
    NodeLaunched { node: u32, port: u16, restart: bool },
    /// The harness connected to a node's listening port.
    NodeConnected { node: u32 },
    /// A command was forwarded to a node.
    CommandForwarded { node: u32, command: String },
    /// A node reported its chat log.
    ChatLog { node: u32, data: String },
    /// A node sent a frame the harness does not understand.
    ProtocolViolation { node: u32, frame: String },
    /// A node's connection closed (crash observed or shutdown).
    NodeClosed { node: u32 },
    /// The read gate was armed for a `get`.
    GateArmed { node: u32 },
    /// The shutdown sequence began.
    ShutdownInitiated { forced: bool },
    /// The watchdog deadline fired.
    WatchdogFired,
    /// The cluster-teardown collaborator was invoked.
    TeardownInvoked,
    /// A validation verdict was recorded.
    Verdict { correct: bool, failures: Vec<String> },
}

/// Append-only JSONL writer. A disabled log swallows events, so call sites
/// never need to branch on whether logging is on.
#[derive(Debug)]
pub struct RunLog {
    writer: Option<Mutex<BufWriter<File>>>,
}

impl RunLog {
    /// Log to `path`, creating parent directories and appending to an
    /// existing file.
    pub fn to_file(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create log directory: {}", parent.display())
                })?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open run log: {}", path.display()))?;
        Ok(Self {
            writer: Some(Mutex::new(BufWriter::new(file))),
        })
    }

    /// A log that discards everything.
    pub fn disabled() -> Self {
        Self { writer: None }
    }

    /// Append one event. Logging failures are reported at debug level and
    /// never interrupt the run.
    pub fn append(&self, event: RunEvent) {
        let Some(writer) = &self.writer else {
            return;
        };
        let entry = LogEntry {
            timestamp: now_secs(),
            event,
        };
        let mut writer = writer.lock().unwrap();
        match serde_json::to_string(&entry) {
            Ok(json) => {
                if let Err(e) = writeln!(writer, "{json}").and_then(|()| writer.flush()) {
                    debug!("run log write failed: {e}");
                }
            }
            Err(e) => debug!("run log serialization failed: {e}"),
        }
    }
}
