//! Captured chat-log output.
//!
//! Every `chatLog` response observed by a reader thread becomes one line on
//! the harness's stdout — that stream is the test artifact the outer suite
//! compares against. Lines are also retained in memory so a single run can
//! grade itself against an expected specification without re-reading its own
//! output.

use std::io::Write;
use std::sync::Mutex;

/// Append-only sink for observed chat-log snapshots.
#[derive(Debug)]
pub struct Capture {
    lines: Mutex<Vec<String>>,
    echo: bool,
}

impl Capture {
    /// A capture that echoes each line to stdout as it arrives.
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
            echo: true,
        }
    }

    /// A silent capture for tests.
    #[cfg(test)]
    pub fn silent() -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
            echo: false,
        }
    }

    /// Record one chat-log snapshot, written once and never mutated.
    pub fn record(&self, data: &str) {
        let mut lines = self.lines.lock().unwrap();
        if self.echo {
            let mut stdout = std::io::stdout().lock();
            let _ = writeln!(stdout, "{data}");
            let _ = stdout.flush();
        }
        lines.push(data.to_string());
    }

    /// All lines recorded so far, in arrival order.
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    /// Flush the echo stream; called once at the end of the shutdown
    /// sequence.
    pub fn flush(&self) {
        let _ = std::io::stdout().flush();
    }
}

impl Default for Capture {
    fn default() -> Self {
        Self::new()
    }
}
