//! Command dispatch.
//!
//! Consumes the script line by line on the calling thread and turns each
//! command into node operations with the blocking semantics the scripts rely
//! on: `start` launches and settles before connecting (with a recovery delay
//! when the id was started before), `msg`/`crash` are fire-and-forget, and
//! `get chatLog` is serialized through the single-flight gate so a response
//! can only ever belong to the one `get` that is outstanding.

use std::collections::HashSet;
use std::io::BufRead;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::cluster::NodeLauncher;
use crate::command::Command;
use crate::connection::{ConnectionCtx, NodeConnection};
use crate::log::RunEvent;

/// How the command stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The script said `exit`.
    ExitCommand,
    /// The script ran out of lines.
    EndOfInput,
    /// The input stream failed; shutdown should not wait for pending reads.
    InputError,
}

impl RunOutcome {
    pub fn forced(self) -> bool {
        matches!(self, RunOutcome::InputError)
    }
}

pub struct Dispatcher {
    ctx: ConnectionCtx,
    launcher: Box<dyn NodeLauncher>,
    host: String,
    settle: Duration,
    recovery: Duration,
    /// Ids that have been started at least once this run. A second `start`
    /// for the same id is a restart and gets throttled.
    started: HashSet<u32>,
}

impl Dispatcher {
    pub fn new(
        ctx: ConnectionCtx,
        launcher: Box<dyn NodeLauncher>,
        host: impl Into<String>,
        settle: Duration,
        recovery: Duration,
    ) -> Self {
        Self {
            ctx,
            launcher,
            host: host.into(),
            settle,
            recovery,
            started: HashSet::new(),
        }
    }

    /// Process the command stream until `exit`, end of input, or a stream
    /// error. The caller runs the shutdown sequence on whatever comes back.
    pub fn run(&mut self, input: impl BufRead) -> RunOutcome {
        for line in input.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    error!("command stream failed: {e}");
                    return RunOutcome::InputError;
                }
            };
            let Some(command) = Command::parse(&line) else {
                continue;
            };
            debug!(?command, "dispatching");
            match command {
                Command::Exit => return RunOutcome::ExitCommand,
                Command::Start {
                    node,
                    config_arg,
                    port,
                } => self.handle_start(node, &config_arg, port),
                Command::Msg { node, rest } | Command::Crash { node, rest } => {
                    self.forward(node, &rest);
                }
                Command::Get { node, rest } => self.handle_get(node, &rest),
            }
        }
        RunOutcome::EndOfInput
    }

    fn handle_start(&mut self, node: u32, config_arg: &str, port: u16) {
        let restart = !self.started.insert(node);
        if restart {
            // The replacement must not come up while the previous process is
            // still tearing down its port.
            debug!(node, "restart detected, throttling");
            thread::sleep(self.recovery);
        }

        let child = match self.launcher.launch(node, config_arg, port) {
            Ok(child) => child,
            Err(e) => {
                error!(node, port, "launch failed: {e:#}");
                return;
            }
        };
        self.ctx.log.append(RunEvent::NodeLaunched {
            node,
            port,
            restart,
        });

        // Give the node time to bind its listening port.
        thread::sleep(self.settle);

        let addr = format!("{}:{}", self.host, port);
        match NodeConnection::open(node, &addr, child, &self.ctx) {
            Ok(_) => info!(node, port, "node started"),
            Err(e) => {
                // The node stays dead to the harness until a later start
                // succeeds; subsequent commands to this id are dropped.
                error!(node, port, "connection failed: {e:#}");
            }
        }
    }

    fn forward(&self, node: u32, rest: &str) {
        match self.ctx.registry.get(node) {
            Some(conn) => {
                conn.send(rest);
                self.ctx.log.append(RunEvent::CommandForwarded {
                    node,
                    command: rest.to_string(),
                });
            }
            None => debug!(node, command = rest, "dropping command for unregistered node"),
        }
    }

    fn handle_get(&self, node: u32, rest: &str) {
        if !self.ctx.gate.is_outstanding() {
            // First get after a quiet period: give recently sent msg/crash
            // commands a window to take effect before sampling the log.
            thread::sleep(self.settle);
        }
        // Blocks while a previous get is still awaiting its response.
        self.ctx.gate.arm_when_clear();

        match self.ctx.registry.get(node) {
            Some(conn) => {
                self.ctx.log.append(RunEvent::GateArmed { node });
                conn.send(rest);
                self.ctx.log.append(RunEvent::CommandForwarded {
                    node,
                    command: rest.to_string(),
                });
            }
            None => {
                // A response will never come; release the gate so later
                // gets are not wedged.
                warn!(node, "get for unregistered node, releasing gate");
                self.ctx.gate.clear();
            }
        }
    }
}
