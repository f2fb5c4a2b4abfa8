//! One TCP connection to one node process.
//!
//! Each connection owns its socket and a reader thread that splits the
//! inbound byte stream into newline-delimited frames. A `chatLog <data>`
//! frame lands in the capture stream and releases the read gate; anything
//! else is a protocol violation, logged and ignored. A read failure is the
//! node's expected crash signal: the connection marks itself closed, removes
//! its own registry entry exactly once, and the thread exits.

use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream};
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::capture::Capture;
use crate::gate::ReadGate;
use crate::log::{RunEvent, RunLog};
use crate::registry::NodeRegistry;

/// Shared collaborators every reader thread needs.
#[derive(Clone)]
pub struct ConnectionCtx {
    pub registry: Arc<NodeRegistry>,
    pub gate: Arc<ReadGate>,
    pub capture: Arc<Capture>,
    pub log: Arc<RunLog>,
}

pub struct NodeConnection {
    node: u32,
    stream: Mutex<TcpStream>,
    closed: AtomicBool,
    /// Handle of the launched node process, held so it is not reaped while
    /// the connection lives. The teardown collaborator does the killing.
    #[allow(dead_code)]
    child: Mutex<Option<Child>>,
}

impl std::fmt::Debug for NodeConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConnection")
            .field("node", &self.node)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl NodeConnection {
    /// Connect to a node's listening port, register the connection, and
    /// start its reader thread.
    ///
    /// A connect failure is fatal to this node's lifecycle: nothing is
    /// registered and the error propagates to the dispatcher.
    pub fn open(
        node: u32,
        addr: &str,
        child: Option<Child>,
        ctx: &ConnectionCtx,
    ) -> Result<Arc<Self>> {
        let stream = TcpStream::connect(addr)
            .with_context(|| format!("failed to connect to node {node} at {addr}"))?;
        let reader = BufReader::new(
            stream
                .try_clone()
                .with_context(|| format!("failed to clone socket for node {node}"))?,
        );

        let conn = Arc::new(Self {
            node,
            stream: Mutex::new(stream),
            closed: AtomicBool::new(false),
            child: Mutex::new(child),
        });

        if let Some(displaced) = ctx.registry.insert(node, Arc::clone(&conn)) {
            debug!(node, "displacing stale connection on restart");
            displaced.close();
        }
        ctx.log.append(RunEvent::NodeConnected { node });

        let reader_conn = Arc::clone(&conn);
        let reader_ctx = ctx.clone();
        let spawned = thread::Builder::new()
            .name(format!("node-{node}-reader"))
            .spawn(move || reader_conn.read_loop(reader, reader_ctx));
        if let Err(e) = spawned {
            ctx.registry.remove_if(node, &conn);
            return Err(e)
                .with_context(|| format!("failed to spawn reader thread for node {node}"));
        }

        Ok(conn)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Write a newline-terminated frame if the connection is still live.
    ///
    /// Crashed nodes ignore further commands, so sending to a closed
    /// connection silently drops the message.
    pub fn send(&self, message: &str) {
        if self.is_closed() {
            debug!(node = self.node, dropped = message, "send to closed connection");
            return;
        }
        let mut stream = self.stream.lock().unwrap();
        let frame = format!("{message}\n");
        if let Err(e) = stream.write_all(frame.as_bytes()).and_then(|()| stream.flush()) {
            // The reader thread will observe the failure and clean up.
            debug!(node = self.node, "write failed: {e}");
        }
    }

    /// Best-effort socket shutdown. Safe to call any number of times.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let stream = self.stream.lock().unwrap();
        let _ = stream.shutdown(Shutdown::Both);
    }

    fn read_loop(self: Arc<Self>, reader: BufReader<TcpStream>, ctx: ConnectionCtx) {
        for line in reader.lines() {
            match line {
                Ok(frame) => self.handle_frame(frame.trim(), &ctx),
                Err(e) => {
                    debug!(node = self.node, "read failed: {e}");
                    break;
                }
            }
        }

        // EOF or read error: the node's expected crash signal. This path
        // runs exactly once per connection; a stale reader cannot evict a
        // replacement because removal is by pointer identity.
        self.closed.store(true, Ordering::SeqCst);
        if ctx.registry.remove_if(self.node, &self) {
            debug!(node = self.node, "connection closed, removed from registry");
            ctx.log.append(RunEvent::NodeClosed { node: self.node });
        }
    }

    fn handle_frame(&self, frame: &str, ctx: &ConnectionCtx) {
        if frame.is_empty() {
            return;
        }
        let mut parts = frame.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("chatLog"), Some(data)) => {
                ctx.capture.record(data);
                ctx.log.append(RunEvent::ChatLog {
                    node: self.node,
                    data: data.to_string(),
                });
                ctx.gate.clear();
            }
            _ => {
                warn!(node = self.node, frame, "protocol violation: unexpected frame");
                ctx.log.append(RunEvent::ProtocolViolation {
                    node: self.node,
                    frame: frame.to_string(),
                });
            }
        }
    }
}
