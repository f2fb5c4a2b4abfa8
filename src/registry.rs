//! Node registry — the single source of truth for liveness.
//!
//! Maps a node id to its live connection. The dispatcher inserts on `start`,
//! each reader thread removes its own entry when it observes the peer close,
//! and shutdown drains whatever is left. All three go through one mutex, so
//! insert/remove/iterate on the same id never race.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::connection::NodeConnection;

#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: Mutex<HashMap<u32, Arc<NodeConnection>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for `node`, returning the displaced connection
    /// if one was still present (a restart racing the old reader's removal).
    pub fn insert(&self, node: u32, conn: Arc<NodeConnection>) -> Option<Arc<NodeConnection>> {
        self.nodes.lock().unwrap().insert(node, conn)
    }

    pub fn get(&self, node: u32) -> Option<Arc<NodeConnection>> {
        self.nodes.lock().unwrap().get(&node).cloned()
    }

    /// Remove the entry for `node` only if it is still this exact
    /// connection. A reader thread that lost its socket after a restart must
    /// not evict the replacement, so removal is by pointer identity.
    pub fn remove_if(&self, node: u32, conn: &Arc<NodeConnection>) -> bool {
        let mut nodes = self.nodes.lock().unwrap();
        match nodes.get(&node) {
            Some(current) if Arc::ptr_eq(current, conn) => {
                nodes.remove(&node);
                true
            }
            _ => false,
        }
    }

    /// Drain the registry and close every connection. Order is unspecified;
    /// each close is independent and idempotent.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut nodes = self.nodes.lock().unwrap();
            nodes.drain().map(|(_, conn)| conn).collect()
        };
        for conn in &drained {
            conn.close();
        }
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
