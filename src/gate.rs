//! Single-flight read gate.
//!
//! At most one `get chatLog` may be awaiting a response at any instant across
//! the whole cluster. The dispatcher arms the gate immediately before
//! forwarding a `get`; the reader thread that observes the matching `chatLog`
//! frame clears it. Waiters block on a condition variable rather than
//! polling, which preserves the ordering guarantee: a response can only ever
//! be attributed to the single `get` that armed the gate.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Cluster-wide "a chat-log read is outstanding" flag.
#[derive(Debug, Default)]
pub struct ReadGate {
    outstanding: Mutex<bool>,
    cond: Condvar,
}

impl ReadGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a read is currently outstanding.
    pub fn is_outstanding(&self) -> bool {
        *self.outstanding.lock().unwrap()
    }

    /// Block until the gate is clear, then arm it.
    ///
    /// Only the dispatcher calls this, so two callers can never race to arm;
    /// the gate strictly alternates armed → cleared.
    pub fn arm_when_clear(&self) {
        let mut outstanding = self.outstanding.lock().unwrap();
        while *outstanding {
            outstanding = self.cond.wait(outstanding).unwrap();
        }
        *outstanding = true;
    }

    /// Clear the gate and wake every waiter.
    ///
    /// Called by the reader thread that saw the `chatLog` response, and by
    /// forced shutdown to release a wedged waiter. Clearing an already-clear
    /// gate is a no-op.
    pub fn clear(&self) {
        let mut outstanding = self.outstanding.lock().unwrap();
        *outstanding = false;
        self.cond.notify_all();
    }

    /// Wait until the gate is clear or `timeout` elapses.
    ///
    /// Returns `true` if the gate was clear when the wait ended.
    pub fn wait_clear(&self, timeout: Duration) -> bool {
        let outstanding = self.outstanding.lock().unwrap();
        let (outstanding, _) = self
            .cond
            .wait_timeout_while(outstanding, timeout, |pending| *pending)
            .unwrap();
        !*outstanding
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn arm_and_clear_alternate() {
        let gate = ReadGate::new();
        assert!(!gate.is_outstanding());
        gate.arm_when_clear();
        assert!(gate.is_outstanding());
        gate.clear();
        assert!(!gate.is_outstanding());
    }

    #[test]
    fn second_arm_blocks_until_cleared() {
        let gate = Arc::new(ReadGate::new());
        gate.arm_when_clear();

        let armed_again = Arc::new(AtomicBool::new(false));
        let gate2 = Arc::clone(&gate);
        let flag = Arc::clone(&armed_again);
        let waiter = thread::spawn(move || {
            gate2.arm_when_clear();
            flag.store(true, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(50));
        assert!(
            !armed_again.load(Ordering::SeqCst),
            "second arm must wait for the first to clear"
        );

        gate.clear();
        waiter.join().unwrap();
        assert!(armed_again.load(Ordering::SeqCst));
        assert!(gate.is_outstanding(), "the waiter re-armed the gate");
    }

    #[test]
    fn wait_clear_times_out_while_armed() {
        let gate = ReadGate::new();
        gate.arm_when_clear();
        assert!(!gate.wait_clear(Duration::from_millis(20)));
        gate.clear();
        assert!(gate.wait_clear(Duration::from_millis(20)));
    }

    #[test]
    fn clear_wakes_bounded_waiter() {
        let gate = Arc::new(ReadGate::new());
        gate.arm_when_clear();

        let gate2 = Arc::clone(&gate);
        let waiter = thread::spawn(move || gate2.wait_clear(Duration::from_secs(5)));

        thread::sleep(Duration::from_millis(20));
        gate.clear();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn clearing_clear_gate_is_noop() {
        let gate = ReadGate::new();
        gate.clear();
        gate.clear();
        assert!(!gate.is_outstanding());
    }
}
