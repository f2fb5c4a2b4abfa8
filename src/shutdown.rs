//! Orderly shutdown sequencing.
//!
//! Every way a run can end — `exit` command, end of input, input-stream
//! error, Ctrl-C, watchdog expiry — converges on the same sequence:
//!
//! 1. unless forced, a bounded wait for any outstanding chat-log read
//!    (forced shutdown clears the gate instead, abandoning the response);
//! 2. a grace delay so in-flight responses settle;
//! 3. close every registered connection;
//! 4. invoke the cluster-teardown collaborator;
//! 5. flush the captured output.
//!
//! The sequence runs at most once per process, however many triggers race.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::capture::Capture;
use crate::cluster::ClusterTeardown;
use crate::gate::ReadGate;
use crate::log::{RunEvent, RunLog};
use crate::registry::NodeRegistry;

pub struct ShutdownController {
    registry: Arc<NodeRegistry>,
    gate: Arc<ReadGate>,
    capture: Arc<Capture>,
    log: Arc<RunLog>,
    teardown: Box<dyn ClusterTeardown>,
    wait_bound: Duration,
    grace: Duration,
    fired: AtomicBool,
}

impl ShutdownController {
    pub fn new(
        registry: Arc<NodeRegistry>,
        gate: Arc<ReadGate>,
        capture: Arc<Capture>,
        log: Arc<RunLog>,
        teardown: Box<dyn ClusterTeardown>,
        wait_bound: Duration,
        grace: Duration,
    ) -> Self {
        Self {
            registry,
            gate,
            capture,
            log,
            teardown,
            wait_bound,
            grace,
            fired: AtomicBool::new(false),
        }
    }

    /// Run the shutdown sequence. Returns `false` if another trigger already
    /// claimed it, in which case nothing is done.
    pub fn run(&self, forced: bool) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            debug!("shutdown already in progress, ignoring duplicate trigger");
            return false;
        }
        info!(forced, "shutting down");
        self.log.append(RunEvent::ShutdownInitiated { forced });

        if forced {
            // Abandon any outstanding response so nothing stays wedged on
            // the gate.
            self.gate.clear();
        } else if !self.gate.wait_clear(self.wait_bound) {
            warn!(
                wait = ?self.wait_bound,
                "outstanding chat-log read never resolved, proceeding"
            );
        }

        std::thread::sleep(self.grace);

        let closed = self.registry.close_all();
        debug!(closed, "node connections closed");

        self.teardown.tear_down();
        self.log.append(RunEvent::TeardownInvoked);

        self.capture.flush();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Instant;

    struct CountingTeardown(Arc<AtomicUsize>);

    impl ClusterTeardown for CountingTeardown {
        fn tear_down(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn controller(
        gate: Arc<ReadGate>,
        registry: Arc<NodeRegistry>,
        wait_bound: Duration,
    ) -> (ShutdownController, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let controller = ShutdownController::new(
            registry,
            gate,
            Arc::new(Capture::silent()),
            Arc::new(RunLog::disabled()),
            Box::new(CountingTeardown(Arc::clone(&count))),
            wait_bound,
            Duration::from_millis(1),
        );
        (controller, count)
    }

    #[test]
    fn teardown_is_invoked_exactly_once() {
        let gate = Arc::new(ReadGate::new());
        let registry = Arc::new(NodeRegistry::new());
        let (controller, count) = controller(gate, registry, Duration::from_millis(10));

        assert!(controller.run(false));
        assert!(!controller.run(true));
        assert!(!controller.run(false));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn forced_shutdown_clears_a_wedged_gate() {
        let gate = Arc::new(ReadGate::new());
        gate.arm_when_clear();
        let registry = Arc::new(NodeRegistry::new());
        let (controller, count) = controller(Arc::clone(&gate), registry, Duration::from_secs(60));

        let start = Instant::now();
        assert!(controller.run(true));
        assert!(start.elapsed() < Duration::from_secs(5), "forced path must not wait");
        assert!(!gate.is_outstanding());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn non_forced_shutdown_waits_for_outstanding_read() {
        let gate = Arc::new(ReadGate::new());
        gate.arm_when_clear();
        let registry = Arc::new(NodeRegistry::new());
        let (controller, count) =
            controller(Arc::clone(&gate), registry, Duration::from_secs(10));

        let clearer = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                gate.clear();
            })
        };

        let start = Instant::now();
        assert!(controller.run(false));
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        clearer.join().unwrap();
    }

    #[test]
    fn non_forced_wait_is_bounded() {
        let gate = Arc::new(ReadGate::new());
        gate.arm_when_clear();
        let registry = Arc::new(NodeRegistry::new());
        let (controller, count) =
            controller(Arc::clone(&gate), registry, Duration::from_millis(30));

        // The gate never clears; the sequence must still finish.
        assert!(controller.run(false));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_triggers_run_the_sequence_once() {
        let gate = Arc::new(ReadGate::new());
        let registry = Arc::new(NodeRegistry::new());
        let (controller, count) = controller(gate, registry, Duration::from_millis(10));
        let controller = Arc::new(controller);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let controller = Arc::clone(&controller);
                thread::spawn(move || controller.run(i % 2 == 0))
            })
            .collect();

        let ran: usize = handles
            .into_iter()
            .map(|h| usize::from(h.join().unwrap()))
            .sum();
        assert_eq!(ran, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
