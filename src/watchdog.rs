//! Run-time watchdog.
//!
//! One timer, started at harness startup, that fires once after the absolute
//! deadline and runs whatever the caller hands it — in production, the
//! forced shutdown sequence followed by process exit. Pending reads are
//! abandoned; bounding total run time wins.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::warn;

pub struct Watchdog;

impl Watchdog {
    /// Start the deadline timer. `on_fire` runs on the watchdog thread after
    /// `deadline` elapses, regardless of input or pending state.
    pub fn spawn(deadline: Duration, on_fire: impl FnOnce() + Send + 'static) -> JoinHandle<()> {
        thread::spawn(move || {
            thread::sleep(deadline);
            warn!(?deadline, "watchdog deadline reached, forcing shutdown");
            on_fire();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn fires_once_after_deadline() {
        let fired = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&fired);

        let start = Instant::now();
        let handle = Watchdog::spawn(Duration::from_millis(30), move || {
            flag.fetch_add(1, Ordering::SeqCst);
        });

        handle.join().unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn does_not_fire_before_deadline() {
        let fired = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&fired);

        let _handle = Watchdog::spawn(Duration::from_secs(600), move || {
            flag.fetch_add(1, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(50));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
