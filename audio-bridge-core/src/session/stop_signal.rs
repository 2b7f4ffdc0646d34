use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Cooperative cancellation shared by every background loop.
///
/// Loops call [`wait`](Self::wait) instead of `thread::sleep`, so a
/// [`stop`](Self::stop) wakes them immediately rather than after a full interval.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock() = true;
        cvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Sleep for up to `timeout`. Returns `true` if stop was requested.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let mut stopped = flag.lock();
        if !*stopped && !timeout.is_zero() {
            cvar.wait_for(&mut stopped, timeout);
        }
        *stopped
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Instant;

    use super::*;

    #[test]
    fn wait_times_out_when_not_stopped() {
        let signal = StopSignal::new();
        assert!(!signal.wait(Duration::from_millis(5)));
    }

    #[test]
    fn stop_wakes_waiter_early() {
        let signal = StopSignal::new();
        let waiter = {
            let signal = signal.clone();
            thread::spawn(move || {
                let started = Instant::now();
                let stopped = signal.wait(Duration::from_secs(30));
                (stopped, started.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(20));
        signal.stop();

        let (stopped, elapsed) = waiter.join().unwrap();
        assert!(stopped);
        assert!(elapsed < Duration::from_secs(5));
    }
}
