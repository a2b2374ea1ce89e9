//! Time source for sampler pacing, stop-detector polling and the simulated
//! stepper's ramp.
use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;

    /// Block the calling thread. Poll loops call this between iterations.
    fn sleep(&self, d: Duration);

    /// Whole milliseconds since `epoch`; zero if `epoch` lies ahead.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let elapsed = self.now().saturating_duration_since(epoch);
        u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_clock {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{Duration, Instant};

    use super::Clock;

    /// Clock that only moves when told to.
    ///
    /// `sleep` jumps time forward instead of blocking and then yields, so a
    /// stop detector with a multi-second deadline runs its whole poll
    /// schedule almost instantly. Clones share one timeline, and
    /// [`TestClock::sleeps`] counts poll iterations across all of them.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        origin: Instant,
        elapsed_ns: Arc<AtomicU64>,
        sleeps: Arc<AtomicU64>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    fn nanos(d: Duration) -> u64 {
        u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
    }

    impl TestClock {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                elapsed_ns: Arc::new(AtomicU64::new(0)),
                sleeps: Arc::new(AtomicU64::new(0)),
            }
        }

        /// Move time forward without counting a sleep, e.g. to age a ramp.
        pub fn advance(&self, d: Duration) {
            let step = nanos(d);
            let _ = self
                .elapsed_ns
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |ns| {
                    Some(ns.saturating_add(step))
                });
        }

        /// Number of `sleep` calls made through this timeline.
        pub fn sleeps(&self) -> u64 {
            self.sleeps.load(Ordering::Acquire)
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            self.origin + Duration::from_nanos(self.elapsed_ns.load(Ordering::Acquire))
        }

        fn sleep(&self, d: Duration) {
            self.advance(d);
            self.sleeps.fetch_add(1, Ordering::AcqRel);
            std::thread::yield_now();
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn sleep_advances_without_blocking() {
            let clock = TestClock::new();
            let epoch = clock.now();
            let wall = Instant::now();
            clock.sleep(Duration::from_secs(3600));
            assert_eq!(clock.ms_since(epoch), 3_600_000);
            assert!(wall.elapsed() < Duration::from_secs(1));
        }

        #[test]
        fn clones_share_timeline_and_poll_count() {
            let clock = TestClock::new();
            let other = clock.clone();
            let epoch = clock.now();
            other.sleep(Duration::from_millis(10));
            clock.advance(Duration::from_millis(5));
            assert_eq!(clock.ms_since(epoch), 15);
            assert_eq!(clock.sleeps(), 1);
        }

        #[test]
        fn epoch_ahead_reads_as_zero() {
            let clock = TestClock::new();
            let early = clock.now();
            clock.advance(Duration::from_millis(50));
            let later = clock.now();
            let ahead = later + Duration::from_millis(100);
            assert_eq!(clock.ms_since(ahead), 0);
            assert_eq!(clock.ms_since(later), 0);
            assert_eq!(clock.ms_since(early), 50);
        }
    }
}
