use std::time::{Duration, Instant};

/// Opaque monotonic clock capture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct StartMark(Instant);

/// Wall-clock measurement around a bracketed region, on the monotonic clock so
/// system clock adjustments never skew it.
pub struct Timer;

impl Timer {
    pub fn start() -> StartMark {
        StartMark(Instant::now())
    }

    pub fn elapsed_since(mark: &StartMark) -> Duration {
        mark.0.elapsed()
    }

    /// Run `f` in the current process and log how long it took.
    pub fn profile<R>(label: &str, f: impl FnOnce() -> R) -> (R, Duration) {
        let mark = Self::start();
        let value = f();
        let elapsed = Self::elapsed_since(&mark);
        log::info!(
            "Function '{}' was executed in {:.3} s",
            label,
            elapsed.as_secs_f64()
        );
        (value, elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_covers_sleep() {
        let mark = Timer::start();
        std::thread::sleep(Duration::from_millis(20));
        assert!(Timer::elapsed_since(&mark) >= Duration::from_millis(20));
    }

    #[test]
    fn elapsed_is_monotonic() {
        let mark = Timer::start();
        let first = Timer::elapsed_since(&mark);
        let second = Timer::elapsed_since(&mark);
        assert!(second >= first);
    }

    #[test]
    fn later_marks_order_after_earlier_ones() {
        let earlier = Timer::start();
        std::thread::sleep(Duration::from_millis(1));
        let later = Timer::start();
        assert!(later > earlier);
    }

    #[test]
    fn profile_returns_value_and_duration() {
        let (value, elapsed) = Timer::profile("sleepy", || {
            std::thread::sleep(Duration::from_millis(10));
            5
        });
        assert_eq!(value, 5);
        assert!(elapsed >= Duration::from_millis(10));
    }
}
