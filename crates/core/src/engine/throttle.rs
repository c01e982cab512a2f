use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Rate limiter for repeated frame errors.
///
/// The loop hits the same failure every tick while a device is unplugged or
/// an effect is broken; only the first occurrence per interval is logged and
/// the rest are counted.
#[derive(Debug)]
pub struct ErrorThrottle {
    interval: Duration,
    seen: HashMap<String, Seen>,
}

#[derive(Debug)]
struct Seen {
    logged_at: Instant,
    suppressed: u64,
}

impl ErrorThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            seen: HashMap::new(),
        }
    }

    /// Returns `Some(suppressed)` when `message` should be logged now, with the
    /// number of occurrences swallowed since it was last logged.
    pub fn check(&mut self, message: &str, now: Instant) -> Option<u64> {
        match self.seen.get_mut(message) {
            Some(seen) if now.saturating_duration_since(seen.logged_at) < self.interval => {
                seen.suppressed += 1;
                None
            }
            Some(seen) => {
                seen.logged_at = now;
                Some(std::mem::take(&mut seen.suppressed))
            }
            None => {
                self.seen.insert(
                    message.to_owned(),
                    Seen {
                        logged_at: now,
                        suppressed: 0,
                    },
                );
                Some(0)
            }
        }
    }

    /// Logs `message` at warn level unless it was logged within the interval.
    pub fn warn(&mut self, message: &str) {
        if let Some(suppressed) = self.check(message, Instant::now()) {
            if suppressed > 0 {
                tracing::warn!(suppressed, "{message}");
            } else {
                tracing::warn!("{message}");
            }
        }
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeats_are_counted_until_interval_passes() {
        let mut throttle = ErrorThrottle::new(Duration::from_secs(10));
        let start = Instant::now();

        assert_eq!(throttle.check("boom", start), Some(0));
        assert_eq!(throttle.check("boom", start + Duration::from_secs(1)), None);
        assert_eq!(throttle.check("boom", start + Duration::from_secs(9)), None);
        assert_eq!(throttle.check("other", start + Duration::from_secs(9)), Some(0));
        assert_eq!(throttle.check("boom", start + Duration::from_secs(10)), Some(2));
        assert_eq!(throttle.check("boom", start + Duration::from_secs(11)), None);
    }
}
