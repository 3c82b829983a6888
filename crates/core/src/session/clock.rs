//! Session-relative timestamps

use std::sync::OnceLock;
use std::time::Instant;

use crate::data::Timestamp;

/// Ticks per second of session timestamps
pub const TIMESTAMP_BASE: i64 = 1_000_000;

/// Monotonic clock anchored at the start of the session's input stream
#[derive(Debug, Default)]
pub struct SessionClock {
    input_start: OnceLock<Instant>,
}

impl SessionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchor the clock; later calls keep the first anchor
    pub fn mark_input_start(&self) {
        let _ = self.input_start.set(Instant::now());
    }

    pub fn is_started(&self) -> bool {
        self.input_start.get().is_some()
    }

    /// Elapsed time since input start, zero before it
    pub fn timestamp(&self) -> Timestamp {
        let ticks = match self.input_start.get() {
            Some(start) => {
                let elapsed = start.elapsed();
                elapsed.as_secs() as i64 * TIMESTAMP_BASE
                    + elapsed.subsec_nanos() as i64 * TIMESTAMP_BASE / 1_000_000_000
            }
            None => 0,
        };
        Timestamp::new(ticks, TIMESTAMP_BASE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_zero_before_start() {
        let clock = SessionClock::new();
        assert!(!clock.is_started());
        assert_eq!(clock.timestamp(), Timestamp::new(0, TIMESTAMP_BASE));
    }

    #[test]
    fn test_monotonic_after_start() {
        let clock = SessionClock::new();
        clock.mark_input_start();
        let first = clock.timestamp();
        std::thread::sleep(Duration::from_millis(5));
        let second = clock.timestamp();
        assert!(first.is_valid());
        assert!(second.ticks >= first.ticks + 5_000);

        // Re-marking keeps the original anchor
        clock.mark_input_start();
        assert!(clock.timestamp().ticks >= second.ticks);
    }
}
