//! Pacing of the audio-to-signal stage

use std::time::Duration;

/// Default head start kept over real time
pub const DEFAULT_MARGIN: Duration = Duration::from_millis(100);

/// Keeps stage 1 slightly ahead of real time instead of racing through a
/// whole answer
#[derive(Debug, Clone, Copy)]
pub struct SpeedLimiter {
    margin: Duration,
}

impl Default for SpeedLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MARGIN)
    }
}

impl SpeedLimiter {
    pub fn new(margin: Duration) -> Self {
        Self { margin }
    }

    /// Time left to wait after processing `slice_secs` of audio, of which
    /// `padding_secs` were padding, in `elapsed`
    pub fn delay(&self, slice_secs: f64, padding_secs: f64, elapsed: Duration) -> Option<Duration> {
        let remaining =
            slice_secs - padding_secs - self.margin.as_secs_f64() - elapsed.as_secs_f64();
        if remaining > 0.0 {
            Some(Duration::from_secs_f64(remaining))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_formula() {
        let limiter = SpeedLimiter::default();
        let delay = limiter.delay(1.0, 0.25, Duration::from_millis(150)).unwrap();
        assert!((delay.as_secs_f64() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_never_negative() {
        let limiter = SpeedLimiter::default();
        assert!(limiter.delay(0.2, 0.0, Duration::from_millis(150)).is_none());
        assert!(limiter.delay(0.05, 0.0, Duration::ZERO).is_none());
    }
}
