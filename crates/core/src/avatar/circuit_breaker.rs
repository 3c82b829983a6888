//! Circuit breaker guarding calls into the rendering algorithm
//!
//! # State Transitions
//!
//! ```text
//! Closed ──(failures >= threshold)──> Open
//!   ↑                                   │
//!   │                            (reset_timeout)
//!   │                                   ▼
//!   └──(successes >= threshold)── HalfOpen
//! ```
//!
//! A failure while half open reopens the circuit. A panic inside the
//! guarded call counts as a failure and is returned as an error.

use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Circuit breaker thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close it again
    pub success_threshold: u32,
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout_ms: 5000,
        }
    }
}

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls allowed
    Closed,
    /// Calls rejected until the reset timeout elapses
    Open,
    /// Calls allowed to probe recovery
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
}

/// Thread-safe circuit breaker for one component
#[derive(Debug)]
pub struct CircuitBreaker {
    component: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(component: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            component: component.into(),
            config,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
            }),
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Run `operation` unless the circuit is open
    ///
    /// Returns `Error::CircuitBreakerOpen` without calling `operation` while
    /// the circuit is open.
    pub fn call<T, F>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.check()?;
        let outcome = panic::catch_unwind(AssertUnwindSafe(operation)).unwrap_or_else(|payload| {
            Err(Error::Execution(format!(
                "{} panicked: {}",
                self.component,
                panic_message(payload.as_ref())
            )))
        });
        match outcome {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure();
                Err(e)
            }
        }
    }

    /// Whether a call would currently be attempted
    pub fn allows_call(&self) -> bool {
        self.check().is_ok()
    }

    fn check(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.state != CircuitState::Open {
            return Ok(());
        }
        let reset_timeout = Duration::from_millis(self.config.reset_timeout_ms);
        match state.opened_at {
            Some(opened_at) if opened_at.elapsed() < reset_timeout => {
                let remaining = reset_timeout.saturating_sub(opened_at.elapsed());
                Err(Error::CircuitBreakerOpen {
                    component: self.component.clone(),
                    reason: format!(
                        "{} consecutive failures, retry in {}ms",
                        state.consecutive_failures,
                        remaining.as_millis()
                    ),
                })
            }
            _ => {
                debug!(
                    "Circuit breaker for '{}' transitioning to HalfOpen",
                    self.component
                );
                state.state = CircuitState::HalfOpen;
                state.consecutive_successes = 0;
                Ok(())
            }
        }
    }

    fn on_success(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures = 0;
        state.consecutive_successes += 1;
        if state.state == CircuitState::HalfOpen
            && state.consecutive_successes >= self.config.success_threshold
        {
            debug!(
                "Circuit breaker for '{}' closing after {} successful calls",
                self.component, state.consecutive_successes
            );
            state.state = CircuitState::Closed;
            state.consecutive_successes = 0;
            state.opened_at = None;
        }
    }

    fn on_failure(&self) {
        let mut state = self.state.lock();
        state.consecutive_successes = 0;
        state.consecutive_failures += 1;
        let reopen = state.state == CircuitState::HalfOpen;
        if state.state != CircuitState::Open
            && (reopen || state.consecutive_failures >= self.config.failure_threshold)
        {
            warn!(
                "Circuit breaker for '{}' opening after {} consecutive failures",
                self.component, state.consecutive_failures
            );
            state.state = CircuitState::Open;
            state.opened_at = Some(Instant::now());
        }
    }

    /// Force the circuit closed
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.state = CircuitState::Closed;
        state.consecutive_failures = 0;
        state.consecutive_successes = 0;
        state.opened_at = None;
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(reset_timeout_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "algo",
            CircuitBreakerConfig {
                failure_threshold: 2,
                success_threshold: 1,
                reset_timeout_ms,
            },
        )
    }

    fn fail(cb: &CircuitBreaker) -> Result<()> {
        cb.call(|| Err(Error::Execution("boom".to_string())))
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = breaker(60_000);
        assert!(fail(&cb).is_err());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(fail(&cb).is_err());
        assert_eq!(cb.state(), CircuitState::Open);

        let mut called = false;
        let result = cb.call(|| {
            called = true;
            Ok(())
        });
        assert!(!called);
        assert!(matches!(result, Err(Error::CircuitBreakerOpen { .. })));
    }

    #[test]
    fn test_half_open_recovers() {
        let cb = breaker(10);
        let _ = fail(&cb);
        let _ = fail(&cb);
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.call(|| Ok(1)).is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = breaker(10);
        let _ = fail(&cb);
        let _ = fail(&cb);
        std::thread::sleep(Duration::from_millis(20));
        assert!(fail(&cb).is_err());
        assert_eq!(cb.state(), CircuitState::Open);
        cb.reset();
        assert!(cb.allows_call());
    }
    #[test]
    fn test_panic_counts_as_failure() {
        let cb = breaker(60_000);
        let result: Result<()> = cb.call(|| panic!("adapter crashed"));
        match result {
            Err(Error::Execution(message)) => assert!(message.contains("adapter crashed")),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.call(|| -> Result<()> { panic!("again") }).is_err());
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
