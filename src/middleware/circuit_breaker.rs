use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::core::config::TranslationConfig;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls fail fast until the cooldown elapses
    Open,
    /// One probe call is let through to test recovery
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failed batches before the circuit opens
    pub failure_threshold: usize,
    /// Time spent open before a probe is allowed
    pub cooldown: Duration,
    /// Consecutive successful probes needed to close again
    pub success_threshold: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
            success_threshold: 1,
        }
    }
}

impl From<&TranslationConfig> for CircuitBreakerConfig {
    fn from(config: &TranslationConfig) -> Self {
        Self {
            failure_threshold: config.circuit_failure_threshold.max(1),
            cooldown: config.circuit_cooldown,
            success_threshold: 1,
        }
    }
}

/// Guards a remote capability so a dead service degrades batches to the
/// fallback path immediately instead of waiting out a timeout per image.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    inner: Arc<RwLock<CircuitBreakerInner>>,
    config: CircuitBreakerConfig,
}

struct CircuitBreakerInner {
    state: CircuitState,
    consecutive_failures: usize,
    consecutive_successes: usize,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    trips: usize,
}

impl CircuitBreaker {
    pub fn new(name: &'static str) -> Self {
        Self::with_config(name, CircuitBreakerConfig::default())
    }

    pub fn with_config(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            inner: Arc::new(RwLock::new(CircuitBreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                probe_in_flight: false,
                trips: 0,
            })),
            config,
        }
    }

    /// Whether a call may proceed right now.
    ///
    /// In the half-open state only one caller gets `true` until it reports
    /// back through `record_success` or `record_failure`.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.write();

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled_down = inner
                    .opened_at
                    .map(|t| t.elapsed() >= self.config.cooldown)
                    .unwrap_or(true);
                if cooled_down {
                    info!(breaker = self.name, "Circuit half-open, probing backend");
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                    inner.probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.write();
        inner.consecutive_failures = 0;
        inner.probe_in_flight = false;

        if inner.state != CircuitState::Closed {
            inner.consecutive_successes += 1;
            if inner.consecutive_successes >= self.config.success_threshold {
                info!(breaker = self.name, "Circuit closed, backend recovered");
                inner.state = CircuitState::Closed;
                inner.consecutive_successes = 0;
                inner.opened_at = None;
            }
        }
    }

    /// Record a failed call. Returns `true` when this failure opened the circuit.
    pub fn record_failure(&self) -> bool {
        let mut inner = self.inner.write();
        inner.consecutive_successes = 0;
        inner.consecutive_failures += 1;
        inner.probe_in_flight = false;

        let trip = match inner.state {
            CircuitState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };

        if trip {
            warn!(
                breaker = self.name,
                failures = inner.consecutive_failures,
                cooldown_s = self.config.cooldown.as_secs(),
                "Circuit opened"
            );
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            inner.trips += 1;
        }
        trip
    }

    pub fn state(&self) -> CircuitState {
        self.inner.read().state
    }

    /// Number of times the circuit has opened.
    pub fn trips(&self) -> usize {
        self.inner.read().trips
    }
}
