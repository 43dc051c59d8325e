/// Circuit Breaker keyed on consecutive failures
///
/// State transitions:
/// - Closed → Open: when consecutive failures reach `failure_threshold`
/// - Open → HalfOpen: once `cooldown` has elapsed since opening
/// - HalfOpen → Closed: on the first success of the single trial call
/// - HalfOpen → Open: on trial failure (cooldown restarts)
///
/// Rejections while open are not counted as failures.
use crate::metrics::CircuitBreakerMetrics;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Normal operation, requests pass through
    Closed,
    /// Circuit is open, requests fail fast
    Open,
    /// Cooldown elapsed, exactly one trial request allowed
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failure count to trigger circuit open
    pub failure_threshold: u32,
    /// Duration to wait before transitioning from Open to HalfOpen
    pub cooldown: Duration,
    /// Number of recent outcomes kept for the success rate
    pub window_size: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
            window_size: 100,
        }
    }
}

#[derive(Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: CircuitBreakerConfig,
    state: Arc<RwLock<CircuitBreakerState>>,
}

struct CircuitBreakerState {
    current: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    /// Sliding window: true = success, false = failure
    window: VecDeque<bool>,
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open - failing fast")]
    Open,
    #[error("Call failed: {0}")]
    CallFailed(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::named("default", config)
    }

    /// Create a breaker whose name labels its logs and metrics
    pub fn named(name: impl Into<Arc<str>>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(RwLock::new(CircuitBreakerState {
                current: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
                window: VecDeque::with_capacity(config.window_size),
            })),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Execute a future with circuit breaker protection
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.try_acquire()?;

        match f().await {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(e) => {
                self.record_failure();
                Err(CircuitBreakerError::CallFailed(e))
            }
        }
    }

    /// Ask for permission to issue one call.
    ///
    /// Callers that get `Ok` must report the outcome through
    /// [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure).
    pub fn try_acquire<E>(&self) -> Result<(), CircuitBreakerError<E>> {
        let mut state = self.state.write();

        match state.current {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = state
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.cooldown)
                    .unwrap_or(true);
                if elapsed {
                    self.transition(&mut state, CircuitState::HalfOpen);
                    state.trial_in_flight = true;
                    Ok(())
                } else {
                    CircuitBreakerMetrics::record_rejection(&self.name);
                    Err(CircuitBreakerError::Open)
                }
            }
            CircuitState::HalfOpen => {
                if state.trial_in_flight {
                    CircuitBreakerMetrics::record_rejection(&self.name);
                    Err(CircuitBreakerError::Open)
                } else {
                    state.trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.write();

        self.add_to_window(&mut state, true);

        match state.current {
            CircuitState::HalfOpen => {
                self.transition(&mut state, CircuitState::Closed);
                state.consecutive_failures = 0;
                state.opened_at = None;
                state.trial_in_flight = false;
            }
            CircuitState::Closed => {
                state.consecutive_failures = 0;
            }
            CircuitState::Open => {
                // Late result from a call issued before the circuit opened
            }
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.state.write();

        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        self.add_to_window(&mut state, false);

        match state.current {
            CircuitState::Closed => {
                if state.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        breaker = %self.name,
                        failures = state.consecutive_failures,
                        "Circuit breaker: Closed → Open"
                    );
                    self.transition(&mut state, CircuitState::Open);
                    state.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                warn!(breaker = %self.name, "Circuit breaker: HalfOpen → Open (trial failed)");
                self.transition(&mut state, CircuitState::Open);
                state.opened_at = Some(Instant::now());
                state.trial_in_flight = false;
            }
            CircuitState::Open => {}
        }
    }

    /// Force the breaker back to Closed with a clean history (admin operation)
    pub fn reset(&self) {
        let mut state = self.state.write();
        self.transition(&mut state, CircuitState::Closed);
        state.consecutive_failures = 0;
        state.opened_at = None;
        state.trial_in_flight = false;
        state.window.clear();
    }

    fn transition(&self, state: &mut CircuitBreakerState, to: CircuitState) {
        if state.current != to {
            info!(
                breaker = %self.name,
                from = state.current.as_str(),
                to = to.as_str(),
                "Circuit breaker state transition"
            );
            CircuitBreakerMetrics::record_state_transition(
                &self.name,
                state.current.as_str(),
                to.as_str(),
            );
            state.current = to;
        }
    }

    fn add_to_window(&self, state: &mut CircuitBreakerState, success: bool) {
        if self.config.window_size == 0 {
            return;
        }
        if state.window.len() >= self.config.window_size {
            state.window.pop_front();
        }
        state.window.push_back(success);
    }

    /// Effective circuit state; an Open circuit whose cooldown has elapsed
    /// reports HalfOpen even before the trial call is issued.
    pub fn state(&self) -> CircuitState {
        let state = self.state.read();
        match (state.current, state.opened_at) {
            (CircuitState::Open, Some(at)) if at.elapsed() >= self.config.cooldown => {
                CircuitState::HalfOpen
            }
            (current, _) => current,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.read().consecutive_failures
    }

    /// Remaining cooldown while the circuit is open
    pub fn retry_after(&self) -> Option<Duration> {
        let state = self.state.read();
        match (state.current, state.opened_at) {
            (CircuitState::Open, Some(at)) => {
                Some(self.config.cooldown.saturating_sub(at.elapsed()))
            }
            _ => None,
        }
    }

    /// Share of successes in the sliding window (1.0 when empty)
    pub fn success_rate(&self) -> f64 {
        let state = self.state.read();
        if state.window.is_empty() {
            return 1.0;
        }
        let successes = state.window.iter().filter(|&&ok| ok).count();
        successes as f64 / state.window.len() as f64
    }
}
