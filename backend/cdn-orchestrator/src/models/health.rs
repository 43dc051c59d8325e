use chrono::{DateTime, Utc};
use resilience::CircuitState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl From<CircuitState> for BreakerState {
    fn from(state: CircuitState) -> Self {
        match state {
            CircuitState::Closed => Self::Closed,
            CircuitState::Open => Self::Open,
            CircuitState::HalfOpen => Self::HalfOpen,
        }
    }
}

/// Point-in-time view of a provider's health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub provider_id: String,
    pub status: HealthState,
    pub last_check: Option<DateTime<Utc>>,
    pub latency_ms: Option<u64>,
    pub error_count: u32,
    /// Rolling uptime percentage (0-100)
    pub uptime: f64,
    pub consecutive_failures: u32,
    pub circuit_state: BreakerState,
    /// Set only while the circuit is open
    pub next_retry: Option<DateTime<Utc>>,
}

impl HealthStatus {
    /// The single routing/selection predicate
    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy | HealthState::Degraded)
            && self.circuit_state == BreakerState::Closed
    }
}
