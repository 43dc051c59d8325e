/// Preset configurations for edge provider operations
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::timeout::TimeoutConfig;
use std::time::Duration;

/// Configuration bundle for one kind of provider call
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub timeout: TimeoutConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

fn provider_breaker() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: 5,
        cooldown: Duration::from_secs(60),
        window_size: 100,
    }
}

/// Object uploads to an edge provider
///
/// - Timeout: 30s (large payloads)
/// - Circuit breaker: 5 consecutive failures, 60s cooldown
pub fn upload_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(30),
        },
        circuit_breaker: provider_breaker(),
    }
}

/// Cache invalidation requests
///
/// - Timeout: 15s
/// - Circuit breaker: 5 consecutive failures, 60s cooldown
pub fn purge_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(15),
        },
        circuit_breaker: provider_breaker(),
    }
}

/// Health probes
///
/// - Timeout: 8s (must finish well inside the 30s probe interval)
/// - Circuit breaker: 5 consecutive failures, 60s cooldown
pub fn probe_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(8),
        },
        circuit_breaker: provider_breaker(),
    }
}
