/// Resilience patterns for calls to external edge providers
///
/// This library provides:
/// - **Circuit Breaker**: consecutive-failure breaker with a cooldown and a
///   single half-open trial
/// - **Timeout**: per-call deadlines that surface as ordinary failures
/// - **Preset Configurations**: tuned settings for upload, purge and probe calls
///
/// # Example: provider upload behind a breaker and a deadline
///
/// ```rust,no_run
/// use resilience::{presets, CircuitBreaker, timeout::with_timeout_result};
///
/// #[tokio::main]
/// async fn main() {
///     let config = presets::upload_config();
///     let breaker = CircuitBreaker::named("cloudflare-main", config.circuit_breaker);
///
///     let result = breaker
///         .call(|| with_timeout_result(config.timeout.duration, async {
///             // Provider upload here
///             Ok::<_, String>(())
///         }))
///         .await;
/// }
/// ```

pub mod circuit_breaker;
pub mod metrics;
pub mod presets;
pub mod timeout;

// Re-export main types for convenience
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
pub use presets::{probe_config, purge_config, upload_config, ServiceConfig};
pub use timeout::{with_timeout, with_timeout_result, Elapsed, TimeoutConfig, TimeoutError};
