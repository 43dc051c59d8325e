/// Integration tests for resilience library
use resilience::{
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState},
    presets,
    timeout::{with_timeout_result, TimeoutError},
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ==================== Circuit Breaker Tests ====================

#[tokio::test(start_paused = true)]
async fn test_circuit_breaker_full_lifecycle() {
    let config = CircuitBreakerConfig {
        failure_threshold: 3,
        cooldown: Duration::from_secs(60),
        ..Default::default()
    };
    let cb = CircuitBreaker::named("edge-a", config);

    // Phase 1: Closed -> Open (3 failures)
    for _ in 0..3 {
        let _ = cb.call(|| async { Err::<(), _>("error") }).await;
    }
    assert_eq!(cb.state(), CircuitState::Open);

    // Phase 2: still open just before cooldown ends
    tokio::time::advance(Duration::from_secs(59)).await;
    assert_eq!(cb.state(), CircuitState::Open);

    // Phase 3: Open -> HalfOpen -> Closed on first trial success
    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(cb.state(), CircuitState::HalfOpen);
    let _ = cb.call(|| async { Ok::<_, String>(()) }).await;
    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.consecutive_failures(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_open_circuit_never_reaches_dependency() {
    let cb = CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: 2,
        ..Default::default()
    });
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..10 {
        let calls = calls.clone();
        let _ = cb
            .call(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("down")
            })
            .await;
    }

    // Only the two calls that tripped the breaker were issued
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cb.consecutive_failures(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_half_open_callers_get_one_trial() {
    let cb = CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: 1,
        ..Default::default()
    });
    cb.record_failure();
    tokio::time::advance(Duration::from_secs(60)).await;

    let first = cb.try_acquire::<()>();
    let second = cb.try_acquire::<()>();
    assert!(first.is_ok());
    assert!(matches!(second, Err(CircuitBreakerError::Open)));

    cb.record_failure();
    assert_eq!(cb.state(), CircuitState::Open);
}

// ==================== Combined Scenario Tests ====================

#[tokio::test(start_paused = true)]
async fn test_timeouts_count_as_breaker_failures() {
    let cb = CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: 2,
        ..Default::default()
    });

    for _ in 0..2 {
        let result = cb
            .call(|| {
                with_timeout_result(Duration::from_millis(10), async {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok::<(), String>(())
                })
            })
            .await;
        assert!(matches!(
            result,
            Err(CircuitBreakerError::CallFailed(TimeoutError::Elapsed(_)))
        ));
    }

    assert_eq!(cb.state(), CircuitState::Open);
}

#[tokio::test]
async fn test_upload_preset_breaker_starts_closed() {
    let config = presets::upload_config();
    let cb = CircuitBreaker::new(config.circuit_breaker);

    assert_eq!(cb.state(), CircuitState::Closed);

    let result = cb.call(|| async { Ok::<_, String>(42) }).await;
    assert_eq!(result.unwrap(), 42);
}
