//! Circuit breaker behaviour as seen through the orchestrator
mod common;

use cdn_orchestrator::models::{BreakerState, HealthState};
use cdn_orchestrator::services::{CdnEvent, ProbeOutcome, UploadOptions};
use common::{orchestrator_with, provider};
use std::time::Duration;
use tokio::sync::watch;

async fn upload_n(orch: &cdn_orchestrator::CdnOrchestrator, n: usize) {
    for i in 0..n {
        orch.upload_to_cdn(
            format!("payload-{}", i).into_bytes(),
            "f.bin",
            "application/octet-stream",
            "u1",
            UploadOptions::default(),
        )
        .await
        .unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_failures_open_circuit_and_stop_traffic() {
    let (orch, factory) = orchestrator_with(vec![provider("good", 1, 1.0, &[]), provider("bad", 2, 1.0, &[])]);
    factory.client("bad").fail_uploads(true);

    upload_n(&orch, 5).await;

    let bad = orch.provider_health("bad").unwrap();
    assert_eq!(bad.circuit_state, BreakerState::Open);
    assert_eq!(bad.status, HealthState::Unhealthy);
    assert!(bad.next_retry.is_some());
    assert_eq!(factory.client("bad").uploads(), 5);

    // Open circuit: no further network calls to the failing provider
    upload_n(&orch, 3).await;
    assert_eq!(factory.client("bad").uploads(), 5);
    assert_eq!(orch.get_system_status().healthy_providers, 1);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_probe_closes_circuit() {
    let (orch, factory) = orchestrator_with(vec![provider("good", 1, 1.0, &[]), provider("bad", 2, 1.0, &[])]);
    factory.client("bad").fail_uploads(true);
    upload_n(&orch, 5).await;
    let mut events = orch.subscribe();

    // Probes during cooldown are skipped without touching the network
    let outcomes = orch.check_health().await;
    assert!(outcomes.contains(&("bad".to_string(), ProbeOutcome::Skipped)));
    assert_eq!(factory.client("bad").probes(), 0);

    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(orch.provider_health("bad").unwrap().circuit_state, BreakerState::HalfOpen);

    factory.client("bad").fail_uploads(false);
    let outcomes = orch.check_health().await;
    assert!(matches!(
        outcomes.iter().find(|(id, _)| id == "bad").map(|(_, o)| o),
        Some(ProbeOutcome::Healthy(_))
    ));

    let bad = orch.provider_health("bad").unwrap();
    assert_eq!(bad.circuit_state, BreakerState::Closed);
    assert_eq!(bad.consecutive_failures, 0);

    match events.recv().await.unwrap() {
        CdnEvent::ProviderStateChanged { provider_id, from, to } => {
            assert_eq!(provider_id, "bad");
            assert_eq!(from, BreakerState::HalfOpen);
            assert_eq!(to, BreakerState::Closed);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    // Fresh bytes so dedup cannot absorb the upload
    orch.upload_to_cdn(
        b"after-recovery".to_vec(),
        "f.bin",
        "application/octet-stream",
        "u1",
        UploadOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(factory.client("bad").uploads(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_failed_trial_reopens_circuit() {
    let (orch, factory) = orchestrator_with(vec![provider("only", 1, 1.0, &[])]);
    factory.client("only").fail_probes(true);

    for _ in 0..5 {
        orch.check_health().await;
    }
    assert_eq!(orch.provider_health("only").unwrap().circuit_state, BreakerState::Open);

    tokio::time::advance(Duration::from_secs(60)).await;
    let outcomes = orch.check_health().await;
    assert!(matches!(outcomes[0].1, ProbeOutcome::Failed(_)));

    let only = orch.provider_health("only").unwrap();
    assert_eq!(only.circuit_state, BreakerState::Open);
    assert_eq!(factory.client("only").probes(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_probes_record_latency_and_feed_status() {
    let (orch, factory) = orchestrator_with(vec![provider("a", 1, 1.0, &[]), provider("b", 2, 1.0, &[])]);
    factory.client("a").set_probe_latency(Duration::from_millis(40));
    factory.client("b").set_probe_latency(Duration::from_millis(80));

    orch.check_health().await;

    assert_eq!(orch.provider_health("a").unwrap().latency_ms, Some(40));
    let status = orch.get_system_status();
    assert_eq!(status.total_providers, 2);
    assert_eq!(status.healthy_providers, 2);
    assert_eq!(status.avg_response_time, 60.0);
}

#[tokio::test(start_paused = true)]
async fn test_one_hung_probe_does_not_delay_others() {
    let mut hung = provider("hung", 1, 1.0, &[]);
    hung.timeouts.probe_secs = Some(3);
    let (orch, factory) = orchestrator_with(vec![hung, provider("ok", 2, 1.0, &[])]);
    factory.client("hung").set_delay(Duration::from_secs(600));

    let started = tokio::time::Instant::now();
    let outcomes = orch.check_health().await;

    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(matches!(outcomes[0].1, ProbeOutcome::Failed(_)));
    assert!(matches!(outcomes[1].1, ProbeOutcome::Healthy(_)));
    assert_eq!(orch.provider_health("hung").unwrap().consecutive_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_background_loop_probes_and_stops() {
    let (orch, factory) = orchestrator_with(vec![provider("a", 1, 1.0, &[])]);
    let (tx, rx) = watch::channel(false);
    let handles = orch.start_background_tasks(rx);

    // First tick fires immediately, the next after the 30s interval
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(factory.client("a").probes() >= 2);

    tx.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
}
