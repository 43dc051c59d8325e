//! HTTP surface exercised through actix-web's test harness
mod common;

use actix_web::{test, web, App};
use cdn_orchestrator::handlers;
use common::{orchestrator_with, provider, MockClientFactory};
use serde_json::Value;
use std::sync::Arc;

fn app_data(
    providers: Vec<cdn_orchestrator::models::ProviderDefinition>,
) -> (web::Data<cdn_orchestrator::CdnOrchestrator>, Arc<MockClientFactory>) {
    let (orch, factory) = orchestrator_with(providers);
    (web::Data::new(orch), factory)
}

#[actix_web::test]
async fn test_upload_then_resolve_url() {
    let (data, _) = app_data(vec![provider("a", 1, 1.0, &["eu-west"])]);
    let app = test::init_service(App::new().app_data(data.clone()).configure(handlers::configure)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/files?filename=logo.png&user_id=u1&priority=cost&tags=brand,logo")
        .insert_header(("content-type", "image/png"))
        .set_payload(vec![1u8, 2, 3, 4])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let file: Value = test::read_body_json(resp).await;
    assert_eq!(file["mime_type"], "image/png");
    assert_eq!(file["tags"], serde_json::json!(["brand", "logo"]));
    assert_eq!(file["placements"]["a"]["status"], "cached");
    let id = file["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/files/{}/url?format=auto&width=200", id))
        .insert_header(("accept", "image/webp,*/*"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let routed: Value = test::read_body_json(resp).await;
    assert_eq!(routed["provider_id"], "a");
    assert!(routed["url"].as_str().unwrap().ends_with("?format=webp&width=200"));

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/files/{}", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let stored: Value = test::read_body_json(resp).await;
    assert_eq!(stored["analytics"]["total_requests"], 1);
}

#[actix_web::test]
async fn test_error_mapping() {
    let (data, _) = app_data(vec![]);
    let app = test::init_service(App::new().app_data(data).configure(handlers::configure)).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/files?filename=a.txt&user_id=u1")
            .set_payload("abc")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 503);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "NO_HEALTHY_PROVIDERS");

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/v1/files/not-a-uuid").to_request(),
    )
    .await;
    assert_eq!(resp.status(), 400);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/v1/files/{}", uuid::Uuid::new_v4()))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 404);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/purge")
            .set_json(serde_json::json!({}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 400);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/v1/analytics?range=decade").to_request(),
    )
    .await;
    assert_eq!(resp.status(), 400);

    let resp = test::call_service(
        &app,
        test::TestRequest::post().uri("/api/v1/providers/ghost/enable").to_request(),
    )
    .await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn test_total_upload_failure_lists_providers() {
    let (data, factory) = app_data(vec![provider("a", 1, 1.0, &[])]);
    factory.client("a").fail_uploads(true);
    let app = test::init_service(App::new().app_data(data).configure(handlers::configure)).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/files?filename=a.bin&user_id=u1")
            .set_payload("payload")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 503);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "DISTRIBUTION_FAILED");
    assert_eq!(body["failures"][0]["provider_id"], "a");

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/providers").to_request()).await;
    let providers: Value = test::read_body_json(resp).await;
    assert!(providers[0]["last_error"]
        .as_str()
        .unwrap()
        .contains("503"));
    assert_eq!(providers[0]["health"]["error_count"], 1);
}

#[actix_web::test]
async fn test_provider_listing_redacts_credentials_and_toggles() {
    let (data, _) = app_data(vec![provider("a", 1, 1.0, &[])]);
    let app = test::init_service(App::new().app_data(data.clone()).configure(handlers::configure)).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/providers").to_request()).await;
    assert_eq!(resp.status(), 200);
    let body = test::read_body(resp).await;
    let text = std::str::from_utf8(&body).unwrap();
    assert!(!text.contains("a-secret-key"));
    let providers: Value = serde_json::from_str(text).unwrap();
    assert_eq!(providers[0]["id"], "a");
    assert_eq!(providers[0]["health"]["circuit_state"], "closed");
    assert!(providers[0].get("last_error").is_none());

    let resp = test::call_service(
        &app,
        test::TestRequest::post().uri("/api/v1/providers/a/disable").to_request(),
    )
    .await;
    assert_eq!(resp.status(), 204);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/status").to_request()).await;
    let status: Value = test::read_body_json(resp).await;
    assert_eq!(status["totalProviders"], 1);
    assert_eq!(status["healthyProviders"], 0);

    let resp = test::call_service(
        &app,
        test::TestRequest::post().uri("/api/v1/providers/a/enable").to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    assert_eq!(data.get_system_status().healthy_providers, 1);
}

#[actix_web::test]
async fn test_liveness_metrics_and_analytics() {
    let (data, _) = app_data(vec![provider("a", 1, 1.0, &[])]);
    let app = test::init_service(App::new().app_data(data).configure(handlers::configure)).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), 200);

    // Make sure at least one series exists before scraping
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/files?filename=m.txt&user_id=u1")
            .set_payload("metrics")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 201);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
    assert_eq!(resp.status(), 200);
    let body = test::read_body(resp).await;
    assert!(std::str::from_utf8(&body).unwrap().contains("cdn_upload_total"));

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/v1/analytics?range=all").to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let report: Value = test::read_body_json(resp).await;
    assert_eq!(report["range"], "all");
    assert_eq!(report["total_files"], 1);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/v1/analytics/recommendations")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let recs: Value = test::read_body_json(resp).await;
    assert_eq!(recs, serde_json::json!([]));
}
