// tests/metrics_http.rs
//
// The Prometheus scrape route. The recorder is process-global, so this
// binary installs it exactly once.

mod common;

use axum::body::{self, Body};
use http::{Request, StatusCode};
use tower::ServiceExt as _;

use common::config;
use dossier::metrics::Metrics;

#[tokio::test]
async fn metrics_route_renders_config_gauges() {
    let cfg = config();
    let metrics = Metrics::init(&cfg).expect("recorder installs once");

    let req = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .expect("build request");
    let resp = metrics.router().oneshot(req).await.expect("oneshot");
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), 1 << 20)
        .await
        .expect("read body");
    let text = String::from_utf8(bytes.to_vec()).expect("utf-8 exposition");
    assert!(text.contains(&format!("refresh_interval_secs {}", cfg.refresh.interval_secs)));
    assert!(text.contains(&format!("tracked_fields {}", cfg.fields.len())));
}
