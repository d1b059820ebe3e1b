//! API regression tests.
//!
//! Drives the `/simulate` route through the router without binding a
//! socket.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use skenario_api::{build_router, ApiState};
use tower::ServiceExt;

fn test_router() -> axum::Router {
    let dir = std::env::temp_dir().join("skenario-api-test.db");
    build_router(ApiState { db_path: dir })
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn simulate_inmemory_returns_results() {
    let router = test_router();

    let req = Request::builder()
        .uri("/simulate?inmemory=true&run_for=30&number_of_requests=5")
        .body(Body::empty())
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert_eq!(json["success"], true);
    let data = &json["data"];
    assert_eq!(data["traffic_pattern"], "uniform_random");
    assert_eq!(data["requests_scheduled"], 5);
    assert!(data["completed_count"].as_u64().unwrap() >= 2);
    assert!(data["replica_series"].as_array().unwrap().len() > 0);
    // The first movement in the log is the start sentinel.
    assert_eq!(data["movements"][0]["kind"], "scenario_start");
}

#[tokio::test]
async fn simulate_rejects_nonpositive_run_length() {
    let router = test_router();

    let req = Request::builder()
        .uri("/simulate?inmemory=true&run_for=0")
        .body(Body::empty())
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let json = body_json(resp).await;
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("run_for"));
}

#[tokio::test]
async fn simulate_rejects_unknown_traffic_pattern() {
    let router = test_router();

    let req = Request::builder()
        .uri("/simulate?inmemory=true&traffic_pattern=sawtooth")
        .body(Body::empty())
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn simulate_ramp_pattern_over_http() {
    let router = test_router();

    let req = Request::builder()
        .uri("/simulate?inmemory=true&run_for=30&traffic_pattern=ramp&ramp_delta_v=0.5&ramp_max_rps=2")
        .body(Body::empty())
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert_eq!(json["data"]["traffic_pattern"], "ramp");
}
