//! HTTP surface tests: the axum router driven in-process via
//! `tower::ServiceExt::oneshot`, no sockets involved. The interesting
//! behaviour lives in the core; these tests pin the wire shapes and the
//! error mapping the dashboard consumers rely on.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use probos::broadcast::Broadcaster;
use probos::ingest::Ingestor;
use probos::routes::{self, AppState};
use probos::schema;
use probos::store::Store;
use probos::tickets::TicketManager;
use probos::ScoringConfig;

// ---

async fn build_app() -> (tempfile::TempDir, Router) {
    // ---
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}/api.db?mode=rwc", dir.path().display());
    let store = Store::connect(&url, 5).await.unwrap();
    schema::create_schema(store.pool()).await.unwrap();

    let broadcaster = Arc::new(Broadcaster::new(256, Duration::ZERO));
    let tickets = Arc::new(TicketManager::new(store.clone(), broadcaster.clone()));
    let ingestor = Arc::new(Ingestor::new(
        store.clone(),
        tickets.clone(),
        broadcaster.clone(),
        Arc::new(ScoringConfig::default()),
    ));

    let app = routes::router(AppState {
        store,
        ingestor,
        tickets,
        broadcaster,
    });
    (dir, app)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    // ---
    let request = match body {
        Some(json) => Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn reading_body(sensor_id: &str, moisture: f64, temperature: f64, ec: f64, ph: f64) -> Value {
    // ---
    json!({
        "sensorId": sensor_id,
        "moisture": moisture,
        "temperature": temperature,
        "ec": ec,
        "ph": ph,
    })
}

/// Register a sensor and push `n` mildly wiggling readings through it.
async fn seed(app: &Router, external_id: &str, zone: &str, n: usize) {
    // ---
    let (status, _) = send(
        app,
        Method::POST,
        "/api/sensors",
        Some(json!({ "externalId": external_id, "zone": zone, "type": "soil-probe" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    for i in 0..n {
        let wiggle = if i % 2 == 0 { 1.0 } else { -1.0 };
        let (status, _) = send(
            app,
            Method::POST,
            "/api/readings",
            Some(reading_body(
                external_id,
                30.0 + wiggle,
                22.0 + 0.3 * wiggle,
                1.2 + 0.03 * wiggle,
                6.5 + 0.03 * wiggle,
            )),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}

// ---

#[tokio::test]
async fn health_endpoint_proves_the_store_answers() {
    // ---
    let (_dir, app) = build_app().await;

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sensors"], 0);

    // The reported fleet size tracks registrations.
    seed(&app, "s_00", "zone_0", 0).await;
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sensors"], 1);
}

#[tokio::test]
async fn registration_returns_created_then_conflict() {
    // ---
    let (_dir, app) = build_app().await;

    let payload = json!({ "externalId": "s_01", "zone": "zone_1", "type": "soil-probe" });
    let (status, body) = send(&app, Method::POST, "/api/sensors", Some(payload.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["externalId"], "s_01");
    assert!(body["id"].as_i64().is_some());

    let (status, body) = send(&app, Method::POST, "/api/sensors", Some(payload)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("s_01"));
}

#[tokio::test]
async fn unknown_entities_map_to_not_found() {
    // ---
    let (_dir, app) = build_app().await;

    let (status, _) = send(&app, Method::GET, "/api/sensors/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/readings",
        Some(reading_body("ghost", 30.0, 22.0, 1.2, 6.5)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("ghost"));

    let (status, _) = send(
        &app,
        Method::PATCH,
        "/api/tickets/999",
        Some(json!({ "status": "resolved" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_numeric_probe_is_unprocessable() {
    // ---
    let (_dir, app) = build_app().await;
    seed(&app, "s_02", "zone_1", 1).await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/readings",
        Some(json!({ "sensorId": "s_02", "moisture": "wet" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn ingest_returns_null_trust_until_enough_history() {
    // ---
    let (_dir, app) = build_app().await;
    seed(&app, "s_03", "zone_1", 4).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/readings",
        Some(reading_body("s_03", 30.5, 22.1, 1.22, 6.5)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    // Fifth stored reading: the verdict appears.
    assert!(body["trust"].is_object());
    assert_eq!(body["trust"]["status"], "healthy");
    assert_eq!(body["trust"]["score"], 1.0);
    assert_eq!(body["trust"]["rootCauses"], json!(["normal"]));
}

#[tokio::test]
async fn sensor_detail_and_trust_history_expose_verdicts() {
    // ---
    let (_dir, app) = build_app().await;
    seed(&app, "s_04", "zone_1", 8).await;

    let (status, body) = send(&app, Method::GET, "/api/sensors", None).await;
    assert_eq!(status, StatusCode::OK);
    let detail = &body.as_array().unwrap()[0];
    assert_eq!(detail["externalId"], "s_04");
    assert!(detail["latestReading"].is_object());
    assert!(detail["latestTrust"].is_object());

    let id = detail["id"].as_i64().unwrap();
    let (status, history) = send(
        &app,
        Method::GET,
        &format!("/api/sensors/{id}/trust?limit=3"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let history = history.as_array().unwrap().clone();
    assert_eq!(history.len(), 3);
    for verdict in &history {
        assert_eq!(verdict["label"], "Highly Reliable");
    }
}

#[tokio::test]
async fn batch_endpoint_reports_per_item_outcomes() {
    // ---
    let (_dir, app) = build_app().await;
    seed(&app, "s_05", "zone_1", 0).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/readings/batch",
        Some(json!([
            { "sensorId": "s_05", "moisture": 30.0, "temperature": 22.0, "ec": 1.2, "ph": 6.5 },
            { "sensorId": "ghost", "moisture": 30.0 },
            { "sensorId": "s_05", "moisture": 31.0, "temperature": 22.3, "ec": 1.23, "ph": 6.53 },
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let outcomes = body.as_array().unwrap();
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0]["ok"], true);
    assert_eq!(outcomes[1]["ok"], false);
    assert!(outcomes[1]["error"].as_str().unwrap().contains("ghost"));
    assert_eq!(outcomes[2]["ok"], true);
}

#[tokio::test]
async fn dashboard_and_zone_endpoints_aggregate() {
    // ---
    let (_dir, app) = build_app().await;
    seed(&app, "s_06", "north", 6).await;
    seed(&app, "s_07", "south", 6).await;

    let (status, body) = send(&app, Method::GET, "/api/dashboard", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalSensors"], 2);
    assert_eq!(body["byStatus"]["healthy"], 2);
    assert_eq!(body["tickets"]["total"], 0);

    let (status, body) = send(&app, Method::GET, "/api/dashboard/zones", None).await;
    assert_eq!(status, StatusCode::OK);
    let zones = body.as_array().unwrap();
    assert_eq!(zones.len(), 2);
    assert_eq!(zones[0]["zone"], "north");
    assert_eq!(zones[0]["healthy"], 1);
}

#[tokio::test]
async fn ticket_endpoints_follow_the_lifecycle() {
    // ---
    let (_dir, app) = build_app().await;
    // Three sensors in one zone so a lone spike reads as a zone mismatch.
    seed(&app, "s_08", "west", 10).await;
    seed(&app, "s_09", "west", 10).await;
    seed(&app, "s_10", "west", 10).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/readings",
        Some(reading_body("s_08", 92.0, 22.0, 3.1, 8.2)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["trust"]["status"], "anomalous");

    let (status, body) = send(&app, Method::GET, "/api/tickets?status=open", None).await;
    assert_eq!(status, StatusCode::OK);
    let tickets = body.as_array().unwrap();
    assert_eq!(tickets.len(), 1);
    let ticket_id = tickets[0]["id"].as_i64().unwrap();
    assert_eq!(tickets[0]["severity"], "high");

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/api/tickets/{ticket_id}"),
        Some(json!({ "status": "inProgress" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "inProgress");

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/api/tickets/{ticket_id}"),
        Some(json!({ "status": "resolved" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["resolvedAt"].is_string());

    // Resolved tickets never move again.
    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/api/tickets/{ticket_id}"),
        Some(json!({ "status": "inProgress" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&app, Method::GET, "/api/tickets?status=open", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}
