use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use apiwatch::model::RequestRecord;
use apiwatch::store::{MemoryStore, RecordStore};
use apiwatch::{server, AppState};

const KEY: &str = "test-key";

fn app() -> Router {
    app_with_store().0
}

fn app_with_store() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(
        store.clone(),
        KEY,
        Duration::from_secs(1),
        Duration::from_millis(200),
    );
    (server::create_router(Arc::new(state)), store)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).header("X-API-Key", KEY).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("X-API-Key", KEY)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn ingest(app: &Router, body: Value) -> Value {
    let (status, saved) = send(app, post_json("/api/requests", body)).await;
    assert_eq!(status, StatusCode::CREATED, "{saved}");
    saved
}

fn exchange(method: &str, path: &str, status: u16, ms: u64, created_at: &str) -> Value {
    json!({
        "projectId": "shop",
        "method": method,
        "path": path,
        "responseStatus": status,
        "responseTime": ms,
        "createdAt": created_at,
    })
}

// ─── Access control ──────────────────────────────────────────────

#[tokio::test]
async fn missing_key_is_unauthorized_and_wrong_key_forbidden() {
    let app = app();

    let (status, body) = send(
        &app,
        Request::get("/api/requests/count?projectId=shop").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "API key is required");

    let (status, body) = send(
        &app,
        Request::get("/api/requests/count?projectId=shop")
            .header("X-API-Key", "nope")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], 403);
}

#[tokio::test]
async fn liveness_needs_no_key() {
    let (status, body) = send(&app(), Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "UP");
}

// ─── Ingestion ───────────────────────────────────────────────────

#[tokio::test]
async fn invalid_payload_reports_each_field() {
    let (status, body) = send(
        &app(),
        post_json("/api/requests", json!({ "projectId": " ", "responseTime": -5 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"]["projectId"], "Project ID is required");
    assert_eq!(body["fields"]["method"], "Method is required");
    assert_eq!(body["fields"]["path"], "Path is required");
    assert_eq!(body["fields"]["responseTime"], "Response time must be >= 0");
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let req = Request::post("/api/requests")
        .header("X-API-Key", KEY)
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(&app(), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn created_record_can_be_fetched_by_id() {
    let app = app();
    let saved = ingest(
        &app,
        json!({
            "projectId": "shop",
            "method": "POST",
            "path": "/api/orders",
            "responseTime": 42,
            "requestHeaders": { "content-type": "application/json" },
        }),
    )
    .await;
    assert!(saved["createdAt"].is_string());

    let id = saved["id"].as_str().unwrap();
    let (status, fetched) = send(&app, get(&format!("/api/requests/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["path"], "/api/orders");
    assert_eq!(fetched["responseTime"], 42);
    assert_eq!(fetched["requestHeaders"]["content-type"], "application/json");
}

#[tokio::test]
async fn unknown_id_is_not_found() {
    let id = uuid::Uuid::new_v4();
    let (status, body) = send(&app(), get(&format!("/api/requests/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], format!("API Request not found with id: {id}"));

    let (status, _) = send(&app(), get("/api/requests/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ─── Record queries ──────────────────────────────────────────────

#[tokio::test]
async fn method_filter_beats_search() {
    let app = app();
    ingest(&app, exchange("GET", "/api/orders", 200, 10, "2024-05-01T10:00:00Z")).await;
    ingest(&app, exchange("POST", "/api/users", 201, 10, "2024-05-01T11:00:00Z")).await;

    let (status, page) = send(
        &app,
        get("/api/requests/table?projectId=shop&method=GET&search=users"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["totalElements"], 1);
    assert_eq!(page["content"][0]["path"], "/api/orders");
}

#[tokio::test]
async fn table_pagination_metadata() {
    let app = app();
    for i in 0..5 {
        ingest(
            &app,
            exchange("GET", &format!("/api/items/{i}"), 200, 10, &format!("2024-05-01T10:0{i}:00")),
        )
        .await;
    }

    let (_, page) = send(&app, get("/api/requests/table?projectId=shop&page=0&size=2")).await;
    assert_eq!(page["totalElements"], 5);
    assert_eq!(page["totalPages"], 3);
    assert_eq!(page["first"], true);
    assert_eq!(page["last"], false);
    // newest first by default
    assert_eq!(page["content"][0]["path"], "/api/items/4");
}

#[tokio::test]
async fn table_rejects_unknown_sort_and_bad_size() {
    let (status, body) = send(
        &app(),
        get("/api/requests/table?projectId=shop&sortBy=secret&size=0"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["sortBy"].is_string());
    assert!(body["fields"]["size"].is_string());
}

#[tokio::test]
async fn date_range_filter_is_inclusive() {
    let app = app();
    ingest(&app, exchange("GET", "/a", 200, 10, "2024-05-01T09:59:59Z")).await;
    ingest(&app, exchange("GET", "/b", 200, 10, "2024-05-01T10:00:00Z")).await;
    ingest(&app, exchange("GET", "/c", 200, 10, "2024-05-01T11:00:00Z")).await;

    let (_, page) = send(
        &app,
        get(concat!(
            "/api/requests/table?projectId=shop",
            "&startDate=2024-05-01T10:00:00&endDate=2024-05-01T11:00:00&sortDirection=asc",
        )),
    )
    .await;
    let paths: Vec<_> = page["content"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["path"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(paths, ["/b", "/c"]);
}

#[tokio::test]
async fn list_view_deduplicates_paths() {
    let app = app();
    let mut newest = Value::Null;
    for i in 0..10 {
        newest = ingest(
            &app,
            exchange("GET", "/api/users", 200, 10 + i, &format!("2024-05-01T10:00:0{i}Z")),
        )
        .await;
    }
    ingest(&app, exchange("GET", "/api/orders", 200, 10, "2024-05-01T09:00:00Z")).await;

    let (status, list) = send(&app, get("/api/requests/list?projectId=shop")).await;
    assert_eq!(status, StatusCode::OK);
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["id"], newest["id"]);
    assert_eq!(list[1]["path"], "/api/orders");
}

#[tokio::test]
async fn search_and_count() {
    let app = app();
    ingest(&app, exchange("GET", "/api/users/1", 200, 10, "2024-05-01T10:00:00Z")).await;
    ingest(&app, exchange("GET", "/api/users/2", 200, 10, "2024-05-01T12:00:00Z")).await;
    ingest(&app, exchange("GET", "/api/orders", 200, 10, "2024-05-01T11:00:00Z")).await;

    let uri = "/api/requests/search?projectId=shop&search=users&size=1";
    let (_, page) = send(&app, get(uri)).await;
    assert_eq!(page["totalElements"], 2);
    assert_eq!(page["content"][0]["path"], "/api/users/2");

    let (_, count) = send(&app, get("/api/requests/count?projectId=shop")).await;
    assert_eq!(count, 3);
}

#[tokio::test]
async fn query_without_project_is_rejected() {
    let (status, body) = send(&app(), get("/api/requests/list")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"]["projectId"], "Project ID is required");
}

// ─── Health metrics ──────────────────────────────────────────────

#[tokio::test]
async fn ingest_refreshes_endpoint_snapshot() {
    let app = app();
    for (status, ms) in [(200, 100), (200, 150), (500, 200)] {
        ingest(&app, exchange("GET", "/api/users", status, ms, "2024-05-01T10:00:00Z")).await;
    }

    let (status, m) = send(
        &app,
        get("/api/health-metrics/endpoint?projectId=shop&endpoint=/api/users"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(m["totalRequests"], 3);
    assert_eq!(m["avgResponseTime"], 150.0);
    assert_eq!(m["minResponseTime"], 100);
    assert_eq!(m["maxResponseTime"], 200);
    assert_eq!(m["successCount"], 2);
    assert_eq!(m["errorCount"], 1);
    assert_eq!(m["healthScore"], 78);

    let id = m["id"].as_str().unwrap();
    let (status, by_id) = send(&app, get(&format!("/api/health-metrics/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_id["endpoint"], "/api/users");

    let (_, count) = send(&app, get("/api/health-metrics/count?projectId=shop")).await;
    assert_eq!(count, 1);
}

#[tokio::test]
async fn metrics_table_filters_by_health_range() {
    let app = app();
    ingest(&app, exchange("GET", "/fast", 200, 10, "2024-05-01T10:00:00Z")).await;
    ingest(&app, exchange("GET", "/broken", 500, 2500, "2024-05-01T10:00:00Z")).await;

    let (_, page) = send(
        &app,
        get("/api/health-metrics/table?projectId=shop&minHealthScore=0&maxHealthScore=50"),
    )
    .await;
    assert_eq!(page["totalElements"], 1);
    assert_eq!(page["content"][0]["endpoint"], "/broken");

    let (_, list) = send(&app, get("/api/health-metrics/list?projectId=shop")).await;
    assert_eq!(list.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn recalculate_rebuilds_snapshots_from_stored_records() {
    let (app, store) = app_with_store();
    for (status, ms) in [(200, 100), (500, 300)] {
        store
            .save_record(RequestRecord {
                id: Uuid::new_v4(),
                project_id: "shop".into(),
                method: "GET".into(),
                path: "/api/users".into(),
                query_string: None,
                response_status: Some(status),
                response_time_ms: ms,
                created_at: "2024-05-01T10:00:00Z".parse().unwrap(),
                request_headers: Default::default(),
                request_body: None,
                response_body: None,
            })
            .await
            .unwrap();
    }
    let snapshot_uri = "/api/health-metrics/endpoint?projectId=shop&endpoint=/api/users";
    let (status, _) = send(&app, get(snapshot_uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = Request::post("/api/health-metrics/recalculate?projectId=shop")
        .header("X-API-Key", KEY)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["projectId"], "shop");

    for _ in 0..100 {
        let (status, m) = send(&app, get(snapshot_uri)).await;
        if status == StatusCode::OK {
            assert_eq!(m["totalRequests"], 2);
            assert_eq!(m["errorCount"], 1);
            assert_eq!(m["avgResponseTime"], 200.0);
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("recalculation never wrote a snapshot");
}

#[tokio::test]
async fn missing_snapshot_is_not_found() {
    let (status, _) = send(
        &app(),
        get("/api/health-metrics/endpoint?projectId=shop&endpoint=/nothing"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ─── Live feed ───────────────────────────────────────────────────

#[tokio::test]
async fn metrics_stream_emits_list_view() {
    let app = app();
    ingest(&app, exchange("GET", "/api/users", 200, 10, "2024-05-01T10:00:00Z")).await;

    let resp = app
        .clone()
        .oneshot(get("/api/health-metrics/stream?projectId=shop"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "text/event-stream");

    let mut body = resp.into_body();
    let frame = tokio::time::timeout(Duration::from_secs(2), body.frame())
        .await
        .expect("first event within the interval")
        .unwrap()
        .unwrap();
    let event = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
    assert!(event.contains("event: metrics"), "{event}");
    assert!(event.contains(r#""endpoint":"/api/users""#), "{event}");
    assert!(event.contains(r#""totalRequests":1"#), "{event}");
}

#[tokio::test]
async fn metrics_stream_requires_project() {
    let (status, body) = send(&app(), get("/api/health-metrics/stream")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["projectId"].is_string(), "{body}");
}
