//! Integration tests for the REST surface, driven through the router with oneshot,
//! and for the websocket feed against a bound listener

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tower::ServiceExt;

use sensor_relay::{
    clock::ManualClock,
    config::{DeviceEndpoint, DevicesConfig},
    error::FetchError,
    fetcher::{RawPayload, RemoteSensors, SensorFetcher},
    relay::LiveRelay,
    server::{self, AppState},
    store::{MemoryStore, ReadingStore},
};

/// serves whatever payload is queued for an endpoint url
#[derive(Default)]
struct StubFetcher {
    payloads: Mutex<Vec<(String, Result<Value, String>)>>,
}

impl StubFetcher {
    fn answer(&self, endpoint: &DeviceEndpoint, payload: Result<Value, &str>) {
        self.payloads
            .lock()
            .unwrap()
            .push((endpoint.url.clone(), payload.map_err(str::to_string)));
    }
}

#[async_trait]
impl SensorFetcher for StubFetcher {
    async fn fetch(&self, endpoint: &DeviceEndpoint) -> Result<RawPayload, FetchError> {
        let payloads = self.payloads.lock().unwrap();
        match payloads.iter().rev().find(|(url, _)| url == &endpoint.url) {
            Some((_, Ok(payload))) => Ok(payload.clone()),
            Some((_, Err(reason))) => Err(FetchError::Unavailable(reason.clone())),
            None => Err(FetchError::Unavailable("no stub".to_string())),
        }
    }
}

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
    fetcher: Arc<StubFetcher>,
    clock: Arc<ManualClock>,
    devices: DevicesConfig,
    relay: LiveRelay,
}

fn harness(api_token: Option<&str>) -> Harness {
    harness_with_interval(api_token, Duration::from_secs(3))
}

fn harness_with_interval(api_token: Option<&str>, interval: Duration) -> Harness {
    let devices = DevicesConfig::default();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()));
    let store = Arc::new(MemoryStore::new(ChronoDuration::hours(1), clock.clone()));
    let fetcher = Arc::new(StubFetcher::default());
    let sensors = RemoteSensors::new(fetcher.clone(), devices.primary.clone(), devices.secondary.clone());
    let relay = LiveRelay::new(sensors.clone(), store.clone(), interval);

    let state = AppState {
        store: store.clone(),
        sensors,
        relay: relay.clone(),
        devices: devices.clone(),
        api_token: api_token.map(Arc::from),
    };

    Harness { app: server::router(state), store, fetcher, clock, devices, relay }
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, json)
}

#[tokio::test]
async fn fetch_and_save_stores_and_returns_device_history() {
    let h = harness(None);
    h.fetcher.answer(&h.devices.primary, Ok(json!([{ "temperature": 22.5, "humidity": 41.0 }])));

    let (status, body) = call(&h.app, Method::POST, "/api/data/fetch-and-save", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["deviceId"], "kitchen");
    assert_eq!(body["data"][0]["humidity"], 41.0);
    assert!(body["message"].as_str().unwrap().contains("kitchen"));

    h.clock.advance(ChronoDuration::seconds(3));
    h.fetcher.answer(&h.devices.primary, Ok(json!({ "temperature": 23.0, "humidity": 40.0 })));
    let (_, body) = call(&h.app, Method::POST, "/api/data/fetch-and-save", None).await;
    let temps: Vec<f64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["temperature"].as_f64().unwrap())
        .collect();
    assert_eq!(temps, vec![23.0, 22.5]);
}

#[tokio::test]
async fn fetch_temp_uses_secondary_schema() {
    let h = harness(None);
    h.fetcher.answer(&h.devices.secondary, Ok(json!({ "temperature": 19.0 })));

    let (status, body) = call(&h.app, Method::POST, "/api/data/fetch-temp", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["deviceId"], "living-room");
    assert!(body["data"][0].get("humidity").is_none());

    // humidity from a temperature-only device is a schema violation
    h.fetcher.answer(&h.devices.secondary, Ok(json!({ "temperature": 19.0, "humidity": 50.0 })));
    let (status, _) = call(&h.app, Method::POST, "/api/data/fetch-temp", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_payload_is_rejected_without_touching_store() {
    let h = harness(None);
    h.fetcher.answer(&h.devices.primary, Ok(json!({ "humidity": 41.0 })));

    let before = h.store.len().await.unwrap();
    let (status, body) = call(&h.app, Method::POST, "/api/data/fetch-and-save", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["status"], 400);
    assert!(body["error"]["message"].as_str().unwrap().contains("temperature is required"));
    assert_eq!(h.store.len().await.unwrap(), before);
}

#[tokio::test]
async fn sensor_outage_is_bad_gateway() {
    let h = harness(None);
    h.fetcher.answer(&h.devices.primary, Err("connection refused"));

    let (status, body) = call(&h.app, Method::POST, "/api/data/fetch-and-save", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["message"], "Sensor endpoint unavailable");
    assert_eq!(h.store.len().await.unwrap(), 0);
}

#[tokio::test]
async fn latest_returns_one_reading_per_device() {
    let h = harness(None);
    h.fetcher.answer(&h.devices.primary, Ok(json!({ "temperature": 22.0, "humidity": 40.0 })));
    h.fetcher.answer(&h.devices.secondary, Ok(json!({ "temperature": 18.0 })));
    call(&h.app, Method::POST, "/api/data/fetch-and-save", None).await;
    call(&h.app, Method::POST, "/api/data/fetch-temp", None).await;

    let (status, body) = call(&h.app, Method::GET, "/api/data/latest", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kitchen"]["temperature"], 22.0);
    assert_eq!(body["living-room"]["temperature"], 18.0);
}

#[tokio::test]
async fn add_and_recent_round_trip() {
    let h = harness(None);

    let (status, body) = call(
        &h.app,
        Method::POST,
        "/api/data/add/3",
        Some(json!({ "air": [{ "id": 1, "value": 21.0 }, { "id": 2, "value": 1010.0 }, { "id": 3, "value": 48.0 }] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deviceId"], "3");

    h.clock.advance(ChronoDuration::seconds(5));
    call(&h.app, Method::POST, "/api/data/add/3", Some(json!({ "temperature": 21.4 }))).await;

    let (status, body) = call(&h.app, Method::GET, "/api/data/3/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["temperature"], 21.4);

    let (_, body) = call(&h.app, Method::GET, "/api/data/3/10", None).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn add_rejects_mismatched_device_and_bad_json() {
    let h = harness(None);

    let (status, _) = call(
        &h.app,
        Method::POST,
        "/api/data/add/3",
        Some(json!({ "temperature": 21.0, "deviceId": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/data/add/3")
        .body(Body::from("{not json"))
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(h.store.len().await.unwrap(), 0);
}

#[tokio::test]
async fn recent_requires_positive_count() {
    let h = harness(None);
    let (status, _) = call(&h.app, Method::GET, "/api/data/kitchen/0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(&h.app, Method::GET, "/api/data/kitchen/many", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn clear_routes_purge_their_collection() {
    let h = harness(None);
    h.store.append(sensor_relay::Reading::new("kitchen", 20.0, Some(40.0))).await.unwrap();
    h.store.append(sensor_relay::Reading::new("living-room", 18.0, None)).await.unwrap();
    h.store.append(sensor_relay::Reading::new("garage", 10.0, None)).await.unwrap();

    let (status, body) = call(&h.app, Method::DELETE, "/api/data/clear/fetch-save", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 1);
    assert!(h.store.recent("kitchen", 1).await.unwrap().is_empty());
    assert_eq!(h.store.len().await.unwrap(), 2);

    let (_, body) = call(&h.app, Method::DELETE, "/api/data/clear/fetch-temp", None).await;
    assert_eq!(body["removed"], 1);

    // unknown device: still a success
    let (status, body) = call(&h.app, Method::DELETE, "/api/data/nowhere", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 0);

    let (status, body) = call(&h.app, Method::DELETE, "/api/data/all", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 1);
    assert_eq!(h.store.len().await.unwrap(), 0);
}

#[tokio::test]
async fn readings_expire_after_retention_window() {
    let h = harness(None);
    call(&h.app, Method::POST, "/api/data/add/kitchen", Some(json!({ "temperature": 20.0, "humidity": 40.0 }))).await;

    let (_, body) = call(&h.app, Method::GET, "/api/data/kitchen/5", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    h.clock.advance(ChronoDuration::minutes(61));
    let (_, body) = call(&h.app, Method::GET, "/api/data/kitchen/5", None).await;
    assert!(body.as_array().unwrap().is_empty());
    let (_, body) = call(&h.app, Method::GET, "/api/data/latest", None).await;
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn bearer_gate_guards_data_routes() {
    let h = harness(Some("s3cret"));

    let (status, body) = call(&h.app, Method::GET, "/api/data/latest", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["status"], 401);

    let request = Request::builder()
        .uri("/api/data/latest")
        .header(header::AUTHORIZATION, "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    assert_eq!(h.app.clone().oneshot(request).await.unwrap().status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/api/data/latest")
        .header(header::AUTHORIZATION, "Bearer s3cret")
        .body(Body::empty())
        .unwrap();
    assert_eq!(h.app.clone().oneshot(request).await.unwrap().status(), StatusCode::OK);

    let (status, _) = call(&h.app, Method::GET, "/api/data/latest?token=s3cret", None).await;
    assert_eq!(status, StatusCode::OK);

    // health stays open
    let (status, body) = call(&h.app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn unmatched_routes_and_methods_use_error_shape() {
    let h = harness(None);

    let (status, body) = call(&h.app, Method::GET, "/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["status"], 404);
    assert!(body["error"]["message"].as_str().unwrap().contains("/nope"));

    let (status, body) = call(&h.app, Method::POST, "/health", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"]["status"], 405);

    let (status, body) = call(&h.app, Method::PUT, "/api/data/latest", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"]["status"], 405);
}

#[tokio::test]
async fn websocket_relays_named_events_and_ends_session_on_close() {
    let h = harness_with_interval(None, Duration::from_millis(50));
    h.fetcher.answer(&h.devices.primary, Ok(json!({ "temperature": 21.0, "humidity": 40.0 })));
    h.fetcher.answer(&h.devices.secondary, Ok(json!({ "temperature": 18.5 })));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = h.app.clone();
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.unwrap();

    let mut events = Vec::new();
    while events.len() < 2 {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("no frame within 5s")
            .unwrap()
            .unwrap();
        if let WsMessage::Text(text) = frame {
            events.push(serde_json::from_str::<Value>(&text).unwrap());
        }
    }

    // one tick: primary first, then secondary, raw payloads untouched
    assert_eq!(events[0], json!({ "event": "dataFromDHT", "data": { "temperature": 21.0, "humidity": 40.0 } }));
    assert_eq!(events[1], json!({ "event": "dataFromD18b20", "data": { "temperature": 18.5 } }));
    assert_eq!(h.relay.active_sessions(), 1);
    assert!(!h.store.recent("kitchen", 1).await.unwrap().is_empty());

    socket.close(None).await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while h.relay.active_sessions() > 0 {
        assert!(tokio::time::Instant::now() < deadline, "live session survived the close");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    server.abort();
}
