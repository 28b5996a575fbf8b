use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use fleet_dispatch::api::rest::router;
use fleet_dispatch::config::Config;
use fleet_dispatch::geo::InMemoryGeoIndex;
use fleet_dispatch::state::AppState;
use fleet_dispatch::store::{InMemoryStore, Store};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

const FLEET_ID: &str = "6f1c1c9e-2d5e-4a57-9a51-0d3f6b5a2c11";

fn setup() -> axum::Router {
    let (state, hub) = AppState::new(Config::default());
    tokio::spawn(hub.run());
    router(Arc::new(state))
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_empty(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Registers a driver at the given position and returns `(driver_id, token)`.
async fn register_and_login(app: &axum::Router, email: &str, lat: f64, lng: f64) -> (String, String) {
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/drivers",
            None,
            json!({
                "fleet_id": FLEET_ID,
                "name": "Dana Driver",
                "phone": "+15550100",
                "email": email,
                "password": "s3cret",
                "lat": lat,
                "lng": lng
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let driver = body_json(res).await;
    assert_eq!(driver["status"], "OFFLINE");
    let driver_id = driver["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/login",
            None,
            json!({ "email": email, "password": "s3cret" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let token = body_json(res).await["token"].as_str().unwrap().to_string();

    (driver_id, token)
}

async fn go_online(app: &axum::Router, token: &str) {
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/drivers/me/availability",
            Some(token),
            json!({ "online": true }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["status"], "IDLE");
}

fn order_body() -> Value {
    json!({
        "fleet_id": FLEET_ID,
        "pickup_lat": 40.0,
        "pickup_lng": -74.0,
        "dropoff_lat": 40.1,
        "dropoff_lng": -74.1
    })
}

#[tokio::test]
async fn health_returns_ok() {
    let app = setup();
    let response = app.oneshot(get_request("/health", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["env"], "development");
    assert_eq!(body["drivers"], 0);
    assert_eq!(body["orders"], 0);
    assert_eq!(body["connected_drivers"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let app = setup();
    let (_driver_id, token) = register_and_login(&app, "metrics@fleet.io", 40.01, -74.0).await;
    let res = app
        .clone()
        .oneshot(json_request("POST", "/orders", Some(&token), order_body()))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let response = app.oneshot(get_request("/metrics", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("dispatch_total"));
    assert!(body.contains("connected_drivers"));
}

#[tokio::test]
async fn duplicate_email_returns_409() {
    let app = setup();
    register_and_login(&app, "dup@fleet.io", 40.0, -74.0).await;

    let res = app
        .oneshot(json_request(
            "POST",
            "/drivers",
            None,
            json!({
                "fleet_id": FLEET_ID,
                "name": "Second",
                "phone": "+15550101",
                "email": "DUP@fleet.io",
                "password": "x",
                "lat": 40.0,
                "lng": -74.0
            }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn invalid_registration_returns_400() {
    let app = setup();
    let res = app
        .oneshot(json_request(
            "POST",
            "/drivers",
            None,
            json!({
                "fleet_id": FLEET_ID,
                "name": "  ",
                "phone": "+15550100",
                "email": "blank@fleet.io",
                "password": "x",
                "lat": 95.0,
                "lng": -74.0
            }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn fleet_listing_hides_password_digests() {
    let app = setup();
    let (driver_id, token) = register_and_login(&app, "list@fleet.io", 40.0, -74.0).await;

    let res = app
        .oneshot(get_request(&format!("/fleets/{FLEET_ID}/drivers"), Some(&token)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let drivers = body_json(res).await;
    let list = drivers.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], driver_id);
    assert!(list[0].get("password_hash").is_none());
}

#[tokio::test]
async fn wrong_password_returns_401() {
    let app = setup();
    register_and_login(&app, "pw@fleet.io", 40.0, -74.0).await;

    let res = app
        .oneshot(json_request(
            "POST",
            "/login",
            None,
            json!({ "email": "pw@fleet.io", "password": "guess" }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(res).await["error"], "unauthorized: invalid email or password");
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() {
    let app = setup();

    let res = app
        .clone()
        .oneshot(json_request("POST", "/orders", None, order_body()))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app
        .oneshot(get_request("/drivers/me/order", Some("not-a-token")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn order_without_drivers_stays_created() {
    let app = setup();
    let (_driver_id, token) = register_and_login(&app, "far@fleet.io", 41.0, -74.0).await;
    go_online(&app, &token).await;

    let res = app
        .clone()
        .oneshot(json_request("POST", "/orders", Some(&token), order_body()))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = body_json(res).await;
    assert_eq!(body["status"], "no_drivers_available");
    assert!(body.get("driver_id").is_none());
    let order_id = body["order_id"].as_str().unwrap().to_string();

    let res = app
        .oneshot(get_request(&format!("/orders/{order_id}"), Some(&token)))
        .await
        .unwrap();
    let order = body_json(res).await;
    assert_eq!(order["status"], "CREATED");
    assert!(order["driver_id"].is_null());
}

#[tokio::test]
async fn unsupported_vehicle_class_returns_400() {
    let app = setup();
    let (_driver_id, token) = register_and_login(&app, "cls@fleet.io", 40.0, -74.0).await;
    let mut body = order_body();
    body["vehicle_class"] = json!("HOVERCRAFT");

    let res = app
        .oneshot(json_request("POST", "/orders", Some(&token), body))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = body_json(res).await;
    let message = body["error"].as_str().unwrap();
    assert!(message.starts_with("bad request:"));
    assert!(message.contains("unknown variant"));
}

#[tokio::test]
async fn malformed_json_body_returns_400_with_error_key() {
    let app = setup();
    let request = Request::builder()
        .method("POST")
        .uri("/login")
        .header("content-type", "application/json")
        .body(Body::from("{\"email\": "))
        .unwrap();

    let res = app.oneshot(request).await.unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(res).await["error"].is_string());
}

#[tokio::test]
async fn get_nonexistent_order_returns_404() {
    let app = setup();
    let (_driver_id, token) = register_and_login(&app, "404@fleet.io", 40.0, -74.0).await;
    let fake_id = "00000000-0000-0000-0000-000000000000";

    let response = app
        .oneshot(get_request(&format!("/orders/{fake_id}"), Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn full_dispatch_flow() {
    let app = setup();
    let (driver_id, token) = register_and_login(&app, "flow@fleet.io", 40.01, -74.0).await;
    go_online(&app, &token).await;

    let res = app
        .clone()
        .oneshot(json_request("POST", "/orders", Some(&token), order_body()))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = body_json(res).await;
    assert_eq!(body["status"], "assigned");
    assert_eq!(body["driver_id"], driver_id);
    assert!(body["amount_cents"].as_i64().unwrap() > 500);
    let order_id = body["order_id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(get_request("/drivers/me/order", Some(&token)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["id"], order_id);

    let res = app
        .clone()
        .oneshot(post_empty(&format!("/orders/{order_id}/pickup"), &token))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(res).await["error"],
        "invalid state transition, check if order is in correct status"
    );

    for step in ["arrive", "pickup", "deliver"] {
        let res = app
            .clone()
            .oneshot(post_empty(&format!("/orders/{order_id}/{step}"), &token))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK, "step {step}");
        assert_eq!(body_json(res).await["status"], "success");
    }

    let res = app
        .clone()
        .oneshot(get_request(&format!("/orders/{order_id}"), Some(&token)))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["status"], "DELIVERED");

    let res = app
        .clone()
        .oneshot(get_request("/drivers/me/order", Some(&token)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = app
        .oneshot(json_request(
            "POST",
            "/drivers/me/availability",
            Some(&token),
            json!({ "online": false }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["status"], "OFFLINE");
}

#[tokio::test]
async fn another_driver_cannot_advance_the_order() {
    let app = setup();
    let (_owner, owner_token) = register_and_login(&app, "owner@fleet.io", 40.01, -74.0).await;
    go_online(&app, &owner_token).await;
    let (_other, other_token) = register_and_login(&app, "other@fleet.io", 45.0, -74.0).await;

    let res = app
        .clone()
        .oneshot(json_request("POST", "/orders", Some(&owner_token), order_body()))
        .await
        .unwrap();
    let order_id = body_json(res).await["order_id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(post_empty(&format!("/orders/{order_id}/arrive"), &other_token))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .oneshot(post_empty(&format!("/orders/{order_id}/dispatch"), &owner_token))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn redispatch_picks_up_a_driver_who_came_online_later() {
    let app = setup();
    let (driver_id, token) = register_and_login(&app, "late@fleet.io", 40.01, -74.0).await;

    let res = app
        .clone()
        .oneshot(json_request("POST", "/orders", Some(&token), order_body()))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["status"], "no_drivers_available");
    let order_id = body["order_id"].as_str().unwrap().to_string();

    go_online(&app, &token).await;

    let res = app
        .oneshot(post_empty(&format!("/orders/{order_id}/dispatch"), &token))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["status"], "assigned");
    assert_eq!(body["driver_id"], driver_id);
}

#[tokio::test]
async fn store_reads_are_bounded_by_the_request_deadline() {
    let store = Arc::new(InMemoryStore::new());
    let config = Config {
        request_timeout: Duration::from_millis(50),
        ..Config::default()
    };
    let (state, hub) =
        AppState::with_backends(config, store.clone(), Arc::new(InMemoryGeoIndex::new()));
    tokio::spawn(hub.run());
    let token = state.tokens.issue(Uuid::new_v4()).unwrap();
    let app = router(Arc::new(state));

    let _open_scope = store.begin().await.unwrap();

    for uri in [
        format!("/orders/{}", Uuid::new_v4()),
        format!("/fleets/{FLEET_ID}/drivers"),
    ] {
        let res = app
            .clone()
            .oneshot(get_request(&uri, Some(&token)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT, "{uri}");
    }
}
