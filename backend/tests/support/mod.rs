#![allow(dead_code)]
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use groupnom_backend::{
    app::build_router,
    config::Config,
    selection::{
        outcomes::InMemoryOutcomeStore, CuratedPlaceSource, OutcomeRecorder, PlaceCandidate,
        RestaurantSelector, RestaurantSourcing,
    },
    services::SessionStore,
    state::AppState,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub const AUTH_HEADER: &str = "x-auth-user-id";

pub fn test_config() -> Config {
    Config {
        rate_limit_enabled: false,
        ..Config::default()
    }
}

/// Places 0.5 km apart heading north from (45.5, -122.6).
pub fn portland_places(count: usize) -> Vec<PlaceCandidate> {
    (0..count)
        .map(|i| {
            serde_json::from_value(json!({
                "id": format!("place-{}", i + 1),
                "name": format!("Place {}", i + 1),
                "address": format!("{} Test Way", i + 1),
                "city": "Portland",
                "lat": 45.5 + (i as f64 + 1.0) * 0.5 / 111.19,
                "lng": -122.6,
                "categories": [if i % 2 == 0 { "thai" } else { "pizza" }],
                "rating": 4.0 + (i % 3) as f64 * 0.3,
                "reviewCount": 50 + i * 10,
                "priceLevel": 2,
                "openNow": true
            }))
            .expect("candidate json")
        })
        .collect()
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub outcomes: Arc<InMemoryOutcomeStore>,
}

pub fn test_app(config: Config, places: Vec<PlaceCandidate>) -> TestApp {
    let outcomes = Arc::new(InMemoryOutcomeStore::new());
    let sourcing = RestaurantSourcing::new(
        Arc::new(CuratedPlaceSource::new(places)),
        None,
        RestaurantSelector::default(),
    );
    let state = AppState::new(
        Arc::new(SessionStore::in_memory(config.session_policy())),
        Arc::new(sourcing),
        OutcomeRecorder::new(outcomes.clone()),
        config,
    );
    TestApp {
        router: build_router(state.clone()),
        state,
        outcomes,
    }
}

pub fn default_app() -> TestApp {
    test_app(test_config(), portland_places(3))
}

pub async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    auth_user: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = auth_user {
        builder = builder.header(AUTH_HEADER, user);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("build request"),
        None => builder.body(Body::empty()).expect("build request"),
    };

    let response = router.clone().oneshot(request).await.expect("call router");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, json)
}

pub async fn post_json(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(router, "POST", uri, Some(body), None).await
}

pub async fn get_json(router: &Router, uri: &str) -> (StatusCode, Value) {
    send(router, "GET", uri, None, None).await
}

pub fn create_body(user_id: &str) -> Value {
    json!({
        "userId": user_id,
        "filters": { "distance": 5 },
        "location": { "lat": 45.5, "lng": -122.6 }
    })
}

/// Creates a session hosted by `host` and returns `(code, restaurant ids)`.
pub async fn create_session(router: &Router, host: &str) -> (String, Vec<String>) {
    let (status, body) = post_json(router, "/api/session/create", create_body(host)).await;
    assert_eq!(status, StatusCode::OK, "create failed: {body}");
    let code = body["code"].as_str().expect("code").to_string();
    let ids = body["session"]["restaurants"]
        .as_array()
        .expect("restaurants")
        .iter()
        .map(|r| r["id"].as_str().expect("id").to_string())
        .collect();
    (code, ids)
}

pub async fn vote(
    router: &Router,
    code: &str,
    user: &str,
    restaurant: &str,
    liked: bool,
) -> (StatusCode, Value) {
    post_json(
        router,
        &format!("/api/session/{code}/vote"),
        json!({ "userId": user, "restaurantId": restaurant, "liked": liked }),
    )
    .await
}
