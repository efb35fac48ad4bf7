//! End-to-end behaviour of the catalog API with the route and data caches in
//! front of the in-memory repositories.

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, Bytes, to_bytes},
    http::{Method, Request, StatusCode, header::CONTENT_TYPE},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use larder::cache::{
    CacheConfig, CacheContext, CachePolicies, CacheStore, MemoryStore, RedisStore,
};
use larder::infra::http::{self, ApiState};
use larder::infra::memory::MemoryRepositories;

struct TestResponse {
    status: StatusCode,
    x_cache: Option<String>,
    body: Bytes,
}

impl TestResponse {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body should be JSON")
    }
}

fn build_app() -> (Router, Arc<MemoryStore>) {
    build_app_with(CacheConfig::default())
}

fn build_app_with(config: CacheConfig) -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::default());
    (build_app_over(store.clone(), config), store)
}

fn build_app_over(store: Arc<dyn CacheStore>, config: CacheConfig) -> Router {
    let cache = CacheContext::new(store, &config, CachePolicies::defaults(&config));
    let route_cache = cache.route_cache(&config);
    let state = ApiState::from_repositories(
        Arc::new(MemoryRepositories::new()),
        cache,
        route_cache,
    );
    http::build_router(state)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let request = builder.body(body).expect("request should build");

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");

    let status = response.status();
    let x_cache = response
        .headers()
        .get("x-cache")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should collect");

    TestResponse {
        status,
        x_cache,
        body,
    }
}

async fn get(app: &Router, uri: &str) -> TestResponse {
    send(app, Method::GET, uri, None).await
}

async fn create_chef(app: &Router, email: &str) -> i64 {
    let response = send(
        app,
        Method::POST,
        "/api/v1/chefs",
        Some(json!({ "name": "Ana", "email": email })),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED);
    response.json()["id"].as_i64().expect("chef id")
}

async fn create_dish(app: &Router, chef_id: i64, price: f64) -> i64 {
    let response = send(
        app,
        Method::POST,
        "/api/v1/dishes",
        Some(json!({ "chef_id": chef_id, "name": "Paella", "price": price })),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED);
    response.json()["id"].as_i64().expect("dish id")
}

#[tokio::test]
async fn repeated_get_is_served_from_the_route_cache() {
    let (app, _) = build_app();
    let chef = create_chef(&app, "ana@example.com").await;
    let dish = create_dish(&app, chef, 5.0).await;
    let uri = format!("/api/v1/dishes/{dish}");

    let first = get(&app, &uri).await;
    let second = get(&app, &uri).await;

    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.x_cache.as_deref(), Some("MISS"));
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.x_cache.as_deref(), Some("HIT"));
    assert_eq!(first.body, second.body);
}

#[tokio::test]
async fn read_after_write_sees_the_new_price() {
    let (app, _) = build_app();
    let chef = create_chef(&app, "ana@example.com").await;
    let dish = create_dish(&app, chef, 5.0).await;
    let uri = format!("/api/v1/dishes/{dish}");

    let before = get(&app, &uri).await;
    assert_eq!(before.json()["price"], json!(5.0));
    assert_eq!(get(&app, &uri).await.x_cache.as_deref(), Some("HIT"));

    let update = send(
        &app,
        Method::PUT,
        &uri,
        Some(json!({ "chef_id": chef, "name": "Paella", "price": 7.5 })),
    )
    .await;
    assert_eq!(update.status, StatusCode::OK);

    let after = get(&app, &uri).await;
    assert_eq!(after.status, StatusCode::OK);
    assert_eq!(after.x_cache.as_deref(), Some("MISS"));
    assert_eq!(after.json()["price"], json!(7.5));
}

#[tokio::test]
async fn alternate_id_spellings_share_one_entry_and_are_invalidated() {
    let (app, _) = build_app();
    let chef = create_chef(&app, "ana@example.com").await;
    let dish = create_dish(&app, chef, 5.0).await;

    let padded = format!("/api/v1/dishes/0{dish}");
    let signed = format!("/api/v1/dishes/+{dish}");
    assert_eq!(get(&app, &padded).await.x_cache.as_deref(), Some("MISS"));
    let canonical = get(&app, &format!("/api/v1/dishes/{dish}")).await;
    assert_eq!(canonical.x_cache.as_deref(), Some("HIT"));
    assert_eq!(get(&app, &signed).await.x_cache.as_deref(), Some("HIT"));

    let update = send(
        &app,
        Method::PUT,
        &format!("/api/v1/dishes/{dish}"),
        Some(json!({ "chef_id": chef, "name": "Paella", "price": 7.5 })),
    )
    .await;
    assert_eq!(update.status, StatusCode::OK);

    for uri in [&padded, &signed] {
        let after = get(&app, uri).await;
        assert_eq!(after.status, StatusCode::OK);
        assert_eq!(after.json()["price"], json!(7.5));
    }
}

#[tokio::test]
async fn error_responses_are_never_cached() {
    let (app, store) = build_app();

    let first = get(&app, "/api/v1/dishes/999").await;
    let second = get(&app, "/api/v1/dishes/999").await;

    assert_eq!(first.status, StatusCode::NOT_FOUND);
    assert_eq!(second.status, StatusCode::NOT_FOUND);
    assert_eq!(second.x_cache.as_deref(), Some("MISS"));
    assert_eq!(second.json()["error"]["code"], json!("not_found"));
    assert!(store.keys().iter().all(|key| !key.starts_with("route:")));
}

#[tokio::test]
async fn query_parameter_order_does_not_split_entries() {
    let (app, _) = build_app();
    let chef = create_chef(&app, "ana@example.com").await;
    create_dish(&app, chef, 5.0).await;

    let first = get(&app, &format!("/api/v1/dishes?active=true&chef_id={chef}")).await;
    let second = get(&app, &format!("/api/v1/dishes?chef_id={chef}&active=true")).await;

    assert_eq!(first.x_cache.as_deref(), Some("MISS"));
    assert_eq!(second.x_cache.as_deref(), Some("HIT"));
    assert_eq!(second.json()["items"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn creating_a_dish_refreshes_the_chef_listing() {
    let (app, _) = build_app();
    let chef = create_chef(&app, "ana@example.com").await;
    let uri = format!("/api/v1/chefs/{chef}/dishes");

    let empty = get(&app, &uri).await;
    assert_eq!(empty.json()["items"], json!([]));

    create_dish(&app, chef, 5.0).await;

    let listed = get(&app, &uri).await;
    assert_eq!(listed.x_cache.as_deref(), Some("MISS"));
    assert_eq!(listed.json()["items"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn reassigning_a_dish_refreshes_both_chefs() {
    let (app, _) = build_app();
    let ana = create_chef(&app, "ana@example.com").await;
    let bo = create_chef(&app, "bo@example.com").await;
    let dish = create_dish(&app, ana, 5.0).await;

    let ana_uri = format!("/api/v1/chefs/{ana}/dishes");
    let bo_uri = format!("/api/v1/chefs/{bo}/dishes");
    assert_eq!(get(&app, &ana_uri).await.json()["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(get(&app, &bo_uri).await.json()["items"], json!([]));

    let update = send(
        &app,
        Method::PUT,
        &format!("/api/v1/dishes/{dish}"),
        Some(json!({ "chef_id": bo, "name": "Paella", "price": 5.0 })),
    )
    .await;
    assert_eq!(update.status, StatusCode::OK);

    assert_eq!(get(&app, &ana_uri).await.json()["items"], json!([]));
    assert_eq!(get(&app, &bo_uri).await.json()["items"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn menu_detail_reflects_dish_updates() {
    let (app, _) = build_app();
    let chef = create_chef(&app, "ana@example.com").await;
    let dish = create_dish(&app, chef, 5.0).await;
    let menu = send(
        &app,
        Method::POST,
        "/api/v1/menus",
        Some(json!({
            "chef_id": chef,
            "name": "Tasting",
            "price_per_person": 40.0,
            "dish_ids": [dish],
        })),
    )
    .await;
    assert_eq!(menu.status, StatusCode::CREATED);
    let menu_uri = format!("/api/v1/menus/{}", menu.json()["id"]);

    let before = get(&app, &menu_uri).await;
    assert_eq!(before.json()["dishes"][0]["price"], json!(5.0));

    send(
        &app,
        Method::PUT,
        &format!("/api/v1/dishes/{dish}"),
        Some(json!({ "chef_id": chef, "name": "Paella", "price": 6.25 })),
    )
    .await;

    let after = get(&app, &menu_uri).await;
    assert_eq!(after.x_cache.as_deref(), Some("MISS"));
    assert_eq!(after.json()["dishes"][0]["price"], json!(6.25));
}

#[tokio::test]
async fn deleting_a_dish_drops_it_from_cached_menus() {
    let (app, _) = build_app();
    let chef = create_chef(&app, "ana@example.com").await;
    let dish = create_dish(&app, chef, 5.0).await;
    send(
        &app,
        Method::POST,
        "/api/v1/menus",
        Some(json!({
            "chef_id": chef,
            "name": "Tasting",
            "price_per_person": 40.0,
            "dish_ids": [dish],
        })),
    )
    .await;

    let uri = format!("/api/v1/chefs/{chef}/menus");
    assert_eq!(get(&app, &uri).await.json()["items"][0]["dish_ids"], json!([dish]));

    let deleted = send(&app, Method::DELETE, &format!("/api/v1/dishes/{dish}"), None).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);

    assert_eq!(get(&app, &uri).await.json()["items"][0]["dish_ids"], json!([]));
}

#[tokio::test]
async fn invalid_payloads_are_rejected_with_json_errors() {
    let (app, _) = build_app();
    let chef = create_chef(&app, "ana@example.com").await;

    let negative = send(
        &app,
        Method::POST,
        "/api/v1/dishes",
        Some(json!({ "chef_id": chef, "name": "Paella", "price": -1.0 })),
    )
    .await;
    assert_eq!(negative.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(negative.json()["error"]["code"], json!("validation_error"));

    let duplicate = send(
        &app,
        Method::POST,
        "/api/v1/chefs",
        Some(json!({ "name": "Ana", "email": "ana@example.com" })),
    )
    .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
    assert_eq!(duplicate.json()["error"]["code"], json!("duplicate"));
}

#[tokio::test]
async fn disabled_cache_still_reports_miss() {
    let (app, store) = build_app_with(CacheConfig {
        enabled: false,
        ..Default::default()
    });
    let chef = create_chef(&app, "ana@example.com").await;
    let uri = format!("/api/v1/chefs/{chef}");

    assert_eq!(get(&app, &uri).await.x_cache.as_deref(), Some("MISS"));
    assert_eq!(get(&app, &uri).await.x_cache.as_deref(), Some("MISS"));
    assert!(store.is_empty());
}

#[tokio::test]
async fn unreachable_redis_degrades_to_the_repositories() {
    let store = RedisStore::connect("redis://127.0.0.1:1")
        .await
        .expect("a well-formed url opens a store");
    let app = build_app_over(Arc::new(store), CacheConfig::default());

    let chef = create_chef(&app, "ana@example.com").await;
    let dish = create_dish(&app, chef, 5.0).await;
    let uri = format!("/api/v1/dishes/{dish}");

    for _ in 0..2 {
        let response = get(&app, &uri).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.x_cache.as_deref(), Some("MISS"));
        assert_eq!(response.json()["price"], json!(5.0));
    }

    let update = send(
        &app,
        Method::PUT,
        &uri,
        Some(json!({ "chef_id": chef, "name": "Paella", "price": 7.5 })),
    )
    .await;
    assert_eq!(update.status, StatusCode::OK);
    assert_eq!(get(&app, &uri).await.json()["price"], json!(7.5));
}

#[tokio::test]
async fn health_reports_backends() {
    let (app, _) = build_app();

    let response = get(&app, "/health").await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["cache_backend"], json!("memory"));
}
