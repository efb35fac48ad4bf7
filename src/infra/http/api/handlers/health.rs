//! Liveness of the repository and the cache store.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::application::error::ErrorReport;
use crate::infra::http::api::models::HealthResponse;
use crate::infra::http::api::state::ApiState;

const OK: &str = "ok";
const UNAVAILABLE: &str = "unavailable";

/// `200` when both the repository and the cache store answer, `503`
/// otherwise.
pub async fn health(State(state): State<ApiState>) -> Response {
    let database = state.health.health_check().await;
    let store = state.cache.store();
    let cache = store.ping().await;

    let healthy = database.is_ok() && cache.is_ok();
    let body = HealthResponse {
        status: if healthy { OK } else { UNAVAILABLE }.to_string(),
        database: if database.is_ok() { OK } else { UNAVAILABLE }.to_string(),
        cache: if cache.is_ok() { OK } else { UNAVAILABLE }.to_string(),
        cache_backend: store.backend().to_string(),
    };

    if healthy {
        return (StatusCode::OK, Json(body)).into_response();
    }

    let mut response = (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
    let detail = match (database, cache) {
        (Err(err), _) => format!("database: {err}"),
        (_, Err(err)) => format!("cache: {err}"),
        _ => String::new(),
    };
    ErrorReport::from_message(
        "infra::http::api::health",
        StatusCode::SERVICE_UNAVAILABLE,
        detail,
    )
    .attach(&mut response);
    response
}
