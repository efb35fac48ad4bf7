pub mod api;
mod middleware;

pub use api::{ApiState, build_api_router};
pub use middleware::RequestContext;

use axum::{Router, middleware::from_fn, routing::get};

use self::middleware::{log_responses, set_request_context};

/// Full HTTP surface: the versioned API plus `/health`.
///
/// Response logging sits inside the request context layer so failures are
/// logged with their request id.
pub fn build_router(state: ApiState) -> Router {
    let health = Router::new()
        .route("/health", get(api::handlers::health))
        .with_state(state.clone());

    build_api_router(state)
        .merge(health)
        .layer(from_fn(log_responses))
        .layer(from_fn(set_request_context))
}
