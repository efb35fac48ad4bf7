pub mod error;
pub mod handlers;
pub mod models;
pub mod state;

pub use state::ApiState;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{MethodRouter, get},
};

use crate::cache::{RouteCacheState, route_cache_layer};

/// Versioned catalog API. Every read route is wrapped by the route cache
/// under its own handler name; writes bypass it.
pub fn build_api_router(state: ApiState) -> Router {
    let cache = state.route_cache.clone();

    Router::new()
        .route(
            "/api/v1/chefs",
            cached_get(&cache, "chefs.index", handlers::list_chefs).post(handlers::create_chef),
        )
        .route(
            "/api/v1/chefs/{id}",
            cached_get(&cache, "chefs.show", handlers::get_chef)
                .put(handlers::update_chef)
                .delete(handlers::delete_chef),
        )
        .route(
            "/api/v1/chefs/{id}/dishes",
            cached_get(&cache, "chefs.dishes", handlers::list_chef_dishes),
        )
        .route(
            "/api/v1/chefs/{id}/menus",
            cached_get(&cache, "chefs.menus", handlers::list_chef_menus),
        )
        .route(
            "/api/v1/dishes",
            cached_get(&cache, "dishes.index", handlers::list_dishes).post(handlers::create_dish),
        )
        .route(
            "/api/v1/dishes/{id}",
            cached_get(&cache, "dishes.show", handlers::get_dish)
                .put(handlers::update_dish)
                .delete(handlers::delete_dish),
        )
        .route(
            "/api/v1/menus",
            cached_get(&cache, "menus.index", handlers::list_menus).post(handlers::create_menu),
        )
        .route(
            "/api/v1/menus/{id}",
            cached_get(&cache, "menus.show", handlers::get_menu)
                .put(handlers::update_menu)
                .delete(handlers::delete_menu),
        )
        .with_state(state)
}

/// `GET` route wrapped by the route cache. The layer is applied before other
/// methods are chained so only the read handler is covered.
fn cached_get<H, T>(
    cache: &RouteCacheState,
    handler_name: &'static str,
    handler: H,
) -> MethodRouter<ApiState>
where
    H: axum::handler::Handler<T, ApiState>,
    T: 'static,
{
    get(handler).layer(from_fn_with_state(cache.named(handler_name), route_cache_layer))
}
