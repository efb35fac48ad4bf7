//! Route response cache middleware.
//!
//! Wraps individual read handlers. A hit replays the stored status, headers
//! and body without running the handler; a miss runs it and stores the
//! buffered response when it is cacheable. Every response that passes through
//! carries `X-Cache: HIT` or `X-Cache: MISS`.

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    extract::{FromRequestParts, MatchedPath, RawPathParams, State},
    http::{
        HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, SET_COOKIE},
        request::Parts,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use http_body_util::BodyExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{
    accessor::{CacheAccessor, CacheError, CacheStatus, Cached},
    config::CacheConfig,
    keys::{CacheKey, SelectorPart, build_key},
    store::CacheStore,
};

/// Namespace of every route cache key.
pub const ROUTE_NAMESPACE: &str = "route";
/// Response header reporting the cache outcome.
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

const EMPTY_QUERY: &str = "-";

/// Shared state of the route cache.
#[derive(Clone)]
pub struct RouteCacheState {
    accessor: CacheAccessor,
    enabled: bool,
    ttl: Duration,
    body_limit: usize,
    version: Arc<str>,
}

impl RouteCacheState {
    pub fn new(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self {
            accessor: CacheAccessor::new(store, config.store_timeout).for_layer("route"),
            enabled: config.route_cache_active(),
            ttl: config.route_ttl,
            body_limit: config.route_body_limit_bytes,
            version: Arc::from(config.key_version.as_str()),
        }
    }

    /// State for one handler; `handler` becomes the key's entity segment.
    pub fn named(&self, handler: &'static str) -> RouteCache {
        RouteCache {
            state: self.clone(),
            handler,
        }
    }
}

/// Route cache bound to a handler name.
#[derive(Clone)]
pub struct RouteCache {
    state: RouteCacheState,
    handler: &'static str,
}

/// Serialized form of a stored response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Base64 of the body bytes.
    pub body: String,
}

impl CachedResponse {
    fn from_parts(status: StatusCode, headers: &HeaderMap, body: &Bytes) -> Self {
        Self {
            status: status.as_u16(),
            headers: headers
                .iter()
                .filter(|(name, _)| **name != X_CACHE)
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| (name.to_string(), value.to_string()))
                })
                .collect(),
            body: BASE64.encode(body),
        }
    }

    fn encode(&self) -> Result<Bytes, CacheError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(CacheError::serialization)
    }

    fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        serde_json::from_slice(bytes).map_err(CacheError::deserialization)
    }

    fn into_response(self) -> Result<Response, CacheError> {
        let body = BASE64
            .decode(self.body.as_bytes())
            .map_err(CacheError::deserialization)?;
        let status = StatusCode::from_u16(self.status).map_err(CacheError::deserialization)?;

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        let headers = response.headers_mut();
        for (name, value) in self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::from_str(&value),
            ) {
                headers.append(name, value);
            }
        }
        Ok(response)
    }
}

enum RouteFetch {
    /// The handler ran but its response must not be stored.
    Uncacheable(Response),
    Buffer(String),
    Cache(CacheError),
}

impl From<CacheError> for RouteFetch {
    fn from(err: CacheError) -> Self {
        Self::Cache(err)
    }
}

/// Route cache middleware, attached per route with
/// `axum::middleware::from_fn_with_state(state.named("..."), route_cache_layer)`.
#[instrument(skip_all, fields(handler = cache.handler, path = %request.uri().path()))]
pub async fn route_cache_layer(
    State(cache): State<RouteCache>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let RouteCache { state, handler } = cache;
    if !state.enabled || request.method() != Method::GET {
        return with_status(next.run(request).await, CacheStatus::Miss);
    }

    let (mut parts, body) = request.into_parts();
    let path = request_path(&mut parts).await;
    let key = route_key(
        handler,
        &parts.method,
        &path,
        parts.uri.query(),
        &state.version,
    );
    let request = Request::from_parts(parts, body);
    let body_limit = state.body_limit;

    let outcome = state
        .accessor
        .get_or_set_with(
            &key,
            state.ttl,
            move || async move {
                let response = next.run(request).await;
                buffer_cacheable(response, body_limit).await
            },
            CachedResponse::encode,
            CachedResponse::decode,
        )
        .await;

    match outcome {
        Ok(Cached { value, status }) => match value.into_response() {
            Ok(response) => {
                debug!(key = %key, outcome = status.header_value(), "route cache");
                with_status(response, status)
            }
            Err(err) => {
                warn!(key = %key, error = %err, "stored response could not be rebuilt");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
        Err(RouteFetch::Uncacheable(response)) => with_status(response, CacheStatus::Miss),
        Err(RouteFetch::Buffer(message)) => {
            warn!(key = %key, error = %message, "failed to buffer response body");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(RouteFetch::Cache(err)) => {
            warn!(key = %key, error = %err, "failed to encode response for caching");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Key of a route response:
/// `route:{handler}:{method}:{path}:{query}:{version}`.
///
/// The query is parsed, sorted by name then value and hashed; an empty
/// query renders as `-`.
pub fn route_key(
    handler: &str,
    method: &Method,
    path: &str,
    query: Option<&str>,
    version: &str,
) -> CacheKey {
    build_key(
        ROUTE_NAMESPACE,
        handler,
        &[
            SelectorPart::from(method.as_str()),
            SelectorPart::from(normalize_path(path)),
            query_selector(query),
        ],
        version,
    )
}

/// Path used in the route key.
///
/// Under a matched route the path is rebuilt from the route template and the
/// decoded parameters, so spellings that the extractors accept as the same
/// resource (`/dishes/07`, `/dishes/+7`, `/dishes/%37`) share one key.
async fn request_path(parts: &mut Parts) -> String {
    let template = parts
        .extensions
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_owned());
    let Some(template) = template else {
        return normalize_path(parts.uri.path()).to_owned();
    };
    match RawPathParams::from_request_parts(parts, &()).await {
        Ok(params) => {
            let params: Vec<(&str, &str)> = params.iter().collect();
            canonical_path(&template, &params)
        }
        Err(_) => normalize_path(parts.uri.path()).to_owned(),
    }
}

/// Render a route template with its parameters. Integer values take their
/// canonical decimal form.
pub fn canonical_path(template: &str, params: &[(&str, &str)]) -> String {
    let rendered = template
        .split('/')
        .map(|segment| {
            let name = segment
                .strip_prefix('{')
                .and_then(|rest| rest.strip_suffix('}'))
                .map(|name| name.trim_start_matches('*'));
            match name.and_then(|name| params.iter().find(|(key, _)| *key == name)) {
                Some((_, value)) => canonical_param(value),
                None => segment.to_owned(),
            }
        })
        .collect::<Vec<_>>()
        .join("/");
    normalize_path(&rendered).to_owned()
}

fn canonical_param(value: &str) -> String {
    value
        .parse::<i64>()
        .map(|number| number.to_string())
        .unwrap_or_else(|_| value.to_owned())
}

fn normalize_path(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

fn query_selector(query: Option<&str>) -> SelectorPart {
    let mut pairs: Vec<(String, String)> =
        url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
            .into_owned()
            .collect();
    if pairs.is_empty() {
        return SelectorPart::from(EMPTY_QUERY);
    }
    pairs.sort();
    let normalized = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter())
        .finish();
    SelectorPart::hashed(&normalized)
}

async fn buffer_cacheable(response: Response, body_limit: usize) -> Result<CachedResponse, RouteFetch> {
    if !is_storable(response.status(), response.headers(), body_limit) {
        return Err(RouteFetch::Uncacheable(response));
    }

    let (parts, body) = response.into_parts();
    let bytes = match BodyExt::collect(body).await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => return Err(RouteFetch::Buffer(err.to_string())),
    };
    if bytes.len() > body_limit {
        return Err(RouteFetch::Uncacheable(Response::from_parts(
            parts,
            Body::from(bytes),
        )));
    }
    Ok(CachedResponse::from_parts(parts.status, &parts.headers, &bytes))
}

/// Whether a response may be stored, judged from its head alone.
pub fn is_storable(status: StatusCode, headers: &HeaderMap, body_limit: usize) -> bool {
    if !status.is_success() || headers.contains_key(SET_COOKIE) {
        return false;
    }

    let forbids_storage = headers
        .get_all(CACHE_CONTROL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|directive| directive.trim().to_ascii_lowercase())
        .any(|directive| directive == "no-store" || directive == "private");
    if forbids_storage {
        return false;
    }

    let streaming = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/event-stream"));
    if streaming {
        return false;
    }

    let declared_len = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    !declared_len.is_some_and(|len| len > body_limit)
}

fn with_status(mut response: Response, status: CacheStatus) -> Response {
    response
        .headers_mut()
        .insert(X_CACHE, HeaderValue::from_static(status.header_value()));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    #[test]
    fn query_order_does_not_change_the_key() {
        let a = route_key("dishes.index", &Method::GET, "/api/v1/dishes", Some("active=true&chef_id=3"), "v1");
        let b = route_key("dishes.index", &Method::GET, "/api/v1/dishes", Some("chef_id=3&active=true"), "v1");
        assert_eq!(a, b);
    }

    #[test]
    fn different_queries_produce_different_keys() {
        let a = route_key("dishes.index", &Method::GET, "/api/v1/dishes", Some("chef_id=3"), "v1");
        let b = route_key("dishes.index", &Method::GET, "/api/v1/dishes", Some("chef_id=4"), "v1");
        assert_ne!(a, b);
    }

    #[test]
    fn empty_query_and_trailing_slash_are_normalized() {
        let key = route_key("dishes.show", &Method::GET, "/api/v1/dishes/7/", Some(""), "v1");
        assert_eq!(key.as_str(), "route:dishes.show:GET:/api/v1/dishes/7:-:v1");
        assert_eq!(
            key,
            route_key("dishes.show", &Method::GET, "/api/v1/dishes/7", None, "v1")
        );
    }

    #[test]
    fn integer_parameters_render_canonically() {
        let template = "/api/v1/dishes/{id}";
        for raw in ["7", "07", "+7", "0007"] {
            assert_eq!(canonical_path(template, &[("id", raw)]), "/api/v1/dishes/7");
        }
        assert_eq!(
            canonical_path("/api/v1/chefs/{id}/menus", &[("id", "003")]),
            "/api/v1/chefs/3/menus"
        );
        assert_eq!(
            canonical_path("/files/{*rest}", &[("rest", "a/b")]),
            "/files/a/b"
        );
        assert_eq!(canonical_path("/api/v1/dishes", &[]), "/api/v1/dishes");
    }

    #[test]
    fn route_keys_match_invalidation_templates() {
        let key = route_key("dishes.show", &Method::GET, "/api/v1/dishes/7", Some("x=1"), "v1");
        assert!(crate::cache::store::glob_match(
            "route:dishes.show:GET:/api/v1/dishes/7:*",
            key.as_str()
        ));
        let other = route_key("dishes.show", &Method::GET, "/api/v1/dishes/70", None, "v1");
        assert!(!crate::cache::store::glob_match(
            "route:dishes.show:GET:/api/v1/dishes/7:*",
            other.as_str()
        ));
    }

    #[test]
    fn only_plain_successes_are_storable() {
        assert!(is_storable(StatusCode::OK, &json_headers(), 1024));
        assert!(!is_storable(StatusCode::NOT_FOUND, &json_headers(), 1024));
        assert!(!is_storable(StatusCode::INTERNAL_SERVER_ERROR, &json_headers(), 1024));

        let mut cookie = json_headers();
        cookie.insert(SET_COOKIE, HeaderValue::from_static("session=1"));
        assert!(!is_storable(StatusCode::OK, &cookie, 1024));

        let mut private = json_headers();
        private.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=60, Private"));
        assert!(!is_storable(StatusCode::OK, &private, 1024));

        let mut no_store = json_headers();
        no_store.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        assert!(!is_storable(StatusCode::OK, &no_store, 1024));

        let mut stream = HeaderMap::new();
        stream.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        assert!(!is_storable(StatusCode::OK, &stream, 1024));

        let mut large = json_headers();
        large.insert(CONTENT_LENGTH, HeaderValue::from_static("4096"));
        assert!(!is_storable(StatusCode::OK, &large, 1024));
    }

    #[test]
    fn cached_response_rebuilds_status_headers_and_body() {
        let body = Bytes::from_static(b"{\"id\":7}");
        let mut headers = json_headers();
        headers.insert(X_CACHE, HeaderValue::from_static("MISS"));
        let cached = CachedResponse::from_parts(StatusCode::CREATED, &headers, &body);
        assert!(cached.headers.iter().all(|(name, _)| name != "x-cache"));

        let decoded = CachedResponse::decode(&cached.encode().expect("encode")).expect("decode");
        let response = decoded.into_response().expect("rebuild");
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(CONTENT_TYPE),
            Some(&HeaderValue::from_static("application/json"))
        );
    }
}
