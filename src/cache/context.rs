//! Service-facing cache handle.

use std::{future::Future, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};

use super::{
    accessor::{CacheAccessor, CacheError},
    config::CacheConfig,
    invalidation::{InvalidationDispatcher, InvalidationReport, WriteEvent},
    keys::{CacheKey, SelectorPart},
    middleware::RouteCacheState,
    policy::{CachePolicies, CachePolicy, ResourceType},
    store::CacheStore,
};

/// Everything a service needs to read through the cache and invalidate
/// after writes. Cheap to clone.
#[derive(Clone)]
pub struct CacheContext {
    enabled: bool,
    accessor: CacheAccessor,
    dispatcher: InvalidationDispatcher,
    policies: Arc<CachePolicies>,
}

impl CacheContext {
    pub fn new(store: Arc<dyn CacheStore>, config: &CacheConfig, policies: CachePolicies) -> Self {
        let policies = Arc::new(policies);
        Self {
            enabled: config.enabled,
            accessor: CacheAccessor::new(store.clone(), config.store_timeout),
            dispatcher: InvalidationDispatcher::new(store, policies.clone(), config.store_timeout),
            policies,
        }
    }

    /// Route cache state sharing this context's store.
    pub fn route_cache(&self, config: &CacheConfig) -> RouteCacheState {
        RouteCacheState::new(self.accessor.store().clone(), config)
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        self.accessor.store()
    }

    pub fn accessor(&self) -> &CacheAccessor {
        &self.accessor
    }

    pub fn dispatcher(&self) -> &InvalidationDispatcher {
        &self.dispatcher
    }

    pub fn policy(&self, resource: ResourceType) -> &CachePolicy {
        self.policies.get(resource)
    }

    pub fn detail_key(&self, resource: ResourceType, id: i64) -> CacheKey {
        self.policy(resource).detail_key(id)
    }

    pub fn list_key(
        &self,
        resource: ResourceType,
        owner: Option<i64>,
        filters: &[SelectorPart],
    ) -> CacheKey {
        self.policy(resource).list_key(owner, filters)
    }

    /// Read `key` through the cache with the TTL of `resource`'s policy.
    pub async fn read<T, E, F, Fut>(&self, resource: ResourceType, key: &CacheKey, fetch: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.enabled {
            return fetch().await;
        }
        self.accessor
            .get_or_set(key, self.policy(resource).ttl, fetch)
            .await
    }

    /// Invalidate after a committed write. Always runs, even with the data
    /// cache disabled, so route entries never outlive a write.
    pub async fn written(&self, event: WriteEvent) -> InvalidationReport {
        self.dispatcher.dispatch(&event).await
    }
}
