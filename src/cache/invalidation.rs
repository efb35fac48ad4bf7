//! Write-side invalidation.
//!
//! After a successful commit, services hand a [`WriteEvent`] to the
//! [`InvalidationDispatcher`], which expands the resource's policy templates
//! into an [`InvalidationSet`] and deletes every target from the store.
//! Failures of individual deletes never fail the write.

use std::{collections::HashSet, fmt, sync::Arc, time::Duration};

use futures::future::join_all;
use metrics::{counter, histogram};
use tokio::time::{Instant, timeout};
use tracing::{debug, instrument, warn};

use super::{
    METRIC_CACHE_INVALIDATE_MS, METRIC_CACHE_INVALIDATED_KEYS_TOTAL,
    METRIC_CACHE_INVALIDATION_FAILURES_TOTAL,
    keys::{SelectorPart, escape_segment},
    policy::{CachePolicies, CachePolicy, ResourceType},
    store::{CacheStore, StoreError, is_pattern},
};

const ID_PLACEHOLDER: &str = "{id}";
const OWNER_PLACEHOLDER: &str = "{owner}";

/// A committed create, update or delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteEvent {
    pub resource: ResourceType,
    pub resource_id: i64,
    pub owner_id: Option<i64>,
    /// Additional owner scopes to purge, e.g. the previous chef of a dish
    /// that moved to another chef.
    pub extra_selectors: Vec<SelectorPart>,
}

impl WriteEvent {
    pub fn new(resource: ResourceType, resource_id: i64, owner_id: Option<i64>) -> Self {
        Self {
            resource,
            resource_id,
            owner_id,
            extra_selectors: Vec::new(),
        }
    }

    pub fn with_extra(mut self, selector: impl Into<SelectorPart>) -> Self {
        self.extra_selectors.push(selector.into());
        self
    }
}

/// One thing to delete.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InvalidationTarget {
    Key(String),
    Pattern(String),
}

impl InvalidationTarget {
    fn from_expanded(value: String) -> Self {
        if is_pattern(&value) {
            Self::Pattern(value)
        } else {
            Self::Key(value)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Key(value) | Self::Pattern(value) => value,
        }
    }
}

impl fmt::Display for InvalidationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, de-duplicated targets computed for one write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationSet {
    targets: Vec<InvalidationTarget>,
}

impl InvalidationSet {
    /// Expand `policy` for `event`.
    ///
    /// `{id}` is substituted with the resource id. Templates containing
    /// `{owner}` are expanded once for the owner and once per extra selector,
    /// and skipped when neither is present.
    pub fn plan(policy: &CachePolicy, event: &WriteEvent) -> Self {
        let id = escape_segment(&event.resource_id.to_string());
        let owners: Vec<String> = event
            .owner_id
            .into_iter()
            .map(|owner| SelectorPart::Int(owner).segment())
            .chain(event.extra_selectors.iter().map(SelectorPart::segment))
            .collect();

        let mut set = Self::default();
        let mut seen = HashSet::new();
        for template in &policy.invalidation {
            let with_id = template.replace(ID_PLACEHOLDER, &id);
            if with_id.contains(OWNER_PLACEHOLDER) {
                for owner in &owners {
                    set.push(&mut seen, with_id.replace(OWNER_PLACEHOLDER, owner));
                }
            } else {
                set.push(&mut seen, with_id);
            }
        }
        set
    }

    fn push(&mut self, seen: &mut HashSet<String>, value: String) {
        if seen.insert(value.clone()) {
            self.targets.push(InvalidationTarget::from_expanded(value));
        }
    }

    pub fn targets(&self) -> &[InvalidationTarget] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Targets that could not be deleted during one dispatch.
#[derive(Debug)]
pub struct PartialInvalidation {
    pub resource: ResourceType,
    pub attempted: usize,
    pub failures: Vec<(InvalidationTarget, StoreError)>,
}

impl fmt::Display for PartialInvalidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} invalidation targets for {} failed",
            self.failures.len(),
            self.attempted,
            self.resource
        )?;
        for (target, err) in &self.failures {
            write!(f, "; {target}: {err}")?;
        }
        Ok(())
    }
}

/// Outcome of one dispatch.
#[derive(Debug)]
pub struct InvalidationReport {
    pub removed: u64,
    pub partial: Option<PartialInvalidation>,
}

/// Turns write events into store deletes.
#[derive(Clone)]
pub struct InvalidationDispatcher {
    store: Arc<dyn CacheStore>,
    policies: Arc<CachePolicies>,
    timeout: Duration,
}

impl InvalidationDispatcher {
    pub fn new(store: Arc<dyn CacheStore>, policies: Arc<CachePolicies>, timeout: Duration) -> Self {
        Self {
            store,
            policies,
            timeout,
        }
    }

    pub fn policies(&self) -> &CachePolicies {
        &self.policies
    }

    /// Purge everything the policy of `resource` names and return how many
    /// keys were removed. Never fails; failures are logged.
    pub async fn invalidate(
        &self,
        resource: ResourceType,
        resource_id: i64,
        owner_id: Option<i64>,
        extra_selectors: &[SelectorPart],
    ) -> u64 {
        let event = WriteEvent {
            resource,
            resource_id,
            owner_id,
            extra_selectors: extra_selectors.to_vec(),
        };
        self.dispatch(&event).await.removed
    }

    #[instrument(skip(self, event), fields(resource = %event.resource, id = event.resource_id))]
    pub async fn dispatch(&self, event: &WriteEvent) -> InvalidationReport {
        let started = Instant::now();
        let set = InvalidationSet::plan(self.policies.get(event.resource), event);

        let outcomes = join_all(set.targets().iter().map(|target| self.purge(target))).await;

        let mut removed = 0;
        let mut failures = Vec::new();
        for (target, outcome) in set.targets().iter().zip(outcomes) {
            match outcome {
                Ok(count) => removed += count,
                Err(err) => failures.push((target.clone(), err)),
            }
        }

        let resource = event.resource.as_str();
        counter!(METRIC_CACHE_INVALIDATED_KEYS_TOTAL, "resource" => resource).increment(removed);
        histogram!(METRIC_CACHE_INVALIDATE_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        let partial = if failures.is_empty() {
            debug!(targets = set.len(), removed, "cache invalidated");
            None
        } else {
            counter!(METRIC_CACHE_INVALIDATION_FAILURES_TOTAL, "resource" => resource)
                .increment(failures.len() as u64);
            let report = PartialInvalidation {
                resource: event.resource,
                attempted: set.len(),
                failures,
            };
            warn!(removed, report = %report, "cache invalidation incomplete");
            Some(report)
        };

        InvalidationReport { removed, partial }
    }

    async fn purge(&self, target: &InvalidationTarget) -> Result<u64, StoreError> {
        let (op, call) = match target {
            InvalidationTarget::Key(key) => ("delete", self.store.delete(key)),
            InvalidationTarget::Pattern(pattern) => {
                ("delete_pattern", self.store.delete_pattern(pattern))
            }
        };
        let started = Instant::now();
        match timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                op,
                elapsed_ms: started.elapsed().as_millis() as u64,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::cache::{config::CacheConfig, store::MemoryStore};

    fn policies() -> Arc<CachePolicies> {
        Arc::new(CachePolicies::defaults(&CacheConfig::default()))
    }

    fn planned(event: &WriteEvent) -> Vec<String> {
        let policies = policies();
        InvalidationSet::plan(policies.get(event.resource), event)
            .targets()
            .iter()
            .map(|target| target.to_string())
            .collect()
    }

    #[test]
    fn dish_plan_covers_detail_owner_lists_and_routes() {
        let targets = planned(&WriteEvent::new(ResourceType::Dish, 7, Some(3)));
        assert_eq!(
            targets,
            vec![
                "dish:7:*",
                "dish:list:3:*",
                "dish:list:all:*",
                "menu:*",
                "route:dishes.show:GET:/api/v1/dishes/7:*",
                "route:dishes.index:*",
                "route:chefs.dishes:GET:/api/v1/chefs/3/dishes:*",
                "route:chefs.menus:GET:/api/v1/chefs/3/menus:*",
                "route:menus.*",
            ]
        );
    }

    #[test]
    fn owner_templates_expand_for_extra_scopes() {
        let event = WriteEvent::new(ResourceType::Dish, 7, Some(3)).with_extra(4_i64);
        let targets = planned(&event);
        assert!(targets.contains(&"dish:list:3:*".to_string()));
        assert!(targets.contains(&"dish:list:4:*".to_string()));
        assert!(targets.contains(&"route:chefs.dishes:GET:/api/v1/chefs/4/dishes:*".to_string()));
    }

    #[test]
    fn owner_templates_are_skipped_without_owner() {
        let targets = planned(&WriteEvent::new(ResourceType::Dish, 7, None));
        assert!(targets.iter().all(|target| !target.contains("{owner}")));
        assert!(!targets.iter().any(|target| target.starts_with("dish:list:3")));
        assert!(targets.contains(&"dish:7:*".to_string()));
    }

    #[test]
    fn duplicates_are_removed_in_order() {
        let event = WriteEvent::new(ResourceType::Menu, 2, Some(5)).with_extra(5_i64);
        let targets = planned(&event);
        let unique: HashSet<_> = targets.iter().collect();
        assert_eq!(unique.len(), targets.len());
        assert_eq!(targets[0], "menu:2:*");
    }

    #[test]
    fn templates_without_globs_are_exact_keys() {
        let config = CacheConfig::default();
        let mut overrides = std::collections::HashMap::new();
        overrides.insert(
            ResourceType::Chef,
            crate::cache::policy::PolicyOverride {
                ttl: None,
                invalidate: Some(vec!["chef:{id}:v1".into(), "chef:list:*".into()]),
            },
        );
        let policies = CachePolicies::with_overrides(&config, &overrides);
        let set = InvalidationSet::plan(
            policies.get(ResourceType::Chef),
            &WriteEvent::new(ResourceType::Chef, 9, None),
        );
        assert_eq!(
            set.targets(),
            &[
                InvalidationTarget::Key("chef:9:v1".into()),
                InvalidationTarget::Pattern("chef:list:*".into()),
            ]
        );
    }

    #[tokio::test]
    async fn removes_matching_entries_and_keeps_unrelated_ones() {
        let store = Arc::new(MemoryStore::default());
        let ttl = Duration::from_secs(60);
        for key in [
            "dish:7:v1",
            "dish:list:3:any:v1",
            "dish:list:all:any:v1",
            "menu:2:v1",
            "dish:8:v1",
            "dish:list:4:any:v1",
            "chef:3:v1",
        ] {
            store.set(key, Bytes::from_static(b"{}"), ttl).await.expect("seed");
        }

        let dispatcher = InvalidationDispatcher::new(store.clone(), policies(), Duration::from_millis(250));
        let removed = dispatcher.invalidate(ResourceType::Dish, 7, Some(3), &[]).await;

        assert_eq!(removed, 4);
        let mut remaining = store.keys();
        remaining.sort();
        assert_eq!(remaining, vec!["chef:3:v1", "dish:8:v1", "dish:list:4:any:v1"]);
    }

    #[tokio::test]
    async fn invalidating_absent_keys_is_a_no_op() {
        let store = Arc::new(MemoryStore::default());
        let dispatcher = InvalidationDispatcher::new(store, policies(), Duration::from_millis(250));

        assert_eq!(dispatcher.invalidate(ResourceType::Menu, 1, Some(1), &[]).await, 0);
        assert_eq!(dispatcher.invalidate(ResourceType::Menu, 1, Some(1), &[]).await, 0);
    }

    struct FlakyStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl CacheStore for FlakyStore {
        fn backend(&self) -> &'static str {
            "flaky"
        }
        async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
            self.inner.set(key, value, ttl).await
        }
        async fn delete(&self, key: &str) -> Result<u64, StoreError> {
            self.inner.delete(key).await
        }
        async fn delete_pattern(&self, pattern: &str) -> Result<u64, StoreError> {
            if pattern.starts_with("route:") {
                return Err(StoreError::unavailable("scan refused"));
            }
            self.inner.delete_pattern(pattern).await
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn partial_failures_are_reported_not_raised() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::default(),
        });
        store
            .set("dish:7:v1", Bytes::from_static(b"{}"), Duration::from_secs(60))
            .await
            .expect("seed");
        let dispatcher = InvalidationDispatcher::new(store.clone(), policies(), Duration::from_millis(250));

        let report = dispatcher
            .dispatch(&WriteEvent::new(ResourceType::Dish, 7, Some(3)))
            .await;

        assert_eq!(report.removed, 1);
        let partial = report.partial.expect("route patterns should fail");
        assert_eq!(partial.failures.len(), 5);
        assert_eq!(partial.attempted, 9);
        assert!(partial.to_string().starts_with("5 of 9 invalidation targets for dish failed"));
        assert!(store.inner.is_empty());
    }
}
