//! Per-resource cache policies.
//!
//! A policy fixes the namespace, TTL and invalidation templates of one
//! resource type. The table is built once at startup and shared read-only.

use std::{collections::HashMap, fmt, str::FromStr, time::Duration};

use thiserror::Error;

use super::{
    config::CacheConfig,
    keys::{CacheKey, SelectorPart, build_key},
};

/// Entity segment shared by every list key.
pub const LIST_ENTITY: &str = "list";
/// List selector used when a list is not scoped to an owner.
pub const ALL_OWNERS: &str = "all";

/// Resource types with a cache policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    Chef,
    Dish,
    Menu,
}

impl ResourceType {
    pub const ALL: [ResourceType; 3] = [ResourceType::Chef, ResourceType::Dish, ResourceType::Menu];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Chef => "chef",
            ResourceType::Dish => "dish",
            ResourceType::Menu => "menu",
        }
    }

    /// Invalidation templates applied when no override is configured.
    ///
    /// Placeholders: `{id}` is the written resource, `{owner}` its owning
    /// chef. Menus embed dish data, so dish writes also purge menu entries.
    pub fn default_invalidation(self) -> &'static [&'static str] {
        match self {
            ResourceType::Chef => &[
                "chef:{id}:*",
                "chef:list:*",
                "dish:list:{id}:*",
                "menu:list:{id}:*",
                "route:chefs.*",
                "route:dishes.index:*",
                "route:menus.index:*",
            ],
            ResourceType::Dish => &[
                "dish:{id}:*",
                "dish:list:{owner}:*",
                "dish:list:all:*",
                "menu:*",
                "route:dishes.show:GET:/api/v1/dishes/{id}:*",
                "route:dishes.index:*",
                "route:chefs.dishes:GET:/api/v1/chefs/{owner}/dishes:*",
                "route:chefs.menus:GET:/api/v1/chefs/{owner}/menus:*",
                "route:menus.*",
            ],
            ResourceType::Menu => &[
                "menu:{id}:*",
                "menu:list:{owner}:*",
                "menu:list:all:*",
                "route:menus.show:GET:/api/v1/menus/{id}:*",
                "route:menus.index:*",
                "route:chefs.menus:GET:/api/v1/chefs/{owner}/menus:*",
            ],
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown resource type `{0}` (expected chef, dish or menu)")]
pub struct UnknownResourceType(pub String);

impl FromStr for ResourceType {
    type Err = UnknownResourceType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chef" | "chefs" => Ok(ResourceType::Chef),
            "dish" | "dishes" => Ok(ResourceType::Dish),
            "menu" | "menus" => Ok(ResourceType::Menu),
            _ => Err(UnknownResourceType(value.to_string())),
        }
    }
}

/// Caching rules for one resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub resource: ResourceType,
    pub namespace: String,
    pub ttl: Duration,
    pub invalidation: Vec<String>,
    version: String,
}

impl CachePolicy {
    /// Key of a single record: `{ns}:{id}:{version}`.
    pub fn detail_key(&self, id: i64) -> CacheKey {
        build_key(&self.namespace, &id.to_string(), &[], &self.version)
    }

    /// Key of a list: `{ns}:list:{owner|all}:{filters...}:{version}`.
    pub fn list_key(&self, owner: Option<i64>, filters: &[SelectorPart]) -> CacheKey {
        let mut parts = Vec::with_capacity(filters.len() + 1);
        parts.push(match owner {
            Some(owner) => SelectorPart::Int(owner),
            None => SelectorPart::from(ALL_OWNERS),
        });
        parts.extend_from_slice(filters);
        build_key(&self.namespace, LIST_ENTITY, &parts, &self.version)
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

/// Configured deviation from a default policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyOverride {
    pub ttl: Option<Duration>,
    pub invalidate: Option<Vec<String>>,
}

/// The policy table.
#[derive(Debug, Clone)]
pub struct CachePolicies {
    policies: HashMap<ResourceType, CachePolicy>,
}

impl CachePolicies {
    /// Default table for `config`.
    pub fn defaults(config: &CacheConfig) -> Self {
        Self::with_overrides(config, &HashMap::new())
    }

    pub fn with_overrides(
        config: &CacheConfig,
        overrides: &HashMap<ResourceType, PolicyOverride>,
    ) -> Self {
        let policies = ResourceType::ALL
            .into_iter()
            .map(|resource| {
                let custom = overrides.get(&resource);
                let ttl = custom
                    .and_then(|entry| entry.ttl)
                    .unwrap_or(config.default_ttl);
                let invalidation = custom
                    .and_then(|entry| entry.invalidate.clone())
                    .unwrap_or_else(|| {
                        resource
                            .default_invalidation()
                            .iter()
                            .map(|template| (*template).to_string())
                            .collect()
                    });
                let policy = CachePolicy {
                    resource,
                    namespace: resource.as_str().to_string(),
                    ttl,
                    invalidation,
                    version: config.key_version.clone(),
                };
                (resource, policy)
            })
            .collect();
        Self { policies }
    }

    pub fn get(&self, resource: ResourceType) -> &CachePolicy {
        // Populated for every variant in `with_overrides`.
        &self.policies[&resource]
    }
}
