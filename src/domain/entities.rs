//! Domain entities mirrored from persistent storage.
//!
//! Records are serialized into the cache, so every field round-trips through
//! serde.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChefRecord {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DishRecord {
    pub id: i64,
    pub chef_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuRecord {
    pub id: i64,
    pub chef_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price_per_person_cents: i64,
    /// Dishes in serving order.
    pub dish_ids: Vec<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A menu with its dishes resolved, as served by the read API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuDetail {
    pub menu: MenuRecord,
    pub dishes: Vec<DishRecord>,
}
