//! API handlers organized by resource type.
//!
//! Handlers translate between the JSON models and the catalog services; reads
//! are wrapped by the route cache in the router, not here.

mod chefs;
mod dishes;
mod health;
mod menus;

pub use chefs::*;
pub use dishes::*;
pub use health::*;
pub use menus::*;

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct DishListQuery {
    pub chef_id: Option<i64>,
    pub active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActiveQuery {
    pub active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MenuListQuery {
    pub chef_id: Option<i64>,
}
