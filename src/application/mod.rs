//! Application services: catalog reads through the cache, writes followed by
//! invalidation.

pub mod chefs;
pub mod dishes;
pub mod error;
pub mod menus;
pub mod repos;
mod validation;
