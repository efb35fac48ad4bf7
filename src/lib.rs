//! Catering catalog backend with a read-through cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
