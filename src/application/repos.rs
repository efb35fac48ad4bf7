//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{ChefRecord, DishRecord, MenuRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DishQueryFilter {
    pub chef_id: Option<i64>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MenuQueryFilter {
    pub chef_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct CreateChefParams {
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateChefParams {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateDishParams {
    pub chef_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct UpdateDishParams {
    pub id: i64,
    pub chef_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct CreateMenuParams {
    pub chef_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price_per_person_cents: i64,
    pub dish_ids: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct UpdateMenuParams {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price_per_person_cents: i64,
    pub dish_ids: Vec<i64>,
}

#[async_trait]
pub trait ChefsRepo: Send + Sync {
    async fn list_chefs(&self) -> Result<Vec<ChefRecord>, RepoError>;

    async fn find_chef(&self, id: i64) -> Result<Option<ChefRecord>, RepoError>;
}

#[async_trait]
pub trait ChefsWriteRepo: Send + Sync {
    async fn create_chef(&self, params: CreateChefParams) -> Result<ChefRecord, RepoError>;

    async fn update_chef(&self, params: UpdateChefParams) -> Result<ChefRecord, RepoError>;

    /// Delete a chef together with their dishes and menus.
    async fn delete_chef(&self, id: i64) -> Result<(), RepoError>;
}

#[async_trait]
pub trait DishesRepo: Send + Sync {
    async fn list_dishes(&self, filter: &DishQueryFilter) -> Result<Vec<DishRecord>, RepoError>;

    async fn find_dish(&self, id: i64) -> Result<Option<DishRecord>, RepoError>;

    /// Dishes with the given ids, in the order of `ids`. Unknown ids are
    /// skipped.
    async fn find_dishes(&self, ids: &[i64]) -> Result<Vec<DishRecord>, RepoError>;
}

#[async_trait]
pub trait DishesWriteRepo: Send + Sync {
    async fn create_dish(&self, params: CreateDishParams) -> Result<DishRecord, RepoError>;

    async fn update_dish(&self, params: UpdateDishParams) -> Result<DishRecord, RepoError>;

    /// Delete a dish and remove it from every menu.
    async fn delete_dish(&self, id: i64) -> Result<(), RepoError>;
}

#[async_trait]
pub trait MenusRepo: Send + Sync {
    async fn list_menus(&self, filter: &MenuQueryFilter) -> Result<Vec<MenuRecord>, RepoError>;

    async fn find_menu(&self, id: i64) -> Result<Option<MenuRecord>, RepoError>;
}

#[async_trait]
pub trait MenusWriteRepo: Send + Sync {
    async fn create_menu(&self, params: CreateMenuParams) -> Result<MenuRecord, RepoError>;

    async fn update_menu(&self, params: UpdateMenuParams) -> Result<MenuRecord, RepoError>;

    async fn delete_menu(&self, id: i64) -> Result<(), RepoError>;
}

#[async_trait]
pub trait HealthRepo: Send + Sync {
    async fn health_check(&self) -> Result<(), RepoError>;
}
