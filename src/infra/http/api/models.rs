use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::application::chefs::ChefCommand;
use crate::application::dishes::DishCommand;
use crate::application::menus::MenuCommand;
use crate::domain::entities::{ChefRecord, DishRecord, MenuDetail, MenuRecord};
use crate::domain::error::DomainError;
use crate::domain::money::{amount_to_cents, cents_to_amount};

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ChefRequest {
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
}

impl From<ChefRequest> for ChefCommand {
    fn from(request: ChefRequest) -> Self {
        Self {
            name: request.name,
            email: request.email,
            bio: request.bio,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DishRequest {
    pub chef_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl DishRequest {
    pub fn into_command(self) -> Result<DishCommand, DomainError> {
        Ok(DishCommand {
            chef_id: self.chef_id,
            name: self.name,
            description: self.description,
            price_cents: amount_to_cents(self.price, "price")?,
            active: self.active,
        })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MenuRequest {
    pub chef_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price_per_person: f64,
    #[serde(default)]
    pub dish_ids: Vec<i64>,
}

impl MenuRequest {
    pub fn into_command(self) -> Result<MenuCommand, DomainError> {
        Ok(MenuCommand {
            chef_id: self.chef_id,
            name: self.name,
            description: self.description,
            price_per_person_cents: amount_to_cents(
                self.price_per_person,
                "price_per_person",
            )?,
            dish_ids: self.dish_ids,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChefResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<ChefRecord> for ChefResponse {
    fn from(chef: ChefRecord) -> Self {
        Self {
            id: chef.id,
            name: chef.name,
            email: chef.email,
            bio: chef.bio,
            created_at: chef.created_at,
            updated_at: chef.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DishResponse {
    pub id: i64,
    pub chef_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<DishRecord> for DishResponse {
    fn from(dish: DishRecord) -> Self {
        Self {
            id: dish.id,
            chef_id: dish.chef_id,
            name: dish.name,
            description: dish.description,
            price: cents_to_amount(dish.price_cents),
            active: dish.active,
            created_at: dish.created_at,
            updated_at: dish.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MenuResponse {
    pub id: i64,
    pub chef_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price_per_person: f64,
    pub dish_ids: Vec<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<MenuRecord> for MenuResponse {
    fn from(menu: MenuRecord) -> Self {
        Self {
            id: menu.id,
            chef_id: menu.chef_id,
            name: menu.name,
            description: menu.description,
            price_per_person: cents_to_amount(menu.price_per_person_cents),
            dish_ids: menu.dish_ids,
            created_at: menu.created_at,
            updated_at: menu.updated_at,
        }
    }
}

/// A menu with its dishes expanded, in serving order.
#[derive(Debug, Serialize, Deserialize)]
pub struct MenuDetailResponse {
    #[serde(flatten)]
    pub menu: MenuResponse,
    pub dishes: Vec<DishResponse>,
}

impl From<MenuDetail> for MenuDetailResponse {
    fn from(detail: MenuDetail) -> Self {
        Self {
            menu: MenuResponse::from(detail.menu),
            dishes: detail.dishes.into_iter().map(DishResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
}

impl<T> ListResponse<T> {
    pub fn from_records<R>(records: Vec<R>) -> Self
    where
        T: From<R>,
    {
        Self {
            items: records.into_iter().map(T::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub cache: String,
    pub cache_backend: String,
}
