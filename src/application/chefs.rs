use std::sync::Arc;

use tracing::info;

use crate::application::error::CatalogError;
use crate::application::repos::{
    ChefsRepo, ChefsWriteRepo, CreateChefParams, DishQueryFilter, DishesRepo, MenuQueryFilter,
    MenusRepo, UpdateChefParams,
};
use crate::cache::{CacheContext, ResourceType, WriteEvent};
use crate::domain::entities::ChefRecord;

use super::validation::{ensure_non_empty, normalize_optional};

#[derive(Debug, Clone)]
pub struct ChefCommand {
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
}

#[derive(Clone)]
pub struct ChefService {
    reader: Arc<dyn ChefsRepo>,
    writer: Arc<dyn ChefsWriteRepo>,
    dishes: Arc<dyn DishesRepo>,
    menus: Arc<dyn MenusRepo>,
    cache: CacheContext,
}

impl ChefService {
    pub fn new(
        reader: Arc<dyn ChefsRepo>,
        writer: Arc<dyn ChefsWriteRepo>,
        dishes: Arc<dyn DishesRepo>,
        menus: Arc<dyn MenusRepo>,
        cache: CacheContext,
    ) -> Self {
        Self {
            reader,
            writer,
            dishes,
            menus,
            cache,
        }
    }

    pub async fn list(&self) -> Result<Vec<ChefRecord>, CatalogError> {
        let key = self.cache.list_key(ResourceType::Chef, None, &[]);
        let reader = self.reader.clone();
        self.cache
            .read(ResourceType::Chef, &key, || async move {
                reader.list_chefs().await.map_err(CatalogError::from)
            })
            .await
    }

    pub async fn get(&self, id: i64) -> Result<ChefRecord, CatalogError> {
        let key = self.cache.detail_key(ResourceType::Chef, id);
        let reader = self.reader.clone();
        self.cache
            .read(ResourceType::Chef, &key, || async move {
                reader
                    .find_chef(id)
                    .await?
                    .ok_or_else(|| CatalogError::not_found("chef"))
            })
            .await
    }

    pub async fn create(&self, command: ChefCommand) -> Result<ChefRecord, CatalogError> {
        let ChefCommand { name, email, bio } = command;
        let chef = self
            .writer
            .create_chef(CreateChefParams {
                name: ensure_non_empty(&name, "name")?,
                email: normalize_email(&email)?,
                bio: normalize_optional(bio),
            })
            .await?;

        self.cache
            .written(WriteEvent::new(ResourceType::Chef, chef.id, None))
            .await;
        info!(chef_id = chef.id, "chef created");
        Ok(chef)
    }

    pub async fn update(&self, id: i64, command: ChefCommand) -> Result<ChefRecord, CatalogError> {
        let ChefCommand { name, email, bio } = command;
        let chef = self
            .writer
            .update_chef(UpdateChefParams {
                id,
                name: ensure_non_empty(&name, "name")?,
                email: normalize_email(&email)?,
                bio: normalize_optional(bio),
            })
            .await?;

        self.cache
            .written(WriteEvent::new(ResourceType::Chef, chef.id, None))
            .await;
        Ok(chef)
    }

    /// Delete a chef. Their dishes and menus go with them, so each of those
    /// is invalidated as well.
    pub async fn delete(&self, id: i64) -> Result<(), CatalogError> {
        let owned_dishes = self
            .dishes
            .list_dishes(&DishQueryFilter {
                chef_id: Some(id),
                active: None,
            })
            .await?;
        let owned_menus = self
            .menus
            .list_menus(&MenuQueryFilter { chef_id: Some(id) })
            .await?;

        self.writer.delete_chef(id).await?;

        self.cache
            .written(WriteEvent::new(ResourceType::Chef, id, None))
            .await;
        for dish in &owned_dishes {
            self.cache
                .written(WriteEvent::new(ResourceType::Dish, dish.id, Some(id)))
                .await;
        }
        for menu in &owned_menus {
            self.cache
                .written(WriteEvent::new(ResourceType::Menu, menu.id, Some(id)))
                .await;
        }
        info!(
            chef_id = id,
            dishes = owned_dishes.len(),
            menus = owned_menus.len(),
            "chef deleted"
        );
        Ok(())
    }
}

fn normalize_email(email: &str) -> Result<String, CatalogError> {
    let email = ensure_non_empty(email, "email")?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {
            Ok(email.to_ascii_lowercase())
        }
        _ => Err(CatalogError::validation("email must be a valid address")),
    }
}
