use std::sync::Arc;

use tracing::info;

use crate::application::error::CatalogError;
use crate::application::repos::{
    ChefsRepo, CreateDishParams, DishQueryFilter, DishesRepo, DishesWriteRepo, UpdateDishParams,
};
use crate::cache::{CacheContext, ResourceType, SelectorPart, WriteEvent};
use crate::domain::entities::DishRecord;

use super::validation::{ensure_non_empty, normalize_optional};

#[derive(Debug, Clone)]
pub struct DishCommand {
    pub chef_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub active: bool,
}

#[derive(Clone)]
pub struct DishService {
    reader: Arc<dyn DishesRepo>,
    writer: Arc<dyn DishesWriteRepo>,
    chefs: Arc<dyn ChefsRepo>,
    cache: CacheContext,
}

impl DishService {
    pub fn new(
        reader: Arc<dyn DishesRepo>,
        writer: Arc<dyn DishesWriteRepo>,
        chefs: Arc<dyn ChefsRepo>,
        cache: CacheContext,
    ) -> Self {
        Self {
            reader,
            writer,
            chefs,
            cache,
        }
    }

    pub async fn list(&self, filter: DishQueryFilter) -> Result<Vec<DishRecord>, CatalogError> {
        let key = self.cache.list_key(
            ResourceType::Dish,
            filter.chef_id,
            &[active_selector(filter.active)],
        );
        let reader = self.reader.clone();
        self.cache
            .read(ResourceType::Dish, &key, || async move {
                reader.list_dishes(&filter).await.map_err(CatalogError::from)
            })
            .await
    }

    /// Dishes of one chef; unknown chefs are reported as not found rather
    /// than as an empty list.
    pub async fn list_for_chef(
        &self,
        chef_id: i64,
        active: Option<bool>,
    ) -> Result<Vec<DishRecord>, CatalogError> {
        self.ensure_chef_exists(chef_id, CatalogError::not_found("chef"))
            .await?;
        self.list(DishQueryFilter {
            chef_id: Some(chef_id),
            active,
        })
        .await
    }

    pub async fn get(&self, id: i64) -> Result<DishRecord, CatalogError> {
        let key = self.cache.detail_key(ResourceType::Dish, id);
        let reader = self.reader.clone();
        self.cache
            .read(ResourceType::Dish, &key, || async move {
                reader
                    .find_dish(id)
                    .await?
                    .ok_or_else(|| CatalogError::not_found("dish"))
            })
            .await
    }

    pub async fn create(&self, command: DishCommand) -> Result<DishRecord, CatalogError> {
        let params = self.validate(command).await?;
        let dish = self
            .writer
            .create_dish(CreateDishParams {
                chef_id: params.chef_id,
                name: params.name,
                description: params.description,
                price_cents: params.price_cents,
                active: params.active,
            })
            .await?;

        self.cache
            .written(WriteEvent::new(ResourceType::Dish, dish.id, Some(dish.chef_id)))
            .await;
        info!(dish_id = dish.id, chef_id = dish.chef_id, "dish created");
        Ok(dish)
    }

    pub async fn update(&self, id: i64, command: DishCommand) -> Result<DishRecord, CatalogError> {
        let previous = self
            .reader
            .find_dish(id)
            .await?
            .ok_or_else(|| CatalogError::not_found("dish"))?;
        let params = self.validate(command).await?;

        let dish = self
            .writer
            .update_dish(UpdateDishParams {
                id,
                chef_id: params.chef_id,
                name: params.name,
                description: params.description,
                price_cents: params.price_cents,
                active: params.active,
            })
            .await?;

        let mut event = WriteEvent::new(ResourceType::Dish, dish.id, Some(dish.chef_id));
        if previous.chef_id != dish.chef_id {
            event = event.with_extra(previous.chef_id);
        }
        self.cache.written(event).await;
        Ok(dish)
    }

    pub async fn delete(&self, id: i64) -> Result<(), CatalogError> {
        let existing = self
            .reader
            .find_dish(id)
            .await?
            .ok_or_else(|| CatalogError::not_found("dish"))?;

        self.writer.delete_dish(id).await?;

        self.cache
            .written(WriteEvent::new(ResourceType::Dish, id, Some(existing.chef_id)))
            .await;
        info!(dish_id = id, chef_id = existing.chef_id, "dish deleted");
        Ok(())
    }

    async fn validate(&self, command: DishCommand) -> Result<DishCommand, CatalogError> {
        let DishCommand {
            chef_id,
            name,
            description,
            price_cents,
            active,
        } = command;

        let name = ensure_non_empty(&name, "name")?;
        if price_cents < 0 {
            return Err(CatalogError::validation("price must not be negative"));
        }
        self.ensure_chef_exists(
            chef_id,
            CatalogError::validation(format!("chef {chef_id} does not exist")),
        )
        .await?;

        Ok(DishCommand {
            chef_id,
            name,
            description: normalize_optional(description),
            price_cents,
            active,
        })
    }

    async fn ensure_chef_exists(&self, chef_id: i64, missing: CatalogError) -> Result<(), CatalogError> {
        match self.chefs.find_chef(chef_id).await? {
            Some(_) => Ok(()),
            None => Err(missing),
        }
    }
}

/// Selector for the `active` filter of dish lists.
pub fn active_selector(active: Option<bool>) -> SelectorPart {
    SelectorPart::from(match active {
        Some(true) => "active",
        Some(false) => "inactive",
        None => "any",
    })
}
