use std::{collections::HashSet, sync::Arc};

use tracing::info;

use crate::application::error::CatalogError;
use crate::application::repos::{
    ChefsRepo, CreateMenuParams, DishesRepo, MenuQueryFilter, MenusRepo, MenusWriteRepo,
    UpdateMenuParams,
};
use crate::cache::{CacheContext, ResourceType, WriteEvent};
use crate::domain::entities::{MenuDetail, MenuRecord};

use super::validation::{ensure_non_empty, normalize_optional};

#[derive(Debug, Clone)]
pub struct MenuCommand {
    pub chef_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price_per_person_cents: i64,
    pub dish_ids: Vec<i64>,
}

#[derive(Clone)]
pub struct MenuService {
    reader: Arc<dyn MenusRepo>,
    writer: Arc<dyn MenusWriteRepo>,
    dishes: Arc<dyn DishesRepo>,
    chefs: Arc<dyn ChefsRepo>,
    cache: CacheContext,
}

impl MenuService {
    pub fn new(
        reader: Arc<dyn MenusRepo>,
        writer: Arc<dyn MenusWriteRepo>,
        dishes: Arc<dyn DishesRepo>,
        chefs: Arc<dyn ChefsRepo>,
        cache: CacheContext,
    ) -> Self {
        Self {
            reader,
            writer,
            dishes,
            chefs,
            cache,
        }
    }

    pub async fn list(&self, filter: MenuQueryFilter) -> Result<Vec<MenuRecord>, CatalogError> {
        let key = self.cache.list_key(ResourceType::Menu, filter.chef_id, &[]);
        let reader = self.reader.clone();
        self.cache
            .read(ResourceType::Menu, &key, || async move {
                reader.list_menus(&filter).await.map_err(CatalogError::from)
            })
            .await
    }

    pub async fn list_for_chef(&self, chef_id: i64) -> Result<Vec<MenuRecord>, CatalogError> {
        if self.chefs.find_chef(chef_id).await?.is_none() {
            return Err(CatalogError::not_found("chef"));
        }
        self.list(MenuQueryFilter {
            chef_id: Some(chef_id),
        })
        .await
    }

    /// A menu with its dishes resolved in serving order.
    pub async fn get(&self, id: i64) -> Result<MenuDetail, CatalogError> {
        let key = self.cache.detail_key(ResourceType::Menu, id);
        let reader = self.reader.clone();
        let dishes = self.dishes.clone();
        self.cache
            .read(ResourceType::Menu, &key, || async move {
                let menu = reader
                    .find_menu(id)
                    .await?
                    .ok_or_else(|| CatalogError::not_found("menu"))?;
                let dishes = dishes.find_dishes(&menu.dish_ids).await?;
                Ok::<_, CatalogError>(MenuDetail { menu, dishes })
            })
            .await
    }

    pub async fn create(&self, command: MenuCommand) -> Result<MenuRecord, CatalogError> {
        let command = self.validate(command).await?;
        let menu = self
            .writer
            .create_menu(CreateMenuParams {
                chef_id: command.chef_id,
                name: command.name,
                description: command.description,
                price_per_person_cents: command.price_per_person_cents,
                dish_ids: command.dish_ids,
            })
            .await?;

        self.cache
            .written(WriteEvent::new(ResourceType::Menu, menu.id, Some(menu.chef_id)))
            .await;
        info!(menu_id = menu.id, chef_id = menu.chef_id, "menu created");
        Ok(menu)
    }

    /// Update a menu. Menus cannot move between chefs.
    pub async fn update(&self, id: i64, command: MenuCommand) -> Result<MenuRecord, CatalogError> {
        let existing = self
            .reader
            .find_menu(id)
            .await?
            .ok_or_else(|| CatalogError::not_found("menu"))?;
        if existing.chef_id != command.chef_id {
            return Err(CatalogError::validation(
                "menus cannot be reassigned to another chef",
            ));
        }
        let command = self.validate(command).await?;

        let menu = self
            .writer
            .update_menu(UpdateMenuParams {
                id,
                name: command.name,
                description: command.description,
                price_per_person_cents: command.price_per_person_cents,
                dish_ids: command.dish_ids,
            })
            .await?;

        self.cache
            .written(WriteEvent::new(ResourceType::Menu, menu.id, Some(menu.chef_id)))
            .await;
        Ok(menu)
    }

    pub async fn delete(&self, id: i64) -> Result<(), CatalogError> {
        let existing = self
            .reader
            .find_menu(id)
            .await?
            .ok_or_else(|| CatalogError::not_found("menu"))?;

        self.writer.delete_menu(id).await?;

        self.cache
            .written(WriteEvent::new(ResourceType::Menu, id, Some(existing.chef_id)))
            .await;
        info!(menu_id = id, chef_id = existing.chef_id, "menu deleted");
        Ok(())
    }

    async fn validate(&self, command: MenuCommand) -> Result<MenuCommand, CatalogError> {
        let MenuCommand {
            chef_id,
            name,
            description,
            price_per_person_cents,
            dish_ids,
        } = command;

        let name = ensure_non_empty(&name, "name")?;
        if price_per_person_cents < 0 {
            return Err(CatalogError::validation(
                "price per person must not be negative",
            ));
        }
        if self.chefs.find_chef(chef_id).await?.is_none() {
            return Err(CatalogError::validation(format!(
                "chef {chef_id} does not exist"
            )));
        }

        let mut seen = HashSet::with_capacity(dish_ids.len());
        if let Some(duplicate) = dish_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(CatalogError::validation(format!(
                "dish {duplicate} appears more than once"
            )));
        }

        let dishes = self.dishes.find_dishes(&dish_ids).await?;
        for id in &dish_ids {
            match dishes.iter().find(|dish| dish.id == *id) {
                None => {
                    return Err(CatalogError::validation(format!(
                        "dish {id} does not exist"
                    )));
                }
                Some(dish) if dish.chef_id != chef_id => {
                    return Err(CatalogError::validation(format!(
                        "dish {id} belongs to another chef"
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(MenuCommand {
            chef_id,
            name,
            description: normalize_optional(description),
            price_per_person_cents,
            dish_ids,
        })
    }
}
