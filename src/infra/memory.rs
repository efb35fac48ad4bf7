//! In-process repositories.
//!
//! Used when no database URL is configured and by the integration tests.
//! Mirrors the constraints of the Postgres schema: unique chef emails,
//! cascading chef deletes and menu entries removed with their dish.

use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::application::repos::{
    ChefsRepo, ChefsWriteRepo, CreateChefParams, CreateDishParams, CreateMenuParams,
    DishQueryFilter, DishesRepo, DishesWriteRepo, HealthRepo, MenuQueryFilter, MenusRepo,
    MenusWriteRepo, RepoError, UpdateChefParams, UpdateDishParams, UpdateMenuParams,
};
use crate::domain::entities::{ChefRecord, DishRecord, MenuRecord};

#[derive(Default)]
struct State {
    next_id: i64,
    chefs: BTreeMap<i64, ChefRecord>,
    dishes: BTreeMap<i64, DishRecord>,
    menus: BTreeMap<i64, MenuRecord>,
}

impl State {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn ensure_unique_email(&self, email: &str, except: Option<i64>) -> Result<(), RepoError> {
        let taken = self
            .chefs
            .values()
            .any(|chef| chef.email == email && Some(chef.id) != except);
        if taken {
            return Err(RepoError::Duplicate {
                constraint: "chefs_email_key".to_string(),
            });
        }
        Ok(())
    }

    fn ensure_chef(&self, chef_id: i64) -> Result<(), RepoError> {
        if self.chefs.contains_key(&chef_id) {
            Ok(())
        } else {
            Err(RepoError::Integrity {
                message: format!("chef {chef_id} does not exist"),
            })
        }
    }
}

#[derive(Default)]
pub struct MemoryRepositories {
    state: RwLock<State>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChefsRepo for MemoryRepositories {
    async fn list_chefs(&self) -> Result<Vec<ChefRecord>, RepoError> {
        let state = self.state.read().await;
        let mut chefs: Vec<ChefRecord> = state.chefs.values().cloned().collect();
        chefs.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(chefs)
    }

    async fn find_chef(&self, id: i64) -> Result<Option<ChefRecord>, RepoError> {
        Ok(self.state.read().await.chefs.get(&id).cloned())
    }
}

#[async_trait]
impl ChefsWriteRepo for MemoryRepositories {
    async fn create_chef(&self, params: CreateChefParams) -> Result<ChefRecord, RepoError> {
        let mut state = self.state.write().await;
        state.ensure_unique_email(&params.email, None)?;
        let now = OffsetDateTime::now_utc();
        let chef = ChefRecord {
            id: state.allocate_id(),
            name: params.name,
            email: params.email,
            bio: params.bio,
            created_at: now,
            updated_at: now,
        };
        state.chefs.insert(chef.id, chef.clone());
        Ok(chef)
    }

    async fn update_chef(&self, params: UpdateChefParams) -> Result<ChefRecord, RepoError> {
        let mut state = self.state.write().await;
        state.ensure_unique_email(&params.email, Some(params.id))?;
        let chef = state.chefs.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        chef.name = params.name;
        chef.email = params.email;
        chef.bio = params.bio;
        chef.updated_at = OffsetDateTime::now_utc();
        Ok(chef.clone())
    }

    async fn delete_chef(&self, id: i64) -> Result<(), RepoError> {
        let mut state = self.state.write().await;
        state.chefs.remove(&id).ok_or(RepoError::NotFound)?;
        state.dishes.retain(|_, dish| dish.chef_id != id);
        state.menus.retain(|_, menu| menu.chef_id != id);
        Ok(())
    }
}

#[async_trait]
impl DishesRepo for MemoryRepositories {
    async fn list_dishes(&self, filter: &DishQueryFilter) -> Result<Vec<DishRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(state
            .dishes
            .values()
            .filter(|dish| filter.chef_id.is_none_or(|chef_id| dish.chef_id == chef_id))
            .filter(|dish| filter.active.is_none_or(|active| dish.active == active))
            .cloned()
            .collect())
    }

    async fn find_dish(&self, id: i64) -> Result<Option<DishRecord>, RepoError> {
        Ok(self.state.read().await.dishes.get(&id).cloned())
    }

    async fn find_dishes(&self, ids: &[i64]) -> Result<Vec<DishRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.dishes.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl DishesWriteRepo for MemoryRepositories {
    async fn create_dish(&self, params: CreateDishParams) -> Result<DishRecord, RepoError> {
        let mut state = self.state.write().await;
        state.ensure_chef(params.chef_id)?;
        let now = OffsetDateTime::now_utc();
        let dish = DishRecord {
            id: state.allocate_id(),
            chef_id: params.chef_id,
            name: params.name,
            description: params.description,
            price_cents: params.price_cents,
            active: params.active,
            created_at: now,
            updated_at: now,
        };
        state.dishes.insert(dish.id, dish.clone());
        Ok(dish)
    }

    async fn update_dish(&self, params: UpdateDishParams) -> Result<DishRecord, RepoError> {
        let mut state = self.state.write().await;
        state.ensure_chef(params.chef_id)?;
        let dish = state.dishes.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        dish.chef_id = params.chef_id;
        dish.name = params.name;
        dish.description = params.description;
        dish.price_cents = params.price_cents;
        dish.active = params.active;
        dish.updated_at = OffsetDateTime::now_utc();
        Ok(dish.clone())
    }

    async fn delete_dish(&self, id: i64) -> Result<(), RepoError> {
        let mut state = self.state.write().await;
        state.dishes.remove(&id).ok_or(RepoError::NotFound)?;
        for menu in state.menus.values_mut() {
            menu.dish_ids.retain(|dish_id| *dish_id != id);
        }
        Ok(())
    }
}

#[async_trait]
impl MenusRepo for MemoryRepositories {
    async fn list_menus(&self, filter: &MenuQueryFilter) -> Result<Vec<MenuRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(state
            .menus
            .values()
            .filter(|menu| filter.chef_id.is_none_or(|chef_id| menu.chef_id == chef_id))
            .cloned()
            .collect())
    }

    async fn find_menu(&self, id: i64) -> Result<Option<MenuRecord>, RepoError> {
        Ok(self.state.read().await.menus.get(&id).cloned())
    }
}

#[async_trait]
impl MenusWriteRepo for MemoryRepositories {
    async fn create_menu(&self, params: CreateMenuParams) -> Result<MenuRecord, RepoError> {
        let mut state = self.state.write().await;
        state.ensure_chef(params.chef_id)?;
        let now = OffsetDateTime::now_utc();
        let menu = MenuRecord {
            id: state.allocate_id(),
            chef_id: params.chef_id,
            name: params.name,
            description: params.description,
            price_per_person_cents: params.price_per_person_cents,
            dish_ids: params.dish_ids,
            created_at: now,
            updated_at: now,
        };
        state.menus.insert(menu.id, menu.clone());
        Ok(menu)
    }

    async fn update_menu(&self, params: UpdateMenuParams) -> Result<MenuRecord, RepoError> {
        let mut state = self.state.write().await;
        let menu = state.menus.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        menu.name = params.name;
        menu.description = params.description;
        menu.price_per_person_cents = params.price_per_person_cents;
        menu.dish_ids = params.dish_ids;
        menu.updated_at = OffsetDateTime::now_utc();
        Ok(menu.clone())
    }

    async fn delete_menu(&self, id: i64) -> Result<(), RepoError> {
        let mut state = self.state.write().await;
        state.menus.remove(&id).map(|_| ()).ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl HealthRepo for MemoryRepositories {
    async fn health_check(&self) -> Result<(), RepoError> {
        Ok(())
    }
}
