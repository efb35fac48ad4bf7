use std::sync::Arc;

use crate::application::chefs::ChefService;
use crate::application::dishes::DishService;
use crate::application::menus::MenuService;
use crate::application::repos::{
    ChefsRepo, ChefsWriteRepo, DishesRepo, DishesWriteRepo, HealthRepo, MenusRepo, MenusWriteRepo,
};
use crate::cache::{CacheContext, RouteCacheState};

#[derive(Clone)]
pub struct ApiState {
    pub chefs: Arc<ChefService>,
    pub dishes: Arc<DishService>,
    pub menus: Arc<MenuService>,
    pub cache: CacheContext,
    pub route_cache: RouteCacheState,
    pub health: Arc<dyn HealthRepo>,
}

impl ApiState {
    /// Wire the catalog services over one repository backend.
    pub fn from_repositories<R>(
        repos: Arc<R>,
        cache: CacheContext,
        route_cache: RouteCacheState,
    ) -> Self
    where
        R: ChefsRepo
            + ChefsWriteRepo
            + DishesRepo
            + DishesWriteRepo
            + MenusRepo
            + MenusWriteRepo
            + HealthRepo
            + 'static,
    {
        let chefs = Arc::new(ChefService::new(
            repos.clone(),
            repos.clone(),
            repos.clone(),
            repos.clone(),
            cache.clone(),
        ));
        let dishes = Arc::new(DishService::new(
            repos.clone(),
            repos.clone(),
            repos.clone(),
            cache.clone(),
        ));
        let menus = Arc::new(MenuService::new(
            repos.clone(),
            repos.clone(),
            repos.clone(),
            repos.clone(),
            cache.clone(),
        ));

        Self {
            chefs,
            dishes,
            menus,
            cache,
            route_cache,
            health: repos,
        }
    }
}
