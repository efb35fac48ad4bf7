use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{
        CreateDishParams, DishQueryFilter, DishesRepo, DishesWriteRepo, RepoError,
        UpdateDishParams,
    },
    domain::entities::DishRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const DISH_COLUMNS: &str =
    "id, chef_id, name, description, price_cents, active, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct DishRow {
    id: i64,
    chef_id: i64,
    name: String,
    description: Option<String>,
    price_cents: i64,
    active: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<DishRow> for DishRecord {
    fn from(row: DishRow) -> Self {
        Self {
            id: row.id,
            chef_id: row.chef_id,
            name: row.name,
            description: row.description,
            price_cents: row.price_cents,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl DishesRepo for PostgresRepositories {
    async fn list_dishes(&self, filter: &DishQueryFilter) -> Result<Vec<DishRecord>, RepoError> {
        let sql = format!(
            "SELECT {DISH_COLUMNS} FROM dishes \
             WHERE ($1::BIGINT IS NULL OR chef_id = $1) \
               AND ($2::BOOLEAN IS NULL OR active = $2) \
             ORDER BY id"
        );
        let rows = sqlx::query_as::<_, DishRow>(&sql)
            .bind(filter.chef_id)
            .bind(filter.active)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(DishRecord::from).collect())
    }

    async fn find_dish(&self, id: i64) -> Result<Option<DishRecord>, RepoError> {
        let sql = format!("SELECT {DISH_COLUMNS} FROM dishes WHERE id = $1");
        let row = sqlx::query_as::<_, DishRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(DishRecord::from))
    }

    async fn find_dishes(&self, ids: &[i64]) -> Result<Vec<DishRecord>, RepoError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {DISH_COLUMNS} FROM dishes WHERE id = ANY($1)");
        let rows = sqlx::query_as::<_, DishRow>(&sql)
            .bind(ids)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut dishes: Vec<DishRecord> = rows.into_iter().map(DishRecord::from).collect();
        dishes.sort_by_key(|dish| ids.iter().position(|id| *id == dish.id));
        Ok(dishes)
    }
}

#[async_trait]
impl DishesWriteRepo for PostgresRepositories {
    async fn create_dish(&self, params: CreateDishParams) -> Result<DishRecord, RepoError> {
        let CreateDishParams {
            chef_id,
            name,
            description,
            price_cents,
            active,
        } = params;

        let sql = format!(
            "INSERT INTO dishes (chef_id, name, description, price_cents, active) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {DISH_COLUMNS}"
        );
        let row = sqlx::query_as::<_, DishRow>(&sql)
            .bind(chef_id)
            .bind(name)
            .bind(description)
            .bind(price_cents)
            .bind(active)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(DishRecord::from(row))
    }

    async fn update_dish(&self, params: UpdateDishParams) -> Result<DishRecord, RepoError> {
        let UpdateDishParams {
            id,
            chef_id,
            name,
            description,
            price_cents,
            active,
        } = params;

        let sql = format!(
            "UPDATE dishes \
             SET chef_id = $2, name = $3, description = $4, price_cents = $5, \
                 active = $6, updated_at = now() \
             WHERE id = $1 \
             RETURNING {DISH_COLUMNS}"
        );
        let row = sqlx::query_as::<_, DishRow>(&sql)
            .bind(id)
            .bind(chef_id)
            .bind(name)
            .bind(description)
            .bind(price_cents)
            .bind(active)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(DishRecord::from(row))
    }

    async fn delete_dish(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM dishes WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
