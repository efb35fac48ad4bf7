use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use time::OffsetDateTime;

use crate::{
    application::repos::{
        CreateMenuParams, MenuQueryFilter, MenusRepo, MenusWriteRepo, RepoError, UpdateMenuParams,
    },
    domain::entities::MenuRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

/// Menus with their dish ids aggregated in serving order.
const MENU_SELECT: &str = r#"
    SELECT m.id, m.chef_id, m.name, m.description, m.price_per_person_cents,
           m.created_at, m.updated_at,
           COALESCE(
               array_agg(md.dish_id ORDER BY md.position)
                   FILTER (WHERE md.dish_id IS NOT NULL),
               '{}'
           ) AS dish_ids
    FROM menus m
    LEFT JOIN menu_dishes md ON md.menu_id = m.id
"#;

#[derive(sqlx::FromRow)]
struct MenuRow {
    id: i64,
    chef_id: i64,
    name: String,
    description: Option<String>,
    price_per_person_cents: i64,
    dish_ids: Vec<i64>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<MenuRow> for MenuRecord {
    fn from(row: MenuRow) -> Self {
        Self {
            id: row.id,
            chef_id: row.chef_id,
            name: row.name,
            description: row.description,
            price_per_person_cents: row.price_per_person_cents,
            dish_ids: row.dish_ids,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl PostgresRepositories {
    async fn load_menu(
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
    ) -> Result<MenuRecord, RepoError> {
        let sql = format!("{MENU_SELECT} WHERE m.id = $1 GROUP BY m.id");
        let row = sqlx::query_as::<_, MenuRow>(&sql)
            .bind(id)
            .fetch_one(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(MenuRecord::from(row))
    }

    async fn replace_menu_dishes(
        tx: &mut Transaction<'_, Postgres>,
        menu_id: i64,
        dish_ids: &[i64],
    ) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM menu_dishes WHERE menu_id = $1")
            .bind(menu_id)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO menu_dishes (menu_id, dish_id, position)
            SELECT $1, entry.dish_id, (entry.ordinal - 1)::INTEGER
            FROM UNNEST($2::BIGINT[]) WITH ORDINALITY AS entry(dish_id, ordinal)
            "#,
        )
        .bind(menu_id)
        .bind(dish_ids)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}

#[async_trait]
impl MenusRepo for PostgresRepositories {
    async fn list_menus(&self, filter: &MenuQueryFilter) -> Result<Vec<MenuRecord>, RepoError> {
        let sql = format!(
            "{MENU_SELECT} WHERE ($1::BIGINT IS NULL OR m.chef_id = $1) GROUP BY m.id ORDER BY m.id"
        );
        let rows = sqlx::query_as::<_, MenuRow>(&sql)
            .bind(filter.chef_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(MenuRecord::from).collect())
    }

    async fn find_menu(&self, id: i64) -> Result<Option<MenuRecord>, RepoError> {
        let sql = format!("{MENU_SELECT} WHERE m.id = $1 GROUP BY m.id");
        let row = sqlx::query_as::<_, MenuRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(MenuRecord::from))
    }
}

#[async_trait]
impl MenusWriteRepo for PostgresRepositories {
    async fn create_menu(&self, params: CreateMenuParams) -> Result<MenuRecord, RepoError> {
        let CreateMenuParams {
            chef_id,
            name,
            description,
            price_per_person_cents,
            dish_ids,
        } = params;

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO menus (chef_id, name, description, price_per_person_cents)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(chef_id)
        .bind(name)
        .bind(description)
        .bind(price_per_person_cents)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Self::replace_menu_dishes(&mut tx, id, &dish_ids).await?;
        let menu = Self::load_menu(&mut tx, id).await?;
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(menu)
    }

    async fn update_menu(&self, params: UpdateMenuParams) -> Result<MenuRecord, RepoError> {
        let UpdateMenuParams {
            id,
            name,
            description,
            price_per_person_cents,
            dish_ids,
        } = params;

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query(
            r#"
            UPDATE menus
            SET name = $2,
                description = $3,
                price_per_person_cents = $4,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .bind(price_per_person_cents)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        Self::replace_menu_dishes(&mut tx, id, &dish_ids).await?;
        let menu = Self::load_menu(&mut tx, id).await?;
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(menu)
    }

    async fn delete_menu(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM menus WHERE id = $1")
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
