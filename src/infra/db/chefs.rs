use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{ChefsRepo, ChefsWriteRepo, CreateChefParams, RepoError, UpdateChefParams},
    domain::entities::ChefRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ChefRow {
    id: i64,
    name: String,
    email: String,
    bio: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ChefRow> for ChefRecord {
    fn from(row: ChefRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            bio: row.bio,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl ChefsRepo for PostgresRepositories {
    async fn list_chefs(&self) -> Result<Vec<ChefRecord>, RepoError> {
        let rows = sqlx::query_as::<_, ChefRow>(
            r#"
            SELECT id, name, email, bio, created_at, updated_at
            FROM chefs
            ORDER BY name, id
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ChefRecord::from).collect())
    }

    async fn find_chef(&self, id: i64) -> Result<Option<ChefRecord>, RepoError> {
        let row = sqlx::query_as::<_, ChefRow>(
            r#"
            SELECT id, name, email, bio, created_at, updated_at
            FROM chefs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ChefRecord::from))
    }
}

#[async_trait]
impl ChefsWriteRepo for PostgresRepositories {
    async fn create_chef(&self, params: CreateChefParams) -> Result<ChefRecord, RepoError> {
        let CreateChefParams { name, email, bio } = params;

        let row = sqlx::query_as::<_, ChefRow>(
            r#"
            INSERT INTO chefs (name, email, bio)
            VALUES ($1, $2, $3)
            RETURNING id, name, email, bio, created_at, updated_at
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(bio)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(ChefRecord::from(row))
    }

    async fn update_chef(&self, params: UpdateChefParams) -> Result<ChefRecord, RepoError> {
        let UpdateChefParams {
            id,
            name,
            email,
            bio,
        } = params;

        let row = sqlx::query_as::<_, ChefRow>(
            r#"
            UPDATE chefs
            SET name = $2,
                email = $3,
                bio = $4,
                updated_at = now()
            WHERE id = $1
            RETURNING id, name, email, bio, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(bio)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(ChefRecord::from(row))
    }

    async fn delete_chef(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM chefs WHERE id = $1")
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
