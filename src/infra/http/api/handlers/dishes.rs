//! Dish handlers

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::DishListQuery;
use crate::application::repos::DishQueryFilter;
use crate::infra::http::api::error::{ApiError, catalog_to_api, domain_to_api};
use crate::infra::http::api::models::*;
use crate::infra::http::api::state::ApiState;

pub async fn list_dishes(
    State(state): State<ApiState>,
    Query(query): Query<DishListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = DishQueryFilter {
        chef_id: query.chef_id,
        active: query.active,
    };
    let dishes = state.dishes.list(filter).await.map_err(catalog_to_api)?;
    Ok(Json(ListResponse::<DishResponse>::from_records(dishes)))
}

pub async fn get_dish(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let dish = state.dishes.get(id).await.map_err(catalog_to_api)?;
    Ok(Json(DishResponse::from(dish)))
}

pub async fn create_dish(
    State(state): State<ApiState>,
    Json(payload): Json<DishRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let command = payload.into_command().map_err(domain_to_api)?;
    let dish = state
        .dishes
        .create(command)
        .await
        .map_err(catalog_to_api)?;
    Ok((StatusCode::CREATED, Json(DishResponse::from(dish))))
}

pub async fn update_dish(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(payload): Json<DishRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let command = payload.into_command().map_err(domain_to_api)?;
    let dish = state
        .dishes
        .update(id, command)
        .await
        .map_err(catalog_to_api)?;
    Ok(Json(DishResponse::from(dish)))
}

pub async fn delete_dish(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.dishes.delete(id).await.map_err(catalog_to_api)?;
    Ok(StatusCode::NO_CONTENT)
}
