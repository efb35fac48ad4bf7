//! Chef handlers

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::ActiveQuery;
use crate::infra::http::api::error::{ApiError, catalog_to_api};
use crate::infra::http::api::models::*;
use crate::infra::http::api::state::ApiState;

pub async fn list_chefs(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let chefs = state.chefs.list().await.map_err(catalog_to_api)?;
    Ok(Json(ListResponse::<ChefResponse>::from_records(chefs)))
}

pub async fn get_chef(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let chef = state.chefs.get(id).await.map_err(catalog_to_api)?;
    Ok(Json(ChefResponse::from(chef)))
}

pub async fn create_chef(
    State(state): State<ApiState>,
    Json(payload): Json<ChefRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chef = state
        .chefs
        .create(payload.into())
        .await
        .map_err(catalog_to_api)?;
    Ok((StatusCode::CREATED, Json(ChefResponse::from(chef))))
}

pub async fn update_chef(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(payload): Json<ChefRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chef = state
        .chefs
        .update(id, payload.into())
        .await
        .map_err(catalog_to_api)?;
    Ok(Json(ChefResponse::from(chef)))
}

pub async fn delete_chef(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.chefs.delete(id).await.map_err(catalog_to_api)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_chef_dishes(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(query): Query<ActiveQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let dishes = state
        .dishes
        .list_for_chef(id, query.active)
        .await
        .map_err(catalog_to_api)?;
    Ok(Json(ListResponse::<DishResponse>::from_records(dishes)))
}

pub async fn list_chef_menus(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let menus = state
        .menus
        .list_for_chef(id)
        .await
        .map_err(catalog_to_api)?;
    Ok(Json(ListResponse::<MenuResponse>::from_records(menus)))
}
