//! Menu handlers

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::MenuListQuery;
use crate::application::repos::MenuQueryFilter;
use crate::infra::http::api::error::{ApiError, catalog_to_api, domain_to_api};
use crate::infra::http::api::models::*;
use crate::infra::http::api::state::ApiState;

pub async fn list_menus(
    State(state): State<ApiState>,
    Query(query): Query<MenuListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = MenuQueryFilter {
        chef_id: query.chef_id,
    };
    let menus = state.menus.list(filter).await.map_err(catalog_to_api)?;
    Ok(Json(ListResponse::<MenuResponse>::from_records(menus)))
}

pub async fn get_menu(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state.menus.get(id).await.map_err(catalog_to_api)?;
    Ok(Json(MenuDetailResponse::from(detail)))
}

pub async fn create_menu(
    State(state): State<ApiState>,
    Json(payload): Json<MenuRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let command = payload.into_command().map_err(domain_to_api)?;
    let menu = state
        .menus
        .create(command)
        .await
        .map_err(catalog_to_api)?;
    Ok((StatusCode::CREATED, Json(MenuResponse::from(menu))))
}

pub async fn update_menu(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(payload): Json<MenuRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let command = payload.into_command().map_err(domain_to_api)?;
    let menu = state
        .menus
        .update(id, command)
        .await
        .map_err(catalog_to_api)?;
    Ok(Json(MenuResponse::from(menu)))
}

pub async fn delete_menu(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.menus.delete(id).await.map_err(catalog_to_api)?;
    Ok(StatusCode::NO_CONTENT)
}
