use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};

use super::{ApiJson, ApiPath};
use crate::{
    AppState,
    auth::CurrentUser,
    error::AppResult,
    models::{
        AddItemRequest, CollectionDetailView, CollectionItemView, CollectionView,
        CreateCollectionRequest, UpdateCollectionRequest, UpdateItemRequest,
    },
};

pub async fn list(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<CollectionView>>> {
    let rows = state.collections.list(user.id).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiJson(req): ApiJson<CreateCollectionRequest>,
) -> AppResult<(StatusCode, Json<CollectionView>)> {
    let created = state.collections.create(user.id, &req).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

pub async fn detail(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<i32>,
) -> AppResult<Json<CollectionDetailView>> {
    Ok(Json(state.collections.detail(user.id, id).await?))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<i32>,
    ApiJson(req): ApiJson<UpdateCollectionRequest>,
) -> AppResult<Json<CollectionView>> {
    let updated = state.collections.update(user.id, id, &req).await?;
    Ok(Json(updated.into()))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<i32>,
) -> AppResult<StatusCode> {
    state.collections.delete(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_item(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<i32>,
    ApiJson(req): ApiJson<AddItemRequest>,
) -> AppResult<(StatusCode, Json<CollectionItemView>)> {
    let entry = state.collections.add_item(user.id, id, &req).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn update_item(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath((id, item_id)): ApiPath<(i32, i32)>,
    ApiJson(req): ApiJson<UpdateItemRequest>,
) -> AppResult<Json<CollectionItemView>> {
    let entry = state.collections.update_item(user.id, id, item_id, req.note).await?;
    Ok(Json(entry))
}

pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath((id, item_id)): ApiPath<(i32, i32)>,
) -> AppResult<StatusCode> {
    state.collections.remove_item(user.id, id, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
