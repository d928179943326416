use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};

use super::ApiJson;
use crate::{
    AppState,
    auth::{self, CurrentUser},
    error::AppResult,
    models::{LoginRequest, LoginResponse, RegisterRequest, UserView},
};

pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<UserView>)> {
    let user = auth::register_user(&state.db, &req).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let user = auth::authenticate(&state.db, &req.username, &req.password).await?;
    let access_token =
        auth::issue_token(&user.username, &state.config.secret_key, state.config.token_ttl_minutes)?;

    Ok(Json(LoginResponse { access_token, token_type: "bearer", user: user.into() }))
}

pub async fn me(CurrentUser(user): CurrentUser) -> Json<UserView> {
    Json(user.into())
}
