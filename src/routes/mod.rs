pub mod auth;
pub mod catalog;
pub mod collections;

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts},
};
use serde_json::{Value, json};

use crate::error::AppError;

/// `Json` whose rejections are reported as `{"detail"}` 400s.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

pub async fn index() -> Json<Value> {
    Json(json!({
        "name": "samling",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Film and art search with personal collections",
        "catalogs": ["dfi", "smk"],
    }))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
