pub mod auth;
pub mod cache;
pub mod catalog;
pub mod collections;
pub mod config;
pub mod db;
pub mod dfi;
pub mod entities;
pub mod error;
pub mod mcp;
pub mod models;
pub mod routes;
pub mod smk;
pub mod upstream;

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post, put},
};
use sea_orm::DatabaseConnection;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    cache::CacheManager,
    catalog::{CatalogSource, FilmSource},
    collections::CollectionStore,
    config::Config,
};

pub struct AppState {
    pub config: Arc<Config>,
    pub db: DatabaseConnection,
    pub cache: CacheManager,
    pub collections: CollectionStore,
    pub films: Arc<dyn FilmSource>,
    pub art: Arc<dyn CatalogSource>,
}

pub fn app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/", get(routes::index))
        .route("/api/health", get(routes::health))
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/me", get(routes::auth::me))
        .route("/api/movies/search", get(routes::catalog::search_movies))
        .route("/api/movies/{id}", get(routes::catalog::get_movie))
        .route("/api/directors/search", get(routes::catalog::search_directors))
        .route("/api/directors/{id}/movies", get(routes::catalog::director_movies))
        .route("/api/artworks/search", get(routes::catalog::search_artworks))
        .route("/api/artworks/{object_number}", get(routes::catalog::get_artwork))
        .route(
            "/api/collections",
            get(routes::collections::list).post(routes::collections::create),
        )
        .route(
            "/api/collections/{id}",
            get(routes::collections::detail)
                .put(routes::collections::update)
                .delete(routes::collections::remove),
        )
        .route("/api/collections/{id}/items", post(routes::collections::add_item))
        .route(
            "/api/collections/{id}/items/{item_id}",
            put(routes::collections::update_item).delete(routes::collections::remove_item),
        )
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Any origin when the list is empty.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.is_empty() {
        return base.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            },
        })
        .collect();
    base.allow_origin(AllowOrigin::list(allowed))
}
