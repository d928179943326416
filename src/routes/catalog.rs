use std::sync::Arc;

use axum::{Json, extract::State};
use serde::Deserialize;

use super::{ApiPath, ApiQuery};
use crate::{
    AppState, catalog,
    error::{AppError, AppResult},
    models::{
        ArtworkSearchResponse, CatalogItemView, DirectorMoviesResponse, DirectorSearchResponse,
        MovieSearchResponse, SearchQuery, Source,
    },
};

const MAX_ARTWORK_LIMIT: u32 = 100;

fn required(value: Option<String>, name: &str) -> AppResult<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::validation(format!("{name} must not be empty"))),
    }
}

#[derive(Debug, Deserialize)]
pub struct MovieSearchParams {
    title: Option<String>,
    director: Option<String>,
}

pub async fn search_movies(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<MovieSearchParams>,
) -> AppResult<Json<MovieSearchResponse>> {
    let title = required(params.title, "title")?;

    let outcome = catalog::search(
        &state.cache,
        &*state.films,
        &SearchQuery::new(title),
        state.config.max_concurrent,
    )
    .await?;

    let director = params.director.map(|d| d.trim().to_lowercase()).filter(|d| !d.is_empty());
    let movies: Vec<CatalogItemView> = outcome
        .items
        .into_iter()
        .filter(|m| match &director {
            Some(wanted) => {
                m.creator.as_deref().is_some_and(|c| c.to_lowercase().contains(wanted.as_str()))
            },
            None => true,
        })
        .map(Into::into)
        .collect();

    Ok(Json(MovieSearchResponse { total: movies.len(), movies }))
}

/// A cached film by local id, refreshed from DFI when stale.
pub async fn get_movie(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i32>,
) -> AppResult<Json<CatalogItemView>> {
    let cached = state
        .cache
        .get_item_by_id(id)
        .await?
        .filter(|m| m.source == Source::Dfi.as_code())
        .ok_or_else(|| AppError::not_found("Movie not found"))?;

    let movie = catalog::resolve(&state.cache, &*state.films, &cached.external_id)
        .await?
        .unwrap_or(cached);

    Ok(Json(movie.into()))
}

#[derive(Debug, Deserialize)]
pub struct DirectorSearchParams {
    name: Option<String>,
}

pub async fn search_directors(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<DirectorSearchParams>,
) -> AppResult<Json<DirectorSearchResponse>> {
    let name = required(params.name, "name")?;
    let found = catalog::search_directors(&state.cache, &*state.films, &name).await?;

    Ok(Json(DirectorSearchResponse {
        total: found.len(),
        directors: found.into_iter().map(Into::into).collect(),
    }))
}

/// Cached films credited to the director.
pub async fn director_movies(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i32>,
) -> AppResult<Json<DirectorMoviesResponse>> {
    let director = state
        .cache
        .get_director_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("Director not found"))?;

    let movies = state.cache.items_by_creator(Source::Dfi, &director.name).await?;

    Ok(Json(DirectorMoviesResponse {
        director: director.into(),
        movies: movies.into_iter().map(Into::into).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ArtworkSearchParams {
    q: Option<String>,
    offset: Option<u32>,
    limit: Option<u32>,
}

pub async fn search_artworks(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<ArtworkSearchParams>,
) -> AppResult<Json<ArtworkSearchResponse>> {
    let q = required(params.q, "q")?;
    let offset = params.offset.unwrap_or(0);
    let limit = params.limit.unwrap_or(20);
    if !(1..=MAX_ARTWORK_LIMIT).contains(&limit) {
        return Err(AppError::validation(format!("limit must be between 1 and {MAX_ARTWORK_LIMIT}")));
    }

    let query = SearchQuery { text: q, offset, limit };
    let outcome =
        catalog::search(&state.cache, &*state.art, &query, state.config.max_concurrent).await?;

    Ok(Json(ArtworkSearchResponse {
        artworks: outcome.items.into_iter().map(Into::into).collect(),
        total: outcome.total,
        offset,
        limit,
    }))
}

pub async fn get_artwork(
    State(state): State<Arc<AppState>>,
    ApiPath(object_number): ApiPath<String>,
) -> AppResult<Json<CatalogItemView>> {
    let artwork = catalog::resolve(&state.cache, &*state.art, object_number.trim())
        .await?
        .ok_or_else(|| AppError::not_found("Artwork not found"))?;
    Ok(Json(artwork.into()))
}
