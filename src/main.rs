use std::sync::Arc;

use samling::{
    AppState,
    cache::{CacheManager, CacheTtls},
    collections::CollectionStore,
    config::Config,
    db,
    dfi::DfiClient,
    smk::SmkClient,
    upstream,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,samling=debug,sqlx=warn")),
        )
        .init();

    let config = Arc::new(Config::from_env()?);

    let http = upstream::http_client(config.upstream_timeout_secs)?;

    let db = db::connect_and_migrate(&config.database_url).await?;
    let cache = CacheManager::new(
        db.clone(),
        CacheTtls {
            film_days: config.film_cache_ttl_days,
            director_days: config.director_cache_ttl_days,
            art_days: config.art_cache_ttl_days,
        },
    );

    let films = DfiClient::new(
        http.clone(),
        config.dfi_base_url.clone(),
        config.dfi_username.clone(),
        config.dfi_password.clone(),
        config.upstream_rps,
    );
    let art = SmkClient::new(http, config.smk_base_url.clone(), config.upstream_rps).images_only();

    let state = Arc::new(AppState {
        config: config.clone(),
        collections: CollectionStore::new(db.clone()),
        db,
        cache,
        films: Arc::new(films),
        art: Arc::new(art),
    });

    let app = samling::app(state);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
