use std::net::SocketAddr;

use anyhow::Context;

const DEV_SECRET_KEY: &str = "samling-development-secret";

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
    pub secret_key: String,
    pub token_ttl_minutes: i64,
    pub dfi_base_url: String,
    pub dfi_username: String,
    pub dfi_password: String,
    pub smk_base_url: String,
    pub film_cache_ttl_days: i64,
    pub director_cache_ttl_days: i64,
    pub art_cache_ttl_days: i64,
    pub upstream_rps: u32,
    pub upstream_timeout_secs: u64,
    pub max_concurrent: usize,
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = get("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = get("PORT").unwrap_or_else(|| "8000".to_string()).parse().context("PORT")?;

        let database_url =
            get("DATABASE_URL").unwrap_or_else(|| "sqlite://samling.db?mode=rwc".to_string());

        let secret_key = match get("SECRET_KEY").filter(|s| !s.trim().is_empty()) {
            Some(key) => key,
            None => {
                tracing::warn!("SECRET_KEY not set, using the development signing key");
                DEV_SECRET_KEY.to_string()
            },
        };

        let cors_origins = get("CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            addr: format!("{host}:{port}").parse().context("HOST/PORT")?,
            database_url,
            secret_key,
            token_ttl_minutes: parse_or(&get, "TOKEN_TTL_MINUTES", 30),
            dfi_base_url: get("DFI_API_BASE_URL")
                .unwrap_or_else(|| "https://api.dfi.dk/v1".to_string()),
            dfi_username: get("DFI_API_USERNAME").unwrap_or_default(),
            dfi_password: get("DFI_API_PASSWORD").unwrap_or_default(),
            smk_base_url: get("SMK_API_BASE_URL")
                .unwrap_or_else(|| "https://api.smk.dk/api/v1".to_string()),
            film_cache_ttl_days: parse_or(&get, "FILM_CACHE_TTL_DAYS", 7),
            director_cache_ttl_days: parse_or(&get, "DIRECTOR_CACHE_TTL_DAYS", 30),
            art_cache_ttl_days: parse_or(&get, "ART_CACHE_TTL_DAYS", 30),
            upstream_rps: parse_or(&get, "UPSTREAM_RPS", 4),
            upstream_timeout_secs: parse_or(&get, "UPSTREAM_TIMEOUT_SECS", 30),
            max_concurrent: parse_or(&get, "MAX_CONCURRENT_REQUESTS", 5),
            cors_origins,
        })
    }
}

fn parse_or<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    get(key).and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}
