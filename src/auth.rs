//! Password hashing, bearer tokens and the `CurrentUser` extractor.

use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    AppState,
    entities::user,
    error::{AppError, AppResult, is_unique_violation},
    models::{RegisterRequest, now_sec},
};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("hashing password: {e}"))?;
    Ok(hash.to_string())
}

/// False for a wrong password and for a hash that cannot be parsed.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

pub fn issue_token(username: &str, secret: &str, ttl_minutes: i64) -> AppResult<String> {
    let exp = now_sec().saturating_add(ttl_minutes.saturating_mul(60));
    let claims = Claims { sub: username.to_string(), exp };
    let key = EncodingKey::from_secret(secret.as_bytes());
    Ok(jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &key)?)
}

pub fn decode_token(token: &str, secret: &str) -> AppResult<Claims> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    jsonwebtoken::decode::<Claims>(token, &key, &Validation::new(Algorithm::HS256))
        .map(|data| data.claims)
        .map_err(|e| {
            debug!(error = %e, "rejected bearer token");
            AppError::unauthorized("Could not validate credentials")
        })
}

fn validate_registration(req: &RegisterRequest) -> AppResult<()> {
    if req.username.trim().is_empty() {
        return Err(AppError::validation("username must not be empty"));
    }
    if req.password.is_empty() {
        return Err(AppError::validation("password must not be empty"));
    }
    let email = req.email.trim();
    let valid_email = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        },
        None => false,
    };
    if !valid_email {
        return Err(AppError::validation("email address is not valid"));
    }
    Ok(())
}

pub async fn register_user(db: &DatabaseConnection, req: &RegisterRequest) -> AppResult<user::Model> {
    validate_registration(req)?;
    let username = req.username.trim();
    let email = req.email.trim().to_lowercase();

    let existing = user::Entity::find()
        .filter(
            Condition::any()
                .add(user::Column::Username.eq(username))
                .add(user::Column::Email.eq(email.as_str())),
        )
        .one(db)
        .await?;
    if let Some(existing) = existing {
        let field = if existing.username == username { "Username" } else { "Email" };
        return Err(AppError::conflict(format!("{field} already registered")));
    }

    let model = user::ActiveModel {
        username: Set(username.to_string()),
        email: Set(email),
        password_hash: Set(hash_off_runtime(req.password.clone()).await?),
        created_at: Set(now_sec()),
        ..Default::default()
    };

    match model.insert(db).await {
        Ok(created) => {
            info!(user_id = created.id, username = %created.username, "registered user");
            Ok(created)
        },
        Err(err) if is_unique_violation(&err) => {
            Err(AppError::conflict("Username or email already registered"))
        },
        Err(err) => Err(err.into()),
    }
}

pub async fn authenticate(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
) -> AppResult<user::Model> {
    let found = user::Entity::find()
        .filter(user::Column::Username.eq(username.trim()))
        .one(db)
        .await?;

    let Some(user) = found else {
        return Err(AppError::unauthorized("Incorrect username or password"));
    };

    let password = password.to_string();
    let hash = user.password_hash.clone();
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(anyhow::Error::new)?;

    if valid {
        Ok(user)
    } else {
        Err(AppError::unauthorized("Incorrect username or password"))
    }
}

/// Argon2 is CPU-bound; run it on the blocking pool.
async fn hash_off_runtime(password: String) -> AppResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(anyhow::Error::new)?
}

/// The user named by a valid `Authorization: Bearer` token.
pub struct CurrentUser(pub user::Model);

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> AppResult<Self> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::unauthorized("Not authenticated"))?;

        let claims = decode_token(token, &state.config.secret_key)?;

        let user = user::Entity::find()
            .filter(user::Column::Username.eq(claims.sub.as_str()))
            .one(&state.db)
            .await?
            .ok_or_else(|| AppError::unauthorized("Could not validate credentials"))?;

        Ok(CurrentUser(user))
    }
}
