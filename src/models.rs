use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::{catalog_item, collection, collection_item, director, user};

/// Which upstream catalog a cached row came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Dfi,
    Smk,
}

impl Source {
    pub fn as_code(self) -> &'static str {
        match self {
            Source::Dfi => "dfi",
            Source::Smk => "smk",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "dfi" => Some(Source::Dfi),
            "smk" => Some(Source::Smk),
            _ => None,
        }
    }
}

/// Upstream data flattened into the shape stored in `catalog_items`.
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogRecord {
    pub external_id: String,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub image_url: Option<String>,
    pub creator: Option<String>,
    pub metadata: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DirectorRecord {
    pub external_id: String,
    pub name: String,
    pub bio: Option<String>,
}

#[derive(Clone, Debug)]
pub struct SearchQuery {
    pub text: String,
    pub offset: u32,
    pub limit: u32,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), offset: 0, limit: 20 }
    }
}

/// One page of upstream search hits. When `complete` is false the hits are
/// summaries and need a detail fetch before they are cached.
#[derive(Clone, Debug, Default)]
pub struct SearchPage {
    pub hits: Vec<CatalogRecord>,
    pub total: Option<u64>,
    pub complete: bool,
}

pub fn timestamp(secs: i64) -> Timestamp {
    Timestamp::from_second(secs).unwrap_or(Timestamp::UNIX_EPOCH)
}

pub fn now_sec() -> i64 {
    Timestamp::now().as_second()
}

// ---- response bodies ----

#[derive(Clone, Debug, Serialize)]
pub struct UserView {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub created_at: Timestamp,
}

impl From<user::Model> for UserView {
    fn from(m: user::Model) -> Self {
        Self { id: m.id, username: m.username, email: m.email, created_at: timestamp(m.created_at) }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CatalogItemView {
    pub id: i32,
    pub source: String,
    pub external_id: String,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub image_url: Option<String>,
    pub creator: Option<String>,
    pub metadata: Value,
    pub cached_at: Timestamp,
}

impl From<catalog_item::Model> for CatalogItemView {
    fn from(m: catalog_item::Model) -> Self {
        let mut metadata = m.metadata;
        // raw upstream payloads stay in the database
        if let Some(obj) = metadata.as_object_mut() {
            obj.remove("raw");
        }
        Self {
            id: m.id,
            source: m.source,
            external_id: m.external_id,
            title: m.title,
            year: m.year,
            image_url: m.image_url,
            creator: m.creator,
            metadata,
            cached_at: timestamp(m.cached_at),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct DirectorView {
    pub id: i32,
    pub external_id: String,
    pub name: String,
    pub bio: Option<String>,
    pub cached_at: Timestamp,
}

impl From<director::Model> for DirectorView {
    fn from(m: director::Model) -> Self {
        Self {
            id: m.id,
            external_id: m.external_id,
            name: m.name,
            bio: m.bio,
            cached_at: timestamp(m.cached_at),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CollectionView {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<collection::Model> for CollectionView {
    fn from(m: collection::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            description: m.description,
            created_at: timestamp(m.created_at),
            updated_at: timestamp(m.updated_at),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CollectionItemView {
    pub id: i32,
    pub item: CatalogItemView,
    pub note: Option<String>,
    pub added_at: Timestamp,
}

impl From<(collection_item::Model, catalog_item::Model)> for CollectionItemView {
    fn from((entry, item): (collection_item::Model, catalog_item::Model)) -> Self {
        Self {
            id: entry.id,
            item: item.into(),
            note: entry.note,
            added_at: timestamp(entry.added_at),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CollectionDetailView {
    #[serde(flatten)]
    pub collection: CollectionView,
    pub items: Vec<CollectionItemView>,
}

#[derive(Debug, Serialize)]
pub struct MovieSearchResponse {
    pub movies: Vec<CatalogItemView>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ArtworkSearchResponse {
    pub artworks: Vec<CatalogItemView>,
    pub total: u64,
    pub offset: u32,
    pub limit: u32,
}

#[derive(Debug, Serialize)]
pub struct DirectorSearchResponse {
    pub directors: Vec<DirectorView>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct DirectorMoviesResponse {
    pub director: DirectorView,
    pub movies: Vec<CatalogItemView>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub user: UserView,
}

// ---- request bodies ----

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCollectionRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateCollectionRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub item_id: i32,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub note: Option<String>,
}
