use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::{
    catalog::{CatalogSource, FilmSource},
    error::AppResult,
    models::{CatalogRecord, DirectorRecord, SearchPage, SearchQuery, Source},
    upstream::{self, Limiter, array, first, leading_year, text},
};

/// Upstream search results are cut to this many films before details are
/// fetched for each.
pub const SEARCH_LIMIT: usize = 10;

const POSTER_MEDIUM: &str = "landscape43M";
const POSTER_SMALL: &str = "landscape43S";

/// Client for the Danish Film Institute film database.
pub struct DfiClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    limiter: Arc<Limiter>,
}

impl DfiClient {
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        username: String,
        password: String,
        rps: u32,
    ) -> Self {
        if username.trim().is_empty() {
            tracing::warn!("DFI_API_USERNAME not set, calling the DFI API without credentials");
        }
        Self { client, base_url, username, password, limiter: upstream::rate_limiter(rps) }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let req = self.client.get(url);
        if self.username.trim().is_empty() {
            req
        } else {
            req.basic_auth(&self.username, Some(&self.password))
        }
    }
}

#[async_trait]
impl CatalogSource for DfiClient {
    fn source(&self) -> Source {
        Source::Dfi
    }

    async fn search(&self, query: &SearchQuery) -> AppResult<SearchPage> {
        let req = self.get("film").query(&[("Title", query.text.as_str())]);
        let Some(body) = upstream::get_json(&self.limiter, req).await? else {
            return Ok(SearchPage::default());
        };

        let hits = film_hits(&body);
        debug!(title = %query.text, hits = hits.len(), "DFI film search");

        Ok(SearchPage { total: Some(hits.len() as u64), hits, complete: false })
    }

    async fn fetch(&self, external_id: &str) -> AppResult<Option<CatalogRecord>> {
        let path = format!("film/{}", urlencoding::encode(external_id));
        let body = upstream::get_json(&self.limiter, self.get(&path)).await?;
        Ok(body.as_ref().and_then(map_film))
    }
}

#[async_trait]
impl FilmSource for DfiClient {
    async fn search_directors(&self, name: &str) -> AppResult<Vec<DirectorRecord>> {
        let req = self.get("person").query(&[("Name", name)]);
        let Some(body) = upstream::get_json(&self.limiter, req).await? else {
            return Ok(Vec::new());
        };
        let people: Vec<DirectorRecord> = search_entries(&body).iter().filter_map(map_person).collect();
        debug!(name = %name, hits = people.len(), "DFI person search");
        Ok(people)
    }
}

/// The list inside a DFI search response, which arrives as `{"FilmList": [..]}`,
/// `{"PersonList": [..]}`, a bare array, or `{"results"|"data": [..]}`.
pub fn search_entries(body: &Value) -> &[Value] {
    match body {
        Value::Array(items) => items.as_slice(),
        Value::Object(_) => ["FilmList", "PersonList", "results", "data"]
            .into_iter()
            .map(|key| array(body, key))
            .find(|items| !items.is_empty())
            .unwrap_or(&[]),
        _ => &[],
    }
}

/// The first [`SEARCH_LIMIT`] entries of a film search. The cut comes before
/// entries without an `Id` are dropped.
pub fn film_hits(body: &Value) -> Vec<CatalogRecord> {
    search_entries(body).iter().take(SEARCH_LIMIT).filter_map(map_film).collect()
}

/// Flattens a DFI film object. Entries without an `Id` cannot be cached and
/// map to `None`.
pub fn map_film(data: &Value) -> Option<CatalogRecord> {
    let external_id = text(data, "Id")?;

    let metadata = json!({
        "cast": list_or_empty(data, "Cast"),
        "clips": list_or_empty(data, "Clips"),
        "videotek_url": text(data, "VideotekUrl"),
        "description": text(data, "Description"),
    });

    Some(CatalogRecord {
        external_id,
        title: text(data, "Title"),
        year: data.get("ReleaseYear").and_then(leading_year),
        image_url: poster_url(data),
        creator: director_name(data),
        metadata,
    })
}

pub fn map_person(data: &Value) -> Option<DirectorRecord> {
    Some(DirectorRecord {
        external_id: text(data, "Id")?,
        name: text(data, "Name")?,
        bio: text(data, "Bio"),
    })
}

/// Medium landscape crop of the first poster, else the small one.
fn poster_url(data: &Value) -> Option<String> {
    let poster = first(data, "Posters")?;
    let crops = array(poster, "ScaledCropped");

    [POSTER_MEDIUM, POSTER_SMALL].into_iter().find_map(|wanted| {
        crops
            .iter()
            .find(|crop| crop.get("Name").and_then(Value::as_str) == Some(wanted))
            .and_then(|crop| text(crop, "Path"))
    })
}

fn director_name(data: &Value) -> Option<String> {
    array(data, "PersonCredits")
        .iter()
        .find(|credit| {
            credit.get("Type").and_then(Value::as_str) == Some("Instruktion")
                && credit.get("TypeCode").and_then(Value::as_str) == Some("instr")
        })
        .and_then(|credit| text(credit, "Name"))
}

fn list_or_empty(data: &Value, key: &str) -> Value {
    Value::Array(array(data, key).to_vec())
}
