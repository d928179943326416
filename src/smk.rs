use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::{
    catalog::CatalogSource,
    error::AppResult,
    models::{CatalogRecord, SearchPage, SearchQuery, Source},
    upstream::{self, Limiter, array, first, flag, leading_year, text},
};

const IMAGE_FILTER: &str = "[has_image:true]";

/// Client for the Statens Museum for Kunst open API.
pub struct SmkClient {
    client: reqwest::Client,
    base_url: String,
    limiter: Arc<Limiter>,
    require_image: bool,
}

impl SmkClient {
    pub fn new(client: reqwest::Client, base_url: String, rps: u32) -> Self {
        Self { client, base_url, limiter: upstream::rate_limiter(rps), require_image: false }
    }

    /// Restrict searches to artworks that have an image.
    pub fn images_only(mut self) -> Self {
        self.require_image = true;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl CatalogSource for SmkClient {
    fn source(&self) -> Source {
        Source::Smk
    }

    async fn search(&self, query: &SearchQuery) -> AppResult<SearchPage> {
        let mut params = vec![
            ("keys", query.text.clone()),
            ("offset", query.offset.to_string()),
            ("rows", query.limit.to_string()),
        ];
        if self.require_image {
            params.push(("filters", IMAGE_FILTER.to_string()));
        }

        let req = self.client.get(self.url("art/search/")).query(&params);
        let Some(body) = upstream::get_json(&self.limiter, req).await? else {
            return Ok(SearchPage { complete: true, ..Default::default() });
        };

        let hits: Vec<CatalogRecord> = array(&body, "items").iter().filter_map(map_artwork).collect();
        let total = body.get("found").and_then(Value::as_u64);
        debug!(keys = %query.text, hits = hits.len(), ?total, "SMK art search");

        Ok(SearchPage { hits, total, complete: true })
    }

    async fn fetch(&self, object_number: &str) -> AppResult<Option<CatalogRecord>> {
        let req = self.client.get(self.url("art/")).query(&[("object_number", object_number)]);
        let Some(body) = upstream::get_json(&self.limiter, req).await? else {
            return Ok(None);
        };
        Ok(detail_item(&body).and_then(map_artwork))
    }
}

/// Unwraps `{"items": [..]}`; any other object is taken as the item itself.
pub fn detail_item(body: &Value) -> Option<&Value> {
    match body.get("items") {
        Some(Value::Array(items)) => items.first(),
        Some(_) => None,
        None => body.is_object().then_some(body),
    }
}

pub fn map_artwork(data: &Value) -> Option<CatalogRecord> {
    let external_id = text(data, "object_number")?;

    let period = production_date(data).and_then(|d| text(d, "period"));
    let metadata = json!({
        "image_iiif_id": text(data, "image_iiif_id"),
        "public_domain": flag(data, "public_domain"),
        "object_names": object_names(data),
        "has_image": flag(data, "has_image"),
        "high_res_image_url": text(data, "image_native")
            .or_else(|| data.get("image_url").and_then(|u| text(u, "full"))),
        "description": description(data),
        "production_period": period,
        "raw": data.clone(),
    });

    Some(CatalogRecord {
        external_id,
        title: title(data),
        year: year(data),
        image_url: text(data, "image_thumbnail")
            .or_else(|| data.get("image_url").and_then(|u| text(u, "thumbnail"))),
        creator: creator(data),
        metadata,
    })
}

fn title(data: &Value) -> Option<String> {
    first(data, "titles").and_then(|t| text(t, "title")).or_else(|| text(data, "title"))
}

fn production_date(data: &Value) -> Option<&Value> {
    first(data, "production_date").or_else(|| first(data, "production_dates"))
}

fn year(data: &Value) -> Option<i32> {
    let date = production_date(data)?;
    ["year", "period"].into_iter().filter_map(|key| date.get(key)).find_map(leading_year)
}

fn creator(data: &Value) -> Option<String> {
    first(data, "production")
        .and_then(|p| text(p, "creator"))
        .or_else(|| first(data, "creators").and_then(|c| text(c, "name")))
        .or_else(|| first(data, "creator").and_then(|c| text(c, "name")))
        .or_else(|| match array(data, "artist").first() {
            Some(Value::String(name)) if !name.trim().is_empty() => Some(name.trim().to_string()),
            _ => None,
        })
}

fn object_names(data: &Value) -> Vec<String> {
    array(data, "object_names")
        .iter()
        .filter_map(|entry| match entry {
            Value::String(name) => Some(name.clone()),
            obj => text(obj, "name"),
        })
        .collect()
}

fn description(data: &Value) -> Option<String> {
    text(data, "description").or_else(|| match array(data, "content_description").first() {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artwork() -> Value {
        json!({
            "object_number": "KMS1",
            "titles": [{ "title": "Udsigt fra Dosseringen" }],
            "production_date": [{ "period": "1838-1840" }],
            "production": [{ "creator": "Christen Købke" }],
            "image_thumbnail": "https://iip.smk.dk/thumb.jpg",
            "image_native": "https://iip.smk.dk/native.tif",
            "image_iiif_id": "https://iip.smk.dk/iiif/jp2/KMS1",
            "public_domain": true,
            "has_image": true,
            "object_names": [{ "name": "Maleri" }, "Kunst"]
        })
    }

    #[test]
    fn maps_search_item() {
        let rec = map_artwork(&artwork()).unwrap();
        assert_eq!(rec.external_id, "KMS1");
        assert_eq!(rec.title.as_deref(), Some("Udsigt fra Dosseringen"));
        assert_eq!(rec.year, Some(1838));
        assert_eq!(rec.creator.as_deref(), Some("Christen Købke"));
        assert_eq!(rec.image_url.as_deref(), Some("https://iip.smk.dk/thumb.jpg"));
        assert_eq!(rec.metadata["high_res_image_url"], "https://iip.smk.dk/native.tif");
        assert_eq!(rec.metadata["object_names"], json!(["Maleri", "Kunst"]));
        assert_eq!(rec.metadata["public_domain"], true);
        assert_eq!(rec.metadata["production_period"], "1838-1840");
        assert_eq!(rec.metadata["raw"]["object_number"], "KMS1");
    }

    #[test]
    fn maps_detail_shaped_item() {
        let data = json!({
            "object_number": "KMS3716",
            "title": "Amager",
            "production_dates": { "year": 1837 },
            "creator": [{ "name": "P.C. Skovgaard" }],
            "image_url": { "thumbnail": "/t.jpg", "full": "/f.jpg" },
            "description": "Landskab"
        });
        let rec = map_artwork(&data).unwrap();
        assert_eq!(rec.title.as_deref(), Some("Amager"));
        assert_eq!(rec.year, Some(1837));
        assert_eq!(rec.creator.as_deref(), Some("P.C. Skovgaard"));
        assert_eq!(rec.image_url.as_deref(), Some("/t.jpg"));
        assert_eq!(rec.metadata["high_res_image_url"], "/f.jpg");
        assert_eq!(rec.metadata["description"], "Landskab");
    }

    #[test]
    fn creator_fallback_chain() {
        let creators = json!({ "object_number": "A", "creators": [{ "name": "From creators" }] });
        let artist = json!({ "object_number": "B", "artist": ["From artist"] });
        let empty_production =
            json!({ "object_number": "C", "production": [{}], "artist": ["Fallback"] });

        assert_eq!(map_artwork(&creators).unwrap().creator.as_deref(), Some("From creators"));
        assert_eq!(map_artwork(&artist).unwrap().creator.as_deref(), Some("From artist"));
        assert_eq!(map_artwork(&empty_production).unwrap().creator.as_deref(), Some("Fallback"));
    }

    #[test]
    fn ill_typed_fields_are_ignored() {
        let data = json!({
            "object_number": "X1",
            "titles": "not a list",
            "production_date": [{ "period": "ca. 1700" }],
            "artist": [42],
            "object_names": null,
            "has_image": "yes"
        });
        let rec = map_artwork(&data).unwrap();
        assert_eq!(rec.title, None);
        assert_eq!(rec.year, None);
        assert_eq!(rec.creator, None);
        assert_eq!(rec.metadata["object_names"], json!([]));
        assert_eq!(rec.metadata["has_image"], false);
    }

    #[test]
    fn item_without_object_number_is_skipped() {
        assert!(map_artwork(&json!({ "title": "Anonymous" })).is_none());
    }

    #[test]
    fn detail_envelopes() {
        let wrapped = json!({ "items": [{ "object_number": "KMS1" }, { "object_number": "KMS2" }] });
        let bare = json!({ "object_number": "KMS1" });
        let empty = json!({ "items": [] });

        assert_eq!(detail_item(&wrapped).unwrap()["object_number"], "KMS1");
        assert_eq!(detail_item(&bare), Some(&bare));
        assert!(detail_item(&empty).is_none());
        assert!(detail_item(&json!([])).is_none());
    }
}
