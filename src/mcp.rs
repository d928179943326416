//! Minimal MCP server exposing the SMK art API as two resources.
//!
//! Requests and responses are newline-delimited JSON-RPC 2.0 objects:
//!
//! ```json
//! {"jsonrpc":"2.0","id":1,"method":"resources/read","params":{"uri":"smk://artsearch?keys=amager"}}
//! ```
//!
//! Nothing here touches the database; every read goes straight to upstream.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::{
    catalog::CatalogSource,
    models::{CatalogRecord, SearchQuery},
};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

const ARTSEARCH_URI: &str = "smk://artsearch";
const DETAIL_URI: &str = "smk://detail";
const MIME_JSON: &str = "application/json";
const DEFAULT_ROWS: u32 = 100;
const MAX_ROWS: u32 = 100;
const UNKNOWN_TITLE: &str = "Unknown Title";

#[derive(Debug, Serialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

#[derive(Debug, Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

impl RpcResponse {
    fn new(id: Value, outcome: Result<Value, RpcError>) -> Self {
        match outcome {
            Ok(result) => Self { jsonrpc: "2.0", id, result: Some(result), error: None },
            Err(error) => Self { jsonrpc: "2.0", id, result: None, error: Some(error) },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ArtworkSummary {
    pub id: String,
    pub title: String,
    pub year: Option<String>,
    pub artist: Option<String>,
    pub image_url: Option<String>,
}

impl From<CatalogRecord> for ArtworkSummary {
    fn from(rec: CatalogRecord) -> Self {
        Self {
            id: rec.external_id,
            title: rec.title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            year: rec.year.map(|y| y.to_string()),
            artist: rec.creator,
            image_url: rec.image_url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ArtworkDetail {
    pub id: String,
    pub title: String,
    pub year: Option<String>,
    pub artist: Option<String>,
    pub image_url: Option<String>,
    pub high_res_image_url: Option<String>,
    pub description: Option<String>,
}

impl From<CatalogRecord> for ArtworkDetail {
    fn from(rec: CatalogRecord) -> Self {
        let meta_text = |key: &str| rec.metadata.get(key).and_then(Value::as_str).map(str::to_string);
        let high_res_image_url = meta_text("high_res_image_url");
        let description = meta_text("description");
        Self {
            id: rec.external_id,
            title: rec.title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            year: rec.year.map(|y| y.to_string()),
            artist: rec.creator,
            image_url: rec.image_url,
            high_res_image_url,
            description,
        }
    }
}

pub struct McpServer {
    art: Arc<dyn CatalogSource>,
}

impl McpServer {
    pub fn new(art: Arc<dyn CatalogSource>) -> Self {
        Self { art }
    }

    /// Answers each request line on `reader` with one line on `writer` until
    /// the input ends.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        info!("MCP server ready");

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let Some(response) = self.handle_line(&line).await else {
                continue;
            };

            let mut out = serde_json::to_string(&response).unwrap_or_default();
            out.push('\n');
            writer.write_all(out.as_bytes()).await?;
            writer.flush().await?;
        }

        info!("stdin closed, MCP server stopping");
        Ok(())
    }

    /// The response for one raw request line; `None` for notifications.
    pub async fn handle_line(&self, line: &str) -> Option<Value> {
        let request: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "unparseable request");
                return Some(respond(Value::Null, Err(RpcError::new(PARSE_ERROR, "Parse error"))));
            },
        };
        self.handle(&request).await
    }

    pub async fn handle(&self, request: &Value) -> Option<Value> {
        if !request.is_object() {
            return Some(respond(Value::Null, Err(RpcError::new(INVALID_REQUEST, "Invalid Request"))));
        }
        let id = request.get("id").cloned().unwrap_or(Value::Null);

        let Some(method) = request.get("method").and_then(Value::as_str) else {
            return Some(respond(id, Err(RpcError::new(INVALID_REQUEST, "Invalid Request"))));
        };
        if method.starts_with("notifications/") {
            debug!(method, "notification");
            return None;
        }

        let params = request.get("params").cloned().unwrap_or(Value::Null);
        debug!(method, "request");
        Some(respond(id, self.dispatch(method, &params).await))
    }

    async fn dispatch(&self, method: &str, params: &Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "resources": {} },
                "serverInfo": { "name": "smk-mcp", "version": env!("CARGO_PKG_VERSION") },
            })),
            "ping" => Ok(json!({})),
            "resources/list" => Ok(json!({ "resources": resource_list() })),
            "resources/read" => {
                let uri = params.get("uri").and_then(Value::as_str).unwrap_or_default();
                let body = self.read_resource(uri).await?;
                Ok(json!({
                    "contents": [{
                        "uri": uri,
                        "mimeType": MIME_JSON,
                        "text": body.to_string(),
                    }]
                }))
            },
            _ => Err(RpcError::new(METHOD_NOT_FOUND, "Method not found")),
        }
    }

    async fn read_resource(&self, uri: &str) -> Result<Value, RpcError> {
        let (base, query) = match uri.split_once('?') {
            Some((base, query)) => (base, Some(query)),
            None => (uri, None),
        };

        match (base, query) {
            (ARTSEARCH_URI, None) => Ok(search_interface()),
            (DETAIL_URI, None) => Ok(detail_interface()),
            (ARTSEARCH_URI, Some(query)) => self.search(query).await,
            (DETAIL_URI, Some(query)) => self.detail(query).await,
            _ => Err(RpcError::new(METHOD_NOT_FOUND, "Unknown resource")),
        }
    }

    async fn search(&self, query: &str) -> Result<Value, RpcError> {
        let keys = query_param(query, "keys").unwrap_or_default();
        if keys.trim().is_empty() {
            return Err(RpcError::new(INVALID_PARAMS, "Keys parameter is required"));
        }
        let offset = number_param(query, "offset", 0)?;
        let rows = number_param(query, "rows", DEFAULT_ROWS)?.min(MAX_ROWS);

        let search = SearchQuery { text: keys, offset, limit: rows };
        let hits = match self.art.search(&search).await {
            Ok(page) => page.hits,
            Err(e) => {
                warn!(keys = %search.text, error = %e, "SMK search failed");
                Vec::new()
            },
        };

        let results: Vec<ArtworkSummary> = hits.into_iter().map(Into::into).collect();
        Ok(json!(results))
    }

    async fn detail(&self, query: &str) -> Result<Value, RpcError> {
        let id = query_param(query, "id").unwrap_or_default();
        if id.trim().is_empty() {
            return Err(RpcError::new(INVALID_PARAMS, "ID parameter is required"));
        }

        match self.art.fetch(id.trim()).await {
            Ok(Some(record)) => Ok(json!(ArtworkDetail::from(record))),
            Ok(None) => Err(RpcError::new(INVALID_PARAMS, "Artwork not found")),
            Err(e) => {
                warn!(id = %id, error = %e, "SMK detail fetch failed");
                Err(RpcError::new(INVALID_PARAMS, "Artwork not found"))
            },
        }
    }
}

fn respond(id: Value, outcome: Result<Value, RpcError>) -> Value {
    serde_json::to_value(RpcResponse::new(id, outcome)).unwrap_or(Value::Null)
}

fn resource_list() -> Value {
    json!([
        {
            "uri": ARTSEARCH_URI,
            "name": "ArtSearch",
            "description": "Search for artworks in the SMK collection",
            "mimeType": MIME_JSON,
        },
        {
            "uri": DETAIL_URI,
            "name": "Detail",
            "description": "Get detailed information about a specific artwork",
            "mimeType": MIME_JSON,
        }
    ])
}

fn search_interface() -> Value {
    json!({
        "type": "search_interface",
        "description": "Search for artworks using the 'keys' parameter",
        "example": "smk://artsearch?keys=amager&offset=0&rows=100",
        "parameters": {
            "keys": "Search terms (required)",
            "offset": "Starting position (default: 0)",
            "rows": "Number of results (default: 100, max: 100)",
        }
    })
}

fn detail_interface() -> Value {
    json!({
        "type": "detail_interface",
        "description": "Get detailed information about a specific artwork",
        "example": "smk://detail?id=KMS1234",
        "parameters": { "id": "Artwork ID (required)" }
    })
}

/// First value for `name` in a URI query string, percent-decoded.
fn query_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key != name {
            return None;
        }
        let value = value.replace('+', " ");
        Some(urlencoding::decode(&value).map(|v| v.into_owned()).unwrap_or(value))
    })
}

fn number_param(query: &str, name: &str, default: u32) -> Result<u32, RpcError> {
    match query_param(query, name).filter(|v| !v.trim().is_empty()) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| RpcError::new(INVALID_PARAMS, format!("Invalid {name} parameter"))),
    }
}
