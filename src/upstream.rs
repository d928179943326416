use std::{num::NonZeroU32, sync::Arc, time::Duration};

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::StatusCode;
use serde_json::Value;

use crate::error::AppResult;

pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub fn rate_limiter(rps: u32) -> Arc<Limiter> {
    let rps = NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::direct(Quota::per_second(rps)))
}

pub fn http_client(timeout_secs: u64) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("samling/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(timeout_secs))
        .build()
}

/// Waits for the limiter, sends the request and decodes JSON. A 404 is
/// `Ok(None)`; every other non-success status is an error.
pub async fn get_json(limiter: &Limiter, req: reqwest::RequestBuilder) -> AppResult<Option<Value>> {
    limiter.until_ready().await;

    let resp = req.send().await?;
    if resp.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    let body = resp.error_for_status()?.json().await?;
    Ok(Some(body))
}

// Upstream payloads change shape without notice, so field access goes
// through these instead of typed structs.

/// Non-empty string at `key`; numbers are rendered as strings.
pub fn text(v: &Value, key: &str) -> Option<String> {
    match v.get(key)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        },
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn flag(v: &Value, key: &str) -> bool {
    v.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// First element when `key` holds an array, the value itself when it holds
/// an object.
pub fn first<'a>(v: &'a Value, key: &str) -> Option<&'a Value> {
    match v.get(key)? {
        Value::Array(items) => items.first(),
        obj @ Value::Object(_) => Some(obj),
        _ => None,
    }
}

pub fn array<'a>(v: &'a Value, key: &str) -> &'a [Value] {
    v.get(key).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

/// A year from a number or from the leading four digits of a string such
/// as `"1837"` or `"1837-1840"`.
pub fn leading_year(v: &Value) -> Option<i32> {
    match v {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => {
            let s = s.trim();
            let digits = s.get(..4)?;
            if digits.chars().all(|c| c.is_ascii_digit()) { digits.parse().ok() } else { None }
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn text_skips_blank_and_renders_numbers() {
        let v = json!({ "a": "  ", "b": 12, "c": " x ", "d": null });
        assert_eq!(text(&v, "a"), None);
        assert_eq!(text(&v, "b").as_deref(), Some("12"));
        assert_eq!(text(&v, "c").as_deref(), Some("x"));
        assert_eq!(text(&v, "d"), None);
        assert_eq!(text(&v, "missing"), None);
    }

    #[test]
    fn first_accepts_array_or_object() {
        let v = json!({ "arr": [{ "n": 1 }, { "n": 2 }], "obj": { "n": 3 }, "empty": [], "s": "x" });
        assert_eq!(first(&v, "arr"), Some(&json!({ "n": 1 })));
        assert_eq!(first(&v, "obj"), Some(&json!({ "n": 3 })));
        assert_eq!(first(&v, "empty"), None);
        assert_eq!(first(&v, "s"), None);
    }

    #[test]
    fn leading_year_parses_periods() {
        assert_eq!(leading_year(&json!(2012)), Some(2012));
        assert_eq!(leading_year(&json!("1837-1840")), Some(1837));
        assert_eq!(leading_year(&json!("ca. 1837")), None);
        assert_eq!(leading_year(&json!("19")), None);
        assert_eq!(leading_year(&json!(null)), None);
    }
}
