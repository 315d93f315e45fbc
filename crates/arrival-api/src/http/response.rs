//! Envelope response format for all API responses.
//!
//! ```json
//! {
//!   "data": { ... },
//!   "meta": { "request_id": "...", "timestamp": "...", "response_time_ms": 5 },
//!   "errors": [],
//!   "_links": { "self": "..." }
//! }
//! ```

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    pub meta: ApiMeta,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ApiErrorDetail>,

    #[serde(rename = "_links", skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct ApiMeta {
    pub request_id: String,
    /// RFC 3339 timestamp of the response.
    pub timestamp: String,
    pub response_time_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    pub message: String,
}

impl ApiMeta {
    /// Metadata for a request that started at `start`.
    pub fn since(start: Instant) -> Self {
        Self {
            request_id: uuid::Uuid::now_v7().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            response_time_ms: start.elapsed().as_millis() as u64,
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, start: Instant) -> Self {
        Self {
            data: Some(data),
            meta: ApiMeta::since(start),
            errors: Vec::new(),
            links: BTreeMap::new(),
        }
    }

    pub fn with_link(mut self, rel: &str, href: impl Into<String>) -> Self {
        self.links.insert(rel.to_string(), href.into());
        self
    }
}

impl ApiResponse<()> {
    pub fn error(code: &str, message: impl Into<String>, start: Instant) -> Self {
        Self {
            data: None,
            meta: ApiMeta::since(start),
            errors: vec![ApiErrorDetail {
                code: code.to_string(),
                message: message.into(),
            }],
            links: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_shape() {
        let resp = ApiResponse::success(serde_json::json!({"ok": true}), Instant::now())
            .with_link("self", "/api/v1/health");
        let json = serde_json::to_value(&resp).unwrap();

        assert_eq!(json["data"]["ok"], true);
        assert_eq!(json["_links"]["self"], "/api/v1/health");
        assert!(json.get("errors").is_none());
        assert!(json["meta"]["request_id"].as_str().unwrap().len() == 36);
    }

    #[test]
    fn error_envelope_has_no_data() {
        let json =
            serde_json::to_value(ApiResponse::error("NOT_FOUND", "gone", Instant::now())).unwrap();
        assert!(json.get("data").is_none());
        assert_eq!(json["errors"][0]["code"], "NOT_FOUND");
        assert_eq!(json["errors"][0]["message"], "gone");
    }
}
