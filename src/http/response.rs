//! Response handling.
//!
//! # Responsibilities
//! - Hold a fully-read response (status, headers, body)
//! - Decode JSON payloads for callers
//! - Extract the optional message from an error payload
//!
//! # Design Decisions
//! - Bodies are read eagerly so an attempt is complete before classification
//! - Error payloads are searched explicitly for `message` / `error`, never assumed

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

/// A completed HTTP response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self { status, headers, body }
    }

    /// Response with a status and body and no headers.
    pub fn from_parts(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    /// Body as UTF-8 text, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON. An empty body decodes as `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        if self.body.is_empty() {
            return serde_json::from_slice(b"null");
        }
        serde_json::from_slice(&self.body)
    }

    /// Message to show for a failed response.
    pub fn error_message(&self) -> String {
        extract_message(&self.body).unwrap_or_else(|| {
            self.status
                .canonical_reason()
                .unwrap_or("Unexpected response")
                .to_string()
        })
    }
}

/// Pull a human-readable message out of an error payload, if it carries one.
///
/// Accepts `{"message": ".."}`, `{"error": ".."}`, `{"error": {"message": ".."}}`
/// and a bare JSON string.
pub fn extract_message(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let message = match &value {
        serde_json::Value::String(s) => Some(s.as_str()),
        serde_json::Value::Object(map) => map
            .get("message")
            .and_then(|m| m.as_str())
            .or_else(|| match map.get("error") {
                Some(serde_json::Value::String(s)) => Some(s.as_str()),
                Some(serde_json::Value::Object(inner)) => inner.get("message").and_then(|m| m.as_str()),
                _ => None,
            }),
        _ => None,
    }?;

    let trimmed = message.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_message_shapes() {
        assert_eq!(extract_message(br#"{"message":"Out of stock"}"#).as_deref(), Some("Out of stock"));
        assert_eq!(extract_message(br#"{"error":"Bad supplier"}"#).as_deref(), Some("Bad supplier"));
        assert_eq!(
            extract_message(br#"{"error":{"message":"Table locked"}}"#).as_deref(),
            Some("Table locked")
        );
        assert_eq!(extract_message(br#""plain""#).as_deref(), Some("plain"));
        assert_eq!(extract_message(br#"{"message":"  "}"#), None);
        assert_eq!(extract_message(br#"{"code":500}"#), None);
        assert_eq!(extract_message(b"<html>oops</html>"), None);
    }

    #[test]
    fn test_error_message_falls_back_to_reason() {
        let res = ApiResponse::from_parts(503, "");
        assert_eq!(res.error_message(), "Service Unavailable");

        let res = ApiResponse::from_parts(500, r#"{"message":"db down"}"#);
        assert_eq!(res.error_message(), "db down");
    }

    #[test]
    fn test_json_decoding() {
        let res = ApiResponse::from_parts(200, r#"{"id":7,"name":"Latte"}"#);
        let value: serde_json::Value = res.json().unwrap();
        assert_eq!(value["id"], 7);

        let empty = ApiResponse::from_parts(204, "");
        let nothing: Option<serde_json::Value> = empty.json().unwrap();
        assert!(nothing.is_none());
    }
}
