//! # HTTP Response
//!
//! Response value produced by handlers and middleware, plus the
//! [`IntoResponse`] conversions that normalize handler return types.

use crate::error::Result;
use crate::json::to_json;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::StatusCode;
use serde::Serialize;
use std::collections::HashMap;

/// HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: String,
    /// Content type
    pub content_type: String,
    /// Response headers (lower-cased names)
    pub headers: HashMap<String, String>,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            body: String::new(),
            content_type: "application/json".to_string(),
            headers: HashMap::new(),
        }
    }
}

impl Response {
    /// Serialize a value as a JSON response
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if the value cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::json_str(to_json(value)?))
    }

    /// Create a JSON response from pre-encoded text
    #[must_use]
    pub fn json_str(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// Create a text response
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: "text/plain; charset=utf-8".to_string(),
            ..Self::default()
        }
    }

    /// Create an HTML response
    #[must_use]
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: "text/html; charset=utf-8".to_string(),
            ..Self::default()
        }
    }

    /// Create a redirect response
    #[must_use]
    pub fn redirect(url: &str, status: u16) -> Self {
        Self::empty(status).with_header("location", url)
    }

    /// Create a response without a body
    #[must_use]
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8".to_string(),
            ..Self::default()
        }
    }

    /// Set status code
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set a header
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.set_header(key, value);
        self
    }

    /// Set or override a header
    ///
    /// `Content-Type` is stored in [`Response::content_type`].
    pub fn set_header(&mut self, key: &str, value: &str) {
        if key.eq_ignore_ascii_case("content-type") {
            self.content_type = value.to_string();
        } else {
            self.headers
                .insert(key.to_ascii_lowercase(), value.to_string());
        }
    }

    /// Get a header value (case-insensitive)
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        if key.eq_ignore_ascii_case("content-type") {
            return Some(&self.content_type);
        }
        self.headers
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Convert to hyper Response
    pub(crate) fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = hyper::Response::new(Full::new(Bytes::from(self.body)));
        *response.status_mut() = status;

        let headers = response.headers_mut();
        let pairs = std::iter::once(("content-type".to_string(), self.content_type))
            .chain(self.headers);
        for (k, v) in pairs {
            if let (Ok(name), Ok(value)) = (
                hyper::header::HeaderName::from_bytes(k.as_bytes()),
                hyper::header::HeaderValue::from_str(&v),
            ) {
                headers.insert(name, value);
            }
        }
        response
    }
}

/// JSON body wrapper for handler return values
#[derive(Debug, Clone)]
pub struct Json<T>(pub T);

/// Conversion of handler results into a [`Response`]
///
/// - `Response` passes through unchanged
/// - `serde_json::Value` and [`Json<T>`] become `application/json`
/// - `String` / `&'static str` become `text/plain`
/// - `()` becomes an empty 200
pub trait IntoResponse {
    /// Perform the conversion
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if a body cannot be serialized.
    fn into_response(self) -> Result<Response>;
}

impl IntoResponse for Response {
    fn into_response(self) -> Result<Response> {
        Ok(self)
    }
}

impl IntoResponse for serde_json::Value {
    fn into_response(self) -> Result<Response> {
        Response::json(&self)
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Result<Response> {
        Response::json(&self.0)
    }
}

impl IntoResponse for String {
    fn into_response(self) -> Result<Response> {
        Ok(Response::text(self))
    }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Result<Response> {
        Ok(Response::text(self))
    }
}

impl IntoResponse for () {
    fn into_response(self) -> Result<Response> {
        Ok(Response::empty(200))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_json() {
        let resp = Response::json(&serde_json::json!({"status": "ok"})).unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_type, "application/json");
        assert_eq!(resp.body, r#"{"status":"ok"}"#);
    }

    #[test]
    fn test_response_with_status() {
        let resp = Response::text("Not Found").with_status(404);
        assert_eq!(resp.status, 404);
        assert!(resp.content_type.starts_with("text/plain"));
    }

    #[test]
    fn test_headers_case_insensitive() {
        let mut resp = Response::empty(204).with_header("X-Trace", "abc");
        assert_eq!(resp.header("x-trace"), Some("abc"));
        resp.set_header("Content-Type", "text/csv");
        assert_eq!(resp.header("content-type"), Some("text/csv"));
        assert!(resp.headers.is_empty() || !resp.headers.contains_key("content-type"));
    }

    #[test]
    fn test_redirect() {
        let resp = Response::redirect("/login", 302);
        assert_eq!(resp.status, 302);
        assert_eq!(resp.header("location"), Some("/login"));
        assert!(resp.body.is_empty());
    }

    #[test]
    fn test_into_response_shapes() {
        let resp = serde_json::json!([1, 2]).into_response().unwrap();
        assert_eq!(resp.body, "[1,2]");

        let resp = Json(vec!["a"]).into_response().unwrap();
        assert_eq!(resp.content_type, "application/json");

        let resp = "hello".into_response().unwrap();
        assert!(resp.content_type.starts_with("text/plain"));
        assert_eq!(resp.body, "hello");

        let resp = ().into_response().unwrap();
        assert_eq!(resp.status, 200);
        assert!(resp.body.is_empty());
    }

    #[test]
    fn test_into_hyper() {
        let resp = Response::text("hi").with_status(201).with_header("x-id", "1");
        let hyper_resp = resp.into_hyper();
        assert_eq!(hyper_resp.status(), StatusCode::CREATED);
        assert_eq!(hyper_resp.headers()["x-id"], "1");
        assert_eq!(
            hyper_resp.headers()["content-type"],
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn test_invalid_status_falls_back() {
        let hyper_resp = Response::empty(42).into_hyper();
        assert_eq!(hyper_resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
