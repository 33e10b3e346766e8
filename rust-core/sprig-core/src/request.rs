//! # HTTP Request
//!
//! The inbound request view handed to middleware and handlers.
//!
//! Routing only reads `method` and `path`; everything else (headers, query,
//! body, claims, attributes) is carried through for application code.

use crate::error::{Error, Result};
use crate::json::parse_json_bytes;
use crate::params::PathParams;
use crate::router::Method;
use crate::state::AppState;
use http_body_util::BodyExt;
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;

/// HTTP request
///
/// - Query string is parsed once at construction
/// - Body is collected once and kept as bytes
/// - Path parameters are filled in by the router after matching
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Request path (without query string)
    pub path: String,
    query_string: Option<String>,
    query_params: HashMap<String, String>,
    params: PathParams,
    headers: HeaderMap,
    body: Option<Bytes>,
    /// Validated JWT claims, set by the auth middleware
    pub claims: Option<Value>,
    attributes: HashMap<String, Value>,
    state: AppState,
}

impl Request {
    /// Create a request by hand (tests, internal dispatch)
    ///
    /// `path` may carry a query string (`/users?page=2`).
    pub fn new(
        method: Method,
        path: impl Into<String>,
        headers_map: HashMap<String, String>,
        body: Option<Bytes>,
    ) -> Self {
        let path = path.into();
        let (path, query_string) = match path.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (path, None),
        };

        let mut headers = HeaderMap::new();
        for (k, v) in headers_map {
            if let (Ok(n), Ok(v)) = (
                HeaderName::from_bytes(k.as_bytes()),
                HeaderValue::from_str(&v),
            ) {
                headers.insert(n, v);
            }
        }

        Self {
            method,
            path,
            query_params: parse_query_string(query_string.as_deref()),
            query_string,
            params: PathParams::new(),
            headers,
            body,
            claims: None,
            attributes: HashMap::new(),
            state: AppState::new(),
        }
    }

    /// Create from a hyper request, enforcing a body size limit
    ///
    /// # Errors
    ///
    /// - `Error::PayloadTooLarge` if Content-Length or the collected body
    ///   exceeds `max_body_size`
    /// - 405 `Error::HttpStatus` for methods the router does not support
    /// - `Error::Http` if the body cannot be read
    pub async fn from_hyper_with_limit(
        req: hyper::Request<hyper::body::Incoming>,
        max_body_size: usize,
    ) -> Result<Self> {
        let method = Method::try_from(req.method())?;

        let uri = req.uri();
        let path = uri.path().to_string();
        let query_string = uri.query().map(String::from);
        let headers = req.headers().clone();

        let declared = headers
            .get(CONTENT_LENGTH)
            .and_then(|len| len.to_str().ok())
            .and_then(|len| len.parse::<usize>().ok());
        if let Some(content_len) = declared {
            if content_len > max_body_size {
                return Err(Error::PayloadTooLarge {
                    limit: max_body_size,
                    actual: content_len,
                });
            }
        }

        let bytes = BodyExt::collect(req.into_body()).await?.to_bytes();
        if bytes.len() > max_body_size {
            return Err(Error::PayloadTooLarge {
                limit: max_body_size,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            method,
            path,
            query_params: parse_query_string(query_string.as_deref()),
            query_string,
            params: PathParams::new(),
            headers,
            body: (!bytes.is_empty()).then_some(bytes),
            claims: None,
            attributes: HashMap::new(),
            state: AppState::new(),
        })
    }

    // ---- path parameters --------------------------------------------------

    /// Get a path parameter captured by the router
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// All path parameters
    #[must_use]
    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Replace the path parameters
    pub fn set_params(&mut self, params: PathParams) {
        self.params = params;
    }

    // ---- headers ----------------------------------------------------------

    /// Get a header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Set or override a header
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(n, v);
        }
    }

    /// Get all headers as a HashMap
    #[must_use]
    pub fn headers_map(&self) -> HashMap<String, String> {
        self.headers
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|val| (k.as_str().to_string(), val.to_string()))
            })
            .collect()
    }

    /// Whether the request declares a JSON body
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.header(CONTENT_TYPE.as_str())
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"))
    }

    /// Whether the request was sent by `XMLHttpRequest`
    #[must_use]
    pub fn is_ajax(&self) -> bool {
        self.header("x-requested-with")
            .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
    }

    // ---- query ------------------------------------------------------------

    /// Get a query string parameter
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(String::as_str)
    }

    /// Get query parameters as a HashMap
    #[must_use]
    pub fn query_map(&self) -> &HashMap<String, String> {
        &self.query_params
    }

    /// Get raw query string
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    // ---- body -------------------------------------------------------------

    /// Get the request body as bytes
    #[must_use]
    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Get the request body as string (UTF-8)
    #[must_use]
    pub fn body_str(&self) -> Option<&str> {
        self.body_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Deserialize the body as JSON
    ///
    /// # Errors
    ///
    /// Returns a 400 `Error::HttpStatus` if the body is missing or invalid.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let mut bytes = self
            .body_bytes()
            .ok_or_else(|| Error::bad_request("Request body is empty"))?
            .to_vec();
        parse_json_bytes(&mut bytes)
    }

    /// Look up an input value: a top-level JSON body field first, then the
    /// query string
    #[must_use]
    pub fn input(&self, name: &str) -> Option<Value> {
        if self.is_json() {
            if let Ok(Value::Object(mut fields)) = self.json::<Value>() {
                if let Some(value) = fields.remove(name) {
                    return Some(value);
                }
            }
        }
        self.query(name).map(|v| Value::String(v.to_string()))
    }

    // ---- attributes and state ---------------------------------------------

    /// Get a request-scoped attribute set by middleware
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Set a request-scoped attribute
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Application state shared by every request
    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Attach the application state
    pub fn set_state(&mut self, state: AppState) {
        self.state = state;
    }
}

/// Parse query string into HashMap
///
/// Handles URL decoding and duplicate keys (last value wins).
fn parse_query_string(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| {
            q.split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| {
                    let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                    (url_decode(key), url_decode(value))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// URL decoding (`+` and `%XX`), lossy on invalid UTF-8
fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let decoded = s
                    .get(i + 1..i + 3)
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                if let Some(byte) = decoded {
                    out.push(byte);
                    i += 2;
                } else {
                    out.push(b'%');
                }
            }
            b => out.push(b),
        }
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}
