//! # Route Definition
//!
//! A single `(method, path template, handler)` registration.

use crate::error::Result;
use crate::pattern::PathPattern;
use crate::router::{normalize_path, Method};

/// A registered route
///
/// Routes are immutable once created; the router only ever reads them.
#[derive(Debug, Clone)]
pub struct Route<H> {
    /// HTTP method this route answers
    pub method: Method,
    /// Normalized path template (e.g., "/users/{id}")
    pub path: String,
    pattern: PathPattern,
    handler: H,
}

impl<H> Route<H> {
    /// Create a route, normalizing and compiling its path template
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the template repeats a placeholder
    pub fn new(method: Method, path: &str, handler: H) -> Result<Self> {
        let path = normalize_path(path);
        let pattern = PathPattern::compile(&path)?;

        Ok(Self {
            method,
            path,
            pattern,
            handler,
        })
    }

    /// The compiled matcher
    #[must_use]
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// The handler registered for this route
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }
}
