//! # Router
//!
//! Ordered route table with first-match-wins lookup.
//!
//! ## Features
//!
//! - Path parameter extraction (`/users/{id}`)
//! - Optional segments (`/posts/{id?}`)
//! - Trailing-slash tolerant matching (`/users/42/` == `/users/42`)
//!
//! Routes are scanned in registration order and the first route whose method
//! and pattern both match wins, even when a later route would be a tighter
//! fit. A later duplicate of an earlier route is therefore unreachable.

use crate::error::{Error, Result};
use crate::params::PathParams;
use crate::route::Route;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// HTTP methods supported by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// HTTP GET
    Get,
    /// HTTP POST
    Post,
    /// HTTP PUT
    Put,
    /// HTTP PATCH
    Patch,
    /// HTTP DELETE
    Delete,
    /// HTTP OPTIONS
    Options,
}

impl Method {
    /// Canonical upper-case name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "OPTIONS" => Ok(Self::Options),
            other => Err(Error::method_not_allowed(format!(
                "Unsupported HTTP method: {other}"
            ))),
        }
    }
}

impl TryFrom<&hyper::Method> for Method {
    type Error = Error;

    fn try_from(method: &hyper::Method) -> Result<Self> {
        method.as_str().parse()
    }
}

/// Normalize a request or template path
///
/// Guarantees a leading `/` and strips trailing slashes, except for the root
/// path itself. Normalizing twice gives the same result as normalizing once.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Matched route with extracted parameters
#[derive(Debug)]
pub struct Match<'a, H> {
    /// The handler registered for the matched route
    pub handler: &'a H,
    /// The route that matched
    pub route: &'a Route<H>,
    /// Extracted path parameters
    pub params: PathParams,
}

/// HTTP router over an ordered list of routes
///
/// Generic over the handler type so the table can hold application handlers,
/// ids, or plain labels in tests.
#[derive(Debug, Clone)]
pub struct Router<H> {
    routes: Vec<Route<H>>,
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Router<H> {
    /// Create a new empty router
    #[must_use]
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Register a route with the given method and path template
    ///
    /// No de-duplication is performed: an identical later route is kept but
    /// never matched.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the template repeats a placeholder
    pub fn add_route(&mut self, method: Method, path: &str, handler: H) -> Result<()> {
        let route = Route::new(method, path, handler)?;
        debug!(method = %method, path = %route.path, "Route registered");
        self.routes.push(route);
        Ok(())
    }

    /// Match a request against registered routes
    ///
    /// The path is normalized first. Returns `None` if no route matches; the
    /// caller decides how to answer (usually 404).
    #[must_use]
    pub fn match_route(&self, method: Method, path: &str) -> Option<Match<'_, H>> {
        let path = normalize_path(path);

        self.routes
            .iter()
            .filter(|route| route.method == method)
            .find_map(|route| {
                route.pattern().matches(&path).map(|params| Match {
                    handler: route.handler(),
                    route,
                    params,
                })
            })
    }

    /// All registered routes in registration order
    #[must_use]
    pub fn routes(&self) -> &[Route<H>] {
        &self.routes
    }

    /// Number of registered routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Check if no route is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Convenience method to add a GET route
    pub fn get(&mut self, path: &str, handler: H) -> Result<()> {
        self.add_route(Method::Get, path, handler)
    }

    /// Convenience method to add a POST route
    pub fn post(&mut self, path: &str, handler: H) -> Result<()> {
        self.add_route(Method::Post, path, handler)
    }

    /// Convenience method to add a PUT route
    pub fn put(&mut self, path: &str, handler: H) -> Result<()> {
        self.add_route(Method::Put, path, handler)
    }

    /// Convenience method to add a PATCH route
    pub fn patch(&mut self, path: &str, handler: H) -> Result<()> {
        self.add_route(Method::Patch, path, handler)
    }

    /// Convenience method to add a DELETE route
    pub fn delete(&mut self, path: &str, handler: H) -> Result<()> {
        self.add_route(Method::Delete, path, handler)
    }

    /// Convenience method to add an OPTIONS route
    pub fn options(&mut self, path: &str, handler: H) -> Result<()> {
        self.add_route(Method::Options, path, handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_routing() {
        let mut router = Router::new();

        router.get("/", "index").unwrap();
        router.get("/users", "list_users").unwrap();
        router.post("/users", "create_user").unwrap();

        let m = router.match_route(Method::Get, "/").unwrap();
        assert_eq!(*m.handler, "index");

        let m = router.match_route(Method::Get, "/users").unwrap();
        assert_eq!(*m.handler, "list_users");

        let m = router.match_route(Method::Post, "/users").unwrap();
        assert_eq!(*m.handler, "create_user");
    }

    #[test]
    fn test_hello_scenario() {
        let mut router = Router::new();
        router.get("/", "root").unwrap();
        router.get("/hello/{name}", "hello").unwrap();

        let m = router.match_route(Method::Get, "/hello/Ada").unwrap();
        assert_eq!(*m.handler, "hello");
        assert_eq!(m.params.get("name"), Some("Ada"));
        assert_eq!(m.params.len(), 1);

        assert!(router.match_route(Method::Post, "/").is_none());
    }

    #[test]
    fn test_path_parameters() {
        let mut router = Router::new();
        router.get("/users/{id}", 1).unwrap();
        router.get("/users/{user_id}/posts/{post_id}", 2).unwrap();

        let m = router.match_route(Method::Get, "/users/123").unwrap();
        assert_eq!(m.params.get("id"), Some("123"));

        let m = router
            .match_route(Method::Get, "/users/456/posts/789")
            .unwrap();
        assert_eq!(m.params.get("user_id"), Some("456"));
        assert_eq!(m.params.get("post_id"), Some("789"));
    }

    #[test]
    fn test_trailing_slash_ignored() {
        let mut router = Router::new();
        router.get("/users/{id}", ()).unwrap();

        let plain = router.match_route(Method::Get, "/users/42").unwrap();
        let slashed = router.match_route(Method::Get, "/users/42/").unwrap();
        assert_eq!(plain.params, slashed.params);
        assert_eq!(slashed.params.get("id"), Some("42"));
    }

    #[test]
    fn test_missing_leading_slash() {
        let mut router = Router::new();
        router.get("about", ()).unwrap();
        assert!(router.match_route(Method::Get, "about").is_some());
        assert!(router.match_route(Method::Get, "/about/").is_some());
    }

    #[test]
    fn test_optional_segment() {
        let mut router = Router::new();
        router.get("/posts/{id?}", ()).unwrap();

        let m = router.match_route(Method::Get, "/posts").unwrap();
        assert!(m.params.is_empty());
        let m = router.match_route(Method::Get, "/posts/7").unwrap();
        assert_eq!(m.params.get("id"), Some("7"));
    }

    #[test]
    fn test_first_registered_wins() {
        let mut router = Router::new();
        router.get("/users/{id}", "param").unwrap();
        router.get("/users/me", "literal").unwrap();
        router.get("/users/{id}", "duplicate").unwrap();

        let m = router.match_route(Method::Get, "/users/me").unwrap();
        assert_eq!(*m.handler, "param");
        assert_eq!(router.len(), 3);
    }

    #[test]
    fn test_method_filtering_skips_to_later_route() {
        let mut router = Router::new();
        router.post("/items/{id}", "post").unwrap();
        router.get("/items/{id}", "get").unwrap();

        let m = router.match_route(Method::Get, "/items/1").unwrap();
        assert_eq!(*m.handler, "get");
    }

    #[test]
    fn test_route_not_found() {
        let router: Router<()> = Router::new();
        assert!(router.match_route(Method::Get, "/nonexistent").is_none());
    }

    #[test]
    fn test_method_not_matched() {
        let mut router = Router::new();
        router.get("/users", ()).unwrap();
        assert!(router.match_route(Method::Post, "/users").is_none());
    }

    #[test]
    fn test_duplicate_placeholder_rejected() {
        let mut router = Router::new();
        let err = router.get("/a/{x}/{x}", ()).unwrap_err();
        assert!(matches!(err, Error::InvalidRoutePattern { .. }));
        assert!(router.is_empty());
    }

    #[test]
    fn test_normalize_path_idempotent() {
        for raw in ["", "/", "//", "users", "/users/", "/users///", "/a/b"] {
            let once = normalize_path(raw);
            assert_eq!(normalize_path(&once), once, "input {raw:?}");
        }
        assert_eq!(normalize_path("/users///"), "/users");
        assert_eq!(normalize_path("//"), "/");
    }

    #[test]
    fn test_method_parse() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("OPTIONS".parse::<Method>().unwrap(), Method::Options);
        assert!("TRACE".parse::<Method>().is_err());
        assert_eq!(Method::Patch.to_string(), "PATCH");
    }
}
