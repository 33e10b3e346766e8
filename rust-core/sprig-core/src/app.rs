//! # Application
//!
//! [`App`] wires the router, middleware chain, error handlers and shared
//! state together. It is constructed explicitly and handed to
//! [`crate::server::serve`]; nothing is registered globally.
//!
//! Handlers are async functions from [`Request`] to `Result<R>` where `R`
//! implements [`IntoResponse`].

use crate::error::{Error, Result};
use crate::middleware::{Middleware, MiddlewareChain, Next, RequestHandler};
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::router::{Method, Router};
use crate::state::AppState;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use hyper::body::Bytes;
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, warn};

/// Type-erased route handler
pub type Handler = Arc<dyn Fn(Request) -> BoxFuture<'static, Result<Response>> + Send + Sync>;

/// Custom error response builder, keyed by status code
pub type ErrorHandler = Arc<dyn Fn(&Error) -> Response + Send + Sync>;

/// Erase an async handler into a [`Handler`]
///
/// The handler's return value is normalized with [`IntoResponse`].
pub fn handler<F, Fut, R>(f: F) -> Handler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
    R: IntoResponse,
{
    Arc::new(move |req| {
        let fut = f(req);
        async move { fut.await?.into_response() }.boxed()
    })
}

/// Web application
pub struct App {
    router: Router<Handler>,
    middleware: MiddlewareChain,
    error_handlers: HashMap<u16, ErrorHandler>,
    state: AppState,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    /// Create an empty application
    #[must_use]
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            middleware: MiddlewareChain::new(),
            error_handlers: HashMap::new(),
            state: AppState::new(),
        }
    }

    /// Register a handler for `method` and `path`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the path repeats a placeholder.
    pub fn route<F, Fut, R>(&mut self, method: Method, path: &str, f: F) -> Result<&mut Self>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: IntoResponse,
    {
        self.router.add_route(method, path, handler(f))?;
        Ok(self)
    }

    /// Register a GET route
    ///
    /// # Errors
    ///
    /// See [`App::route`].
    pub fn get<F, Fut, R>(&mut self, path: &str, f: F) -> Result<&mut Self>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: IntoResponse,
    {
        self.route(Method::Get, path, f)
    }

    /// Register a POST route
    ///
    /// # Errors
    ///
    /// See [`App::route`].
    pub fn post<F, Fut, R>(&mut self, path: &str, f: F) -> Result<&mut Self>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: IntoResponse,
    {
        self.route(Method::Post, path, f)
    }

    /// Register a PUT route
    ///
    /// # Errors
    ///
    /// See [`App::route`].
    pub fn put<F, Fut, R>(&mut self, path: &str, f: F) -> Result<&mut Self>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: IntoResponse,
    {
        self.route(Method::Put, path, f)
    }

    /// Register a PATCH route
    ///
    /// # Errors
    ///
    /// See [`App::route`].
    pub fn patch<F, Fut, R>(&mut self, path: &str, f: F) -> Result<&mut Self>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: IntoResponse,
    {
        self.route(Method::Patch, path, f)
    }

    /// Register a DELETE route
    ///
    /// # Errors
    ///
    /// See [`App::route`].
    pub fn delete<F, Fut, R>(&mut self, path: &str, f: F) -> Result<&mut Self>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: IntoResponse,
    {
        self.route(Method::Delete, path, f)
    }

    /// Register an OPTIONS route
    ///
    /// # Errors
    ///
    /// See [`App::route`].
    pub fn options<F, Fut, R>(&mut self, path: &str, f: F) -> Result<&mut Self>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: IntoResponse,
    {
        self.route(Method::Options, path, f)
    }

    /// Append a middleware
    pub fn middleware<M: Middleware + 'static>(&mut self, middleware: M) -> &mut Self {
        self.middleware.add(middleware);
        self
    }

    /// Append a plain async function as middleware
    pub fn middleware_fn<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        self.middleware.add_fn(f);
        self
    }

    /// Build the response for errors with the given status
    pub fn error_handler<F>(&mut self, status: u16, f: F) -> &mut Self
    where
        F: Fn(&Error) -> Response + Send + Sync + 'static,
    {
        self.error_handlers.insert(status, Arc::new(f));
        self
    }

    /// Shared application state, visible to handlers via [`Request::state`]
    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    /// The route table
    #[must_use]
    pub const fn router(&self) -> &Router<Handler> {
        &self.router
    }

    /// The middleware chain
    #[must_use]
    pub const fn middlewares(&self) -> &MiddlewareChain {
        &self.middleware
    }

    /// Route and run a request, always producing a response
    ///
    /// Unmatched requests get a 404 without running middleware. Errors from
    /// middleware or handlers are turned into responses by the error handler
    /// registered for their status, or the default JSON error body.
    pub async fn dispatch(&self, mut req: Request) -> Response {
        if req.header("x-request-id").is_none() {
            req.set_header("x-request-id", &generate_request_id());
        }
        let request_id = req.header("x-request-id").unwrap_or_default().to_string();
        req.set_state(self.state.clone());

        let result = match self.router.match_route(req.method, &req.path) {
            None => Err(Error::not_found("Not Found")),
            Some(matched) => {
                let handler = Arc::clone(matched.handler);
                req.set_params(matched.params);
                self.run(req, handler).await
            }
        };

        let mut response = result.unwrap_or_else(|e| self.handle_error(&e));
        response.set_header("x-request-id", &request_id);
        response
    }

    async fn run(&self, req: Request, handler: Handler) -> Result<Response> {
        if self.middleware.is_empty() {
            return handler(req).await;
        }
        let endpoint: Arc<dyn RequestHandler> = Arc::new(move |req: Request| handler(req));
        self.middleware.handle_with(req, endpoint).await
    }

    fn handle_error(&self, e: &Error) -> Response {
        let status = e.status_code();
        if let Some(custom) = self.error_handlers.get(&status) {
            return custom(e);
        }

        let message = if status >= 500 {
            error!(status, error = %e, "Request failed");
            "Internal Server Error".to_string()
        } else {
            warn!(status, error = %e, "Request rejected");
            e.to_string()
        };

        let body = json!({ "error": { "code": status, "message": message } });
        Response::json_str(body.to_string()).with_status(status)
    }

    /// Execute a test request directly without network stack
    pub async fn test_request(
        &self,
        method: Method,
        path: &str,
        headers: HashMap<String, String>,
        body: Option<Bytes>,
    ) -> Response {
        self.dispatch(Request::new(method, path, headers, body)).await
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("routes", &self.router.len())
            .field("middleware", &self.middleware)
            .field("error_handlers", &self.error_handlers.keys().collect::<Vec<_>>())
            .field("state", &self.state)
            .finish()
    }
}

static REQUEST_COUNTER: AtomicUsize = AtomicUsize::new(1);

fn generate_request_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{:x}", now.as_nanos(), counter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Json;
    use serde_json::Value;

    fn app() -> App {
        let mut app = App::new();
        app.get("/", |_req| async { Ok("Hello, World!") })
            .unwrap()
            .get("/hello/{name}", |req: Request| async move {
                let name = req.param("name").unwrap_or("stranger").to_string();
                Ok(json!({ "message": format!("Hello, {name}!") }))
            })
            .unwrap()
            .post("/fail", |_req| async {
                Err::<(), _>(Error::unprocessable("Name is required"))
            })
            .unwrap()
            .get("/boom", |_req| async {
                Err::<(), _>(Error::Database {
                    message: "secret dsn".to_string(),
                })
            })
            .unwrap();
        app
    }

    async fn get(app: &App, path: &str) -> Response {
        app.test_request(Method::Get, path, HashMap::new(), None).await
    }

    #[tokio::test]
    async fn test_text_and_json_handlers() {
        let app = app();

        let res = get(&app, "/").await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body, "Hello, World!");

        let res = get(&app, "/hello/Ada").await;
        let body: Value = serde_json::from_str(&res.body).unwrap();
        assert_eq!(body["message"], "Hello, Ada!");
        assert_eq!(res.content_type, "application/json");
    }

    #[tokio::test]
    async fn test_not_found_default_body() {
        let app = app();
        let res = get(&app, "/missing").await;
        assert_eq!(res.status, 404);
        let body: Value = serde_json::from_str(&res.body).unwrap();
        assert_eq!(body["error"]["code"], 404);
        assert_eq!(body["error"]["message"], "Not Found");
    }

    #[tokio::test]
    async fn test_method_mismatch_is_not_found() {
        let app = app();
        let res = app
            .test_request(Method::Post, "/", HashMap::new(), None)
            .await;
        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn test_http_error_keeps_message() {
        let app = app();
        let res = app
            .test_request(Method::Post, "/fail", HashMap::new(), None)
            .await;
        assert_eq!(res.status, 422);
        assert!(res.body.contains("Name is required"));
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let app = app();
        let res = get(&app, "/boom").await;
        assert_eq!(res.status, 500);
        assert!(!res.body.contains("secret dsn"));
        assert!(res.body.contains("Internal Server Error"));
    }

    #[tokio::test]
    async fn test_custom_error_handler() {
        let mut app = app();
        app.error_handler(404, |_e| Response::text("nothing here").with_status(404));

        let res = get(&app, "/nope").await;
        assert_eq!(res.status, 404);
        assert_eq!(res.body, "nothing here");
    }

    #[tokio::test]
    async fn test_request_id_assigned_and_echoed() {
        let app = app();
        let res = get(&app, "/").await;
        assert!(res.header("x-request-id").is_some());

        let headers = HashMap::from([("x-request-id".to_string(), "abc-123".to_string())]);
        let res = app.test_request(Method::Get, "/", headers, None).await;
        assert_eq!(res.header("x-request-id"), Some("abc-123"));
    }

    #[tokio::test]
    async fn test_middleware_wraps_route_handler() {
        let mut app = app();
        app.middleware_fn(|req, next| async move {
            let res = next.run(req).await?;
            Ok(res.with_header("x-wrapped", "yes"))
        });

        let res = get(&app, "/hello/Bob").await;
        assert_eq!(res.header("x-wrapped"), Some("yes"));
        assert!(res.body.contains("Bob"));

        let res = get(&app, "/missing").await;
        assert!(res.header("x-wrapped").is_none());
    }

    #[tokio::test]
    async fn test_state_reaches_handlers() {
        let mut app = App::new();
        app.state().set("greeting", "hi".to_string());
        app.get("/greet", |req: Request| async move {
            let greeting: String = req.state().get("greeting").unwrap_or_default();
            Ok(Json(json!({ "greeting": greeting })))
        })
        .unwrap();

        let res = get(&app, "/greet").await;
        assert_eq!(res.body, r#"{"greeting":"hi"}"#);
    }

    #[test]
    fn test_duplicate_placeholder_rejected() {
        let mut app = App::new();
        let result = app.get("/a/{id}/b/{id}", |_req| async { Ok("x") });
        assert!(matches!(result, Err(Error::InvalidRoutePattern { .. })));
    }
}
