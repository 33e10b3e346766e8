//! # Middleware System
//!
//! Onion-style request interception. Each middleware receives the request
//! and a [`Next`] continuation; calling [`Next::run`] dispatches to the next
//! middleware and finally to the fallback handler. Not calling it
//! short-circuits the rest of the chain.
//!
//! Two shapes are supported and normalized to the same contract:
//!
//! - types implementing [`Middleware`]
//! - plain async functions wrapped with [`from_fn`]

use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;
use crate::router::Method;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Terminal request handler
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Produce the response for a request
    async fn handle(&self, req: Request) -> Result<Response>;
}

#[async_trait]
impl<F, Fut> RequestHandler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    async fn handle(&self, req: Request) -> Result<Response> {
        (self)(req).await
    }
}

/// Middleware trait for request/response interception
///
/// Code before `next.run(req)` sees the request on the way in; code after it
/// sees the response on the way out, in reverse registration order.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Process a request, optionally delegating to `next`
    async fn process(&self, req: Request, next: Next) -> Result<Response>;

    /// Middleware name for logging
    fn name(&self) -> &'static str {
        "Unknown"
    }
}

/// Continuation to the rest of the chain
///
/// Consumed by [`Next::run`], so a middleware can invoke the remainder of the
/// chain at most once.
pub struct Next {
    middlewares: Arc<Vec<Arc<dyn Middleware>>>,
    index: usize,
    fallback: Option<Arc<dyn RequestHandler>>,
}

impl Next {
    /// Dispatch to the next middleware, or to the fallback handler past the
    /// end of the chain
    ///
    /// # Errors
    ///
    /// Returns `Error::NoHandler` if the chain is exhausted and no fallback is
    /// set, otherwise whatever the downstream middleware or handler returns.
    pub async fn run(mut self, req: Request) -> Result<Response> {
        if let Some(middleware) = self.middlewares.get(self.index).cloned() {
            self.index += 1;
            return middleware.process(req, self).await;
        }

        match self.fallback {
            Some(handler) => handler.handle(req).await,
            None => Err(Error::NoHandler),
        }
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("remaining", &self.middlewares.len().saturating_sub(self.index))
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

/// Middleware built from an async function
pub struct FnMiddleware<F> {
    f: F,
}

/// Wrap a plain async function as middleware
///
/// # Example
///
/// ```ignore
/// chain.add(from_fn(|req, next| async move {
///     let res = next.run(req).await?;
///     Ok(res.with_header("x-powered-by", "sprig"))
/// }));
/// ```
pub fn from_fn<F, Fut>(f: F) -> FnMiddleware<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    FnMiddleware { f }
}

#[async_trait]
impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    async fn process(&self, req: Request, next: Next) -> Result<Response> {
        (self.f)(req, next).await
    }

    fn name(&self) -> &'static str {
        "FnMiddleware"
    }
}

/// Ordered middleware list with an optional fallback handler
#[derive(Default, Clone)]
pub struct MiddlewareChain {
    middlewares: Arc<Vec<Arc<dyn Middleware>>>,
    fallback: Option<Arc<dyn RequestHandler>>,
}

impl MiddlewareChain {
    /// Create a new empty middleware chain
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a middleware to the end of the chain
    pub fn add<M: Middleware + 'static>(&mut self, middleware: M) {
        Arc::make_mut(&mut self.middlewares).push(Arc::new(middleware));
    }

    /// Add a plain async function as middleware
    pub fn add_fn<F, Fut>(&mut self, f: F)
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        self.add(from_fn(f));
    }

    /// Set the handler invoked past the last middleware
    pub fn set_fallback<H: RequestHandler + 'static>(&mut self, handler: H) {
        self.fallback = Some(Arc::new(handler));
    }

    /// Run the chain with the registered fallback
    ///
    /// # Errors
    ///
    /// Returns `Error::NoHandler` if the chain reaches its end without a
    /// fallback, or any error a middleware or the handler returns.
    pub async fn handle(&self, req: Request) -> Result<Response> {
        self.start(self.fallback.clone()).run(req).await
    }

    /// Run the chain with `fallback` as the terminal handler
    ///
    /// # Errors
    ///
    /// Propagates any error a middleware or the handler returns.
    pub async fn handle_with(
        &self,
        req: Request,
        fallback: Arc<dyn RequestHandler>,
    ) -> Result<Response> {
        self.start(Some(fallback)).run(req).await
    }

    fn start(&self, fallback: Option<Arc<dyn RequestHandler>>) -> Next {
        Next {
            middlewares: Arc::clone(&self.middlewares),
            index: 0,
            fallback,
        }
    }

    /// Get the number of middlewares
    #[must_use]
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Check if chain is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Whether any middleware is registered
    #[must_use]
    pub fn has_middlewares(&self) -> bool {
        !self.is_empty()
    }

    /// Names of the registered middlewares, in order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("middlewares", &self.names())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

/// Logging middleware - logs requests in structured JSON format
#[derive(Debug, Default)]
pub struct LoggingMiddleware {
    log_headers: bool,
}

impl LoggingMiddleware {
    /// Create a new logging middleware
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable header logging
    #[must_use]
    pub const fn with_headers(mut self) -> Self {
        self.log_headers = true;
        self
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn process(&self, req: Request, next: Next) -> Result<Response> {
        let method = req.method;
        let path = req.path.clone();
        let request_id = req.header("x-request-id").unwrap_or("-").to_string();

        if self.log_headers {
            info!(
                %method,
                %path,
                %request_id,
                headers = ?req.headers_map(),
                "Request received"
            );
        } else {
            info!(%method, %path, %request_id, "Request received");
        }

        let result = next.run(req).await;
        match &result {
            Ok(res) => info!(%method, %path, status = res.status, %request_id, "Response sent"),
            Err(e) => warn!(
                %method,
                %path,
                status = e.status_code(),
                %request_id,
                error = %e,
                "Request failed"
            ),
        }
        result
    }

    fn name(&self) -> &'static str {
        "LoggingMiddleware"
    }
}

/// Timing middleware - measures request duration
///
/// Adds an `x-response-time` header (milliseconds) to successful responses.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimingMiddleware;

impl TimingMiddleware {
    /// Create a new timing middleware
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for TimingMiddleware {
    async fn process(&self, req: Request, next: Next) -> Result<Response> {
        let method = req.method;
        let path = req.path.clone();
        let start = Instant::now();

        let mut res = next.run(req).await?;
        let elapsed = start.elapsed();
        debug!(
            %method,
            %path,
            duration_ms = %elapsed.as_millis(),
            "Request timing"
        );
        res.set_header(
            "x-response-time",
            &format!("{:.3}ms", elapsed.as_secs_f64() * 1000.0),
        );
        Ok(res)
    }

    fn name(&self) -> &'static str {
        "TimingMiddleware"
    }
}

/// CORS middleware - adds Cross-Origin Resource Sharing headers
///
/// `OPTIONS` requests are answered directly with a 204 preflight response.
/// Other requests run the chain and get CORS headers added when they carry
/// an `Origin` header.
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    allowed_origins: Vec<String>,
    allowed_methods: Vec<String>,
    allowed_headers: Vec<String>,
    exposed_headers: Vec<String>,
    max_age: u64,
    allow_credentials: bool,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS"]
                .map(String::from)
                .to_vec(),
            allowed_headers: ["Content-Type", "Authorization", "Accept", "X-Requested-With"]
                .map(String::from)
                .to_vec(),
            exposed_headers: Vec::new(),
            max_age: 86_400,
            allow_credentials: false,
        }
    }
}

impl CorsMiddleware {
    /// Create a new CORS middleware with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set allowed origins (`*` allows any)
    #[must_use]
    pub fn allow_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    /// Set allowed methods
    #[must_use]
    pub fn allow_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_methods = methods.into_iter().map(Into::into).collect();
        self
    }

    /// Set allowed request headers
    #[must_use]
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Set headers exposed to the browser
    #[must_use]
    pub fn expose_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exposed_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Set the preflight cache lifetime in seconds
    #[must_use]
    pub const fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = seconds;
        self
    }

    /// Send `Access-Control-Allow-Credentials: true`
    #[must_use]
    pub const fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    fn preflight(&self, req: &Request) -> Response {
        let mut res = Response::empty(204);
        self.apply_headers(req.header("origin").unwrap_or_default(), &mut res);

        let requested_method = req
            .header("access-control-request-method")
            .unwrap_or_default();
        if !requested_method.is_empty()
            && self.allowed_methods.iter().any(|m| m == requested_method)
        {
            res.set_header(
                "access-control-allow-methods",
                &self.allowed_methods.join(", "),
            );
        }

        let requested_headers = req
            .header("access-control-request-headers")
            .unwrap_or_default();
        if !requested_headers.is_empty() {
            res.set_header(
                "access-control-allow-headers",
                &self.allowed_headers.join(", "),
            );
        }

        res.set_header("access-control-max-age", &self.max_age.to_string());
        res
    }

    fn apply_headers(&self, origin: &str, res: &mut Response) {
        if origin.is_empty() {
            return;
        }

        if self.allowed_origins.iter().any(|o| o == "*") {
            res.set_header("access-control-allow-origin", "*");
        } else if self.allowed_origins.iter().any(|o| o == origin) {
            res.set_header("access-control-allow-origin", origin);
            res.set_header("vary", "Origin");
        }

        if self.allow_credentials {
            res.set_header("access-control-allow-credentials", "true");
        }

        if !self.exposed_headers.is_empty() {
            res.set_header(
                "access-control-expose-headers",
                &self.exposed_headers.join(", "),
            );
        }
    }
}

#[async_trait]
impl Middleware for CorsMiddleware {
    async fn process(&self, req: Request, next: Next) -> Result<Response> {
        if req.method == Method::Options {
            return Ok(self.preflight(&req));
        }

        let origin = req.header("origin").unwrap_or_default().to_string();
        let mut res = next.run(req).await?;
        self.apply_headers(&origin, &mut res);
        Ok(res)
    }

    fn name(&self) -> &'static str {
        "CorsMiddleware"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn request(method: Method, headers: &[(&str, &str)]) -> Request {
        let headers: HashMap<String, String> = headers
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Request::new(method, "/things", headers, None)
    }

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        call_next: bool,
    }

    #[async_trait]
    impl Middleware for Recorder {
        async fn process(&self, req: Request, next: Next) -> Result<Response> {
            self.log.lock().unwrap().push(format!("{} in", self.label));
            if !self.call_next {
                return Ok(Response::text("blocked").with_status(401));
            }
            let res = next.run(req).await?;
            self.log.lock().unwrap().push(format!("{} out", self.label));
            Ok(res)
        }
    }

    fn chain_with(log: &Arc<Mutex<Vec<String>>>, a_calls_next: bool) -> MiddlewareChain {
        let mut chain = MiddlewareChain::new();
        chain.add(Recorder {
            label: "A",
            log: Arc::clone(log),
            call_next: a_calls_next,
        });
        chain.add(Recorder {
            label: "B",
            log: Arc::clone(log),
            call_next: true,
        });
        let handler_log = Arc::clone(log);
        chain.set_fallback(move |_req: Request| {
            let log = Arc::clone(&handler_log);
            async move {
                log.lock().unwrap().push("H".to_string());
                Ok(Response::text("done"))
            }
        });
        chain
    }

    #[tokio::test]
    async fn test_onion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = chain_with(&log, true);

        let res = chain.handle(request(Method::Get, &[])).await.unwrap();
        assert_eq!(res.body, "done");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["A in", "B in", "H", "B out", "A out"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = chain_with(&log, false);

        let res = chain.handle(request(Method::Get, &[])).await.unwrap();
        assert_eq!(res.status, 401);
        assert_eq!(*log.lock().unwrap(), vec!["A in"]);
    }

    #[test]
    fn test_empty_chain_without_fallback() {
        let chain = MiddlewareChain::new();
        let err = tokio_test::block_on(chain.handle(request(Method::Get, &[]))).unwrap_err();
        assert!(matches!(err, Error::NoHandler));
    }

    #[tokio::test]
    async fn test_empty_chain_runs_fallback() {
        let mut chain = MiddlewareChain::new();
        chain.set_fallback(|_req: Request| async { Ok(Response::text("fallback")) });
        let res = chain.handle(request(Method::Get, &[])).await.unwrap();
        assert_eq!(res.body, "fallback");
    }

    #[tokio::test]
    async fn test_fn_middleware_and_handle_with() {
        let mut chain = MiddlewareChain::new();
        chain.add_fn(|req, next| async move {
            let res = next.run(req).await?;
            Ok(res.with_header("x-powered-by", "sprig"))
        });

        let endpoint: Arc<dyn RequestHandler> =
            Arc::new(|req: Request| async move { Ok::<_, Error>(Response::text(req.path)) });
        let res = chain
            .handle_with(request(Method::Get, &[]), endpoint)
            .await
            .unwrap();
        assert_eq!(res.body, "/things");
        assert_eq!(res.header("x-powered-by"), Some("sprig"));
        assert_eq!(chain.names(), vec!["FnMiddleware"]);
    }

    #[tokio::test]
    async fn test_errors_propagate_through_chain() {
        let mut chain = MiddlewareChain::new();
        chain.add(LoggingMiddleware::new());
        chain.set_fallback(|_req: Request| async { Err(Error::forbidden("nope")) });

        let err = chain.handle(request(Method::Get, &[])).await.unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn test_middleware_chain_add() {
        let mut chain = MiddlewareChain::new();
        assert!(chain.is_empty());
        chain.add(LoggingMiddleware::new().with_headers());
        chain.add(TimingMiddleware::new());

        assert!(chain.has_middlewares());
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.names(), vec!["LoggingMiddleware", "TimingMiddleware"]);
    }

    #[tokio::test]
    async fn test_timing_header() {
        let mut chain = MiddlewareChain::new();
        chain.add(TimingMiddleware::new());
        chain.set_fallback(|_req: Request| async { Ok(Response::text("ok")) });

        let res = chain.handle(request(Method::Get, &[])).await.unwrap();
        let value = res.header("x-response-time").unwrap();
        assert!(value.ends_with("ms"));
    }

    fn cors_chain(cors: CorsMiddleware) -> MiddlewareChain {
        let mut chain = MiddlewareChain::new();
        chain.add(cors);
        chain.set_fallback(|_req: Request| async { Ok(Response::text("body")) });
        chain
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let chain = cors_chain(CorsMiddleware::new());
        let req = request(
            Method::Options,
            &[
                ("origin", "https://app.test"),
                ("access-control-request-method", "PUT"),
                ("access-control-request-headers", "content-type"),
            ],
        );

        let res = chain.handle(req).await.unwrap();
        assert_eq!(res.status, 204);
        assert_eq!(res.header("access-control-allow-origin"), Some("*"));
        assert_eq!(
            res.header("access-control-allow-methods"),
            Some("GET, POST, PUT, DELETE, PATCH, OPTIONS")
        );
        assert!(res.header("access-control-allow-headers").is_some());
        assert_eq!(res.header("access-control-max-age"), Some("86400"));
    }

    #[tokio::test]
    async fn test_cors_preflight_unknown_method() {
        let chain = cors_chain(CorsMiddleware::new().allow_methods(["GET"]));
        let req = request(
            Method::Options,
            &[("access-control-request-method", "DELETE")],
        );

        let res = chain.handle(req).await.unwrap();
        assert_eq!(res.status, 204);
        assert!(res.header("access-control-allow-methods").is_none());
        assert!(res.header("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn test_cors_echoes_listed_origin() {
        let cors = CorsMiddleware::new()
            .allow_origins(["https://a.test"])
            .allow_credentials(true)
            .expose_headers(["x-total"]);
        let chain = cors_chain(cors);

        let res = chain
            .handle(request(Method::Get, &[("origin", "https://a.test")]))
            .await
            .unwrap();
        assert_eq!(res.body, "body");
        assert_eq!(
            res.header("access-control-allow-origin"),
            Some("https://a.test")
        );
        assert_eq!(res.header("vary"), Some("Origin"));
        assert_eq!(res.header("access-control-allow-credentials"), Some("true"));
        assert_eq!(res.header("access-control-expose-headers"), Some("x-total"));
    }

    #[tokio::test]
    async fn test_cors_without_origin_untouched() {
        let chain = cors_chain(CorsMiddleware::new());
        let res = chain.handle(request(Method::Get, &[])).await.unwrap();
        assert!(res.headers.is_empty());
    }

    #[tokio::test]
    async fn test_cors_unlisted_origin() {
        let chain = cors_chain(CorsMiddleware::new().allow_origins(["https://a.test"]));
        let res = chain
            .handle(request(Method::Get, &[("origin", "https://evil.test")]))
            .await
            .unwrap();
        assert!(res.header("access-control-allow-origin").is_none());
    }
}
