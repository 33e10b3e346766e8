//! # Bearer Authentication
//!
//! HS256 JWT verification as a middleware. Requests to public paths pass
//! through untouched; everything else needs an `Authorization: Bearer`
//! header with a valid token, whose claims end up on
//! [`Request::claims`](crate::request::Request).

use crate::error::{Error, Result};
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::router::normalize_path;
use async_trait::async_trait;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Authentication Configuration (JWT)
#[derive(Clone)]
pub struct AuthConfig {
    /// JWT decoding key
    pub decoding_key: DecodingKey,
    /// JWT encoding key, used by [`AuthConfig::issue`]
    pub encoding_key: EncodingKey,
    /// JWT validation settings
    pub validation: Validation,
}

impl AuthConfig {
    /// Create auth config from shared secret
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Accept tokens without an `exp` claim
    #[must_use]
    pub fn without_expiry(mut self) -> Self {
        self.validation.validate_exp = false;
        self.validation.required_spec_claims.clear();
        self
    }

    /// Sign claims into an HS256 token
    ///
    /// # Errors
    ///
    /// Returns a 500 `Error::HttpStatus` if the claims cannot be encoded.
    pub fn issue<T: Serialize>(&self, claims: &T) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| Error::internal(format!("Token encoding failed: {e}")))
    }

    /// Verify a token and return its claims
    ///
    /// # Errors
    ///
    /// Returns a 401 `Error::HttpStatus` for a malformed, expired or
    /// wrongly signed token.
    pub fn verify(&self, token: &str) -> Result<Value> {
        decode::<Value>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                warn!(error = %e, "JWT validation failed");
                Error::unauthorized("Unauthorized")
            })
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

/// Middleware requiring a bearer token on non-public paths
///
/// Public paths are exact matches, or prefixes when written with a trailing
/// `/*` (`/docs/*` covers `/docs` and everything below it).
#[derive(Debug, Clone)]
pub struct BearerAuthMiddleware {
    config: AuthConfig,
    public_paths: Vec<String>,
}

impl BearerAuthMiddleware {
    /// Create the middleware from a shared secret
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self::from_config(AuthConfig::new(secret))
    }

    /// Create the middleware from an existing config
    #[must_use]
    pub const fn from_config(config: AuthConfig) -> Self {
        Self {
            config,
            public_paths: Vec::new(),
        }
    }

    /// Let a path through without a token
    #[must_use]
    pub fn public(mut self, path: &str) -> Self {
        self.public_paths.push(path.to_string());
        self
    }

    /// The verification config
    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    fn is_public(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.public_paths.iter().any(|p| match p.strip_suffix("/*") {
            Some(prefix) => {
                let prefix = normalize_path(prefix);
                path == prefix || prefix == "/" || path.starts_with(&format!("{prefix}/"))
            }
            None => normalize_path(p) == path,
        })
    }
}

#[async_trait]
impl Middleware for BearerAuthMiddleware {
    async fn process(&self, mut req: Request, next: Next) -> Result<Response> {
        if self.is_public(&req.path) {
            return next.run(req).await;
        }

        let token = req
            .header("authorization")
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::unauthorized("Missing or invalid Authorization header"))?;

        req.claims = Some(self.config.verify(token)?);
        next.run(req).await
    }

    fn name(&self) -> &'static str {
        "BearerAuthMiddleware"
    }
}
