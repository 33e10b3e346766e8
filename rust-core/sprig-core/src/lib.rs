//! # Sprig Core
//!
//! Core library for the sprig micro web framework.
//! Provides routing, the middleware pipeline, request/response types, an
//! HTTP server and a fluent SQL query builder with an sqlx executor.
//!
//! ## Architecture
//!
//! Everything is wired explicitly: an [`App`] owns its router, middleware
//! and state; a [`QueryBuilder`] owns the [`Executor`] it runs against.
//! There are no process-wide registries.
//!
//! ## Modules
//!
//! - `pattern` - Path template compilation (`/users/{id}`, `/posts/{id?}`)
//! - `router` - Ordered, first-match-wins route table
//! - `route` - Route metadata and information
//! - `params` - Captured path parameters
//! - `middleware` - Onion-style middleware chain and built-in middleware
//! - `auth` - Bearer JWT authentication middleware
//! - `request` / `response` - HTTP request and response values
//! - `app` - Application wiring and error handling
//! - `server` - HTTP server built on Hyper
//! - `condition` / `query` - Fluent SQL building with named placeholders
//! - `executor` - Database executor abstraction
//! - `database` - SQLx executor (SQLite, PostgreSQL)
//! - `model` - Active-record style models
//! - `value` - Database values and rows
//! - `state` - Thread-safe application state
//! - `json` - JSON parsing with simd-json
//! - `config` - Server and database configuration
//! - `error` - Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod app;
pub mod auth;
pub mod condition;
pub mod config;
pub mod database;
pub mod error;
pub mod executor;
pub mod json;
pub mod middleware;
pub mod model;
pub mod params;
pub mod pattern;
pub mod query;
pub mod request;
pub mod response;
pub mod route;
pub mod router;
pub mod server;
pub mod state;
pub mod value;

pub use app::{handler, App, Handler};
pub use auth::{AuthConfig, BearerAuthMiddleware};
pub use condition::{Condition, Connective};
pub use config::{env, DatabaseConfig, Driver, EnvValue, ServerConfig};
pub use database::{DatabasePool, DbTransaction};
pub use error::{Error, Result};
pub use executor::{CompiledQuery, Executor, Params};
pub use json::{parse_json, to_json};
pub use middleware::{
    from_fn, CorsMiddleware, LoggingMiddleware, Middleware, MiddlewareChain, Next,
    RequestHandler, TimingMiddleware,
};
pub use model::{Entity, ModelDef};
pub use params::PathParams;
pub use pattern::PathPattern;
pub use query::{Direction, JoinKind, QueryBuilder};
pub use request::Request;
pub use response::{IntoResponse, Json, Response};
pub use route::Route;
pub use router::{Match, Method, Router};
pub use server::serve;
pub use state::AppState;
pub use value::{DbValue, Row};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
