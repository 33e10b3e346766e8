//! # sprig demo
//!
//! A small users API exercising routing, middleware, JWT auth, the query
//! builder and models against SQLite.

use anyhow::Context;
use clap::Parser;
use serde_json::{json, Value};
use sprig_core::{
    App, BearerAuthMiddleware, CorsMiddleware, DatabaseConfig, DatabasePool, Error, Executor,
    Json, LoggingMiddleware, ModelDef, Params, Request, Response, ServerConfig, TimingMiddleware,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command line options
#[derive(Debug, Parser)]
#[command(name = "sprig", version, about = "sprig demo users API")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "SPRIG_ADDR", default_value = "127.0.0.1:8000")]
    addr: SocketAddr,

    /// Database connection URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite::memory:")]
    database_url: String,

    /// Max request body size in bytes
    #[arg(long, env = "SPRIG_MAX_BODY", default_value_t = 1024 * 1024)]
    max_body: usize,

    /// HS256 secret; enables bearer auth on write routes when set
    #[arg(long, env = "SPRIG_JWT_SECRET")]
    jwt_secret: Option<String>,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    created_at TEXT,
    updated_at TEXT
)";

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("sprig=info".parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

fn db(req: &Request) -> sprig_core::Result<Arc<dyn Executor>> {
    req.state().db()
}

fn user_id(req: &Request) -> sprig_core::Result<i64> {
    req.params()
        .get_int("id")
        .ok_or_else(|| Error::bad_request("id must be an integer"))
}

fn users() -> ModelDef {
    ModelDef::new("users")
}

async fn list_users(req: Request) -> sprig_core::Result<Value> {
    let db = db(&req)?;
    let page = req.query("page").and_then(|p| p.parse().ok()).unwrap_or(1);

    let mut query = users().query(&db);
    if let Some(search) = req.query("q") {
        query.where_like("name", format!("%{search}%"));
    }
    // count() resets the builder, so count on a copy.
    let total = query.clone().count().await?;
    let rows = query.order_by("id", "asc")?.paginate(page, 20).get().await?;

    Ok(json!({ "data": rows, "total": total, "page": page }))
}

async fn show_user(req: Request) -> sprig_core::Result<Json<sprig_core::Entity>> {
    let db = db(&req)?;
    users()
        .find(&db, user_id(&req)?)
        .await?
        .map(Json)
        .ok_or_else(|| Error::not_found("User not found"))
}

async fn create_user(req: Request) -> sprig_core::Result<Response> {
    let db = db(&req)?;
    let name = required(&req, "name")?;
    let email = required(&req, "email")?;

    let user = users()
        .create(&db, [("name", name), ("email", email)])
        .await?;
    Ok(Response::json(&user)?.with_status(201))
}

async fn update_user(req: Request) -> sprig_core::Result<Json<sprig_core::Entity>> {
    let db = db(&req)?;
    let mut user = users()
        .find(&db, user_id(&req)?)
        .await?
        .ok_or_else(|| Error::not_found("User not found"))?;

    for field in ["name", "email"] {
        if let Some(Value::String(value)) = req.input(field) {
            user.set(field, value);
        }
    }
    user.save(&db).await?;
    Ok(Json(user))
}

async fn delete_user(req: Request) -> sprig_core::Result<Response> {
    let db = db(&req)?;
    let deleted = users()
        .query(&db)
        .where_eq("id", user_id(&req)?)
        .delete()
        .await?;
    if deleted == 0 {
        return Err(Error::not_found("User not found"));
    }
    Ok(Response::empty(204))
}

fn required(req: &Request, field: &str) -> sprig_core::Result<String> {
    match req.input(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
        _ => Err(Error::unprocessable(format!("{field} is required"))),
    }
}

fn build_app(db: Arc<dyn Executor>, jwt_secret: Option<&str>) -> sprig_core::Result<App> {
    let mut app = App::new();
    app.state().set_executor(db);

    app.middleware(LoggingMiddleware::new())
        .middleware(TimingMiddleware::new())
        .middleware(CorsMiddleware::new());

    if let Some(secret) = jwt_secret {
        // Reads stay public; writes need a token.
        app.middleware_fn({
            let auth = Arc::new(BearerAuthMiddleware::new(secret));
            move |req, next| {
                let auth = Arc::clone(&auth);
                async move {
                    if req.method == sprig_core::Method::Get {
                        next.run(req).await
                    } else {
                        sprig_core::Middleware::process(auth.as_ref(), req, next).await
                    }
                }
            }
        });
    }

    app.get("/", |_req| async { Ok(json!({ "name": "sprig", "version": sprig_core::VERSION })) })?
        .get("/users", list_users)?
        .get("/users/{id}", show_user)?
        .post("/users", create_user)?
        .put("/users/{id}", update_user)?
        .delete("/users/{id}", delete_user)?;

    app.error_handler(404, |e| {
        Response::json_str(json!({ "error": e.to_string() }).to_string()).with_status(404)
    });

    Ok(app)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    let args = Args::parse();

    let db_config = DatabaseConfig::new(&args.database_url)?.with_max_connections(
        // Every in-memory SQLite connection is a separate database.
        if args.database_url.contains(":memory:") { 1 } else { 10 },
    );
    let pool = DatabasePool::connect(&db_config)
        .await
        .context("connecting to the database")?;

    let executor: Arc<dyn Executor> = Arc::new(pool);
    users()
        .query(&executor)
        .raw(SCHEMA, Params::new())
        .await
        .context("creating the users table")?;

    let app = build_app(executor, args.jwt_secret.as_deref())?;
    let config = ServerConfig::default()
        .with_address(args.addr)
        .with_max_body_size(args.max_body);

    info!(addr = %args.addr, "Starting sprig demo");
    sprig_core::serve(app, config).await?;
    Ok(())
}
