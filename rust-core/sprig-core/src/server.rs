//! # HTTP Server
//!
//! HTTP/1.1 transport built on Hyper and Tokio. Converts each connection's
//! requests into [`Request`] values, hands them to [`App::dispatch`] and
//! writes the responses back.
//!
//! ## Key Features
//!
//! - Async request handling with Tokio runtime
//! - Graceful shutdown on Ctrl-C with a bounded drain
//! - Connection keep-alive support
//! - Request body size limit

use crate::app::App;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Serve `app` until Ctrl-C, then drain in-flight connections
///
/// # Errors
///
/// Returns `Error::BindError` if the address cannot be bound, or
/// `Error::Io` if accepting connections fails.
pub async fn serve(app: App, config: ServerConfig) -> Result<()> {
    let addr = config.address;
    let listener = bind(addr)?;
    info!(%addr, routes = app.router().len(), "Server listening on http://{}", addr);

    let app = Arc::new(app);
    let active = Arc::new(AtomicUsize::new(0));
    let max_body_size = config.max_body_size;
    let keep_alive = config.keep_alive;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                let (stream, remote_addr) = accept_result?;
                let io = TokioIo::new(stream);
                let app = Arc::clone(&app);
                let active = Arc::clone(&active);

                tokio::task::spawn(async move {
                    active.fetch_add(1, Ordering::Relaxed);

                    let service = service_fn(move |req| {
                        let app = Arc::clone(&app);
                        async move {
                            Ok::<_, std::convert::Infallible>(
                                handle_request(req, &app, remote_addr, max_body_size).await,
                            )
                        }
                    });

                    if let Err(err) = http1::Builder::new()
                        .keep_alive(keep_alive)
                        .serve_connection(io, service)
                        .await
                    {
                        error!(error = ?err, %remote_addr, "Error serving connection");
                    }
                    active.fetch_sub(1, Ordering::Relaxed);
                });
            }
            () = &mut shutdown => {
                info!("Shutdown signal received, stopping server...");
                break;
            }
        }
    }

    let drain = async {
        while active.load(Ordering::Relaxed) > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };
    if tokio::time::timeout(config.shutdown_timeout, drain).await.is_err() {
        warn!(
            remaining = active.load(Ordering::Relaxed),
            "Shutdown timeout elapsed with open connections"
        );
    }
    Ok(())
}

fn bind(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    let bind_error = |source| Error::BindError {
        address: addr.to_string(),
        source,
    };

    let socket = if addr.is_ipv4() {
        tokio::net::TcpSocket::new_v4()
    } else {
        tokio::net::TcpSocket::new_v6()
    }
    .map_err(bind_error)?;
    socket.set_reuseaddr(true).map_err(bind_error)?;
    socket.bind(addr).map_err(bind_error)?;
    socket.listen(1024).map_err(bind_error)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl-C handler, shutdown signal disabled");
        std::future::pending::<()>().await;
    }
}

async fn handle_request(
    req: hyper::Request<hyper::body::Incoming>,
    app: &App,
    remote_addr: SocketAddr,
    max_body_size: usize,
) -> hyper::Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let version = req.version();

    let response = match Request::from_hyper_with_limit(req, max_body_size).await {
        Ok(mut request) => {
            request.set_header("x-client-ip", &remote_addr.ip().to_string());
            app.dispatch(request).await
        }
        Err(e) => reject(&e),
    };

    info!(
        "    {} - \"{} {} {:?}\" {}",
        remote_addr, method, path, version, response.status
    );
    response.into_hyper()
}

/// Response for requests that never reach the app
fn reject(e: &Error) -> Response {
    let status = match e {
        Error::PayloadTooLarge { .. } => 413,
        Error::HttpStatus { status, .. } => *status,
        _ => {
            error!(error = %e, "Failed to parse request");
            400
        }
    };
    let body = serde_json::json!({ "error": { "code": status, "message": e.to_string() } });
    Response::json_str(body.to_string()).with_status(status)
}
