//! HTTP surface of the installer
//!
//! Static pages, the install routes, the progress stream and `/exit`.
//! Handlers only ever reach the process through [`Installer`] and the
//! `Lifecycle` it carries.

mod auth;
mod events;
mod handlers;
pub mod signals;

pub use auth::{SECRET_HEADER, SharedSecret};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::services::{ServeDir, ServeFile};

use crate::config::InstallerConfig;
use crate::install::Installer;

/// How long open connections (event streams included) get to finish after
/// a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    pub installer: Arc<Installer>,
    pub upload_dir: PathBuf,
    pub frontend_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub secret: Option<SharedSecret>,
}

impl AppState {
    pub fn new(cfg: &InstallerConfig, installer: Arc<Installer>, secret: Option<String>) -> Self {
        Self {
            installer,
            upload_dir: cfg.upload_dir(),
            frontend_dir: cfg.frontend_dir.clone(),
            max_upload_bytes: cfg.max_upload_bytes(),
            secret: secret.as_deref().map(SharedSecret::new),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/uploader", post(handlers::uploader))
        .route("/download", post(handlers::download))
        .route("/upload", post(handlers::upload))
        .route("/exit", post(handlers::exit))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_secret,
        ))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes));

    let frontend = state.frontend_dir.clone();
    Router::new()
        .route_service("/", ServeFile::new(frontend.join("index.html")))
        .route_service("/license", ServeFile::new(frontend.join("license.html")))
        .nest_service("/assets", ServeDir::new(frontend.join("assets")))
        .route("/events", get(events::stream))
        .route("/status", get(handlers::status))
        .merge(protected)
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(log_requests))
                .layer(CatchPanicLayer::new()),
        )
        .with_state(state)
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    log::info!(
        "{method} {path} -> {} ({} ms)",
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

/// Bind the listener and serve until SIGINT/SIGTERM.
pub async fn serve(cfg: &InstallerConfig, state: AppState) -> Result<()> {
    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    log::info!(
        "foundry-installer listening on http://{}",
        listener.local_addr().context("Listener has no local address")?
    );

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let app = router(state);
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.changed().await;
            })
            .await
    });

    tokio::select! {
        finished = &mut server => {
            finished.context("HTTP server task failed")?.context("HTTP server failed")?;
            return Ok(());
        }
        () = signals::wait_for_shutdown() => {}
    }

    stop_tx.send_replace(true);
    match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
        Ok(finished) => {
            finished
                .context("HTTP server task failed")?
                .context("HTTP server failed")?;
            log::info!("HTTP server stopped");
        }
        Err(_) => {
            log::warn!(
                "Connections still open after {}s, closing them",
                SHUTDOWN_GRACE.as_secs()
            );
            server.abort();
        }
    }
    Ok(())
}
