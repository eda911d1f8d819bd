//! Shared helpers for in-process HTTP tests

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect};
use axum::routing::get;
use futures::StreamExt;
use futures::stream;
use tokio::net::TcpListener;

use crate::config::InstallerConfig;

pub const TEN_KB: usize = 10 * 1024;

/// Deterministic, non-repeating-looking test payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Config rooted in `dir` that accepts plain-http links to 127.0.0.1.
pub fn test_config(dir: &Path) -> InstallerConfig {
    let cfg = InstallerConfig {
        host: "127.0.0.1".into(),
        data_dir: dir.to_path_buf(),
        allowed_hosts: vec!["127.0.0.1".into()],
        allow_http: true,
        exit_delay_ms: 50,
        connect_timeout_secs: 2,
        inactivity_timeout_secs: 2,
        fetch_timeout_secs: 5,
        max_upload_mb: 4,
        ..Default::default()
    };
    cfg.ensure_directories().unwrap();
    cfg
}

pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Stand-in for the release host.
pub fn release_host() -> Router {
    Router::new()
        .route("/releases/ok.zip", get(|| async { payload(TEN_KB) }))
        .route("/releases/other.zip", get(|| async { payload(TEN_KB * 3) }))
        .route("/releases/large.zip", get(|| async { payload(1024 * 1024 + 17) }))
        .route(
            "/releases/moved.zip",
            get(|| async { Redirect::temporary("/releases/ok.zip") }),
        )
        .route(
            "/releases/error.zip",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream broke") }),
        )
        .route(
            "/releases/forbidden.zip",
            get(|| async { (StatusCode::FORBIDDEN, "Request has expired") }),
        )
        .route("/releases/empty.zip", get(|| async { StatusCode::OK }))
        .route(
            "/releases/reset.zip",
            get(|| async {
                let chunks: Vec<Result<Bytes, io::Error>> = vec![
                    Ok(Bytes::from(payload(4096))),
                    Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
                ];
                Body::from_stream(stream::iter(chunks)).into_response()
            }),
        )
        .route(
            "/releases/slow.zip",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                payload(16)
            }),
        )
        .route(
            "/releases/stalled.zip",
            get(|| async {
                let first = stream::once(async { Ok::<_, Infallible>(Bytes::from(payload(64))) });
                let late = stream::once(async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok::<_, Infallible>(Bytes::from(payload(64)))
                });
                Body::from_stream(first.chain(late)).into_response()
            }),
        )
}
