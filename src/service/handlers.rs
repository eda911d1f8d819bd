//! Install, exit and status handlers

use std::path::Path;

use axum::Json;
use axum::extract::multipart::Field;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::AppState;
use crate::error::{InstallError, Result};
use crate::install::{InFlightGuard, InstallOutcome, InstallRequest, UploadedFile, discard_upload};
use crate::progress::ProgressEvent;

/// JSON body of a link install. `url` is accepted as an alias.
#[derive(Debug, Deserialize)]
pub struct LinkBody {
    #[serde(alias = "url")]
    pub foundry: Option<String>,
}

/// `POST /uploader`: JSON link or multipart form, picked by `Content-Type`.
pub async fn uploader(
    State(state): State<AppState>,
    req: Request,
) -> Result<Json<InstallOutcome>> {
    let guard = state.installer.begin()?;
    let content_type = content_type(&req);

    let request = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(req, &state)
            .await
            .map_err(|e| InstallError::malformed_request(e.body_text()))?;
        receive_multipart(&state.upload_dir, multipart).await?
    } else if content_type.starts_with("application/json") {
        link_request(parse_json(req, &state).await?)?
    } else if content_type.is_empty() {
        return Err(InstallError::UploadMissing);
    } else {
        return Err(InstallError::malformed_request(format!(
            "unsupported content type {content_type}"
        )));
    };

    run(&state, guard, request).await
}

/// `POST /download`: JSON link only.
pub async fn download(
    State(state): State<AppState>,
    req: Request,
) -> Result<Json<InstallOutcome>> {
    let guard = state.installer.begin()?;
    if content_type(&req).is_empty() {
        return Err(InstallError::UploadMissing);
    }
    let request = link_request(parse_json(req, &state).await?)?;
    run(&state, guard, request).await
}

/// `POST /upload`: multipart only.
pub async fn upload(
    State(state): State<AppState>,
    req: Request,
) -> Result<Json<InstallOutcome>> {
    let guard = state.installer.begin()?;
    if content_type(&req).is_empty() {
        return Err(InstallError::UploadMissing);
    }
    let multipart = Multipart::from_request(req, &state)
        .await
        .map_err(|e| InstallError::malformed_request(e.body_text()))?;
    let request = receive_multipart(&state.upload_dir, multipart).await?;
    run(&state, guard, request).await
}

pub async fn exit(State(state): State<AppState>) -> &'static str {
    log::info!("Exit requested");
    state
        .installer
        .lifecycle()
        .terminate(state.installer.exit_delay());
    "success"
}

pub async fn status(State(state): State<AppState>) -> Json<ProgressEvent> {
    Json(state.installer.progress().current())
}

async fn run(
    state: &AppState,
    guard: InFlightGuard,
    request: InstallRequest,
) -> Result<Json<InstallOutcome>> {
    state
        .installer
        .install_guarded(guard, request)
        .await
        .map(Json)
}

/// Lowercased `Content-Type`, empty when absent.
fn content_type(req: &Request) -> String {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

async fn parse_json(req: Request, state: &AppState) -> Result<LinkBody> {
    let Json(body) = Json::<LinkBody>::from_request(req, state)
        .await
        .map_err(|e| InstallError::malformed_request(e.body_text()))?;
    Ok(body)
}

fn link_request(body: LinkBody) -> Result<InstallRequest> {
    match body.foundry {
        Some(link) if !link.trim().is_empty() => Ok(InstallRequest::Url(link)),
        _ => Err(InstallError::UploadMissing),
    }
}

/// Read every field; files go to the upload directory, a `foundry` (or
/// `url`) text field is taken as a link. A non-empty file wins over a link;
/// empty files are dropped.
async fn receive_multipart(upload_dir: &Path, mut multipart: Multipart) -> Result<InstallRequest> {
    let mut link: Option<String> = None;
    let mut uploads: Vec<UploadedFile> = Vec::new();

    let read = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| InstallError::malformed_request(e.body_text()))?
        {
            if field.file_name().is_some() {
                uploads.push(receive_file(upload_dir, field).await?);
            } else if matches!(field.name(), Some("foundry" | "url")) {
                let text = field
                    .text()
                    .await
                    .map_err(|e| InstallError::malformed_request(e.body_text()))?;
                if !text.trim().is_empty() {
                    link = Some(text);
                }
            }
        }
        Ok::<_, InstallError>(())
    };
    let result = read.await;

    let chosen = match (&result, uploads.iter().position(|f| f.size > 0)) {
        (Ok(()), Some(i)) => Some(uploads.swap_remove(i)),
        _ => None,
    };
    for leftover in &uploads {
        discard_upload(&leftover.path).await;
    }
    result?;

    match (chosen, link) {
        (Some(file), _) => Ok(InstallRequest::File(file)),
        (None, Some(link)) => Ok(InstallRequest::Url(link)),
        (None, None) => Err(InstallError::UploadMissing),
    }
}

async fn receive_file(upload_dir: &Path, mut field: Field<'_>) -> Result<UploadedFile> {
    let file_name = field.file_name().map(str::to_string);
    let path = upload_dir.join(format!("upload-{}.bin", Uuid::new_v4()));

    let mut out = tokio::fs::File::create(&path)
        .await
        .map_err(|e| InstallError::write_failed(&path, e))?;

    let mut size = 0u64;
    let copied = async {
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| InstallError::malformed_request(e.body_text()))?
        {
            out.write_all(&chunk)
                .await
                .map_err(|e| InstallError::write_failed(&path, e))?;
            size += chunk.len() as u64;
        }
        out.flush()
            .await
            .map_err(|e| InstallError::write_failed(&path, e))
    }
    .await;

    if let Err(e) = copied {
        drop(out);
        discard_upload(&path).await;
        return Err(e);
    }

    log::info!(
        "Received upload {} ({size} bytes) into {}",
        file_name.as_deref().unwrap_or("<unnamed>"),
        path.display()
    );
    Ok(UploadedFile {
        path,
        file_name,
        size,
    })
}
