use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, InstallError>;

/// Every way an install or shutdown request can fail.
///
/// Each variant maps to one HTTP status in [`InstallError::status`]; the
/// `Display` text is what the operator sees in the browser.
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Invalid source URL '{url}': {reason}")]
    InvalidSource { url: String, reason: String },

    #[error("No download link or uploaded file was provided")]
    UploadMissing,

    #[error("Malformed request: {message}")]
    MalformedRequest { message: String },

    #[error("Download failed: {message}")]
    FetchFailed { message: String },

    #[error("Download timed out: {message}")]
    FetchTimeout { message: String },

    #[error("Failed to write {}: {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Extraction failed: {message}")]
    ExtractFailed { message: String },

    #[error("An installation is already in progress")]
    AlreadyInProgress,

    #[error("Missing or incorrect admin password")]
    Unauthorized,

    #[error("The installer is shutting down")]
    ShuttingDown,
}

impl InstallError {
    pub fn invalid_source<U: Into<String>, R: Into<String>>(url: U, reason: R) -> Self {
        InstallError::InvalidSource {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed_request<S: Into<String>>(message: S) -> Self {
        InstallError::MalformedRequest {
            message: message.into(),
        }
    }

    pub fn fetch_failed<S: Into<String>>(message: S) -> Self {
        InstallError::FetchFailed {
            message: message.into(),
        }
    }

    pub fn fetch_timeout<S: Into<String>>(message: S) -> Self {
        InstallError::FetchTimeout {
            message: message.into(),
        }
    }

    pub fn write_failed<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        InstallError::WriteFailed {
            path: path.into(),
            source,
        }
    }

    pub fn extract_failed<S: Into<String>>(message: S) -> Self {
        InstallError::ExtractFailed {
            message: message.into(),
        }
    }

    /// Status code reported to the browser for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            InstallError::InvalidSource { .. }
            | InstallError::UploadMissing
            | InstallError::MalformedRequest { .. } => StatusCode::BAD_REQUEST,
            InstallError::Unauthorized => StatusCode::UNAUTHORIZED,
            InstallError::AlreadyInProgress => StatusCode::CONFLICT,
            InstallError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            InstallError::FetchFailed { .. } => StatusCode::BAD_GATEWAY,
            InstallError::FetchTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            InstallError::WriteFailed { .. } | InstallError::ExtractFailed { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether the caller sent something wrong (as opposed to the server failing).
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

impl IntoResponse for InstallError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.is_client_error() || matches!(self, InstallError::ShuttingDown) {
            log::warn!("Request rejected ({status}): {self}");
        } else {
            log::error!("Request failed ({status}): {self}");
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn taxonomy_maps_to_expected_status_codes() {
        let io = || std::io::Error::other("disk full");
        let cases = [
            (InstallError::invalid_source("x", "bad"), 400),
            (InstallError::UploadMissing, 400),
            (InstallError::malformed_request("bad json"), 400),
            (InstallError::Unauthorized, 401),
            (InstallError::AlreadyInProgress, 409),
            (InstallError::ShuttingDown, 503),
            (InstallError::fetch_failed("reset"), 502),
            (InstallError::fetch_timeout("slow"), 504),
            (InstallError::write_failed("/tmp/x", io()), 500),
            (InstallError::extract_failed("corrupt"), 500),
        ];
        for (err, code) in cases {
            assert_eq!(err.status().as_u16(), code, "{err}");
            assert_eq!(err.is_client_error(), code < 500, "{err}");
        }
    }

    #[tokio::test]
    async fn response_body_is_the_plain_text_message() {
        let response = InstallError::invalid_source("https://evil.example.com/x.zip", "host not allowed")
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(&body),
            "Invalid source URL 'https://evil.example.com/x.zip': host not allowed"
        );
    }
}
