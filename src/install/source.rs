//! Install sources and download-link validation
//!
//! Links are parsed as URLs and accepted only when their host exactly matches
//! the allow-list; pattern matching on the raw string is never used.

use std::path::PathBuf;

use url::Url;

use crate::error::{InstallError, Result};

/// What the operator asked us to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallRequest {
    /// A signed download link, not yet validated
    Url(String),
    /// An archive already received into the upload scratch directory
    File(UploadedFile),
}

impl InstallRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            InstallRequest::Url(_) => "url",
            InstallRequest::File(_) => "file",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub file_name: Option<String>,
    pub size: u64,
}

/// Which links are acceptable.
#[derive(Debug, Clone)]
pub struct SourcePolicy {
    allowed_hosts: Vec<String>,
    allow_http: bool,
}

impl SourcePolicy {
    pub fn new<I, S>(allowed_hosts: I, allow_http: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_hosts: allowed_hosts
                .into_iter()
                .map(|h| h.as_ref().trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
            allow_http,
        }
    }

    pub fn allowed_hosts(&self) -> &[String] {
        &self.allowed_hosts
    }

    /// Validate `candidate` and return it normalised.
    pub fn validate(&self, candidate: &str) -> Result<Url> {
        let trimmed = candidate.trim();
        let mut url = Url::parse(trimmed)
            .map_err(|e| InstallError::invalid_source(trimmed, format!("malformed URL ({e})")))?;

        match url.scheme() {
            "https" => {}
            "http" if self.allow_http => {}
            other => {
                return Err(InstallError::invalid_source(
                    trimmed,
                    format!("scheme '{other}' is not allowed"),
                ));
            }
        }

        if !url.username().is_empty() || url.password().is_some() {
            return Err(InstallError::invalid_source(
                trimmed,
                "embedded credentials are not allowed",
            ));
        }

        let host = url
            .host_str()
            .ok_or_else(|| InstallError::invalid_source(trimmed, "URL has no host"))?
            .to_ascii_lowercase();

        if !self.allowed_hosts.iter().any(|allowed| *allowed == host) {
            return Err(InstallError::invalid_source(
                trimmed,
                format!("host '{host}' is not allowed"),
            ));
        }

        url.set_fragment(None);
        Ok(url)
    }
}

/// Validate a download link against `policy`.
pub fn validate_source(candidate: &str, policy: &SourcePolicy) -> Result<Url> {
    policy.validate(candidate)
}
