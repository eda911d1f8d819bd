//! Archive fetching
//!
//! `ArchiveFetcher` places the Destination Archive on disk, either by
//! streaming it from a validated link or by moving an upload into place.
//!
//! ## Module Organization
//!
//! - `core` - streaming download with timeouts and progress
//! - `upload` - copy of an already received upload
//! - `extract` - optional unpacking of the installed zip

mod core;
mod extract;
mod upload;

pub use extract::extract_zip;
pub(crate) use self::core::redact;

use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::InstallerConfig;

/// Timeout budget for link downloads
#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    /// Initial TCP/TLS connection
    pub connect_timeout: Duration,
    /// Longest gap between two received chunks
    pub inactivity_timeout: Duration,
    /// Whole request, headers through last byte
    pub total_timeout: Duration,
}

impl From<&InstallerConfig> for FetchSettings {
    fn from(cfg: &InstallerConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
            inactivity_timeout: Duration::from_secs(cfg.inactivity_timeout_secs),
            total_timeout: Duration::from_secs(cfg.fetch_timeout_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    client: reqwest::Client,
    inactivity_timeout: Duration,
    total_timeout: Duration,
}

impl ArchiveFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .user_agent(concat!("foundry-installer/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            inactivity_timeout: settings.inactivity_timeout,
            total_timeout: settings.total_timeout,
        })
    }
}
