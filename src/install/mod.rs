//! Archive installation
//!
//! [`Installer`] is the single entry point used by the HTTP layer: it checks
//! the single-flight guard, validates the source, places the Destination
//! Archive, optionally unpacks it, reports each stage to the
//! [`ProgressNotifier`] and finally asks the [`Lifecycle`] to end the process.
//! A failed installation leaves the process running so the operator can retry.

mod download;
mod guard;
mod source;
mod staging;

pub use download::{ArchiveFetcher, FetchSettings, extract_zip};
pub use guard::{InFlightGuard, SingleFlight};
pub use source::{InstallRequest, SourcePolicy, UploadedFile, validate_source};
pub use staging::StagedFile;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::InstallerConfig;
use crate::error::{InstallError, Result};
use crate::lifecycle::Lifecycle;
use crate::progress::{ProgressNotifier, Stage};

/// Body of a successful install response
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InstallOutcome {
    pub status: &'static str,
    pub message: String,
    pub bytes: u64,
    pub destination: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_entries: Option<usize>,
}

pub struct Installer {
    fetcher: ArchiveFetcher,
    policy: SourcePolicy,
    destination: PathBuf,
    extract_dir: Option<PathBuf>,
    exit_delay: Duration,
    progress: ProgressNotifier,
    lifecycle: Arc<dyn Lifecycle>,
    flight: SingleFlight,
}

impl Installer {
    pub fn new(
        cfg: &InstallerConfig,
        progress: ProgressNotifier,
        lifecycle: Arc<dyn Lifecycle>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            fetcher: ArchiveFetcher::new(FetchSettings::from(cfg))?,
            policy: SourcePolicy::new(&cfg.allowed_hosts, cfg.allow_http),
            destination: cfg.archive_path(),
            extract_dir: cfg.extract_dir.clone(),
            exit_delay: cfg.exit_delay(),
            progress,
            lifecycle,
            flight: SingleFlight::default(),
        })
    }

    pub fn progress(&self) -> &ProgressNotifier {
        &self.progress
    }

    pub fn lifecycle(&self) -> &Arc<dyn Lifecycle> {
        &self.lifecycle
    }

    pub fn destination(&self) -> &PathBuf {
        &self.destination
    }

    pub fn exit_delay(&self) -> Duration {
        self.exit_delay
    }

    pub fn is_busy(&self) -> bool {
        self.flight.is_busy()
    }

    /// Claim the single-flight slot before doing any expensive work
    /// (such as receiving an upload body).
    ///
    /// Once an exit is scheduled nothing new is started: the process would
    /// die mid-transfer.
    pub fn begin(&self) -> Result<InFlightGuard> {
        if self.lifecycle.is_terminating() {
            return Err(InstallError::ShuttingDown);
        }
        self.flight.try_acquire()
    }

    /// Run one installation, rejecting it if another is in flight.
    pub async fn install(&self, request: InstallRequest) -> Result<InstallOutcome> {
        let guard = match self.begin() {
            Ok(guard) => guard,
            Err(e) => {
                if let InstallRequest::File(upload) = &request {
                    discard_upload(&upload.path).await;
                }
                return Err(e);
            }
        };
        self.install_guarded(guard, request).await
    }

    /// Run one installation while holding `guard`.
    pub async fn install_guarded(
        &self,
        _guard: InFlightGuard,
        request: InstallRequest,
    ) -> Result<InstallOutcome> {
        log::info!("Received {} install request", request.kind());

        match self.run(request).await {
            Ok(outcome) => {
                self.progress
                    .update(Stage::Complete, outcome.message.clone(), Some(100));
                log::info!("{}", outcome.message);
                self.lifecycle.terminate(self.exit_delay);
                Ok(outcome)
            }
            Err(e) => {
                self.progress.update(Stage::Error, e.to_string(), None);
                Err(e)
            }
        }
    }

    async fn run(&self, request: InstallRequest) -> Result<InstallOutcome> {
        let (bytes, message) = match request {
            InstallRequest::Url(raw) => {
                if raw.trim().is_empty() {
                    return Err(InstallError::UploadMissing);
                }
                let url = validate_source(&raw, &self.policy)?;
                log::info!("Download link is valid: {}", download::redact(&url));
                self.progress
                    .update(Stage::Downloading, "Downloading archive...", Some(0));
                let bytes = self
                    .fetcher
                    .stream_from_url(&url, &self.destination, &self.progress)
                    .await?;
                (
                    bytes,
                    format!("Downloaded archive from {}", download::redact(&url)),
                )
            }
            InstallRequest::File(upload) => {
                self.progress
                    .update(Stage::Downloading, "Storing uploaded archive...", Some(0));
                let bytes = self
                    .fetcher
                    .copy_from_upload(&upload.path, &self.destination, &self.progress)
                    .await?;
                let name = upload.file_name.as_deref().unwrap_or("upload");
                (bytes, format!("Stored uploaded archive {name}"))
            }
        };

        let extracted_entries = match &self.extract_dir {
            Some(dir) => {
                self.progress
                    .update(Stage::Extracting, "Extracting archive...", None);
                Some(extract_zip(&self.destination, dir).await?)
            }
            None => None,
        };

        Ok(InstallOutcome {
            status: "success",
            message,
            bytes,
            destination: self.destination.clone(),
            extracted_entries,
        })
    }
}

pub(crate) async fn discard_upload(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        log::warn!("Failed to remove upload {}: {e}", path.display());
    }
}
