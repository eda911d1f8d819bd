//! Moving a received upload into place

use std::io::ErrorKind;
use std::path::Path;

use super::ArchiveFetcher;
use crate::error::{InstallError, Result};
use crate::install::staging::StagedFile;
use crate::progress::{ProgressNotifier, Stage};

impl ArchiveFetcher {
    /// Copy `upload` over `destination` with the same staging discipline as
    /// downloads. The upload file is deleted afterwards whatever the outcome.
    pub async fn copy_from_upload(
        &self,
        upload: &Path,
        destination: &Path,
        progress: &ProgressNotifier,
    ) -> Result<u64> {
        let result = copy_into_place(upload, destination, progress).await;

        match tokio::fs::remove_file(upload).await {
            Ok(()) => log::debug!("Removed upload {}", upload.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove upload {}: {e}", upload.display()),
        }

        result
    }
}

async fn copy_into_place(
    upload: &Path,
    destination: &Path,
    progress: &ProgressNotifier,
) -> Result<u64> {
    let mut source = tokio::fs::File::open(upload)
        .await
        .map_err(|e| InstallError::write_failed(upload, e))?;
    let size = source
        .metadata()
        .await
        .map_err(|e| InstallError::write_failed(upload, e))?
        .len();
    if size == 0 {
        return Err(InstallError::UploadMissing);
    }

    progress.update(
        Stage::Downloading,
        format!("Storing uploaded archive ({:.1} MB)", size as f64 / 1_048_576.0),
        Some(50),
    );

    let mut staged = StagedFile::create(destination).await?;
    staged.write_from(&mut source).await?;
    staged.commit().await
}
