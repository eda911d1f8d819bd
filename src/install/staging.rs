//! Staging of the Destination Archive
//!
//! Bytes are written to a hidden temporary file next to the destination and
//! renamed over it only once everything is on disk. Dropping a [`StagedFile`]
//! without committing removes the temporary file, so a failed attempt never
//! touches a previously installed archive.

use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

use crate::error::{InstallError, Result};

pub struct StagedFile {
    file: tokio::fs::File,
    temp: TempPath,
    destination: PathBuf,
    written: u64,
}

impl StagedFile {
    /// Open a fresh temporary file in the destination's directory.
    pub async fn create(destination: &Path) -> Result<Self> {
        let dir = staging_dir(destination);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| InstallError::write_failed(&dir, e))?;

        let named = tempfile::Builder::new()
            .prefix(".foundryvtt-")
            .suffix(".part")
            .tempfile_in(&dir)
            .map_err(|e| InstallError::write_failed(&dir, e))?;
        let (file, temp) = named.into_parts();
        log::debug!(
            "Staging {} via {}",
            destination.display(),
            temp.display()
        );

        Ok(Self {
            file: tokio::fs::File::from_std(file),
            temp,
            destination: destination.to_path_buf(),
            written: 0,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| InstallError::write_failed(&*self.temp, e))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Copy everything from `reader` into the staged file.
    pub async fn write_from<R>(&mut self, reader: &mut R) -> Result<u64>
    where
        R: tokio::io::AsyncRead + Unpin + ?Sized,
    {
        let copied = tokio::io::copy(reader, &mut self.file)
            .await
            .map_err(|e| InstallError::write_failed(&*self.temp, e))?;
        self.written += copied;
        Ok(copied)
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    /// Flush to disk and atomically move into place. Returns the byte count.
    pub async fn commit(self) -> Result<u64> {
        let StagedFile {
            mut file,
            temp,
            destination,
            written,
        } = self;

        file.flush()
            .await
            .map_err(|e| InstallError::write_failed(&*temp, e))?;
        file.sync_all()
            .await
            .map_err(|e| InstallError::write_failed(&*temp, e))?;
        drop(file);

        temp.persist(&destination)
            .map_err(|e| InstallError::write_failed(&destination, e.error))?;
        log::info!("Wrote {} bytes to {}", written, destination.display());
        Ok(written)
    }
}

fn staging_dir(destination: &Path) -> PathBuf {
    match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
