//! Optional unpacking of the installed archive

use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::{InstallError, Result};

/// Unpack the zip at `archive` into `target_dir` on a blocking thread.
///
/// Entries whose names would escape `target_dir` are rejected by the zip
/// reader. Returns the number of entries extracted.
pub async fn extract_zip(archive: &Path, target_dir: &Path) -> Result<usize> {
    let archive: PathBuf = archive.to_path_buf();
    let target_dir: PathBuf = target_dir.to_path_buf();
    log::info!(
        "Extracting {} to {}",
        archive.display(),
        target_dir.display()
    );

    tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&target_dir)
            .map_err(|e| InstallError::write_failed(&target_dir, e))?;

        let file = std::fs::File::open(&archive)
            .map_err(|e| InstallError::extract_failed(format!("cannot open archive: {e}")))?;
        let mut zip = ZipArchive::new(file)
            .map_err(|e| InstallError::extract_failed(format!("invalid zip file: {e}")))?;
        let entries = zip.len();
        log::debug!("Opened zip archive with {entries} entries");

        zip.extract(&target_dir)
            .map_err(|e| InstallError::extract_failed(e.to_string()))?;
        log::info!("Extraction completed: {entries} entries");
        Ok(entries)
    })
    .await
    .map_err(|e| InstallError::extract_failed(format!("extraction task panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, content) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
    }

    #[tokio::test]
    async fn unpacks_entries_into_target() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("foundryvtt.zip");
        write_zip(
            &archive,
            &[
                ("resources/app/main.js", b"console.log('hi')"),
                ("resources/app/package.json", b"{}"),
            ],
        );
        let target = dir.path().join("app");

        let n = extract_zip(&archive, &target).await.unwrap();

        assert_eq!(n, 2);
        assert_eq!(
            std::fs::read(target.join("resources/app/main.js")).unwrap(),
            b"console.log('hi')"
        );
    }

    #[tokio::test]
    async fn non_zip_is_extract_failure() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("foundryvtt.zip");
        std::fs::write(&archive, b"definitely not a zip").unwrap();

        let err = extract_zip(&archive, &dir.path().join("app"))
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::ExtractFailed { .. }), "{err:?}");
    }
}
