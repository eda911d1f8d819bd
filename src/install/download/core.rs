//! Streaming download of the archive from a validated link

use std::path::Path;

use futures::StreamExt;
use tokio::time::timeout;
use url::Url;

use super::ArchiveFetcher;
use crate::error::{InstallError, Result};
use crate::install::staging::StagedFile;
use crate::progress::{ProgressNotifier, Stage, percent};

/// Emit a progress update at most every 256KB
const PROGRESS_CHUNK: u64 = 256 * 1024;

impl ArchiveFetcher {
    /// Download `url` into `destination`, replacing it only on success.
    ///
    /// Redirects are followed. Non-2xx responses, connection errors and empty
    /// bodies are `FetchFailed`; exceeding the inactivity or total time budget
    /// is `FetchTimeout`. On any failure the temporary file is removed and the
    /// previous archive (if any) is left as it was.
    pub async fn stream_from_url(
        &self,
        url: &Url,
        destination: &Path,
        progress: &ProgressNotifier,
    ) -> Result<u64> {
        match timeout(
            self.total_timeout,
            self.stream_inner(url, destination, progress),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(InstallError::fetch_timeout(format!(
                "download of {} did not finish within {} seconds",
                redact(url),
                self.total_timeout.as_secs_f32()
            ))),
        }
    }

    async fn stream_inner(
        &self,
        url: &Url,
        destination: &Path,
        progress: &ProgressNotifier,
    ) -> Result<u64> {
        log::info!("Starting download from {}", redact(url));

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(InstallError::fetch_failed(format!(
                "{} responded with HTTP {status}",
                redact(url)
            )));
        }

        let total = response.content_length().filter(|len| *len > 0);
        match total {
            Some(len) => progress.update(
                Stage::Downloading,
                format!("Download size: {:.1} MB", mb(len)),
                Some(0),
            ),
            None => progress.update(Stage::Downloading, "Download size unknown", None),
        }

        let mut staged = StagedFile::create(destination).await?;
        let mut stream = response.bytes_stream();
        let mut last_progress_bytes = 0u64;

        loop {
            let chunk = match timeout(self.inactivity_timeout, stream.next()).await {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => return Err(from_reqwest(url, e)),
                Ok(None) => break,
                Err(_) => {
                    return Err(InstallError::fetch_timeout(format!(
                        "no data received for {} seconds after {} bytes",
                        self.inactivity_timeout.as_secs_f32(),
                        staged.written()
                    )));
                }
            };

            staged.write_chunk(&chunk).await?;

            let downloaded = staged.written();
            if downloaded - last_progress_bytes >= PROGRESS_CHUNK {
                log::debug!("Downloaded: {:.1} MB", mb(downloaded));
                progress.update(
                    Stage::Downloading,
                    format!("Downloaded: {:.1} MB", mb(downloaded)),
                    percent(downloaded, total),
                );
                last_progress_bytes = downloaded;
            }
        }

        let downloaded = staged.written();
        if downloaded == 0 {
            return Err(InstallError::fetch_failed(format!(
                "{} returned an empty body",
                redact(url)
            )));
        }
        if let Some(expected) = total
            && downloaded != expected
        {
            return Err(InstallError::fetch_failed(format!(
                "received {downloaded} of {expected} bytes"
            )));
        }

        progress.update(
            Stage::Downloading,
            format!("Download complete: {:.1} MB", mb(downloaded)),
            Some(100),
        );
        let written = staged.commit().await?;
        log::info!("Download completed successfully: {written} bytes");
        Ok(written)
    }
}

fn from_reqwest(url: &Url, e: reqwest::Error) -> InstallError {
    // reqwest errors embed the full URL, signature included
    let e = e.without_url();
    if e.is_timeout() {
        InstallError::fetch_timeout(format!("{}: {e}", redact(url)))
    } else {
        InstallError::fetch_failed(format!("{}: {e}", redact(url)))
    }
}

/// Host and path only; signed links carry credentials in the query.
pub(crate) fn redact(url: &Url) -> String {
    format!(
        "{}://{}{}",
        url.scheme(),
        url.host_str().unwrap_or_default(),
        url.path()
    )
}

fn mb(bytes: u64) -> f64 {
    bytes as f64 / 1_048_576.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::download::FetchSettings;
    use crate::testing::{TEN_KB, payload, release_host, spawn_server};
    use pretty_assertions::assert_eq;
    use std::net::SocketAddr;
    use std::time::Duration;

    fn fetcher() -> ArchiveFetcher {
        ArchiveFetcher::new(FetchSettings {
            connect_timeout: Duration::from_secs(5),
            inactivity_timeout: Duration::from_millis(500),
            total_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn link(addr: SocketAddr, path: &str) -> Url {
        Url::parse(&format!("http://{addr}{path}")).unwrap()
    }

    fn part_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .map(|e| e.file_name().to_string_lossy().ends_with(".part"))
                    .unwrap_or(false)
            })
            .count()
    }

    #[tokio::test]
    async fn writes_exact_bytes() {
        let addr = spawn_server(release_host()).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("foundryvtt.zip");
        let progress = ProgressNotifier::new();

        let n = fetcher()
            .stream_from_url(&link(addr, "/releases/ok.zip"), &dest, &progress)
            .await
            .unwrap();

        assert_eq!(n, TEN_KB as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), payload(TEN_KB));
        assert_eq!(progress.current().progress, Some(100));
        assert_eq!(part_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn follows_redirects_and_handles_large_bodies() {
        let addr = spawn_server(release_host()).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("foundryvtt.zip");
        let progress = ProgressNotifier::new();
        let fetcher = fetcher();

        fetcher
            .stream_from_url(&link(addr, "/releases/moved.zip"), &dest, &progress)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), payload(TEN_KB));

        let n = fetcher
            .stream_from_url(&link(addr, "/releases/large.zip"), &dest, &progress)
            .await
            .unwrap();
        assert_eq!(n, 1024 * 1024 + 17);
        assert_eq!(std::fs::read(&dest).unwrap(), payload(1024 * 1024 + 17));
    }

    #[tokio::test]
    async fn server_error_leaves_no_file() {
        let addr = spawn_server(release_host()).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("foundryvtt.zip");

        let err = fetcher()
            .stream_from_url(&link(addr, "/releases/error.zip"), &dest, &ProgressNotifier::new())
            .await
            .unwrap_err();

        assert!(matches!(err, InstallError::FetchFailed { .. }), "{err:?}");
        assert!(err.to_string().contains("500"));
        assert!(!dest.exists());
        assert_eq!(part_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn failures_keep_the_previous_archive() {
        let addr = spawn_server(release_host()).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("foundryvtt.zip");
        std::fs::write(&dest, b"previous install").unwrap();
        let fetcher = fetcher();

        for path in [
            "/releases/error.zip",
            "/releases/forbidden.zip",
            "/releases/reset.zip",
            "/releases/empty.zip",
        ] {
            let err = fetcher
                .stream_from_url(&link(addr, path), &dest, &ProgressNotifier::new())
                .await
                .unwrap_err();
            assert!(matches!(err, InstallError::FetchFailed { .. }), "{path}: {err:?}");
            assert_eq!(std::fs::read(&dest).unwrap(), b"previous install", "{path}");
        }
        assert_eq!(part_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn connection_refused_is_fetch_failed() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let dir = tempfile::tempdir().unwrap();

        let err = fetcher()
            .stream_from_url(
                &link(addr, "/releases/ok.zip"),
                &dir.path().join("foundryvtt.zip"),
                &ProgressNotifier::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::FetchFailed { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let addr = spawn_server(release_host()).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("foundryvtt.zip");
        let fetcher = ArchiveFetcher::new(FetchSettings {
            connect_timeout: Duration::from_secs(5),
            inactivity_timeout: Duration::from_secs(5),
            total_timeout: Duration::from_millis(300),
        })
        .unwrap();

        let err = fetcher
            .stream_from_url(&link(addr, "/releases/slow.zip"), &dest, &ProgressNotifier::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::FetchTimeout { .. }), "{err:?}");
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn stalled_body_hits_inactivity_timeout() {
        let addr = spawn_server(release_host()).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("foundryvtt.zip");

        let err = fetcher()
            .stream_from_url(&link(addr, "/releases/stalled.zip"), &dest, &ProgressNotifier::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::FetchTimeout { .. }), "{err:?}");
        assert!(!dest.exists());
        assert_eq!(part_files(dir.path()), 0);
    }

    #[test]
    fn redact_drops_signature() {
        let url = Url::parse(
            "https://foundryvtt.s3.amazonaws.com/releases/x.zip?AWSAccessKeyId=a&Signature=b&Expires=c",
        )
        .unwrap();
        assert_eq!(
            redact(&url),
            "https://foundryvtt.s3.amazonaws.com/releases/x.zip"
        );
    }
}
