use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Host serving the signed FoundryVTT release links.
pub const DEFAULT_ALLOWED_HOST: &str = "foundryvtt.s3.amazonaws.com";

/// File name of the archive inside `data_dir` when no explicit path is set.
pub const ARCHIVE_FILE_NAME: &str = "foundryvtt.zip";

/// Shared-secret file inside `data_dir`.
pub const SECRET_FILE_NAME: &str = ".admin-password";

const SECRET_BYTES: usize = 64;

/// Top‑level installer configuration.
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InstallerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding the archive, upload scratch space and the secret file
    pub data_dir: PathBuf,
    /// Explicit archive location; defaults to `<data_dir>/foundryvtt.zip`
    pub archive_path: Option<PathBuf>,
    pub frontend_dir: PathBuf,
    /// When set, the archive is unpacked here after it lands
    pub extract_dir: Option<PathBuf>,
    pub allowed_hosts: Vec<String>,
    /// Accept plain `http://` links (local testing only)
    pub allow_http: bool,
    pub require_shared_secret: bool,
    pub exit_delay_ms: u64,
    pub connect_timeout_secs: u64,
    pub inactivity_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub max_upload_mb: u64,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 4444,
            data_dir: std::env::temp_dir().join("downloads"),
            archive_path: None,
            frontend_dir: PathBuf::from("frontend"),
            extract_dir: None,
            allowed_hosts: vec![DEFAULT_ALLOWED_HOST.to_string()],
            allow_http: false,
            require_shared_secret: false,
            exit_delay_ms: 2000,
            connect_timeout_secs: 30,
            inactivity_timeout_secs: 300,
            fetch_timeout_secs: 1800,
            max_upload_mb: 2048,
        }
    }
}

/// Values coming from the command line or the environment.
///
/// `None` leaves the file/default value untouched.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub archive_path: Option<PathBuf>,
    pub frontend_dir: Option<PathBuf>,
    pub extract_dir: Option<PathBuf>,
    pub allowed_hosts: Option<Vec<String>>,
    pub allow_http: Option<bool>,
    pub require_shared_secret: Option<bool>,
    pub exit_delay_ms: Option<u64>,
    pub fetch_timeout_secs: Option<u64>,
}

impl InstallerConfig {
    /// Load from an optional TOML file, falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg: InstallerConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        log::info!("Using config from: {}", path.display());
        Ok(cfg)
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(host) = overrides.host {
            self.host = host;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(data_dir) = overrides.data_dir {
            self.data_dir = data_dir;
        }
        if overrides.archive_path.is_some() {
            self.archive_path = overrides.archive_path;
        }
        if let Some(frontend_dir) = overrides.frontend_dir {
            self.frontend_dir = frontend_dir;
        }
        if overrides.extract_dir.is_some() {
            self.extract_dir = overrides.extract_dir;
        }
        if let Some(hosts) = overrides.allowed_hosts {
            let hosts: Vec<String> = hosts
                .into_iter()
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect();
            if !hosts.is_empty() {
                self.allowed_hosts = hosts;
            }
        }
        if let Some(allow_http) = overrides.allow_http {
            self.allow_http = allow_http;
        }
        if let Some(require) = overrides.require_shared_secret {
            self.require_shared_secret = require;
        }
        if let Some(delay) = overrides.exit_delay_ms {
            self.exit_delay_ms = delay;
        }
        if let Some(timeout) = overrides.fetch_timeout_secs {
            self.fetch_timeout_secs = timeout;
        }
    }

    /// Resolved location of the Destination Archive.
    pub fn archive_path(&self) -> PathBuf {
        self.archive_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(ARCHIVE_FILE_NAME))
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.data_dir.join("tmp_uploads")
    }

    pub fn secret_path(&self) -> PathBuf {
        self.data_dir.join(SECRET_FILE_NAME)
    }

    pub fn exit_delay(&self) -> Duration {
        Duration::from_millis(self.exit_delay_ms)
    }

    pub fn max_upload_bytes(&self) -> usize {
        usize::try_from(self.max_upload_mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }

    /// Create the data directory, upload scratch space and the archive's parent.
    pub fn ensure_directories(&self) -> Result<()> {
        let archive = self.archive_path();
        let mut dirs = vec![self.data_dir.clone(), self.upload_dir()];
        if let Some(parent) = archive.parent().filter(|p| !p.as_os_str().is_empty()) {
            dirs.push(parent.to_path_buf());
        }
        for dir in dirs {
            if !dir.exists() {
                log::info!("Creating directory: {} (missing)", dir.display());
            }
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    /// Read the shared secret when one is required, generating and saving a
    /// fresh one if the file is missing or empty.
    pub fn load_shared_secret(&self) -> Result<Option<String>> {
        if !self.require_shared_secret {
            return Ok(None);
        }
        let path = self.secret_path();
        match fs::read_to_string(&path) {
            Ok(secret) if !secret.trim().is_empty() => {
                log::info!("Using shared secret from {}", path.display());
                return Ok(Some(secret.trim().to_string()));
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read shared secret from {}", path.display())
                });
            }
        }

        let secret = generate_secret()?;
        write_secret(&path, &secret)
            .with_context(|| format!("Failed to write shared secret to {}", path.display()))?;
        log::info!("Generated a new shared secret, see: {}", path.display());
        Ok(Some(secret))
    }

    pub fn log_summary(&self) {
        log::info!("Configuration Summary:");
        log::info!("  - Listen address: {}:{}", self.host, self.port);
        log::info!("  - Data directory: {}", self.data_dir.display());
        log::info!("  - Archive path: {}", self.archive_path().display());
        log::info!("  - Frontend directory: {}", self.frontend_dir.display());
        match &self.extract_dir {
            Some(dir) => log::info!("  - Extract to: {}", dir.display()),
            None => log::info!("  - Extraction: disabled"),
        }
        log::info!("  - Allowed hosts: {}", self.allowed_hosts.join(", "));
        log::info!("  - Exit delay: {} ms", self.exit_delay_ms);
        if self.require_shared_secret {
            log::info!("  - Shared secret: required");
        }
        if self.allow_http {
            log::warn!("Plain http:// download links are accepted");
        }
    }
}

/// 64 random bytes from the OS, hex encoded.
fn generate_secret() -> Result<String> {
    let mut bytes = [0u8; SECRET_BYTES];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| anyhow::anyhow!("Failed to generate shared secret: {e}"))?;
    Ok(hex::encode(bytes))
}

#[cfg(unix)]
fn write_secret(path: &Path, secret: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(secret.as_bytes())
}

#[cfg(not(unix))]
fn write_secret(path: &Path, secret: &str) -> std::io::Result<()> {
    fs::write(path, secret)
}
