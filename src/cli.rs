use std::path::PathBuf;

use clap::Parser;

use foundry_installer::config::ConfigOverrides;

#[derive(Parser, Debug)]
#[command(version, about = "FoundryVTT archive installer")]
pub struct Args {
    /// Path to a TOML configuration file
    #[arg(long, short = 'c', env = "INSTALLER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Directory for the archive, uploads and the shared-secret file
    #[arg(long, env = "DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Where the downloaded archive is written
    #[arg(long, env = "FOUNDRYVTT_TMP_PATH")]
    pub archive_path: Option<PathBuf>,

    /// Directory holding index.html, license.html and assets/
    #[arg(long, env = "FRONTEND_DIR")]
    pub frontend_dir: Option<PathBuf>,

    /// Unpack the archive here after it is in place
    #[arg(long, env = "EXTRACT_DIR")]
    pub extract_dir: Option<PathBuf>,

    /// Hosts download links may point at (comma separated)
    #[arg(long, env = "ALLOWED_HOSTS", value_delimiter = ',')]
    pub allowed_hosts: Option<Vec<String>>,

    /// Accept plain http:// links
    #[arg(long, env = "ALLOW_HTTP")]
    pub allow_http: Option<bool>,

    /// Require the x-admin-password header on install and exit routes
    #[arg(long, env = "REQUIRE_SHARED_SECRET")]
    pub require_shared_secret: Option<bool>,

    /// Delay between a successful install (or /exit) and process exit
    #[arg(long, env = "EXIT_DELAY_MS")]
    pub exit_delay_ms: Option<u64>,

    /// Upper bound for a whole download
    #[arg(long, env = "FETCH_TIMEOUT_SECS")]
    pub fetch_timeout_secs: Option<u64>,
}

impl Args {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.host.clone(),
            port: self.port,
            data_dir: self.data_dir.clone(),
            archive_path: self.archive_path.clone(),
            frontend_dir: self.frontend_dir.clone(),
            extract_dir: self.extract_dir.clone(),
            allowed_hosts: self.allowed_hosts.clone(),
            allow_http: self.allow_http,
            require_shared_secret: self.require_shared_secret,
            exit_delay_ms: self.exit_delay_ms,
            fetch_timeout_secs: self.fetch_timeout_secs,
        }
    }
}
