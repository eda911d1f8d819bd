mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use foundry_installer::config::InstallerConfig;
use foundry_installer::install::Installer;
use foundry_installer::lifecycle::ProcessLifecycle;
use foundry_installer::progress::ProgressNotifier;
use foundry_installer::service::{self, AppState, signals};

fn main() {
    // RUST_LOG still wins over the info default
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: Failed to create Tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(real_main()) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn real_main() -> Result<()> {
    let args = cli::Args::parse();

    let mut cfg = InstallerConfig::load(args.config.as_deref())?;
    cfg.apply(args.overrides());
    cfg.ensure_directories()?;
    cfg.log_summary();

    let secret = cfg.load_shared_secret()?;

    let installer = Installer::new(
        &cfg,
        ProgressNotifier::new(),
        Arc::new(ProcessLifecycle::new()),
    )
    .context("Failed to initialise installer")?;
    let state = AppState::new(&cfg, Arc::new(installer), secret);

    signals::install_signal_handlers()?;
    info!("foundry-installer started (pid {})", std::process::id());
    service::serve(&cfg, state).await?;
    info!("foundry-installer exiting");
    Ok(())
}
