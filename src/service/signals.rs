// Cheap, polling-based Unix signal handling (lock-free).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

static RECEIVED_SIGNAL: AtomicUsize = AtomicUsize::new(0);

const POLL_INTERVAL: Duration = Duration::from_millis(200);

extern "C" fn record_signal(sig: i32) {
    RECEIVED_SIGNAL.store(sig as usize, Ordering::SeqCst);
}

/// Route SIGINT and SIGTERM into [`RECEIVED_SIGNAL`].
pub fn install_signal_handlers() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(record_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for sig in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only performs an atomic store.
        unsafe { signal::sigaction(sig, &action) }
            .map_err(|e| anyhow::anyhow!("Failed to register {sig} handler: {e}"))?;
    }
    Ok(())
}

/// Non-blocking check; returns each received signal once.
fn check_signals() -> Option<Signal> {
    let val = RECEIVED_SIGNAL.swap(0, Ordering::AcqRel);
    if val == 0 {
        return None;
    }
    match Signal::try_from(val as i32) {
        Ok(sig) => Some(sig),
        Err(e) => {
            log::error!("Invalid signal number {val} from signal handler: {e}");
            None
        }
    }
}

/// Resolves once SIGINT or SIGTERM has been received.
pub async fn wait_for_shutdown() {
    let mut tick = tokio::time::interval(POLL_INTERVAL);
    loop {
        tick.tick().await;
        if let Some(sig) = check_signals() {
            log::info!("signal {sig:?} - orderly shutdown");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recorded_signal_ends_the_wait() {
        RECEIVED_SIGNAL.store(Signal::SIGTERM as usize, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(2), wait_for_shutdown())
            .await
            .unwrap();
        assert_eq!(check_signals(), None);
    }
}
