//! Process lifecycle control
//!
//! The installer hands control back to its supervisor by exiting. Handlers
//! only ever talk to the [`Lifecycle`] trait so the exit can be replaced in
//! tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub trait Lifecycle: Send + Sync {
    /// Schedule process termination after `delay`.
    ///
    /// Returns immediately; calling it again while an exit is pending is a no-op.
    fn terminate(&self, delay: Duration);

    /// Whether a termination has been scheduled.
    fn is_terminating(&self) -> bool;
}

/// Called with the exit status once the delay has elapsed.
pub type ExitHook = Arc<dyn Fn(i32) + Send + Sync>;

/// Exits the real process with status 0 once the delay elapses.
pub struct ProcessLifecycle {
    scheduled: AtomicBool,
    exit: ExitHook,
}

impl Default for ProcessLifecycle {
    fn default() -> Self {
        Self::with_exit_hook(Arc::new(exit_process))
    }
}

impl ProcessLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `exit` instead of ending the process.
    pub fn with_exit_hook(exit: ExitHook) -> Self {
        Self {
            scheduled: AtomicBool::new(false),
            exit,
        }
    }

    /// Mark termination as scheduled. Only the first caller gets `true`.
    fn claim(&self) -> bool {
        !self.scheduled.swap(true, Ordering::AcqRel)
    }
}

impl Lifecycle for ProcessLifecycle {
    fn terminate(&self, delay: Duration) {
        if !self.claim() {
            log::debug!("Termination already scheduled, ignoring");
            return;
        }
        log::info!("Process will exit in {} ms", delay.as_millis());
        let exit = Arc::clone(&self.exit);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            log::info!("foundry-installer exiting (pid {})", std::process::id());
            exit(0);
        });
    }

    fn is_terminating(&self) -> bool {
        self.scheduled.load(Ordering::Acquire)
    }
}

fn exit_process(code: i32) {
    std::process::exit(code)
}
