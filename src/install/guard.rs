//! Single-flight guard for installations

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{InstallError, Result};

/// Shared "an installation is running" flag.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    busy: Arc<AtomicBool>,
}

impl SingleFlight {
    /// Claim the flag, or fail with `AlreadyInProgress` if someone holds it.
    pub fn try_acquire(&self) -> Result<InFlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| InstallError::AlreadyInProgress)?;
        Ok(InFlightGuard {
            busy: Arc::clone(&self.busy),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the flag on drop, including when the request future is cancelled.
#[derive(Debug)]
pub struct InFlightGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
