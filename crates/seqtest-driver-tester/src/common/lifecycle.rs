//! Initialize/shutdown bookkeeping shared by all devices.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Tracks whether a device has been initialized.
///
/// Both transitions are idempotent; repeated calls are logged at debug level
/// and otherwise ignored.
#[derive(Debug, Default)]
pub struct Lifecycle {
    initialized: AtomicBool,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize(&self, device: &str) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!(device, "Already initialized");
        } else {
            info!(device, "Device initialized");
        }
    }

    pub fn shutdown(&self, device: &str) {
        if self.initialized.swap(false, Ordering::SeqCst) {
            info!(device, "Device shut down");
        } else {
            debug!(device, "Shutdown of uninitialized device");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }
}
