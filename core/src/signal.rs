//! Cooperative stop signal shared between a driver and its spin workers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared running flag. Starts out `true`; once cleared it stays cleared.
///
/// Only eventual visibility of the transition is required, so all accesses are
/// `Relaxed`: no other memory is published through the flag.
#[derive(Debug, Clone)]
pub struct SignalFlag {
    running: Arc<AtomicBool>,
}

impl Default for SignalFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalFlag {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Clear the flag. Returns `true` only for the call that performed the transition.
    pub fn stop(&self) -> bool {
        self.running.swap(false, Ordering::Relaxed)
    }
}
