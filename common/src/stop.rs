//! Cooperative shutdown flag

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared run/stop flag checked by every component run-loop at each queue
/// drain. Relaxed ordering is sufficient: the flag carries no data, only the
/// request to wind down.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// Create a flag in the running state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown of every loop holding a clone of this flag.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// True once [`StopFlag::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_flag_is_shared() {
        let flag = StopFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_stopped());
        flag.stop();
        assert!(clone.is_stopped());
    }
}
