use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, SweepError};

/// Shared flag asking a running fit to stop at its next checkpoint.
///
/// Clones share the same flag. A default token is never cancelled unless
/// `cancel` is called on it or one of its clones.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(SweepError::Cancelled)` once the token has fired.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SweepError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let watcher = token.clone();
        assert!(watcher.check().is_ok());

        token.cancel();
        assert!(watcher.is_cancelled());
        assert!(matches!(watcher.check(), Err(SweepError::Cancelled)));
    }
}
