//! Cancellation token for long-running operations.
//!
//! Cancellation is cooperative: operations check the token between units of
//! work (packfile entries, directory entries, protocol frames) and return a
//! `Canceled` error promptly when it fires. Partial on-disk artifacts are
//! left in place; callers decide whether to clean up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::UtilError;

/// A cloneable cancellation flag.
///
/// All clones share one flag; canceling any clone cancels them all.
/// `CancelToken::default()` yields a token that never fires, for callers
/// that do not need cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Has cancellation been requested?
    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Return `Err(UtilError::Canceled)` if cancellation has been requested.
    pub fn check(&self) -> Result<(), UtilError> {
        if self.is_canceled() {
            Err(UtilError::Canceled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_canceled() {
        let token = CancelToken::new();
        assert!(!token.is_canceled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn cancel_is_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_canceled());
        assert!(matches!(token.check(), Err(UtilError::Canceled)));
    }

    #[test]
    fn cancel_is_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_canceled());
    }
}
