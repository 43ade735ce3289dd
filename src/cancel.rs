// src/cancel.rs
//! Cancellation token threaded through cooperative synthesis.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Shared flag checked by long-running jobs at every yield point.
///
/// Clones observe the same flag. Once cancelled a token stays cancelled;
/// owners hand out a fresh token for new work.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once the token has fired.
    #[inline]
    pub fn check(&self, what: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled(what.to_string()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(clone.check("job").is_ok());
        token.cancel();
        assert!(clone.is_cancelled());
        assert!(clone.check("job").unwrap_err().is_cancelled());
    }
}
