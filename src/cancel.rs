use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{ArrangeError, Result};

/// Cooperative cancellation flag shared between a caller and a running stage.
///
/// Stages poll [`CancelToken::check`] at loop boundaries and unwind with
/// [`ArrangeError::Cancelled`]; nothing is interrupted preemptively.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token nobody holds a second handle to, so it never fires.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ArrangeError::Cancelled)
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
        let handle = token.clone();
        assert!(token.check().is_ok());
        handle.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(ArrangeError::Cancelled));
    }
}
