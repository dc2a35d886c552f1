//! Cooperative cancellation
//!
//! A run owns one [`CancellationToken`]; every suspension point that starts new
//! remote work calls [`ensure_active`] first. A request already in flight is never
//! interrupted, only the next step is skipped.

pub use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};

/// Fail with [`EngineError::Cancelled`] if the token has been signalled.
pub fn ensure_active(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        Err(EngineError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_active_token_passes() {
        let token = CancellationToken::new();
        assert!(ensure_active(&token).is_ok());
    }

    #[test]
    fn test_cancelled_token_fails_with_cancellation_kind() {
        let token = CancellationToken::new();
        token.cancel();
        let err = ensure_active(&token).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancellation);
    }
}
