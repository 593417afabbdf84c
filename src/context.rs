//! Per-invocation request state.

use tokio_util::sync::CancellationToken;

use crate::error::{ResourceError, ResourceResult};

/// Carries the cancellation signal for one search, install or uninstall call.
///
/// Cloning is cheap and all clones observe the same token.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: CancellationToken,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns `Cancelled` once the token has fired.
    pub fn check(&self) -> ResourceResult<()> {
        if self.is_cancelled() {
            Err(ResourceError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_after_cancel() {
        let ctx = RequestContext::new();
        assert!(ctx.check().is_ok());

        let clone = ctx.clone();
        clone.cancel();

        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.check(), Err(ResourceError::Cancelled)));
    }
}
