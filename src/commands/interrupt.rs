use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::cleanup::{SharedCleanupContext, lock, new_shared};
use crate::context::RequestContext;

/// Standard exit code for Ctrl-C
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Listens for Ctrl-C while a command runs. On interrupt the request is
/// cancelled, tracked staging paths are removed and the process exits.
/// Dropping the guard stops listening.
pub struct InterruptGuard {
    ctx: RequestContext,
    cleanup: SharedCleanupContext,
    handler: JoinHandle<()>,
}

impl InterruptGuard {
    pub fn install() -> Self {
        let ctx = RequestContext::new();
        let cleanup = new_shared();

        let handler_ctx = ctx.clone();
        let handler_cleanup = Arc::clone(&cleanup);
        let handler = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupted, cleaning up...");
                handler_ctx.cancel();
                lock(&handler_cleanup).cleanup();
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
        });

        Self {
            ctx,
            cleanup,
            handler,
        }
    }

    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    pub fn cleanup(&self) -> SharedCleanupContext {
        Arc::clone(&self.cleanup)
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_provides_live_context() {
        let guard = InterruptGuard::install();

        assert!(!guard.context().is_cancelled());
        assert!(lock(&guard.cleanup()).pending().is_empty());
    }
}
