//! Cooperative cancellation/deadline context for the query surface (spec.md §4.6, §5, §6, §7).
//!
//! Query operations accept a [`CancellationContext`] and race their work against it; a fired
//! context causes the operation to abandon its result promptly rather than surface a partial one
//! (spec.md §5, §6). A context is cheap to clone — cancelling any clone cancels every clone, the
//! same way [`tokio_util::sync::CancellationToken`] itself works.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};

/// A per-request cancellation/deadline handle threaded through [`crate::query::QueryExecutor`]
/// and [`crate::session::SessionManager`]'s read surface.
#[derive(Debug, Clone, Default)]
pub struct CancellationContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CancellationContext {
    /// A context that never cancels and carries no deadline. Used by call sites that have no
    /// caller-supplied timeout to propagate.
    pub fn none() -> Self {
        Self::default()
    }

    /// A context that cancels itself once `timeout` elapses.
    pub fn with_deadline(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Fires cancellation for this context and every clone of it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Fails fast if already cancelled, without waiting on anything. Cheap enough to call before
    /// every backing dispatch so a cancelled context never bothers dispatching to `spawn_blocking`
    /// at all.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Races `fut` against this context's cancellation/deadline. If either fires first, returns
    /// `EngineError::Cancelled` without waiting for `fut` to resolve; `fut` itself (e.g. a
    /// `spawn_blocking` join handle) keeps running to completion in the background, but its
    /// result is discarded (spec.md §5 "a cancelled query returns a not-found shape rather than
    /// partial data").
    pub async fn race<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => Err(EngineError::Cancelled),
                    () = tokio::time::sleep_until(deadline) => Err(EngineError::Cancelled),
                    result = fut => result,
                }
            }
            None => {
                tokio::select! {
                    () = self.token.cancelled() => Err(EngineError::Cancelled),
                    result = fut => result,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn a_fresh_context_never_fires() {
        let ctx = CancellationContext::none();
        assert!(!ctx.is_cancelled());
        assert!(ctx.check().is_ok());
        assert_eq!(ctx.race(async { Ok(7) }).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn cancel_fails_the_next_check() {
        let ctx = CancellationContext::none();
        ctx.cancel();
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.check(), Err(EngineError::Cancelled)));
    }

    #[tokio::test]
    async fn a_cloned_context_observes_cancellation_of_the_original() {
        let ctx = CancellationContext::none();
        let clone = ctx.clone();
        ctx.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn race_returns_cancelled_once_the_token_fires_before_the_future_resolves() {
        let ctx = CancellationContext::none();
        ctx.cancel();
        let result = ctx.race(std::future::pending::<Result<()>>()).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[tokio::test]
    async fn an_elapsed_deadline_cancels_a_pending_race() {
        let ctx = CancellationContext::with_deadline(Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(ctx.is_cancelled());
        let result = ctx.race(std::future::pending::<Result<()>>()).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}
