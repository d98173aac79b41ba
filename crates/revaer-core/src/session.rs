//! Ambient per-task session context (§4.2): which profile and user a unit of
//! work is running on behalf of, propagated implicitly to anything spawned
//! underneath a `scope` call without threading it through every signature.

use std::future::Future;

tokio::task_local! {
    static SESSION: SessionContext;
}

/// Identifies the profile/user a unit of work runs on behalf of. Absent a
/// scope, every field defaults to `None` (process-level/anonymous context).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    /// Active user id, used for RealDebrid-sharing and per-user overrides.
    pub user_id: Option<u64>,
    /// Display/login name for the active user, when known.
    pub username: Option<String>,
    /// Authorization role for the active user. Routing and settings tiers
    /// never branch on this; it is carried for parity with the external
    /// authz layer, not consumed in-process.
    pub role: Option<String>,
    /// Active profile, when multiple profiles are configured.
    pub profile_id: Option<String>,
}

impl SessionContext {
    /// Build a context scoped to a single profile with no user.
    #[must_use]
    pub fn for_profile(profile_id: impl Into<String>) -> Self {
        Self {
            profile_id: Some(profile_id.into()),
            ..Self::default()
        }
    }
}

/// Run `fut` with `ctx` as the ambient session context for everything
/// polled within it. Does not cross a `tokio::spawn` boundary; a spawned
/// task that needs the context must be wrapped with `scope` again using a
/// `current()` captured before the spawn.
pub async fn scope<F: Future>(ctx: SessionContext, fut: F) -> F::Output {
    SESSION.scope(ctx, fut).await
}

/// The current ambient session context, or the default (no profile/user) if
/// called outside a `scope`.
#[must_use]
pub fn current() -> SessionContext {
    SESSION.try_with(Clone::clone).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{current, scope, SessionContext};

    #[tokio::test]
    async fn defaults_to_empty_outside_a_scope() {
        assert_eq!(current(), SessionContext::default());
    }

    #[tokio::test]
    async fn scope_is_visible_within_the_same_task() {
        let ctx = SessionContext::for_profile("alice");
        let observed = scope(ctx.clone(), async { current() }).await;
        assert_eq!(observed, ctx);
    }

    #[tokio::test]
    async fn scope_must_be_re_entered_across_a_spawn_boundary() {
        let ctx = SessionContext::for_profile("alice");
        let observed = scope(ctx.clone(), async {
            let captured = current();
            let inner = tokio::spawn(scope(captured, async { current() }));
            inner.await.expect("task did not panic")
        })
        .await;
        assert_eq!(observed, ctx);
    }
}
