//! Scoped lease over one engine session.

use std::sync::Arc;

use crate::engine::EngineSession;

use super::instance::EngineInstance;

/// A session checked out from the pool.
///
/// The lease owns the session resource and back-references the instance that
/// issued it. Exactly one release happens per lease: `release()` consumes it
/// and closes the session; if a lease is dropped without release, the drop
/// path still settles the instance's active count so it can never leak.
pub struct SessionLease {
    session: Option<Box<dyn EngineSession>>,
    instance: Arc<EngineInstance>,
}

impl SessionLease {
    pub(crate) fn new(session: Box<dyn EngineSession>, instance: Arc<EngineInstance>) -> Self {
        Self {
            session: Some(session),
            instance,
        }
    }

    /// Identity of the instance that issued this lease.
    pub fn instance_id(&self) -> u64 {
        self.instance.id()
    }

    pub fn session_mut(&mut self) -> &mut dyn EngineSession {
        // Present until release() consumes the lease.
        self.session.as_mut().expect("session already released").as_mut()
    }

    /// Close the session and notify the owning instance.
    ///
    /// Close failures are logged, not propagated: the instance bookkeeping
    /// must settle regardless of how the session resource went away.
    pub async fn release(mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                tracing::warn!(
                    instance = self.instance.id(),
                    error = %e,
                    "failed to close engine session"
                );
            }
            self.instance.finish_session();
        }
    }
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("instance_id", &self.instance.id())
            .field("released", &self.session.is_none())
            .finish()
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if self.session.take().is_some() {
            tracing::warn!(
                instance = self.instance.id(),
                "session lease dropped without release"
            );
            self.instance.finish_session();
        }
    }
}
