//! One rendering-engine process plus its session bookkeeping.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use tokio::sync::Mutex;

use crate::engine::{
    DisposeError, Engine, EngineConfig, EngineProcess, LaunchError, SessionError, Viewport,
};

use super::session::SessionLease;

/// A launched engine process with usage counters and a retiring flag.
///
/// `sessions_issued` and `active_sessions` are atomics because session
/// release happens outside the pool mutex; everything else about an instance
/// is only mutated while the pool holds its lock.
pub struct EngineInstance {
    id: u64,
    process: Mutex<Option<Box<dyn EngineProcess>>>,
    sessions_issued: AtomicU64,
    active_sessions: AtomicUsize,
    retiring: AtomicBool,
}

impl EngineInstance {
    pub(crate) async fn launch(
        engine: &dyn Engine,
        id: u64,
        config: &EngineConfig,
    ) -> Result<Self, LaunchError> {
        let process = engine.launch(config).await?;
        tracing::info!(instance = id, engine = engine.name(), "engine instance launched");
        Ok(Self {
            id,
            process: Mutex::new(Some(process)),
            sessions_issued: AtomicU64::new(0),
            active_sessions: AtomicUsize::new(0),
            retiring: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Claim the next session ordinal. Monotone, one increment per acquire.
    pub(crate) fn increment_issued(&self) -> u64 {
        self.sessions_issued.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn sessions_issued(&self) -> u64 {
        self.sessions_issued.load(Ordering::Acquire)
    }

    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Acquire)
    }

    pub fn is_idle(&self) -> bool {
        self.active_sessions.load(Ordering::Acquire) == 0
    }

    pub fn is_retiring(&self) -> bool {
        self.retiring.load(Ordering::Acquire)
    }

    /// Idempotent; never cleared once set.
    pub(crate) fn mark_retiring(&self) {
        self.retiring.store(true, Ordering::Release);
    }

    /// Create a session against this instance's process.
    ///
    /// The active count is incremented before the engine call and rolled back
    /// on failure, so a refused session never leaks a count.
    pub(crate) async fn new_session(
        self: &Arc<Self>,
        viewport: Viewport,
    ) -> Result<SessionLease, SessionError> {
        if self.is_retiring() {
            return Err(SessionError::Retiring);
        }

        self.active_sessions.fetch_add(1, Ordering::AcqRel);

        let created = {
            let process = self.process.lock().await;
            match process.as_ref() {
                Some(process) => process.new_session(viewport).await,
                None => Err(SessionError::Disposed),
            }
        };

        match created {
            Ok(session) => Ok(SessionLease::new(session, Arc::clone(self))),
            Err(e) => {
                self.active_sessions.fetch_sub(1, Ordering::AcqRel);
                Err(e)
            }
        }
    }

    /// Called by the lease, exactly once per issued session.
    pub(crate) fn finish_session(&self) {
        self.active_sessions.fetch_sub(1, Ordering::AcqRel);
    }

    /// Terminate the underlying process. At most one call does the work;
    /// later calls are no-ops. Safe with sessions still active; that is the
    /// forced shutdown path.
    pub(crate) async fn dispose(&self) -> Result<(), DisposeError> {
        let Some(process) = self.process.lock().await.take() else {
            return Ok(());
        };
        tracing::debug!(
            instance = self.id,
            active = self.active_sessions(),
            "terminating engine instance"
        );
        process.terminate().await
    }
}

impl std::fmt::Debug for EngineInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineInstance")
            .field("id", &self.id)
            .field("sessions_issued", &self.sessions_issued())
            .field("active_sessions", &self.active_sessions())
            .field("retiring", &self.is_retiring())
            .finish()
    }
}
