//! Engine instance pool: rotation, draining, and reclaim.
//!
//! The pool owns at most one current instance plus a set of retiring ones.
//! A single async mutex serializes the rotation decision and session
//! creation; rendering with an acquired lease runs outside the lock, so only
//! session *creation* is sequential. Retired instances are reclaimed by a
//! detached cleanup pass once their outstanding sessions drain.

mod instance;
mod session;

pub use instance::EngineInstance;
pub use session::SessionLease;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use crate::engine::{Engine, EngineConfig, LaunchError, SessionError};

/// Pool behavior knobs.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Rotate the current instance once this many sessions have been issued
    /// against it. The request that crosses the threshold is served by the
    /// replacement, so an instance serves at most `max - 1` sessions.
    pub max_sessions_per_instance: u64,
    pub engine: EngineConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sessions_per_instance: 300,
            engine: EngineConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Default)]
struct PoolState {
    current: Option<Arc<EngineInstance>>,
    retiring: Vec<Arc<EngineInstance>>,
}

/// Hands out session leases against a rotating set of engine processes.
pub struct EnginePool {
    engine: Arc<dyn Engine>,
    config: PoolConfig,
    state: Arc<Mutex<PoolState>>,
    instance_seq: AtomicU64,
}

impl EnginePool {
    pub fn new(engine: Arc<dyn Engine>, config: PoolConfig) -> Self {
        Self {
            engine,
            config,
            state: Arc::new(Mutex::new(PoolState::default())),
            instance_seq: AtomicU64::new(0),
        }
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Check out a session, launching or rotating instances as needed.
    ///
    /// The whole decision, including the terminal session-creation call,
    /// runs under the pool mutex, so no two acquires ever race the rotation
    /// bookkeeping. A launch failure leaves `current` empty and the error
    /// with the caller; the next acquire retries from scratch. A cleanup
    /// pass is kicked off after every acquire, successful or not.
    pub async fn acquire(&self) -> Result<SessionLease, AcquireError> {
        let result = self.acquire_locked().await;
        self.spawn_reclaim();
        result
    }

    async fn acquire_locked(&self) -> Result<SessionLease, AcquireError> {
        let mut state = self.state.lock().await;

        let current = match state.current.clone() {
            Some(instance) => instance,
            None => self.launch_instance(&mut state).await?,
        };

        let issued = current.increment_issued();
        let serving = if issued >= self.config.max_sessions_per_instance {
            tracing::info!(
                instance = current.id(),
                issued,
                "session threshold reached, rotating engine instance"
            );
            current.mark_retiring();
            state.retiring.push(Arc::clone(&current));
            // If the replacement launch fails the old instance stays
            // queued and the pool is instance-less until the next call.
            state.current = None;
            self.launch_instance(&mut state).await?
        } else {
            current
        };

        Ok(serving.new_session(self.config.engine.viewport).await?)
    }

    async fn launch_instance(
        &self,
        state: &mut PoolState,
    ) -> Result<Arc<EngineInstance>, LaunchError> {
        let id = self.instance_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let instance = Arc::new(
            EngineInstance::launch(self.engine.as_ref(), id, &self.config.engine).await?,
        );
        state.current = Some(Arc::clone(&instance));
        Ok(instance)
    }

    fn spawn_reclaim(&self) {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            Self::reclaim(state).await;
        });
    }

    /// Dispose every retiring instance whose sessions have drained.
    ///
    /// Idle instances are removed from the retiring set under the lock and
    /// only disposed afterwards, so overlapping passes can never dispose the
    /// same instance twice. Disposal failures are logged per instance and
    /// never abort the rest of the batch.
    pub async fn reclaim_idle_retiring(&self) {
        Self::reclaim(Arc::clone(&self.state)).await;
    }

    async fn reclaim(state: Arc<Mutex<PoolState>>) {
        let idle = {
            let mut state = state.lock().await;
            let (idle, rest): (Vec<_>, Vec<_>) = state
                .retiring
                .drain(..)
                .partition(|instance| instance.is_idle());
            state.retiring = rest;
            idle
        };

        for instance in idle {
            tracing::info!(instance = instance.id(), "reclaiming drained engine instance");
            if let Err(e) = instance.dispose().await {
                tracing::warn!(
                    instance = instance.id(),
                    error = %e,
                    "failed to dispose retired engine instance"
                );
            }
        }
    }

    /// Forced teardown of every known instance, active sessions or not.
    ///
    /// Waits on the pool mutex first, so an in-flight rotation decision
    /// finishes before everything is torn down. Outstanding leases become
    /// invalid; session operations against them fail terminally.
    pub async fn dispose_all(&self) {
        let mut state = self.state.lock().await;
        let current = state.current.take();
        let retiring = std::mem::take(&mut state.retiring);

        for instance in current.into_iter().chain(retiring) {
            if let Err(e) = instance.dispose().await {
                tracing::warn!(
                    instance = instance.id(),
                    error = %e,
                    "failed to dispose engine instance during shutdown"
                );
            }
        }
    }

    /// Number of retiring instances still awaiting drain.
    pub async fn retiring_count(&self) -> usize {
        self.state.lock().await.retiring.len()
    }

    /// Whether a current instance is installed.
    pub async fn has_current(&self) -> bool {
        self.state.lock().await.current.is_some()
    }
}
