//! RenderService: transport-agnostic render lifecycle management.
//!
//! This service owns:
//! - The admission gate (bounded concurrent renders)
//! - The engine pool (instance rotation and session leasing)
//! - Health tracking and shutdown coordination
//!
//! Transports (HTTP today) delegate to this service for render handling.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{RwLock, Semaphore, watch};
use uuid::Uuid;

use crate::engine::{PageError, SessionLogs};
use crate::health::Health;
use crate::pool::{AcquireError, EnginePool};
use crate::render::{self, RenderOptions};
use crate::version::VersionInfo;

/// Default admission-gate width: how many renders may run at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Service not ready")]
    NotReady,
    #[error("Service shutting down")]
    ShuttingDown,
    #[error(transparent)]
    Acquire(#[from] AcquireError),
    #[error(transparent)]
    Page(#[from] PageError),
    #[error("render timed out after {0} seconds")]
    Timeout(u64),
}

/// A completed render.
#[derive(Debug)]
pub struct Rendered {
    pub id: String,
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub logs: SessionLogs,
    pub render_time: Duration,
}

/// Snapshot of service health for transports to query.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub state: Health,
    pub available_slots: usize,
    pub total_slots: usize,
    pub version: VersionInfo,
    pub engine: &'static str,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl HealthSnapshot {
    pub fn is_ready(&self) -> bool {
        self.state == Health::Ready
    }

    /// BUSY state: ready but every admission slot in use.
    pub fn is_busy(&self) -> bool {
        self.state == Health::Ready && self.available_slots == 0
    }
}

pub struct RenderService {
    pool: Arc<EnginePool>,
    gate: Arc<Semaphore>,
    max_concurrency: usize,
    health: RwLock<Health>,
    version: VersionInfo,
    started_at: chrono::DateTime<chrono::Utc>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl RenderService {
    pub fn new(pool: Arc<EnginePool>, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            pool,
            gate: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            health: RwLock::new(Health::Starting),
            version: VersionInfo::new(),
            started_at: chrono::Utc::now(),
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn with_version(mut self, version: VersionInfo) -> Self {
        self.version = version;
        self
    }

    pub async fn set_health(&self, health: Health) {
        *self.health.write().await = health;
    }

    pub async fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            state: *self.health.read().await,
            available_slots: self.gate.available_permits(),
            total_slots: self.max_concurrency,
            version: self.version.clone(),
            engine: self.pool.engine_name(),
            started_at: self.started_at,
        }
    }

    /// Render one page to an image.
    ///
    /// Admission is bounded by the gate, independently of the pool's own
    /// serialization. The pool lease is released on every exit path
    /// (success, render failure, timeout), so an instance's active count
    /// can never leak.
    pub async fn render(&self, options: RenderOptions) -> Result<Rendered, RenderError> {
        if *self.health.read().await != Health::Ready {
            return Err(RenderError::NotReady);
        }

        let _permit = Arc::clone(&self.gate)
            .acquire_owned()
            .await
            .map_err(|_| RenderError::ShuttingDown)?;

        let id = Uuid::new_v4().to_string();
        let budget = Duration::from_secs(options.timeout_seconds);
        let started = Instant::now();

        let mut lease = self.pool.acquire().await?;
        tracing::info!(
            target: "snaplet::render",
            render_id = %id,
            url = %options.url,
            instance = lease.instance_id(),
            "starting render"
        );

        let captured =
            tokio::time::timeout(budget, render::capture(lease.session_mut(), &options)).await;
        let logs = lease.session_mut().drain_logs();
        lease.release().await;

        let bytes = match captured {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                tracing::warn!(
                    target: "snaplet::render",
                    render_id = %id,
                    error = %e,
                    "render failed"
                );
                return Err(e.into());
            }
            Err(_) => {
                tracing::warn!(
                    target: "snaplet::render",
                    render_id = %id,
                    timeout_seconds = options.timeout_seconds,
                    "render timed out"
                );
                return Err(RenderError::Timeout(options.timeout_seconds));
            }
        };

        let render_time = started.elapsed();
        tracing::info!(
            target: "snaplet::render",
            render_id = %id,
            bytes = bytes.len(),
            elapsed = ?render_time,
            "render succeeded"
        );

        Ok(Rendered {
            id,
            bytes,
            content_type: options.format.content_type(),
            logs,
            render_time,
        })
    }

    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Tear down every engine instance. Intended for process exit only:
    /// outstanding leases become invalid.
    pub async fn shutdown(&self) {
        self.set_health(Health::Defunct).await;
        self.gate.close();
        self.pool.dispose_all().await;
    }
}
