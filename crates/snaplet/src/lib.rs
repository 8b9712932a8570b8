//! snaplet: web page screenshot server over a pool of rendering engines.

mod health;
mod version;

pub mod engine;
pub mod pool;
pub mod render;
pub mod service;
pub mod transport;
pub mod upload;

#[cfg(test)]
pub(crate) mod testing;

pub use health::{Health, HealthResponse};
pub use pool::{AcquireError, EngineInstance, EnginePool, PoolConfig, SessionLease};
pub use render::RenderOptions;
pub use service::{
    DEFAULT_MAX_CONCURRENCY, HealthSnapshot, RenderError, RenderService, Rendered,
};
pub use version::{SNAPLET_VERSION, VersionInfo};
