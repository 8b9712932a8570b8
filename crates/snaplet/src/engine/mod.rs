//! Rendering-engine capability boundary.
//!
//! The pool only needs three capabilities from an engine: launch a process,
//! create a session against a running process, and tear both down again.
//! Everything browser-specific lives behind these traits so the pool and the
//! service can be exercised with mock engines.

pub mod chromium;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Browsing-context viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub scale_factor: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            scale_factor: 1.0,
        }
    }
}

/// Process launch configuration.
///
/// The hardening flag set itself is owned by the engine implementation;
/// `extra_args` is appended after it.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub headless: bool,
    pub executable: Option<PathBuf>,
    pub viewport: Viewport,
    pub extra_args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            viewport: Viewport::default(),
            extra_args: Vec::new(),
        }
    }
}

/// Cookie injected into a session before navigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
}

/// Output image format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    #[default]
    Jpeg,
}

impl ImageFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    /// Anything that isn't `png` renders as JPEG.
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value {
            Some("png") => Self::Png,
            _ => Self::Jpeg,
        }
    }
}

/// What to capture from a loaded page.
#[derive(Debug, Clone)]
pub struct CaptureParams {
    pub full_page: bool,
    /// CSS selector of a single element to capture instead of the page.
    pub selector: Option<String>,
    pub format: ImageFormat,
    /// JPEG quality, 0–100. Ignored for PNG.
    pub quality: u8,
}

/// Console output and failed requests collected while a session was live.
#[derive(Debug, Clone, Default)]
pub struct SessionLogs {
    pub console: Vec<String>,
    pub network_errors: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("invalid engine configuration: {0}")]
    Config(String),
    #[error("failed to launch rendering engine: {0}")]
    Spawn(String),
    #[error("engine launch I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("engine refused to create a session: {0}")]
    Create(String),
    #[error("instance is retiring and accepts no new sessions")]
    Retiring,
    #[error("instance has been disposed")]
    Disposed,
    #[error("failed to close session: {0}")]
    Close(String),
}

/// Failure while driving a live session.
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("engine protocol error: {0}")]
    Protocol(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DisposeError {
    #[error("failed to terminate engine process: {0}")]
    Terminate(String),
}

/// Launches rendering-engine processes.
#[async_trait]
pub trait Engine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn launch(&self, config: &EngineConfig) -> Result<Box<dyn EngineProcess>, LaunchError>;
}

/// One running rendering-engine process.
#[async_trait]
pub trait EngineProcess: Send + Sync {
    async fn new_session(&self, viewport: Viewport) -> Result<Box<dyn EngineSession>, SessionError>;

    async fn terminate(self: Box<Self>) -> Result<(), DisposeError>;
}

/// An isolated browsing context, used for exactly one render.
#[async_trait]
pub trait EngineSession: Send {
    async fn set_viewport(&mut self, viewport: Viewport) -> Result<(), PageError>;

    async fn set_cookies(&mut self, cookies: Vec<Cookie>) -> Result<(), PageError>;

    /// Navigate and wait for the page load to settle.
    async fn navigate(&mut self, url: &str) -> Result<(), PageError>;

    async fn capture(&mut self, params: &CaptureParams) -> Result<Vec<u8>, PageError>;

    /// Take everything logged by the page since the last drain.
    fn drain_logs(&mut self) -> SessionLogs;

    async fn close(self: Box<Self>) -> Result<(), SessionError>;
}
