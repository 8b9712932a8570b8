//! Drives a leased session through one render.

use serde::Deserialize;

use crate::engine::{CaptureParams, Cookie, EngineSession, ImageFormat, PageError, Viewport};

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_quality() -> u8 {
    100
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn deserialize_format<'de, D>(deserializer: D) -> Result<ImageFormat, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(ImageFormat::parse_lenient(value.as_deref()))
}

/// One render request, as accepted over HTTP.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    pub url: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub full_page: bool,
    /// CSS selector of a single element to capture instead of the page.
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default, deserialize_with = "deserialize_format")]
    pub format: ImageFormat,
    #[serde(default = "default_quality")]
    pub quality: u8,
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    /// End-to-end budget for the render, enforced by the service.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl RenderOptions {
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            width: default_width(),
            height: default_height(),
            full_page: false,
            selector: None,
            format: ImageFormat::default(),
            quality: default_quality(),
            cookies: Vec::new(),
            timeout_seconds: default_timeout_seconds(),
        }
    }

    pub fn viewport(&self) -> Viewport {
        Viewport {
            width: self.width,
            height: self.height,
            scale_factor: 1.0,
        }
    }

    pub fn capture_params(&self) -> CaptureParams {
        CaptureParams {
            full_page: self.full_page,
            selector: self.selector.clone(),
            format: self.format,
            quality: self.quality,
        }
    }
}

/// Run one render against an already-leased session: size the viewport,
/// inject cookies, navigate, capture.
pub async fn capture(
    session: &mut dyn EngineSession,
    options: &RenderOptions,
) -> Result<Vec<u8>, PageError> {
    session.set_viewport(options.viewport()).await?;
    if !options.cookies.is_empty() {
        session.set_cookies(options.cookies.clone()).await?;
    }
    session.navigate(&options.url).await?;
    session.capture(&options.capture_params()).await
}
