//! Version information for snaplet.

/// Snaplet version from Cargo.toml
pub const SNAPLET_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version information reported by the health endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VersionInfo {
    /// Snaplet runtime version.
    pub snaplet: &'static str,
    /// Rendering-engine identifier (if known).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            snaplet: SNAPLET_VERSION,
            engine: None,
        }
    }
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_info_has_snaplet_version() {
        let info = VersionInfo::new();
        assert_eq!(info.snaplet, SNAPLET_VERSION);
        assert!(info.engine.is_none());
    }

    #[test]
    fn version_info_serializes_engine_only_when_set() {
        let bare = serde_json::to_value(VersionInfo::new()).unwrap();
        assert!(bare.get("engine").is_none());

        let full = serde_json::to_value(VersionInfo::new().with_engine("chromium")).unwrap();
        assert_eq!(full["engine"], "chromium");
    }
}
