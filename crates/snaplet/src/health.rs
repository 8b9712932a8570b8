//! Health status types for the snaplet runtime.

use serde::{Deserialize, Serialize};

/// Stored health state of the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Health {
    /// Starting up, not accepting renders yet
    #[default]
    Starting,
    /// Accepting render requests
    Ready,
    /// Shut down or unrecoverable
    Defunct,
}

/// Response-only health status. BUSY is derived from admission-gate pressure
/// at snapshot time and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthResponse {
    Starting,
    Ready,
    Busy,
    Defunct,
}

impl From<Health> for HealthResponse {
    fn from(health: Health) -> Self {
        match health {
            Health::Starting => HealthResponse::Starting,
            Health::Ready => HealthResponse::Ready,
            Health::Defunct => HealthResponse::Defunct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_default_is_starting() {
        assert_eq!(Health::default(), Health::Starting);
    }

    #[test]
    fn health_serializes_screaming_snake_case() {
        assert_eq!(
            serde_json::to_value([Health::Starting, Health::Ready, Health::Defunct]).unwrap(),
            serde_json::json!(["STARTING", "READY", "DEFUNCT"])
        );
    }

    #[test]
    fn health_response_includes_busy() {
        assert_eq!(
            serde_json::to_value(HealthResponse::Busy).unwrap(),
            serde_json::json!("BUSY")
        );
    }

    #[test]
    fn health_deserializes_screaming_snake_case() {
        assert_eq!(
            serde_json::from_str::<Health>("\"READY\"").unwrap(),
            Health::Ready
        );
    }
}
