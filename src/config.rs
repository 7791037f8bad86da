//! Engine configuration.
//!
//! Every field has a default, so a configuration document only needs to name
//! what it overrides:
//!
//! ```json
//! { "importance": "normal", "notification": { "stream_capacity": 64 } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AlarmResult, ConfigurationError};
use crate::level::ImportanceLevel;

/// Delivery settings for summary streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Per-stream buffer capacity; transitions beyond it are dropped for that stream.
    pub stream_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { stream_capacity: 1024 }
    }
}

/// Configuration of an [`AlarmSummary`](crate::AlarmSummary).
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmSummaryConfig {
    /// Importance level applied to devices until changed at runtime.
    pub importance: ImportanceLevel,
    pub notification: NotificationConfig,
}

impl AlarmSummaryConfig {
    /// Parse a JSON configuration document.
    pub fn from_json_str(json: &str) -> AlarmResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            ConfigurationError::InvalidConfig {
                reason: format!("malformed configuration: {e}"),
            }
            .into()
        })
    }

    /// Read and parse a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> AlarmResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigurationError::InvalidConfig {
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::from_json_str(&raw)
    }

    /// Override the initial importance level.
    #[must_use]
    pub fn with_importance(mut self, importance: ImportanceLevel) -> Self {
        self.importance = importance;
        self
    }
}
