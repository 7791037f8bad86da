//! Devices, their signals, and the addresses used to subscribe to them.
//!
//! Addresses are opaque: the engine never interprets them beyond equality.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Subscription key of a single signal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wraps an address string.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The raw address string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Importance classification attached to a signal by the directory.
///
/// Tags the engine does not recognise are kept verbatim so they survive a
/// serialization round trip.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ImportanceTag {
    Hinted,
    Normal,
    Config,
    Omitted,
    Unknown(String),
}

impl From<&str> for ImportanceTag {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "hinted" => Self::Hinted,
            "normal" => Self::Normal,
            "config" => Self::Config,
            "omitted" => Self::Omitted,
            _ => Self::Unknown(value.to_string()),
        }
    }
}

impl From<String> for ImportanceTag {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<ImportanceTag> for String {
    fn from(value: ImportanceTag) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ImportanceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hinted => write!(f, "hinted"),
            Self::Normal => write!(f, "normal"),
            Self::Config => write!(f, "config"),
            Self::Omitted => write!(f, "omitted"),
            Self::Unknown(raw) => f.write_str(raw),
        }
    }
}

/// An addressable data point belonging to a device.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub address: Address,
    pub importance: ImportanceTag,
}

impl Signal {
    /// Creates a signal.
    #[must_use]
    pub fn new(name: impl Into<String>, address: impl Into<Address>, importance: ImportanceTag) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            importance,
        }
    }
}

/// A named collection of signals, added to and removed from an aggregation as a unit.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    #[serde(default)]
    pub signals: Vec<Signal>,
}

impl Device {
    /// Creates a device without signals.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signals: Vec::new(),
        }
    }

    /// Appends a signal.
    #[must_use]
    pub fn with_signal(
        mut self,
        name: impl Into<String>,
        address: impl Into<Address>,
        importance: ImportanceTag,
    ) -> Self {
        self.signals.push(Signal::new(name, address, importance));
        self
    }

    /// Checks that the device can be registered.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.name.trim().is_empty() {
            return Err(ConfigurationError::EmptyDeviceName);
        }
        Ok(())
    }
}
