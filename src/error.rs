//! Error types for the alarm summary engine.
//!
//! All errors are strongly typed using thiserror. None of them is fatal: the
//! worst case for the engine is a summary pinned at `Disconnected`.

use thiserror::Error;

use crate::signal::Address;

/// Errors reported synchronously to callers of the configuration API.
///
/// When one of these is returned the aggregation state is left unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Device '{name}' is already part of this aggregation")]
    DuplicateDevice {
        name: String,
    },

    #[error("Device '{name}' is not known")]
    UnknownDevice {
        name: String,
    },

    #[error("Device name cannot be empty")]
    EmptyDeviceName,

    #[error("A reconfiguration is already running on this thread")]
    ReconfigurationInProgress,

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Errors raised by the transport when establishing or releasing a subscription.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("Subscription to '{address}' was rejected: {reason}")]
    Rejected {
        address: Address,
        reason: String,
    },

    #[error("Failed to release subscription for '{address}': {reason}")]
    ReleaseFailed {
        address: Address,
        reason: String,
    },

    #[error("Transport unavailable: {reason}")]
    Unavailable {
        reason: String,
    },
}

/// Errors surfaced to notification stream receivers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotificationError {
    #[error("No summary change received within {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Notification path '{path}' is disconnected")]
    Disconnected {
        path: String,
    },
}

/// Top-level error type for the alarm summary engine.
#[derive(Debug, Error)]
pub enum AlarmError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl AlarmError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns true if this is a subscription error.
    #[must_use]
    pub const fn is_subscription(&self) -> bool {
        matches!(self, Self::Subscription(_))
    }

    /// Returns true if this is a notification error.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        matches!(self, Self::Notification(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if the same call may succeed later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Configuration(e) => matches!(e, ConfigurationError::ReconfigurationInProgress),
            Self::Subscription(e) => matches!(e, SubscriptionError::Unavailable { .. }),
            Self::Notification(e) => matches!(e, NotificationError::Timeout { .. }),
            Self::Internal { .. } => false,
        }
    }
}

/// Builds the internal error used when a lock was poisoned by a panicking holder.
pub(crate) fn lock_err(context: &'static str) -> AlarmError {
    AlarmError::internal(format!("poisoned lock: {context}"))
}

/// Result type alias for alarm summary operations.
pub type AlarmResult<T> = Result<T, AlarmError>;
