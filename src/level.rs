//! Ordered enumerations driving signal selection and alarm precedence.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Which signals of a device take part in the summary.
///
/// Variants are ordered by increasing generality: every signal included at one
/// level is also included at every later level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportanceLevel {
    /// Only signals tagged hinted.
    #[default]
    Hinted,

    /// Hinted and normal signals.
    Normal,

    /// Everything except omitted signals.
    Config,

    /// All signals.
    Omitted,
}

impl ImportanceLevel {
    /// All levels, narrowest first.
    pub const ALL: [Self; 4] = [Self::Hinted, Self::Normal, Self::Config, Self::Omitted];
}

impl fmt::Display for ImportanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hinted => write!(f, "hinted"),
            Self::Normal => write!(f, "normal"),
            Self::Config => write!(f, "config"),
            Self::Omitted => write!(f, "omitted"),
        }
    }
}

impl FromStr for ImportanceLevel {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hinted" => Ok(Self::Hinted),
            "normal" => Ok(Self::Normal),
            "config" => Ok(Self::Config),
            "omitted" => Ok(Self::Omitted),
            other => Err(ConfigurationError::InvalidConfig {
                reason: format!("unknown importance level '{other}'"),
            }),
        }
    }
}

/// Alarm severity of a channel or of the whole aggregation.
///
/// The derived ordering is the precedence used for worst-case selection:
/// `NoAlarm < Minor < Major < Invalid < Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmLevel {
    /// Value is within limits.
    NoAlarm,

    /// Minor alarm.
    Minor,

    /// Major alarm.
    Major,

    /// The value itself is not trustworthy.
    Invalid,

    /// No visibility; overrides every other level.
    Disconnected,
}

impl AlarmLevel {
    /// All levels, least severe first.
    pub const ALL: [Self; 5] = [
        Self::NoAlarm,
        Self::Minor,
        Self::Major,
        Self::Invalid,
        Self::Disconnected,
    ];

    /// Maps a numeric severity code (0..=4) onto a level.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::NoAlarm),
            1 => Some(Self::Minor),
            2 => Some(Self::Major),
            3 => Some(Self::Invalid),
            4 => Some(Self::Disconnected),
            _ => None,
        }
    }

    /// Numeric severity code of this level.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for AlarmLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAlarm => write!(f, "no_alarm"),
            Self::Minor => write!(f, "minor"),
            Self::Major => write!(f, "major"),
            Self::Invalid => write!(f, "invalid"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}
