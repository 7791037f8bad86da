//! # alarm-summary
//!
//! Reduces the live state of many independently updating signal channels into
//! a single worst-case alarm level, and republishes that level whenever it
//! changes.
//!
//! ## Core Concepts
//!
//! - **Device**: a named collection of signals, each tagged with an importance
//! - **ImportanceLevel**: selects which signals of a device take part
//! - **AlarmLevel**: `NoAlarm < Minor < Major < Invalid < Disconnected`;
//!   any disconnected channel makes the whole summary `Disconnected`
//! - **Transport**: the subscription service delivering per-address events
//! - **SummaryStream / SummaryObserver**: receive summary transitions
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use alarm_summary::{AlarmSummary, AlarmSummaryConfig, Device, ImportanceTag, InMemoryTransport};
//!
//! let transport = Arc::new(InMemoryTransport::new());
//! let engine = AlarmSummary::new(AlarmSummaryConfig::default(), transport.clone())?;
//!
//! engine.add_device(
//!     Device::new("sample_stage")
//!         .with_signal("x", "ca://STAGE:X:RBV", ImportanceTag::Hinted)
//!         .with_signal("velocity", "ca://STAGE:X:VELO", ImportanceTag::Config),
//! )?;
//!
//! let changes = engine.subscribe()?;
//! let change = changes.recv()?;
//! println!("summary is now {}", change.current);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Leaf types
pub mod error;
pub mod filter;
pub mod level;
pub mod signal;

// Collaborator seams
pub mod directory;
pub mod transport;

// Engine
pub mod aggregate;
pub mod config;
pub mod controller;
pub mod presentation;
pub mod registry;

// Re-export primary types at crate root for convenience
pub use aggregate::{
    compute_summary, AggregationSnapshot, Aggregator, ChannelState, EventOutcome, ObserverId,
    SummaryChange, SummaryObserver, SummaryStream,
};
pub use config::{AlarmSummaryConfig, NotificationConfig};
pub use controller::AlarmSummary;
pub use directory::{DeviceDirectory, InMemoryDirectory};
pub use error::{AlarmError, AlarmResult, ConfigurationError, NotificationError, SubscriptionError};
pub use filter::select;
pub use level::{AlarmLevel, ImportanceLevel};
pub use presentation::{indicator_color, AlarmIndicator, Presenter, Rgba, Shape, ShapeStylesheet};
pub use registry::{ChannelRegistry, TeardownReport};
pub use signal::{Address, Device, ImportanceTag, Signal};
pub use transport::{ChannelEventSink, InMemoryTransport, SubscriptionHandle, SubscriptionId, Transport};
