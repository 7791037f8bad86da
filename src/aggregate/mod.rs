//! Aggregation core.
//!
//! Per-address channel state and the last published summary live behind a
//! single lock owned by the [`Aggregator`]. Transitions are handed to the
//! [`NotificationChannel`], whose worker thread delivers them to observers and
//! streams outside that lock.

/// Summary computation and the per-address event entry points.
pub mod aggregator;
/// Notification worker, observers, and change records.
pub mod notify;
/// Per-address channel state.
pub mod state;
/// Subscriber stream handle.
pub mod stream;

pub use aggregator::{compute_summary, AggregationSnapshot, Aggregator, EventOutcome};
pub use notify::{NotificationChannel, ObserverId, StreamId, SummaryChange, SummaryObserver};
pub use state::{AlarmStateStore, ChannelState, Epoch};
pub use stream::SummaryStream;
