use std::sync::{Mutex, Weak};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::error::{AlarmError, AlarmResult, NotificationError};
use crate::level::AlarmLevel;

use super::notify::{lock_subscribers, StreamId, Subscribers, SummaryChange};

/// Buffered feed of summary transitions.
///
/// Holds up to the configured stream capacity; a stream that falls further
/// behind loses transitions rather than stalling delivery to everyone else.
/// Dropping the stream unregisters it.
#[derive(Debug)]
pub struct SummaryStream {
    stream_id: StreamId,
    rx: Receiver<SummaryChange>,
    subscribers: Weak<Mutex<Subscribers>>,
}

fn closed() -> AlarmError {
    AlarmError::Notification(NotificationError::Disconnected {
        path: "summary_stream".to_string(),
    })
}

impl SummaryStream {
    pub(crate) fn new(stream_id: StreamId, rx: Receiver<SummaryChange>, subscribers: Weak<Mutex<Subscribers>>) -> Self {
        Self {
            stream_id,
            rx,
            subscribers,
        }
    }

    /// Registration id of this stream.
    #[must_use]
    pub const fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Stop receiving new transitions. Buffered ones can still be read.
    ///
    /// Returns false if the stream was already detached.
    pub fn detach(&self) -> bool {
        self.subscribers
            .upgrade()
            .is_some_and(|subscribers| lock_subscribers(&subscribers).remove_stream(self.stream_id))
    }

    /// Wait for the next transition.
    pub fn recv(&self) -> AlarmResult<SummaryChange> {
        self.rx.recv().map_err(|_| closed())
    }

    /// Wait up to `timeout` for the next transition.
    pub fn recv_timeout(&self, timeout: Duration) -> AlarmResult<SummaryChange> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => AlarmError::Notification(NotificationError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            RecvTimeoutError::Disconnected => closed(),
        })
    }

    /// Next buffered transition, if any.
    #[must_use]
    pub fn try_recv(&self) -> Option<SummaryChange> {
        self.rx.try_recv().ok()
    }

    /// Collapse everything buffered into the newest transition.
    ///
    /// A display that only cares about the current level calls this instead of
    /// replaying intermediate states. The returned change keeps the newest
    /// `current` and `sequence`; its `previous` is the level before the oldest
    /// buffered transition.
    #[must_use]
    pub fn latest(&self) -> Option<SummaryChange> {
        let mut buffered = self.rx.try_iter();
        let first = buffered.next()?;
        let oldest_previous: AlarmLevel = first.previous;
        let mut newest = buffered.last().unwrap_or(first);
        newest.previous = oldest_previous;
        Some(newest)
    }

    /// Block up to `timeout` for at least one transition, then collapse the backlog.
    pub fn wait_latest(&self, timeout: Duration) -> AlarmResult<SummaryChange> {
        let first = self.recv_timeout(timeout)?;
        Ok(match self.latest() {
            Some(mut newest) => {
                newest.previous = first.previous;
                newest
            }
            None => first,
        })
    }
}

impl Drop for SummaryStream {
    fn drop(&mut self) {
        self.detach();
    }
}
