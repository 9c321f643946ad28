//! Hit queue trait, positions and error types.

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::domain::hit_event::HitEvent;

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue connection error: {0}")]
    Connection(String),

    #[error("queue is full ({capacity} pending events)")]
    Full { capacity: usize },

    #[error("queue operation error: {0}")]
    Operation(String),

    #[error("failed to encode hit event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid queue position: {0}")]
    InvalidPosition(String),
}

impl From<redis::RedisError> for QueueError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
            Self::Connection(e.to_string())
        } else {
            Self::Operation(e.to_string())
        }
    }
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Totally ordered position of an event in the queue.
///
/// Formatted as `major-minor`, which is the Redis stream entry ID format.
/// The in-memory queue uses `0-<sequence>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueuePosition {
    pub major: u64,
    pub minor: u64,
}

impl QueuePosition {
    pub const fn new(major: u64, minor: u64) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for QueuePosition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}", self.major, self.minor)
    }
}

impl FromStr for QueuePosition {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .split_once('-')
            .ok_or_else(|| QueueError::InvalidPosition(s.to_string()))?;

        let parse = |part: &str| {
            part.parse::<u64>()
                .map_err(|_| QueueError::InvalidPosition(s.to_string()))
        };

        Ok(Self::new(parse(major)?, parse(minor)?))
    }
}

/// An event handed to a consumer, with the position to commit once it is flushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub position: QueuePosition,
    pub event: HitEvent,
}

/// Ordered, acknowledged queue of hit events.
///
/// Events from one producer are delivered in enqueue order. A consumer commits
/// a position once everything up to it has been flushed; committed events are
/// never redelivered to the consumer group, uncommitted ones are redelivered
/// after [`HitQueue::recover`], a restart or a claim timeout.
///
/// # Implementations
///
/// - [`crate::infrastructure::queue::InMemoryQueue`] - ordered in-process buffer (development)
/// - [`crate::infrastructure::queue::RedisStreamQueue`] - Redis Streams consumer group (production)
#[async_trait]
pub trait HitQueue: Send + Sync {
    /// Appends an event.
    ///
    /// # Returns
    ///
    /// The position assigned to the event, when the backend reports one.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend is unavailable or full. Callers on the
    /// redirect path drop the hit instead of propagating the error.
    async fn enqueue(&self, event: HitEvent) -> QueueResult<Option<QueuePosition>>;

    /// Takes up to `max_items` undelivered events, waiting at most `max_wait`
    /// for the first one.
    ///
    /// Cancel-safe: dropping the future never loses events.
    async fn dequeue_batch(&self, max_items: usize, max_wait: Duration)
    -> QueueResult<Vec<Delivery>>;

    /// Marks every delivered event up to and including `up_to` as processed.
    async fn commit(&self, up_to: QueuePosition) -> QueueResult<()>;

    /// Rewinds delivery to the committed cursor so that delivered but
    /// uncommitted events are handed out again.
    ///
    /// # Returns
    ///
    /// The number of events scheduled for redelivery, when known.
    async fn recover(&self) -> QueueResult<usize>;

    /// Number of events held by the queue.
    async fn len(&self) -> QueueResult<u64>;

    /// Checks whether the backend is reachable.
    async fn health_check(&self) -> bool;
}
