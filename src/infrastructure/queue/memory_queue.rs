//! In-process hit queue for development and tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use super::service::{Delivery, HitQueue, QueueError, QueuePosition, QueueResult};
use crate::domain::hit_event::HitEvent;

/// Ordered in-process buffer with a single consumer cursor.
///
/// Events stay in the buffer until committed, so a consumer that abandons a
/// batch (or a new worker attached to the same queue) gets them again after
/// [`HitQueue::recover`]. Nothing survives a process restart.
///
/// Serves one consumer at a time: commits are cumulative.
pub struct InMemoryQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
}

struct Inner {
    /// Uncommitted events, oldest first.
    entries: VecDeque<(u64, HitEvent)>,
    next_seq: u64,
    /// Sequence of the next event to hand out.
    cursor: u64,
}

impl InMemoryQueue {
    /// Creates a queue holding at most `capacity` uncommitted events.
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "Using in-memory hit queue");
        Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::new(),
                next_seq: 1,
                cursor: 1,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_undelivered(&self, max_items: usize) -> Vec<Delivery> {
        let mut inner = self.lock();
        let cursor = inner.cursor;

        let deliveries: Vec<Delivery> = inner
            .entries
            .iter()
            .skip_while(|(seq, _)| *seq < cursor)
            .take(max_items)
            .map(|(seq, event)| Delivery {
                position: QueuePosition::new(0, *seq),
                event: event.clone(),
            })
            .collect();

        if let Some(last) = deliveries.last() {
            inner.cursor = last.position.minor + 1;
        }

        deliveries
    }
}

#[async_trait]
impl HitQueue for InMemoryQueue {
    async fn enqueue(&self, event: HitEvent) -> QueueResult<Option<QueuePosition>> {
        let position = {
            let mut inner = self.lock();
            if inner.entries.len() >= self.capacity {
                return Err(QueueError::Full {
                    capacity: self.capacity,
                });
            }

            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.entries.push_back((seq, event));
            QueuePosition::new(0, seq)
        };

        self.notify.notify_waiters();
        Ok(Some(position))
    }

    async fn dequeue_batch(
        &self,
        max_items: usize,
        max_wait: Duration,
    ) -> QueueResult<Vec<Delivery>> {
        if max_items == 0 {
            return Ok(Vec::new());
        }

        let deadline = Instant::now() + max_wait;

        loop {
            // Registered before checking so an enqueue in between is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let deliveries = self.take_undelivered(max_items);
            if !deliveries.is_empty() {
                return Ok(deliveries);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn commit(&self, up_to: QueuePosition) -> QueueResult<()> {
        if up_to.major != 0 {
            return Err(QueueError::InvalidPosition(up_to.to_string()));
        }

        let mut inner = self.lock();
        while inner
            .entries
            .front()
            .is_some_and(|(seq, _)| *seq <= up_to.minor)
        {
            inner.entries.pop_front();
        }
        inner.cursor = inner.cursor.max(up_to.minor + 1);

        Ok(())
    }

    async fn recover(&self) -> QueueResult<usize> {
        let mut inner = self.lock();
        let cursor = inner.cursor;
        let first_uncommitted = inner
            .entries
            .front()
            .map_or(inner.next_seq, |(seq, _)| *seq);

        let redelivered = inner
            .entries
            .iter()
            .take_while(|(seq, _)| *seq < cursor)
            .count();
        inner.cursor = first_uncommitted;

        if redelivered > 0 {
            debug!(redelivered, "Rewound in-memory hit queue");
        }

        Ok(redelivered)
    }

    async fn len(&self) -> QueueResult<u64> {
        Ok(self.lock().entries.len() as u64)
    }

    async fn health_check(&self) -> bool {
        true
    }
}
