//! Fire-and-forget hit capture for the redirect path.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::hit_event::HitEvent;
use crate::infrastructure::queue::HitQueue;

/// Non-blocking producer of hit events.
///
/// `record` only pushes into a bounded channel; a single forwarder task moves
/// events to the [`HitQueue`] in channel order, each enqueue bounded by a
/// timeout. Whenever the channel is full, or the queue fails or is too slow, the hit is
/// dropped and counted in `hits_dropped_total`. The redirect never waits on it.
///
/// Cheap to clone. The forwarder exits once every clone is dropped and the
/// channel is drained.
#[derive(Clone)]
pub struct HitRecorder {
    sender: mpsc::Sender<HitEvent>,
}

impl HitRecorder {
    /// Starts the forwarder task.
    pub fn spawn(
        queue: Arc<dyn HitQueue>,
        capacity: usize,
        enqueue_timeout: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let forwarder = tokio::spawn(forward(receiver, queue, enqueue_timeout));

        (Self { sender }, forwarder)
    }

    /// Hands a hit to the forwarder without waiting.
    ///
    /// Returns `false` if the hit was dropped.
    pub fn record(&self, event: HitEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                debug!(short_code = %event.short_code, "Hit buffer full, dropping hit");
                metrics::counter!("hits_dropped_total", "reason" => "buffer_full").increment(1);
                false
            }
            Err(TrySendError::Closed(event)) => {
                debug!(short_code = %event.short_code, "Hit recorder closed, dropping hit");
                metrics::counter!("hits_dropped_total", "reason" => "closed").increment(1);
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Free slots in the buffer.
    pub fn capacity(&self) -> usize {
        self.sender.capacity()
    }

    pub fn max_capacity(&self) -> usize {
        self.sender.max_capacity()
    }
}

async fn forward(
    mut receiver: mpsc::Receiver<HitEvent>,
    queue: Arc<dyn HitQueue>,
    enqueue_timeout: Duration,
) {
    while let Some(event) = receiver.recv().await {
        let short_code = event.short_code.clone();

        match tokio::time::timeout(enqueue_timeout, queue.enqueue(event)).await {
            Ok(Ok(_)) => metrics::counter!("hits_enqueued_total").increment(1),
            Ok(Err(e)) => {
                warn!(short_code = %short_code, error = %e, "Failed to enqueue hit, dropping it");
                metrics::counter!("hits_dropped_total", "reason" => "enqueue_failed").increment(1);
            }
            Err(_) => {
                warn!(
                    short_code = %short_code,
                    timeout_ms = enqueue_timeout.as_millis() as u64,
                    "Hit enqueue timed out, dropping it"
                );
                metrics::counter!("hits_dropped_total", "reason" => "enqueue_timeout").increment(1);
            }
        }
    }

    debug!("Hit forwarder stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hit_event::ClientMetadata;
    use crate::infrastructure::queue::{
        Delivery, InMemoryQueue, QueueError, QueuePosition, QueueResult,
    };
    use async_trait::async_trait;

    fn hit(code: &str) -> HitEvent {
        HitEvent::new(code, ClientMetadata::default())
    }

    /// Queue whose enqueue never completes.
    struct StalledQueue;

    #[async_trait]
    impl HitQueue for StalledQueue {
        async fn enqueue(&self, _event: HitEvent) -> QueueResult<Option<QueuePosition>> {
            std::future::pending().await
        }
        async fn dequeue_batch(&self, _: usize, _: Duration) -> QueueResult<Vec<Delivery>> {
            Ok(Vec::new())
        }
        async fn commit(&self, _: QueuePosition) -> QueueResult<()> {
            Ok(())
        }
        async fn recover(&self) -> QueueResult<usize> {
            Ok(0)
        }
        async fn len(&self) -> QueueResult<u64> {
            Err(QueueError::Connection("stalled".to_string()))
        }
        async fn health_check(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_forwards_hits_in_order() {
        let queue = Arc::new(InMemoryQueue::new(100));
        let (recorder, forwarder) =
            HitRecorder::spawn(queue.clone(), 16, Duration::from_millis(50));

        for code in ["a", "b", "c"] {
            assert!(recorder.record(hit(code)));
        }
        drop(recorder);
        forwarder.await.unwrap();

        let batch = queue.dequeue_batch(10, Duration::ZERO).await.unwrap();
        let codes: Vec<&str> = batch.iter().map(|d| d.event.short_code.as_str()).collect();
        assert_eq!(codes, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_full_buffer_drops_without_blocking() {
        let (recorder, _forwarder) =
            HitRecorder::spawn(Arc::new(StalledQueue), 1, Duration::from_secs(60));

        // The forwarder takes the first hit and stalls on it; the second fills
        // the buffer, the third has nowhere to go.
        assert!(recorder.record(hit("a")));
        tokio::task::yield_now().await;
        assert!(recorder.record(hit("b")));
        assert!(!recorder.record(hit("c")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_enqueue_times_out_and_moves_on() {
        let (recorder, forwarder) =
            HitRecorder::spawn(Arc::new(StalledQueue), 16, Duration::from_millis(50));

        assert!(recorder.record(hit("a")));
        assert!(recorder.record(hit("b")));
        drop(recorder);

        // Both enqueues time out; the forwarder still drains and exits.
        forwarder.await.unwrap();
    }

    #[tokio::test]
    async fn test_full_queue_drops_hit() {
        let queue = Arc::new(InMemoryQueue::new(1));
        let (recorder, forwarder) =
            HitRecorder::spawn(queue.clone(), 16, Duration::from_millis(50));

        recorder.record(hit("a"));
        recorder.record(hit("b"));
        drop(recorder);
        forwarder.await.unwrap();

        assert_eq!(queue.len().await.unwrap(), 1);
    }
}
