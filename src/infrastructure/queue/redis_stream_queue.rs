//! Redis Streams hit queue with consumer-group offsets.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamId, StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, Client};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::service::{Delivery, HitQueue, QueueError, QueuePosition, QueueResult};
use crate::domain::hit_event::HitEvent;

/// Longest single blocking read. Keeps each call well under the client's
/// response timeout; longer waits are issued as several slices.
const READ_SLICE: Duration = Duration::from_millis(250);

/// Field holding the JSON-encoded event in each stream entry.
const PAYLOAD_FIELD: &str = "data";

/// Stream, group and consumer naming for [`RedisStreamQueue`].
#[derive(Debug, Clone)]
pub struct StreamQueueOptions {
    pub stream: String,
    pub group: String,
    pub consumer: String,
    /// Pending entries of other consumers idle this long are taken over.
    pub claim_idle: Duration,
}

/// Durable hit queue on a Redis stream.
///
/// - `XADD` appends, `XREADGROUP` delivers, `XACK` commits.
/// - Delivered entries stay in the consumer's pending list until acknowledged.
///   On startup and after [`HitQueue::recover`] the pending list is replayed
///   (`XREADGROUP ... 0`) before new entries (`>`) are read.
/// - Entries left pending by a crashed consumer are claimed with `XAUTOCLAIM`
///   once idle for [`StreamQueueOptions::claim_idle`].
///
/// Reads run on their own connection so a blocked `XREADGROUP` never delays
/// producers sharing the multiplexed connection.
pub struct RedisStreamQueue {
    producer: ConnectionManager,
    consumer: ConnectionManager,
    options: StreamQueueOptions,
    state: Mutex<ReadState>,
}

struct ReadState {
    /// Delivered, not yet acknowledged entries, by position.
    delivered: BTreeMap<QueuePosition, String>,
    /// Set while replaying this consumer's pending list; last ID seen.
    replay_from: Option<String>,
    claim_cursor: String,
    last_claim: Option<Instant>,
}

impl RedisStreamQueue {
    /// Connects to Redis and makes sure the stream and consumer group exist.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Connection`] if the URL is invalid or Redis is
    /// unreachable, and [`QueueError::Operation`] if the group cannot be created.
    pub async fn connect(redis_url: &str, options: StreamQueueOptions) -> QueueResult<Self> {
        info!(
            stream = %options.stream,
            group = %options.group,
            consumer = %options.consumer,
            "Connecting hit queue to Redis"
        );

        let client = Client::open(redis_url).map_err(|e| {
            QueueError::Connection(format!("Failed to create Redis client: {}", e))
        })?;

        let producer = ConnectionManager::new(client.clone()).await.map_err(|e| {
            QueueError::Connection(format!("Failed to connect to Redis: {}", e))
        })?;
        let consumer = ConnectionManager::new(client).await.map_err(|e| {
            QueueError::Connection(format!("Failed to connect to Redis: {}", e))
        })?;

        let mut conn = producer.clone();
        match conn
            .xgroup_create_mkstream::<_, _, _, ()>(&options.stream, &options.group, "0")
            .await
        {
            Ok(()) => info!(stream = %options.stream, "Created hit stream consumer group"),
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(group = %options.group, "Consumer group already exists")
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            producer,
            consumer,
            options,
            state: Mutex::new(ReadState {
                delivered: BTreeMap::new(),
                replay_from: Some("0".to_string()),
                claim_cursor: "0-0".to_string(),
                last_claim: None,
            }),
        })
    }

    async fn read_group(
        &self,
        from_id: &str,
        count: usize,
        block: Option<Duration>,
    ) -> QueueResult<Vec<StreamId>> {
        let mut opts = StreamReadOptions::default()
            .group(&self.options.group, &self.options.consumer)
            .count(count);
        // BLOCK 0 would wait forever.
        if let Some(block) = block.filter(|b| !b.is_zero()) {
            opts = opts.block(block.as_millis() as usize);
        }

        let mut conn = self.consumer.clone();
        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&self.options.stream], &[from_id], &opts)
            .await?;

        Ok(reply
            .map(|r| r.keys.into_iter().flat_map(|key| key.ids).collect())
            .unwrap_or_default())
    }

    async fn claim_stale(&self, state: &mut ReadState, count: usize) -> QueueResult<Vec<StreamId>> {
        let mut conn = self.consumer.clone();
        let reply: StreamAutoClaimReply = conn
            .xautoclaim_options(
                &self.options.stream,
                &self.options.group,
                &self.options.consumer,
                self.options.claim_idle.as_millis() as u64,
                &state.claim_cursor,
                StreamAutoClaimOptions::default().count(count),
            )
            .await?;

        state.claim_cursor = reply.next_stream_id;
        state.last_claim = Some(Instant::now());

        let claimed: Vec<StreamId> = reply
            .claimed
            .into_iter()
            .filter(|entry| {
                entry
                    .id
                    .parse::<QueuePosition>()
                    .is_ok_and(|pos| !state.delivered.contains_key(&pos))
            })
            .collect();

        if !claimed.is_empty() {
            warn!(
                claimed = claimed.len(),
                "Claimed stale hit events from an idle consumer"
            );
        }

        Ok(claimed)
    }

    fn claim_due(&self, state: &ReadState) -> bool {
        state
            .last_claim
            .is_none_or(|at| at.elapsed() >= self.options.claim_idle / 2)
    }

    /// Decodes entries into deliveries, acknowledging the ones that can never
    /// be processed.
    ///
    /// Deliveries are tracked for [`HitQueue::commit`] only after the last
    /// await, so a failed or dropped call leaves them pending for replay.
    async fn decode(&self, entries: Vec<StreamId>, state: &mut ReadState) -> Vec<Delivery> {
        let (decoded, poison) = split_entries(entries);

        if !poison.is_empty() {
            warn!(
                count = poison.len(),
                ids = ?poison,
                "Dropping undecodable hit events"
            );
            metrics::counter!("hits_dropped_total", "reason" => "undecodable")
                .increment(poison.len() as u64);

            let mut conn = self.consumer.clone();
            if let Err(e) = conn
                .xack::<_, _, _, i64>(&self.options.stream, &self.options.group, &poison)
                .await
            {
                warn!(error = %e, "Failed to acknowledge undecodable hit events, they stay pending");
            }
        }

        decoded
            .into_iter()
            .map(|(id, delivery)| {
                state.delivered.insert(delivery.position, id);
                delivery
            })
            .collect()
    }
}

/// Splits stream entries into decodable deliveries (with their entry IDs) and
/// the IDs of entries that can never be decoded.
fn split_entries(entries: Vec<StreamId>) -> (Vec<(String, Delivery)>, Vec<String>) {
    let mut decoded = Vec::with_capacity(entries.len());
    let mut poison = Vec::new();

    for entry in entries {
        let Ok(position) = entry.id.parse::<QueuePosition>() else {
            poison.push(entry.id);
            continue;
        };

        let event = entry
            .get::<String>(PAYLOAD_FIELD)
            .and_then(|payload| serde_json::from_str::<HitEvent>(&payload).ok());

        match event {
            Some(event) => decoded.push((entry.id, Delivery { position, event })),
            None => poison.push(entry.id),
        }
    }

    (decoded, poison)
}

#[async_trait]
impl HitQueue for RedisStreamQueue {
    async fn enqueue(&self, event: HitEvent) -> QueueResult<Option<QueuePosition>> {
        let payload = serde_json::to_string(&event)?;
        let mut conn = self.producer.clone();

        let id: String = conn
            .xadd(&self.options.stream, "*", &[(PAYLOAD_FIELD, payload)])
            .await?;

        Ok(id.parse().ok())
    }

    async fn dequeue_batch(
        &self,
        max_items: usize,
        max_wait: Duration,
    ) -> QueueResult<Vec<Delivery>> {
        if max_items == 0 {
            return Ok(Vec::new());
        }

        let mut state = self.state.lock().await;

        if let Some(from) = state.replay_from.clone() {
            let entries = self.read_group(&from, max_items, None).await?;
            let last_id = entries.last().map(|entry| entry.id.clone());

            let deliveries = self.decode(entries, &mut state).await;
            state.replay_from = last_id;
            if state.replay_from.is_none() {
                debug!("Pending hit events replayed");
            }
            if !deliveries.is_empty() {
                return Ok(deliveries);
            }
        }

        if self.claim_due(&state) {
            let claimed = self.claim_stale(&mut state, max_items).await?;
            let deliveries = self.decode(claimed, &mut state).await;
            if !deliveries.is_empty() {
                return Ok(deliveries);
            }
        }

        let deadline = Instant::now() + max_wait;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let entries = self
                .read_group(">", max_items, Some(remaining.min(READ_SLICE)))
                .await?;

            let deliveries = self.decode(entries, &mut state).await;
            if !deliveries.is_empty() || remaining <= READ_SLICE {
                return Ok(deliveries);
            }
        }
    }

    async fn commit(&self, up_to: QueuePosition) -> QueueResult<()> {
        let mut state = self.state.lock().await;

        let ids: Vec<String> = state
            .delivered
            .range(..=up_to)
            .map(|(_, id)| id.clone())
            .collect();
        if ids.is_empty() {
            return Ok(());
        }

        let mut conn = self.consumer.clone();
        conn.xack::<_, _, _, i64>(&self.options.stream, &self.options.group, &ids)
            .await?;

        state.delivered.retain(|position, _| *position > up_to);
        debug!(acked = ids.len(), up_to = %up_to, "Committed hit events");

        Ok(())
    }

    async fn recover(&self) -> QueueResult<usize> {
        let mut state = self.state.lock().await;
        let redelivered = state.delivered.len();

        state.delivered.clear();
        state.replay_from = Some("0".to_string());

        Ok(redelivered)
    }

    async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.producer.clone();
        Ok(conn.xlen::<_, u64>(&self.options.stream).await?)
    }

    async fn health_check(&self) -> bool {
        let mut conn = self.producer.clone();
        conn.ping::<()>().await.is_ok()
    }
}
