//! Hit event model for asynchronous hit counting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request metadata captured alongside a hit.
///
/// Opaque to the pipeline: the worker passes it to the analytics store
/// untouched. Every field is optional so missing headers never block a redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
}

/// One redirect occurrence.
///
/// Created by the redirect handler, carried through the hit queue as JSON and
/// consumed by [`crate::domain::hit_worker::HitWorker`]. Never mutated after
/// creation.
///
/// # Usage Flow
///
/// 1. Created in the redirect handler with request metadata
/// 2. Handed to [`crate::application::services::HitRecorder`] (non-blocking)
/// 3. Enqueued on the configured [`crate::infrastructure::queue::HitQueue`]
/// 4. Counted into the aggregate store and appended to the analytics store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitEvent {
    pub short_code: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub client: ClientMetadata,
}

impl HitEvent {
    /// Creates a hit stamped with the current time.
    pub fn new(short_code: impl Into<String>, client: ClientMetadata) -> Self {
        Self::at(short_code, Utc::now(), client)
    }

    /// Creates a hit with an explicit timestamp.
    pub fn at(
        short_code: impl Into<String>,
        occurred_at: DateTime<Utc>,
        client: ClientMetadata,
    ) -> Self {
        Self {
            short_code: short_code.into(),
            occurred_at,
            client,
        }
    }

    /// Key under which downstream analytics consumers can drop duplicates
    /// produced by at-least-once redelivery.
    pub fn dedup_key(&self) -> (&str, DateTime<Utc>) {
        (&self.short_code, self.occurred_at)
    }
}
