//! Hit queue backends.
//!
//! Provides a [`HitQueue`] trait with two implementations:
//! - [`InMemoryQueue`] - Ordered in-process buffer for development and tests
//! - [`RedisStreamQueue`] - Durable Redis stream with consumer-group offsets

mod memory_queue;
mod redis_stream_queue;
mod service;

pub use memory_queue::InMemoryQueue;
pub use redis_stream_queue::{RedisStreamQueue, StreamQueueOptions};
pub use service::{Delivery, HitQueue, QueueError, QueuePosition, QueueResult};
