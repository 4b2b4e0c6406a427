//! Telesink record channel
//!
//! Producers and the aggregator exchange class-tagged byte records through a
//! [`Channel`]. Three classes share one channel: metric deltas, alarm events
//! and log lines.
//!
//! # Backends
//!
//! - **RedisChannel**: Redis lists, one per class, usable across processes
//! - **MemoryChannel**: in-process queues for tests and embedded use

pub mod error;
pub mod traits;

#[cfg(feature = "memory-backend")]
pub mod memory_impl;

#[cfg(feature = "redis-backend")]
pub mod redis_impl;

// Re-exports
pub use bytes::Bytes;
pub use error::{ChannelError, Result};
pub use traits::{
    truncate_payload, Channel, MessageClass, RecvMode, DEFAULT_MAX_MESSAGE_SIZE,
    DEFAULT_QUEUE_ID,
};

#[cfg(feature = "memory-backend")]
pub use memory_impl::MemoryChannel;

#[cfg(feature = "redis-backend")]
pub use redis_impl::RedisChannel;
