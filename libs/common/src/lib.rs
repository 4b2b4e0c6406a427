//! Telesink basic library
//!
//! Provides building blocks shared by the telesink crates:
//! - diagnostic logging
//! - shutdown signal handling
//! - clock abstraction and timestamp formats
//! - host identity
//! - pooled Redis client

#[cfg(feature = "redis")]
pub mod redis;

pub mod host;
pub mod logging;
pub mod shutdown;
pub mod time;

pub use host::resolve_hostname;
pub use time::{ManualTimeProvider, SystemTimeProvider, TimeProvider};
