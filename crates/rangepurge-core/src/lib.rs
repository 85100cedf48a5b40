//! # rangepurge-core
//!
//! Core types and abstractions for Rangepurge, a range-bounded bulk message
//! purge for chat channels.
//!
//! This crate provides:
//! - Time-ordered snowflake identifiers
//! - Channel history primitives and scan direction
//! - Configuration system
//! - Common error types

pub mod config;
pub mod error;
pub mod ids;
pub mod message;

pub use config::Config;
pub use error::{Error, PurgeError, Result};
pub use ids::{ChannelId, MessageId, UserId};
pub use message::{Direction, HistoryItem};
