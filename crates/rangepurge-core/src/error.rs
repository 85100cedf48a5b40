//! Error types for Rangepurge.
//!
//! [`PurgeError`] covers everything that can go wrong while configuring or
//! running a single purge session. [`Error`] is the top-level type used by
//! configuration loading and the binary.

use thiserror::Error;

use crate::ids::{MessageId, UserId};

/// Result type alias using the top-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Rangepurge.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Purge session error
    #[error("{0}")]
    Purge(#[from] PurgeError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors local to one purge session.
///
/// Configuration-time variants are returned synchronously by the session
/// crate. Execution-time variants (`PageFetchFailed`, `BulkDeleteFailed`,
/// `RangeExhaustedWithoutEnd`) are only ever delivered through the progress
/// sink of a running purge.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PurgeError {
    /// No purge is being set up in the channel.
    #[error("there is no purge being set up in this channel")]
    NoActiveSession,

    /// The purge belongs to another user.
    #[error("purge is owned by user {owner}")]
    NotOwner { owner: UserId },

    /// The purge has already started running.
    #[error("purge is already running")]
    AlreadyRunning,

    /// A marker falls outside the deletion age window.
    #[error("message {id} is outside the {window_days}-day window")]
    InvalidRangeAge { id: MessageId, window_days: i64 },

    /// Start and end marker would be the same message.
    #[error("start and end marker cannot be the same message ({0})")]
    DuplicateMarker(MessageId),

    /// Bulk limit outside of the accepted bounds.
    #[error("bulk limit {value} must be between {min} and {max}")]
    InvalidBulkLimit { value: u32, min: u32, max: u32 },

    /// The start marker has not been selected yet.
    #[error("start marker is not set")]
    MissingStart,

    /// The end marker has not been selected yet.
    #[error("end marker is not set")]
    MissingEnd,

    /// Range markers themselves cannot be excluded.
    #[error("message {0} is a range marker")]
    MarkerNotExcludable(MessageId),

    /// The message lies outside the configured range.
    #[error("message {0} is out of the specified range")]
    OutOfRange(MessageId),

    /// Fetching a history page failed.
    #[error("error while fetching messages: {0}")]
    PageFetchFailed(String),

    /// A bulk delete call was rejected.
    #[error("error while bulk deleting: {0}")]
    BulkDeleteFailed(String),

    /// History ran out before the end marker was seen.
    #[error("reached the end of the channel history without finding end message {0}")]
    RangeExhaustedWithoutEnd(MessageId),
}

impl PurgeError {
    /// Whether this error comes out of a running purge rather than its setup.
    pub fn is_execution_error(&self) -> bool {
        matches!(
            self,
            PurgeError::PageFetchFailed(_)
                | PurgeError::BulkDeleteFailed(_)
                | PurgeError::RangeExhaustedWithoutEnd(_)
        )
    }
}
