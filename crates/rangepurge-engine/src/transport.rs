//! Transport and progress-sink trait definitions.
//!
//! The engine never talks to a chat service directly. It pages history and
//! deletes messages through [`MessageTransport`], and tells the user how the
//! run is going through [`ProgressSink`].

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use rangepurge_core::{ChannelId, Direction, HistoryItem, MessageId, PurgeError};

/// Errors returned by a transport client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The cursor has no further pages in the requested direction.
    #[error("no more pages")]
    NoMorePages,

    /// The service rejected the request.
    #[error("request failed with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The request never reached the service.
    #[error("network error: {0}")]
    Network(String),
}

impl TransportError {
    /// Create a rejection error from status code and message.
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        TransportError::Rejected {
            status,
            message: message.into(),
        }
    }
}

/// Error returned by a progress sink; the conversation is usually gone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("progress sink closed: {0}")]
pub struct SinkError(pub String);

/// Paged view of a channel's history, anchored at one message.
#[async_trait]
pub trait HistoryCursor: Send {
    /// Fetch the next page in `direction`.
    ///
    /// The first page includes the anchor message. Returns
    /// [`TransportError::NoMorePages`] once history is exhausted.
    async fn advance(&mut self, direction: Direction) -> Result<Vec<HistoryItem>, TransportError>;
}

/// Client for the chat service's history and bulk-delete endpoints.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Open a history cursor anchored at `anchor`, yielding `page_size`
    /// messages per page.
    async fn open_history(
        &self,
        channel: ChannelId,
        anchor: MessageId,
        page_size: u32,
    ) -> Result<Box<dyn HistoryCursor>, TransportError>;

    /// Delete `ids` in one call.
    ///
    /// Must fail for more than 100 ids or for messages older than 14 days.
    async fn bulk_delete(&self, channel: ChannelId, ids: &[MessageId]) -> Result<(), TransportError>;
}

/// One update sent to the user while a purge runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressReport {
    /// A batch was processed
    Batch {
        /// 1-based batch number
        index: usize,
        /// Messages deleted by this batch
        deleted: usize,
        /// Messages deleted so far
        total: usize,
    },
    /// The end marker was reached
    Completed { total: usize },
    /// The run stopped on an error
    Failed { error: PurgeError, total: usize },
    /// The run was cancelled between batches
    Cancelled { total: usize },
}

impl fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressReport::Batch { index, total, .. } => {
                write!(f, "Purged bulk **{index}**.. (messages purged so far: **{total}**)")
            }
            ProgressReport::Completed { total } => {
                write!(f, "All messages have been purged. Total count: **{total}**")
            }
            ProgressReport::Failed { error, .. } => {
                write!(f, "There was an error while purging: **{error}**.")
            }
            ProgressReport::Cancelled { total } => {
                write!(f, "Purge was cancelled. Messages purged: **{total}**")
            }
        }
    }
}

/// Receiver of progress reports for one run.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Deliver one report. An error stops the run.
    async fn report(&self, report: ProgressReport) -> Result<(), SinkError>;
}
