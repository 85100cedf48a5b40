//! Channel history primitives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::MessageId;

/// Paging direction through a channel's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Newer to older, the natural paging order of chat history
    #[default]
    Backward,
    /// Older to newer
    Forward,
}

impl Direction {
    /// Direction implied by a session's `forward` flag.
    pub fn from_forward(forward: bool) -> Self {
        if forward {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }

    /// Whether `id` lies strictly past `end` when scanning in this direction.
    pub fn is_past(self, id: MessageId, end: MessageId) -> bool {
        match self {
            Direction::Forward => id > end,
            Direction::Backward => id < end,
        }
    }
}

/// One message as returned by a history page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    /// Message id
    pub id: MessageId,
    /// Creation time
    pub timestamp: DateTime<Utc>,
}

impl HistoryItem {
    /// Build an item whose timestamp is the one encoded in the id.
    pub fn from_id(id: MessageId) -> Self {
        Self {
            id,
            timestamp: id.timestamp(),
        }
    }
}
