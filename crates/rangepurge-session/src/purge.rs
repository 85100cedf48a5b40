//! Purge session value object.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rangepurge_core::{Direction, MessageId, UserId};

/// Configuration and range state of one purge being set up in a channel.
///
/// Read access is public; every mutation goes through
/// [`RangeEngine`](crate::range::RangeEngine) so the marker and exclusion
/// invariants hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeSession {
    /// Distinguishes this setup from later ones in the same channel
    id: Uuid,
    /// User who started the setup
    owner: UserId,
    /// When the setup was started
    created_at: DateTime<Utc>,
    /// Page and batch size
    bulk_limit: Option<u32>,
    /// First message of the range (inclusive), zero while unset
    start_marker: MessageId,
    /// Last message of the range (inclusive), zero while unset
    end_marker: MessageId,
    /// Whether the end marker is newer than the start marker
    forward: bool,
    /// Explicitly excluded messages, without duplicates
    exclude_set: Vec<MessageId>,
    /// Re-included messages, all present in `exclude_set`
    include_set: Vec<MessageId>,
    /// Set once execution has been claimed
    running: bool,
}

impl PurgeSession {
    /// Create an empty session owned by `owner`.
    pub fn new(owner: UserId) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            created_at: Utc::now(),
            bulk_limit: None,
            start_marker: MessageId::default(),
            end_marker: MessageId::default(),
            forward: false,
            exclude_set: Vec::new(),
            include_set: Vec::new(),
            running: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner(&self) -> UserId {
        self.owner
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn bulk_limit(&self) -> Option<u32> {
        self.bulk_limit
    }

    /// Start marker, `None` while unset.
    pub fn start_marker(&self) -> Option<MessageId> {
        Some(self.start_marker).filter(|id| !id.is_unset())
    }

    /// End marker, `None` while unset.
    pub fn end_marker(&self) -> Option<MessageId> {
        Some(self.end_marker).filter(|id| !id.is_unset())
    }

    pub fn is_forward(&self) -> bool {
        self.forward
    }

    /// Scan direction implied by the markers.
    pub fn direction(&self) -> Direction {
        Direction::from_forward(self.forward)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn excluded(&self) -> &[MessageId] {
        &self.exclude_set
    }

    pub fn included(&self) -> &[MessageId] {
        &self.include_set
    }

    /// Whether `id` lies between the markers (inclusive) for the current direction.
    ///
    /// Always false until both markers are set.
    pub fn contains(&self, id: MessageId) -> bool {
        let (Some(start), Some(end)) = (self.start_marker(), self.end_marker()) else {
            return false;
        };
        if self.forward {
            start <= id && id <= end
        } else {
            end <= id && id <= start
        }
    }

    /// Exclusions minus re-inclusions.
    pub fn effective_exclusions(&self) -> HashSet<MessageId> {
        self.exclude_set
            .iter()
            .filter(|id| !self.include_set.contains(id))
            .copied()
            .collect()
    }

    pub(crate) fn set_bulk_limit(&mut self, limit: u32) {
        self.bulk_limit = Some(limit);
    }

    pub(crate) fn set_start_marker(&mut self, id: MessageId) {
        self.start_marker = id;
    }

    pub(crate) fn set_end_marker(&mut self, id: MessageId, forward: bool) {
        self.end_marker = id;
        self.forward = forward;
    }

    pub(crate) fn set_forward(&mut self, forward: bool) {
        self.forward = forward;
    }

    pub(crate) fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Append to the exclusion list. Returns false if already present.
    pub(crate) fn push_exclude(&mut self, id: MessageId) -> bool {
        if self.exclude_set.contains(&id) {
            return false;
        }
        self.exclude_set.push(id);
        true
    }

    /// Record a re-inclusion. Returns false if `id` was never excluded.
    pub(crate) fn push_include(&mut self, id: MessageId) -> bool {
        if !self.exclude_set.contains(&id) {
            return false;
        }
        if !self.include_set.contains(&id) {
            self.include_set.push(id);
        }
        true
    }
}
