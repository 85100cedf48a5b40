//! Typed purge operations for a UI dispatch layer.
//!
//! [`PurgeController`] composes the ownership gate of the [`SessionStore`]
//! with the [`RangeEngine`]. Each method maps to one user interaction and
//! returns a typed outcome; turning outcomes into prompts is up to the
//! caller.

use std::sync::Arc;

use tracing::{debug, info};

use rangepurge_core::config::LimitsConfig;
use rangepurge_core::{ChannelId, MessageId, PurgeError, UserId};

use crate::range::{RangeEngine, RunPlan};
use crate::store::SessionStore;

/// Result of asking to start a purge setup in a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    /// A new setup was created for the requester
    Created,
    /// The requester already has a setup in this channel
    AlreadyOwned,
    /// Another user has a setup in this channel
    OwnedByOther(UserId),
}

/// Result of selecting a start or end marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// The marker was unset and has been set
    Set,
    /// The message already is this marker
    Unchanged,
    /// A different marker is set; replacing it needs an explicit confirm
    NeedsConfirmation { current: MessageId },
}

/// Entry point for the interactions of a purge setup.
#[derive(Debug, Clone)]
pub struct PurgeController {
    store: Arc<SessionStore>,
    engine: RangeEngine,
}

impl PurgeController {
    pub fn new(store: Arc<SessionStore>, limits: LimitsConfig) -> Self {
        Self {
            store,
            engine: RangeEngine::new(limits),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn engine(&self) -> &RangeEngine {
        &self.engine
    }

    /// Start a setup, unless the channel already has one.
    pub fn begin(&self, channel: ChannelId, user: UserId) -> BeginOutcome {
        let (handle, created) = self.store.get_or_create(channel, user);
        if created {
            return BeginOutcome::Created;
        }
        let owner = handle.lock().owner();
        if owner == user {
            BeginOutcome::AlreadyOwned
        } else {
            BeginOutcome::OwnedByOther(owner)
        }
    }

    pub fn set_bulk_limit(
        &self,
        channel: ChannelId,
        user: UserId,
        limit: u32,
    ) -> Result<(), PurgeError> {
        self.store.update(channel, user, |session| {
            self.engine.set_bulk_limit(session, limit)
        })
    }

    /// Select `id` as the start message.
    pub fn select_start(
        &self,
        channel: ChannelId,
        user: UserId,
        id: MessageId,
    ) -> Result<Selection, PurgeError> {
        self.store.update(channel, user, |session| match session.start_marker() {
            None => {
                self.engine.set_start(session, id)?;
                Ok(Selection::Set)
            }
            Some(current) if current == id => Ok(Selection::Unchanged),
            Some(current) => Ok(Selection::NeedsConfirmation { current }),
        })
    }

    /// Replace the start marker after the user confirmed.
    pub fn confirm_start(
        &self,
        channel: ChannelId,
        user: UserId,
        id: MessageId,
    ) -> Result<(), PurgeError> {
        self.store.update(channel, user, |session| self.engine.set_start(session, id))
    }

    /// Select `id` as the end message.
    pub fn select_end(
        &self,
        channel: ChannelId,
        user: UserId,
        id: MessageId,
    ) -> Result<Selection, PurgeError> {
        self.store.update(channel, user, |session| {
            if session.start_marker().is_none() {
                return Err(PurgeError::MissingStart);
            }
            match session.end_marker() {
                None => {
                    self.engine.set_end(session, id)?;
                    Ok(Selection::Set)
                }
                Some(current) if current == id => Ok(Selection::Unchanged),
                Some(current) => Ok(Selection::NeedsConfirmation { current }),
            }
        })
    }

    /// Replace the end marker after the user confirmed.
    pub fn confirm_end(
        &self,
        channel: ChannelId,
        user: UserId,
        id: MessageId,
    ) -> Result<(), PurgeError> {
        self.store.update(channel, user, |session| self.engine.set_end(session, id))
    }

    /// Exclude a message inside the range. `Ok(false)` if already excluded.
    pub fn exclude(&self, channel: ChannelId, user: UserId, id: MessageId) -> Result<bool, PurgeError> {
        self.store.update(channel, user, |session| {
            self.engine.check_selectable(session, id)?;
            self.engine.exclude(session, id)
        })
    }

    /// Re-include an excluded message. `Ok(false)` if it was never excluded.
    pub fn include(&self, channel: ChannelId, user: UserId, id: MessageId) -> Result<bool, PurgeError> {
        self.store.update(channel, user, |session| {
            if session.start_marker().is_none() {
                return Err(PurgeError::MissingStart);
            }
            if session.end_marker().is_none() {
                return Err(PurgeError::MissingEnd);
            }
            self.engine.include(session, id)
        })
    }

    /// Cancel a setup that is not running.
    pub fn cancel(&self, channel: ChannelId, user: UserId) -> Result<(), PurgeError> {
        self.store.remove_if_idle(channel, user)?;
        info!(%channel, %user, "Purge setup cancelled");
        Ok(())
    }

    /// Claim the session for execution. Succeeds at most once per setup.
    pub fn claim_run(&self, channel: ChannelId, user: UserId) -> Result<RunPlan, PurgeError> {
        let plan = self
            .store
            .update(channel, user, |session| self.engine.claim(session))?;
        debug!(
            %channel,
            session = %plan.session,
            start = %plan.start,
            end = %plan.end,
            direction = ?plan.direction,
            bulk_limit = plan.bulk_limit,
            excluded = plan.exclusions.len(),
            "Purge claimed"
        );
        Ok(plan)
    }
}
