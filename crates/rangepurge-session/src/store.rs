//! In-memory session store.
//!
//! Maps each channel to at most one [`PurgeSession`]. The map is guarded by
//! one mutex and every session by its own, so a slow operation on one
//! channel never blocks lookups for another. Neither lock is held across an
//! `.await`. When both are taken, the map lock comes first.
//!
//! Runs address their session by id as well as by channel: a run that
//! outlives its setup never releases or removes a newer one.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use rangepurge_core::{ChannelId, PurgeError, UserId};

use crate::purge::PurgeSession;

/// Shared, individually locked purge session.
pub type SessionHandle = Arc<Mutex<PurgeSession>>;

/// Process-lifetime store of active purge sessions, one per channel.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<ChannelId, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The active session for `channel`, if any.
    pub fn get(&self, channel: ChannelId) -> Option<SessionHandle> {
        self.sessions.lock().get(&channel).cloned()
    }

    /// Create a session for `channel` owned by `owner`.
    ///
    /// If the channel already has a session it is returned unchanged; use
    /// [`get_or_create`](Self::get_or_create) to learn which case happened.
    pub fn create(&self, channel: ChannelId, owner: UserId) -> SessionHandle {
        self.get_or_create(channel, owner).0
    }

    /// Like [`create`](Self::create), also reporting whether a new session
    /// was inserted. Lookup and insertion happen under one lock.
    pub fn get_or_create(&self, channel: ChannelId, owner: UserId) -> (SessionHandle, bool) {
        let mut sessions = self.sessions.lock();
        if let Some(existing) = sessions.get(&channel) {
            debug!(%channel, "Purge session already exists, keeping it");
            return (existing.clone(), false);
        }

        info!(%channel, user = %owner, "Created purge session");
        let handle = Arc::new(Mutex::new(PurgeSession::new(owner)));
        sessions.insert(channel, handle.clone());
        (handle, true)
    }

    /// Remove the session for `channel`. Removing a missing session is a no-op.
    pub fn remove(&self, channel: ChannelId) {
        if self.sessions.lock().remove(&channel).is_some() {
            info!(%channel, "Removed purge session");
        }
    }

    /// Ownership gate for interactions on an existing setup.
    ///
    /// Rejects interactions when no session exists, when `user` is not the
    /// owner, or when the purge is already running. The returned handle may
    /// be removed concurrently; use [`update`](Self::update) to act on the
    /// session while it is guaranteed to stay in the store.
    pub fn authorize(&self, channel: ChannelId, user: UserId) -> Result<SessionHandle, PurgeError> {
        let handle = self.get(channel).ok_or(PurgeError::NoActiveSession)?;
        check_gate(&handle.lock(), user)?;
        Ok(handle)
    }

    /// Pass the gated session of `channel` to `f`.
    ///
    /// The map lock is held throughout, so the session can be neither
    /// removed nor replaced while `f` runs.
    pub fn update<T>(
        &self,
        channel: ChannelId,
        user: UserId,
        f: impl FnOnce(&mut PurgeSession) -> Result<T, PurgeError>,
    ) -> Result<T, PurgeError> {
        let sessions = self.sessions.lock();
        let handle = sessions.get(&channel).ok_or(PurgeError::NoActiveSession)?;
        let mut session = handle.lock();
        check_gate(&session, user)?;
        f(&mut session)
    }

    /// Remove the setup of `channel` if `user` owns it and it is not running.
    ///
    /// The ownership and running checks and the removal happen under the map
    /// lock, so a concurrent claim either lands first and wins or finds no
    /// session.
    pub fn remove_if_idle(&self, channel: ChannelId, user: UserId) -> Result<(), PurgeError> {
        let mut sessions = self.sessions.lock();
        let handle = sessions.get(&channel).ok_or(PurgeError::NoActiveSession)?;
        check_gate(&handle.lock(), user)?;
        sessions.remove(&channel);
        info!(%channel, %user, "Removed idle purge session");
        Ok(())
    }

    /// Clear the running flag after run `session` ended without completing.
    ///
    /// Returns false when the channel no longer holds that session.
    pub fn release(&self, channel: ChannelId, session: Uuid) -> bool {
        let sessions = self.sessions.lock();
        match sessions.get(&channel) {
            Some(handle) => {
                let mut current = handle.lock();
                if current.id() != session {
                    debug!(%channel, "Session was replaced, nothing to release");
                    return false;
                }
                current.set_running(false);
                debug!(%channel, "Released purge session");
                true
            }
            None => false,
        }
    }

    /// Remove `session` after its run completed.
    ///
    /// A newer session in the same channel is left alone.
    pub fn complete(&self, channel: ChannelId, session: Uuid) -> bool {
        let mut sessions = self.sessions.lock();
        let matches = sessions
            .get(&channel)
            .is_some_and(|handle| handle.lock().id() == session);
        if matches {
            sessions.remove(&channel);
            info!(%channel, "Purge session completed");
        }
        matches
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Channels that currently have a session.
    pub fn channels(&self) -> Vec<ChannelId> {
        let mut channels: Vec<_> = self.sessions.lock().keys().copied().collect();
        channels.sort();
        channels
    }
}

fn check_gate(session: &PurgeSession, user: UserId) -> Result<(), PurgeError> {
    if session.owner() != user {
        return Err(PurgeError::NotOwner {
            owner: session.owner(),
        });
    }
    if session.is_running() {
        return Err(PurgeError::AlreadyRunning);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangepurge_core::MessageId;

    const CHANNEL: ChannelId = ChannelId::new(10);
    const OWNER: UserId = UserId::new(1);

    #[test]
    fn test_create_and_get() {
        let store = SessionStore::new();
        assert!(store.get(CHANNEL).is_none());

        store.create(CHANNEL, OWNER);
        let handle = store.get(CHANNEL).unwrap();
        assert_eq!(handle.lock().owner(), OWNER);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_create_returns_existing_unchanged() {
        let store = SessionStore::new();
        let first = store.create(CHANNEL, OWNER);
        first.lock().set_start_marker(MessageId::new(500));

        let second = store.create(CHANNEL, UserId::new(2));
        assert!(Arc::ptr_eq(&first, &second));
        let session = second.lock();
        assert_eq!(session.owner(), OWNER);
        assert_eq!(session.start_marker(), Some(MessageId::new(500)));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = SessionStore::new();
        store.remove(CHANNEL);
        store.create(CHANNEL, OWNER);
        store.remove(CHANNEL);
        store.remove(CHANNEL);
        assert!(store.is_empty());
    }

    #[test]
    fn test_authorize() {
        let store = SessionStore::new();
        assert_eq!(
            store.authorize(CHANNEL, OWNER).unwrap_err(),
            PurgeError::NoActiveSession
        );

        store.create(CHANNEL, OWNER);
        assert!(store.authorize(CHANNEL, OWNER).is_ok());
        assert_eq!(
            store.authorize(CHANNEL, UserId::new(2)).unwrap_err(),
            PurgeError::NotOwner { owner: OWNER }
        );

        store.get(CHANNEL).unwrap().lock().set_running(true);
        assert_eq!(
            store.authorize(CHANNEL, OWNER).unwrap_err(),
            PurgeError::AlreadyRunning
        );
    }

    #[test]
    fn test_release() {
        let store = SessionStore::new();
        let handle = store.create(CHANNEL, OWNER);
        let id = handle.lock().id();
        assert!(!store.release(ChannelId::new(99), id));

        handle.lock().set_running(true);
        assert!(store.release(CHANNEL, id));
        assert!(!handle.lock().is_running());
    }

    #[test]
    fn test_stale_run_leaves_newer_session_alone() {
        let store = SessionStore::new();
        let old_id = store.create(CHANNEL, OWNER).lock().id();
        store.remove(CHANNEL);

        let newer = store.create(CHANNEL, UserId::new(2));
        newer.lock().set_running(true);

        assert!(!store.release(CHANNEL, old_id));
        assert!(!store.complete(CHANNEL, old_id));
        assert!(newer.lock().is_running());
        assert_eq!(store.len(), 1);

        let newer_id = newer.lock().id();
        assert!(store.complete(CHANNEL, newer_id));
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_runs_behind_gate() {
        let store = SessionStore::new();
        store.create(CHANNEL, OWNER);

        let owner = store.update(CHANNEL, OWNER, |session| Ok(session.owner()));
        assert_eq!(owner, Ok(OWNER));
        assert_eq!(
            store.update(CHANNEL, UserId::new(2), |_| Ok(())),
            Err(PurgeError::NotOwner { owner: OWNER })
        );

        store
            .update(CHANNEL, OWNER, |session| {
                session.set_running(true);
                Ok(())
            })
            .unwrap();
        assert_eq!(
            store.update(CHANNEL, OWNER, |_| Ok(())),
            Err(PurgeError::AlreadyRunning)
        );
    }

    #[test]
    fn test_remove_if_idle() {
        let store = SessionStore::new();
        assert_eq!(
            store.remove_if_idle(CHANNEL, OWNER),
            Err(PurgeError::NoActiveSession)
        );

        let handle = store.create(CHANNEL, OWNER);
        assert_eq!(
            store.remove_if_idle(CHANNEL, UserId::new(2)),
            Err(PurgeError::NotOwner { owner: OWNER })
        );

        handle.lock().set_running(true);
        assert_eq!(
            store.remove_if_idle(CHANNEL, OWNER),
            Err(PurgeError::AlreadyRunning)
        );
        assert_eq!(store.len(), 1);

        handle.lock().set_running(false);
        assert_eq!(store.remove_if_idle(CHANNEL, OWNER), Ok(()));
        assert!(store.is_empty());
    }

    #[test]
    fn test_channels_are_sorted() {
        let store = SessionStore::new();
        store.create(ChannelId::new(3), OWNER);
        store.create(ChannelId::new(1), OWNER);
        assert_eq!(store.channels(), vec![ChannelId::new(1), ChannelId::new(3)]);
    }
}
