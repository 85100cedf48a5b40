//! Range and exclusion management for purge sessions.
//!
//! [`RangeEngine`] validates and applies every mutation of a
//! [`PurgeSession`]: bulk limit, start and end markers (with direction
//! inference and the age window), exclusions and re-inclusions, and finally
//! the one-shot [`claim`](RangeEngine::claim) that hands the session over to
//! execution.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use rangepurge_core::config::LimitsConfig;
use rangepurge_core::{Direction, MessageId, PurgeError, UserId};

use crate::purge::PurgeSession;

/// Smallest bulk limit accepted; a single-message batch is not a bulk delete.
pub const MIN_BULK_LIMIT: u32 = 2;

/// Immutable snapshot of a session taken when its execution is claimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    /// Id of the claimed session
    pub session: Uuid,
    /// Session owner
    pub owner: UserId,
    /// First message of the range (inclusive)
    pub start: MessageId,
    /// Last message of the range (inclusive)
    pub end: MessageId,
    /// Paging direction from start toward end
    pub direction: Direction,
    /// Page and batch size
    pub bulk_limit: u32,
    /// Effective exclusion set at claim time
    pub exclusions: HashSet<MessageId>,
}

impl RunPlan {
    /// Whether a fetched message should be deleted.
    pub fn should_delete(&self, id: MessageId) -> bool {
        !self.direction.is_past(id, self.end) && !self.exclusions.contains(&id)
    }
}

/// Time between the creation of two messages, in either order.
fn span_between(a: MessageId, b: MessageId) -> Duration {
    (a.timestamp() - b.timestamp()).abs()
}

/// Validates and applies session mutations against the configured limits.
#[derive(Debug, Clone, Default)]
pub struct RangeEngine {
    limits: LimitsConfig,
}

impl RangeEngine {
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    fn window(&self) -> Duration {
        Duration::days(self.limits.max_age_days)
    }

    fn out_of_window(&self, id: MessageId) -> PurgeError {
        PurgeError::InvalidRangeAge {
            id,
            window_days: self.limits.max_age_days,
        }
    }

    fn ensure_idle(session: &PurgeSession) -> Result<(), PurgeError> {
        if session.is_running() {
            return Err(PurgeError::AlreadyRunning);
        }
        Ok(())
    }

    /// Set how many messages are fetched and deleted per batch.
    pub fn set_bulk_limit(&self, session: &mut PurgeSession, limit: u32) -> Result<(), PurgeError> {
        Self::ensure_idle(session)?;
        if limit < MIN_BULK_LIMIT || limit > self.limits.max_bulk_limit {
            return Err(PurgeError::InvalidBulkLimit {
                value: limit,
                min: MIN_BULK_LIMIT,
                max: self.limits.max_bulk_limit,
            });
        }
        session.set_bulk_limit(limit);
        Ok(())
    }

    /// Set the start marker, checking its age against the current time.
    pub fn set_start(&self, session: &mut PurgeSession, id: MessageId) -> Result<(), PurgeError> {
        self.set_start_at(session, id, Utc::now())
    }

    /// Set the start marker, checking its age against `now`.
    ///
    /// An existing end marker and the exclusion lists are kept. The direction
    /// is re-derived against the kept end marker.
    pub fn set_start_at(
        &self,
        session: &mut PurgeSession,
        id: MessageId,
        now: DateTime<Utc>,
    ) -> Result<(), PurgeError> {
        Self::ensure_idle(session)?;
        if session.end_marker() == Some(id) {
            return Err(PurgeError::DuplicateMarker(id));
        }
        if now - id.timestamp() > self.window() {
            return Err(self.out_of_window(id));
        }
        if let Some(end) = session.end_marker() {
            if span_between(id, end) > self.window() {
                return Err(self.out_of_window(id));
            }
        }

        session.set_start_marker(id);
        if let Some(end) = session.end_marker() {
            session.set_forward(end > id);
        }
        debug!(start = %id, "Start marker set");
        Ok(())
    }

    /// Set the end marker, inferring the scan direction.
    pub fn set_end(&self, session: &mut PurgeSession, id: MessageId) -> Result<(), PurgeError> {
        self.set_end_at(session, id, Utc::now())
    }

    /// Set the end marker, checking the age window against `now`.
    ///
    /// Fails without touching the session when the marker would equal the
    /// start marker or when the span between the markers exceeds the window.
    pub fn set_end_at(
        &self,
        session: &mut PurgeSession,
        id: MessageId,
        now: DateTime<Utc>,
    ) -> Result<(), PurgeError> {
        Self::ensure_idle(session)?;
        let start = session.start_marker().ok_or(PurgeError::MissingStart)?;
        if id == start {
            return Err(PurgeError::DuplicateMarker(id));
        }

        let forward = id > start;
        if span_between(start, id) > self.window() || now - id.timestamp() > self.window() {
            return Err(self.out_of_window(id));
        }

        session.set_end_marker(id, forward);
        debug!(end = %id, forward, "End marker set");
        Ok(())
    }

    /// Exclude a message from deletion. Returns `Ok(false)` if it already was.
    ///
    /// Range membership is not checked here, see
    /// [`check_selectable`](Self::check_selectable).
    pub fn exclude(&self, session: &mut PurgeSession, id: MessageId) -> Result<bool, PurgeError> {
        Self::ensure_idle(session)?;
        Ok(session.push_exclude(id))
    }

    /// Re-include a previously excluded message. Returns `Ok(false)` if it
    /// was never excluded.
    pub fn include(&self, session: &mut PurgeSession, id: MessageId) -> Result<bool, PurgeError> {
        Self::ensure_idle(session)?;
        Ok(session.push_include(id))
    }

    /// Exclusions minus re-inclusions.
    pub fn effective_exclusions(&self, session: &PurgeSession) -> HashSet<MessageId> {
        session.effective_exclusions()
    }

    /// Check that `id` can be excluded: both markers set, `id` is not a
    /// marker, and `id` lies inside the range.
    pub fn check_selectable(&self, session: &PurgeSession, id: MessageId) -> Result<(), PurgeError> {
        let start = session.start_marker().ok_or(PurgeError::MissingStart)?;
        let end = session.end_marker().ok_or(PurgeError::MissingEnd)?;
        if id == start || id == end {
            return Err(PurgeError::MarkerNotExcludable(id));
        }
        if !session.contains(id) {
            return Err(PurgeError::OutOfRange(id));
        }
        Ok(())
    }

    /// Atomically mark the session as running and snapshot what to delete.
    ///
    /// Callers hold the session lock for the duration of this call, so two
    /// concurrent claims cannot both succeed.
    pub fn claim(&self, session: &mut PurgeSession) -> Result<RunPlan, PurgeError> {
        Self::ensure_idle(session)?;
        let start = session.start_marker().ok_or(PurgeError::MissingStart)?;
        let end = session.end_marker().ok_or(PurgeError::MissingEnd)?;

        session.set_running(true);
        Ok(RunPlan {
            session: session.id(),
            owner: session.owner(),
            start,
            end,
            direction: session.direction(),
            bulk_limit: session.bulk_limit().unwrap_or(self.limits.default_bulk_limit),
            exclusions: session.effective_exclusions(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Current time truncated to the millisecond precision ids carry.
    fn now() -> DateTime<Utc> {
        MessageId::from_timestamp(Utc::now(), 0).timestamp()
    }

    fn engine() -> RangeEngine {
        RangeEngine::default()
    }

    fn id_at(now: DateTime<Utc>, ago: Duration) -> MessageId {
        MessageId::from_timestamp(now - ago, 0)
    }

    fn session() -> PurgeSession {
        PurgeSession::new(UserId::new(1))
    }

    #[test]
    fn test_bulk_limit_bounds() {
        let engine = engine();
        let mut session = session();
        assert!(matches!(
            engine.set_bulk_limit(&mut session, 1),
            Err(PurgeError::InvalidBulkLimit { value: 1, .. })
        ));
        assert!(engine.set_bulk_limit(&mut session, 101).is_err());
        assert!(engine.set_bulk_limit(&mut session, 2).is_ok());
        assert!(engine.set_bulk_limit(&mut session, 100).is_ok());
        assert_eq!(session.bulk_limit(), Some(100));
    }

    #[test]
    fn test_start_age_window() {
        let engine = engine();
        let now = now();
        let mut session = session();

        let stale = id_at(now, Duration::days(15));
        assert!(matches!(
            engine.set_start_at(&mut session, stale, now),
            Err(PurgeError::InvalidRangeAge { .. })
        ));
        assert!(session.start_marker().is_none());

        let fresh = id_at(now, Duration::days(13));
        engine.set_start_at(&mut session, fresh, now).unwrap();
        assert_eq!(session.start_marker(), Some(fresh));
    }

    #[test]
    fn test_end_infers_direction_for_pairs_within_window() {
        let engine = engine();
        let now = now();
        let pairs = [
            (Duration::days(10), Duration::days(1)),
            (Duration::days(1), Duration::days(10)),
            (Duration::days(14), Duration::zero()),
            (Duration::hours(2), Duration::hours(3)),
        ];

        for (start_ago, end_ago) in pairs {
            let mut session = session();
            let start = id_at(now, start_ago);
            let end = id_at(now, end_ago);
            engine.set_start_at(&mut session, start, now).unwrap();
            engine.set_end_at(&mut session, end, now).unwrap();
            assert_eq!(session.end_marker(), Some(end));
            assert_eq!(session.is_forward(), end.timestamp() > start.timestamp());
        }
    }

    #[test]
    fn test_end_outside_window_is_rejected() {
        let engine = engine();
        let now = now();
        let mut session = session();
        let start = id_at(now, Duration::days(1));
        engine.set_start_at(&mut session, start, now).unwrap();

        let too_old = id_at(now, Duration::days(16));
        assert!(matches!(
            engine.set_end_at(&mut session, too_old, now),
            Err(PurgeError::InvalidRangeAge { .. })
        ));
        assert!(session.end_marker().is_none());
    }

    #[test]
    fn test_forward_span_beyond_window_is_rejected() {
        let engine = engine();
        let start_time = Utc::now() - Duration::days(20);
        let mut session = session();
        let start = MessageId::from_timestamp(start_time, 0);
        engine.set_start_at(&mut session, start, start_time).unwrap();

        let end = MessageId::from_timestamp(start_time + Duration::days(15), 0);
        let err = engine.set_end_at(&mut session, end, start_time + Duration::days(15));
        assert!(matches!(err, Err(PurgeError::InvalidRangeAge { .. })));
        assert!(session.end_marker().is_none());
    }

    #[test]
    fn test_end_requires_distinct_start() {
        let engine = engine();
        let now = now();
        let mut session = session();
        let start = id_at(now, Duration::hours(1));
        assert_eq!(
            engine.set_end_at(&mut session, start, now),
            Err(PurgeError::MissingStart)
        );

        engine.set_start_at(&mut session, start, now).unwrap();
        assert_eq!(
            engine.set_end_at(&mut session, start, now),
            Err(PurgeError::DuplicateMarker(start))
        );
    }

    #[test]
    fn test_replacing_start_keeps_end_and_rederives_direction() {
        let engine = engine();
        let now = now();
        let mut session = session();
        let start = id_at(now, Duration::hours(5));
        let end = id_at(now, Duration::hours(1));
        engine.set_start_at(&mut session, start, now).unwrap();
        engine.set_end_at(&mut session, end, now).unwrap();
        engine.exclude(&mut session, id_at(now, Duration::hours(2))).unwrap();
        assert!(session.is_forward());

        let newer_start = id_at(now, Duration::minutes(10));
        engine.set_start_at(&mut session, newer_start, now).unwrap();
        assert_eq!(session.end_marker(), Some(end));
        assert!(!session.is_forward());
        assert_eq!(session.excluded().len(), 1);

        assert_eq!(
            engine.set_start_at(&mut session, end, now),
            Err(PurgeError::DuplicateMarker(end))
        );
    }

    #[test]
    fn test_replacing_start_keeps_markers_within_window() {
        let engine = engine();
        let t0 = now();
        let mut session = session();
        let start = id_at(t0, Duration::days(1));
        let end = id_at(t0, Duration::days(14));
        engine.set_start_at(&mut session, start, t0).unwrap();
        engine.set_end_at(&mut session, end, t0).unwrap();

        // Fresh relative to `later`, but 19 days after the end marker.
        let later = t0 + Duration::days(5);
        let newer_start = MessageId::from_timestamp(later, 0);
        assert!(matches!(
            engine.set_start_at(&mut session, newer_start, later),
            Err(PurgeError::InvalidRangeAge { .. })
        ));
        assert_eq!(session.start_marker(), Some(start));
        assert!(!session.is_forward());

        let close_start = id_at(t0, Duration::days(2));
        engine.set_start_at(&mut session, close_start, t0).unwrap();
        assert_eq!(session.start_marker(), Some(close_start));
    }

    #[test]
    fn test_exclude_is_idempotent() {
        let engine = engine();
        let mut session = session();
        let id = MessageId::new(300);
        assert!(engine.exclude(&mut session, id).unwrap());
        assert!(!engine.exclude(&mut session, id).unwrap());
        assert_eq!(session.excluded().len(), 1);
    }

    #[test]
    fn test_include_overrides_exclusion() {
        let engine = engine();
        let mut session = session();
        let x = MessageId::new(300);
        let y = MessageId::new(400);
        engine.exclude(&mut session, x).unwrap();
        assert!(engine.include(&mut session, x).unwrap());
        assert!(!engine.effective_exclusions(&session).contains(&x));
        assert!(!engine.include(&mut session, y).unwrap());
    }

    #[test]
    fn test_check_selectable() {
        let engine = engine();
        let now = now();
        let mut session = session();
        let start = MessageId::from_timestamp(now - Duration::hours(3), 0);
        let middle = MessageId::from_timestamp(now - Duration::hours(2), 0);
        let end = MessageId::from_timestamp(now - Duration::hours(1), 0);
        let outside = MessageId::from_timestamp(now, 0);

        assert_eq!(engine.check_selectable(&session, middle), Err(PurgeError::MissingStart));
        engine.set_start_at(&mut session, start, now).unwrap();
        assert_eq!(engine.check_selectable(&session, middle), Err(PurgeError::MissingEnd));
        engine.set_end_at(&mut session, end, now).unwrap();

        assert!(engine.check_selectable(&session, middle).is_ok());
        assert_eq!(
            engine.check_selectable(&session, start),
            Err(PurgeError::MarkerNotExcludable(start))
        );
        assert_eq!(
            engine.check_selectable(&session, outside),
            Err(PurgeError::OutOfRange(outside))
        );
    }

    #[test]
    fn test_claim_is_one_shot_and_freezes_session() {
        let engine = engine();
        let now = now();
        let mut session = session();
        assert_eq!(engine.claim(&mut session), Err(PurgeError::MissingStart));

        let start = id_at(now, Duration::hours(1));
        let end = id_at(now, Duration::hours(3));
        let excluded = id_at(now, Duration::hours(2));
        engine.set_start_at(&mut session, start, now).unwrap();
        assert_eq!(engine.claim(&mut session), Err(PurgeError::MissingEnd));
        engine.set_end_at(&mut session, end, now).unwrap();
        engine.exclude(&mut session, excluded).unwrap();

        let plan = engine.claim(&mut session).unwrap();
        assert!(session.is_running());
        assert_eq!(plan.session, session.id());
        assert_eq!(plan.direction, Direction::Backward);
        assert_eq!(plan.bulk_limit, 100);
        assert!(plan.exclusions.contains(&excluded));

        assert_eq!(engine.claim(&mut session), Err(PurgeError::AlreadyRunning));
        assert_eq!(
            engine.exclude(&mut session, MessageId::new(1)),
            Err(PurgeError::AlreadyRunning)
        );
        assert_eq!(
            engine.set_start_at(&mut session, excluded, now),
            Err(PurgeError::AlreadyRunning)
        );
    }

    #[test]
    fn test_plan_should_delete() {
        let plan = RunPlan {
            session: Uuid::new_v4(),
            owner: UserId::new(1),
            start: MessageId::new(100),
            end: MessageId::new(500),
            direction: Direction::Forward,
            bulk_limit: 2,
            exclusions: HashSet::from([MessageId::new(300)]),
        };
        assert!(plan.should_delete(MessageId::new(500)));
        assert!(!plan.should_delete(MessageId::new(300)));
        assert!(!plan.should_delete(MessageId::new(600)));
    }
}
