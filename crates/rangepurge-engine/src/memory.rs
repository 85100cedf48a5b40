//! In-memory transport.
//!
//! Holds each channel's history as an ordered id set and serves it through
//! the same paging contract a chat service exposes: the first page of a
//! cursor includes its anchor, later pages continue past the last id served.
//! Bulk deletes enforce the batch-size and age limits unless the transport
//! was built with [`InMemoryTransport::unchecked`].
//!
//! Faults can be injected on the Nth page fetch or the Nth delete call,
//! counted across all channels.

use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use rangepurge_core::config::LimitsConfig;
use rangepurge_core::ids::SNOWFLAKE_EPOCH_MS;
use rangepurge_core::{ChannelId, Direction, HistoryItem, MessageId};

use crate::transport::{HistoryCursor, MessageTransport, TransportError};

#[derive(Debug, Default)]
struct ChannelHistory {
    messages: BTreeSet<MessageId>,
    deletes: Vec<Vec<MessageId>>,
    pages_served: usize,
}

#[derive(Debug, Default)]
struct Faults {
    fetches: usize,
    deletes: usize,
    fail_fetch_at: Option<usize>,
    fail_delete_at: Option<usize>,
}

#[derive(Debug)]
struct Inner {
    channels: Mutex<HashMap<ChannelId, ChannelHistory>>,
    faults: Mutex<Faults>,
    limits: Option<LimitsConfig>,
}

/// Chat transport backed by process memory.
#[derive(Debug, Clone)]
pub struct InMemoryTransport {
    inner: Arc<Inner>,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new(LimitsConfig::default())
    }
}

impl InMemoryTransport {
    /// Transport that rejects deletes breaking `limits`.
    pub fn new(limits: LimitsConfig) -> Self {
        Self::with_limits(Some(limits))
    }

    /// Transport that accepts deletes of any size and age.
    pub fn unchecked() -> Self {
        Self::with_limits(None)
    }

    fn with_limits(limits: Option<LimitsConfig>) -> Self {
        Self {
            inner: Arc::new(Inner {
                channels: Mutex::new(HashMap::new()),
                faults: Mutex::new(Faults::default()),
                limits,
            }),
        }
    }

    /// Add `ids` to the history of `channel`.
    pub fn seed(&self, channel: ChannelId, ids: impl IntoIterator<Item = MessageId>) {
        let mut channels = self.inner.channels.lock();
        channels.entry(channel).or_default().messages.extend(ids);
    }

    /// Seed `count` messages spaced `spacing` apart, the newest created at
    /// `newest`. Returns the ids oldest first.
    ///
    /// Returns `None`, seeding nothing, when `spacing` is not positive or the
    /// oldest message would predate the snowflake epoch.
    pub fn seed_timeline(
        &self,
        channel: ChannelId,
        count: usize,
        spacing: Duration,
        newest: DateTime<Utc>,
    ) -> Option<Vec<MessageId>> {
        if spacing <= Duration::zero() {
            return None;
        }
        let ids = (0..count)
            .map(|i| {
                let steps = i32::try_from(count - 1 - i).ok()?;
                let created = newest.checked_sub_signed(spacing.checked_mul(steps)?)?;
                if created.timestamp_millis() < SNOWFLAKE_EPOCH_MS {
                    return None;
                }
                Some(MessageId::from_timestamp(created, i as u64))
            })
            .collect::<Option<Vec<_>>>()?;
        self.seed(channel, ids.iter().copied());
        Some(ids)
    }

    /// Fail the `n`th page fetch (1-based).
    pub fn fail_fetch_at(&self, n: usize) {
        self.inner.faults.lock().fail_fetch_at = Some(n);
    }

    /// Fail the `n`th bulk delete call (1-based).
    pub fn fail_delete_at(&self, n: usize) {
        self.inner.faults.lock().fail_delete_at = Some(n);
    }

    /// Remaining messages of `channel`, oldest first.
    pub fn messages(&self, channel: ChannelId) -> Vec<MessageId> {
        self.inner
            .channels
            .lock()
            .get(&channel)
            .map(|h| h.messages.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every accepted bulk delete call for `channel`, in order.
    pub fn delete_calls(&self, channel: ChannelId) -> Vec<Vec<MessageId>> {
        self.inner
            .channels
            .lock()
            .get(&channel)
            .map(|h| h.deletes.clone())
            .unwrap_or_default()
    }

    /// Number of non-empty pages served for `channel`.
    pub fn pages_served(&self, channel: ChannelId) -> usize {
        self.inner
            .channels
            .lock()
            .get(&channel)
            .map_or(0, |h| h.pages_served)
    }

    fn check_delete(&self, ids: &[MessageId]) -> Result<(), TransportError> {
        let Some(limits) = &self.inner.limits else {
            return Ok(());
        };
        if ids.len() > limits.max_bulk_limit as usize {
            return Err(TransportError::rejected(
                400,
                format!("bulk delete accepts at most {} messages", limits.max_bulk_limit),
            ));
        }
        let oldest_allowed = Utc::now() - Duration::days(limits.max_age_days);
        if let Some(old) = ids.iter().find(|id| id.timestamp() < oldest_allowed) {
            return Err(TransportError::rejected(
                400,
                format!(
                    "message {old} is older than {} days",
                    limits.max_age_days
                ),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageTransport for InMemoryTransport {
    async fn open_history(
        &self,
        channel: ChannelId,
        anchor: MessageId,
        page_size: u32,
    ) -> Result<Box<dyn HistoryCursor>, TransportError> {
        if page_size == 0 {
            return Err(TransportError::rejected(400, "page size must be positive"));
        }
        Ok(Box::new(MemoryCursor {
            inner: self.inner.clone(),
            channel,
            anchor,
            last: None,
            page_size: page_size as usize,
        }))
    }

    async fn bulk_delete(&self, channel: ChannelId, ids: &[MessageId]) -> Result<(), TransportError> {
        {
            let mut faults = self.inner.faults.lock();
            faults.deletes += 1;
            if faults.fail_delete_at == Some(faults.deletes) {
                warn!(%channel, call = faults.deletes, "Injected bulk delete failure");
                return Err(TransportError::rejected(500, "injected delete failure"));
            }
        }
        self.check_delete(ids)?;

        let mut channels = self.inner.channels.lock();
        let history = channels.entry(channel).or_default();
        for id in ids {
            history.messages.remove(id);
        }
        history.deletes.push(ids.to_vec());
        debug!(%channel, count = ids.len(), "Bulk deleted");
        Ok(())
    }
}

/// Cursor over one channel of an [`InMemoryTransport`].
struct MemoryCursor {
    inner: Arc<Inner>,
    channel: ChannelId,
    anchor: MessageId,
    last: Option<MessageId>,
    page_size: usize,
}

#[async_trait]
impl HistoryCursor for MemoryCursor {
    async fn advance(&mut self, direction: Direction) -> Result<Vec<HistoryItem>, TransportError> {
        {
            let mut faults = self.inner.faults.lock();
            faults.fetches += 1;
            if faults.fail_fetch_at == Some(faults.fetches) {
                warn!(channel = %self.channel, call = faults.fetches, "Injected fetch failure");
                return Err(TransportError::Network("injected fetch failure".into()));
            }
        }

        let mut channels = self.inner.channels.lock();
        let Some(history) = channels.get_mut(&self.channel) else {
            return Err(TransportError::rejected(404, "unknown channel"));
        };

        let (lower, upper) = match (direction, self.last) {
            (Direction::Forward, None) => (Bound::Included(self.anchor), Bound::Unbounded),
            (Direction::Forward, Some(last)) => (Bound::Excluded(last), Bound::Unbounded),
            (Direction::Backward, None) => (Bound::Unbounded, Bound::Included(self.anchor)),
            (Direction::Backward, Some(last)) => (Bound::Unbounded, Bound::Excluded(last)),
        };
        let range = history.messages.range((lower, upper));
        let page: Vec<MessageId> = match direction {
            Direction::Forward => range.take(self.page_size).copied().collect(),
            Direction::Backward => range.rev().take(self.page_size).copied().collect(),
        };

        let Some(&last) = page.last() else {
            return Err(TransportError::NoMorePages);
        };
        self.last = Some(last);
        history.pages_served += 1;
        Ok(page.into_iter().map(HistoryItem::from_id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHANNEL: ChannelId = ChannelId::new(1);

    fn ids(raw: &[u64]) -> Vec<MessageId> {
        raw.iter().copied().map(MessageId::new).collect()
    }

    fn page_ids(page: Vec<HistoryItem>) -> Vec<MessageId> {
        page.into_iter().map(|item| item.id).collect()
    }

    #[tokio::test]
    async fn test_forward_paging_includes_anchor() {
        let transport = InMemoryTransport::unchecked();
        transport.seed(CHANNEL, ids(&[100, 200, 300, 400, 500]));

        let mut cursor = transport
            .open_history(CHANNEL, MessageId::new(200), 2)
            .await
            .unwrap();
        let first = cursor.advance(Direction::Forward).await.unwrap();
        let second = cursor.advance(Direction::Forward).await.unwrap();

        assert_eq!(page_ids(first), ids(&[200, 300]));
        assert_eq!(page_ids(second), ids(&[400, 500]));
        assert_eq!(
            cursor.advance(Direction::Forward).await.unwrap_err(),
            TransportError::NoMorePages
        );
        assert_eq!(transport.pages_served(CHANNEL), 2);
    }

    #[tokio::test]
    async fn test_backward_paging() {
        let transport = InMemoryTransport::unchecked();
        transport.seed(CHANNEL, ids(&[100, 200, 300, 400]));

        let mut cursor = transport
            .open_history(CHANNEL, MessageId::new(300), 2)
            .await
            .unwrap();
        let first = cursor.advance(Direction::Backward).await.unwrap();
        let second = cursor.advance(Direction::Backward).await.unwrap();

        assert_eq!(page_ids(first), ids(&[300, 200]));
        assert_eq!(page_ids(second), ids(&[100]));
    }

    #[tokio::test]
    async fn test_delete_limits_are_enforced() {
        let transport = InMemoryTransport::default();
        let stale = MessageId::from_timestamp(Utc::now() - Duration::days(15), 0);
        let fresh = MessageId::from_timestamp(Utc::now() - Duration::minutes(1), 0);
        transport.seed(CHANNEL, [stale, fresh]);

        let err = transport.bulk_delete(CHANNEL, &[stale, fresh]).await.unwrap_err();
        assert!(matches!(err, TransportError::Rejected { status: 400, .. }));

        let too_many: Vec<MessageId> = (0..101).map(|i| MessageId::from_timestamp(Utc::now(), i)).collect();
        assert!(transport.bulk_delete(CHANNEL, &too_many).await.is_err());

        transport.bulk_delete(CHANNEL, &[fresh]).await.unwrap();
        assert_eq!(transport.messages(CHANNEL), vec![stale]);
        assert_eq!(transport.delete_calls(CHANNEL), vec![vec![fresh]]);
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let transport = InMemoryTransport::unchecked();
        transport.seed(CHANNEL, ids(&[100, 200]));
        transport.fail_fetch_at(2);
        transport.fail_delete_at(1);

        let mut cursor = transport
            .open_history(CHANNEL, MessageId::new(100), 1)
            .await
            .unwrap();
        assert!(cursor.advance(Direction::Forward).await.is_ok());
        assert!(matches!(
            cursor.advance(Direction::Forward).await,
            Err(TransportError::Network(_))
        ));

        assert!(transport.bulk_delete(CHANNEL, &ids(&[100])).await.is_err());
        assert!(transport.bulk_delete(CHANNEL, &ids(&[100])).await.is_ok());
        assert_eq!(transport.messages(CHANNEL), ids(&[200]));
    }

    #[test]
    fn test_seed_timeline() {
        let transport = InMemoryTransport::default();
        let newest = Utc::now();
        let ids = transport
            .seed_timeline(CHANNEL, 3, Duration::seconds(10), newest)
            .unwrap();

        assert_eq!(ids.len(), 3);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ids[2].timestamp().timestamp(), newest.timestamp());
        assert_eq!(transport.messages(CHANNEL), ids);
    }

    #[test]
    fn test_seed_timeline_rejects_bad_spacing() {
        let transport = InMemoryTransport::default();
        let newest = Utc::now();

        assert!(transport
            .seed_timeline(CHANNEL, 3, Duration::seconds(-10), newest)
            .is_none());
        assert!(transport
            .seed_timeline(CHANNEL, 3, Duration::zero(), newest)
            .is_none());
        // Reaches back before 2015.
        assert!(transport
            .seed_timeline(CHANNEL, 3, Duration::days(10_000), newest)
            .is_none());
        assert!(transport.messages(CHANNEL).is_empty());
    }
}
