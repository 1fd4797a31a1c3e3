//! The notification reconciliation store.

use crate::config::StoreConfig;
use crate::error::Result;
use crate::policy;
use crate::storage::{FileStorage, Persistence};
use crate::subscriptions::{
    Origin, StoreEvent, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId, SubscriptionManager,
};
use crate::types::{
    AcceptDecision, Clock, NotificationKind, PushMessage, StoreStats,
    StoredNotification, SystemClock,
};
use parking_lot::{Mutex, ReentrantMutex};
use std::collections::BTreeMap;
use std::path::Path;

/// Mapping as persisted: one active notification per kind.
type Entries = BTreeMap<NotificationKind, StoredNotification>;

/// Mutable state, guarded as a unit so a merge decision and its write are
/// never interleaved with another update.
#[derive(Default)]
struct StoreState {
    entries: Entries,
    stats: StoreStats,
}

/// Per-key active flags returned by [`NotificationStore::query`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryResult {
    flags: BTreeMap<NotificationKind, bool>,
}

impl QueryResult {
    /// Whether `kind` was queried and is active.
    pub fn is_active(&self, kind: &NotificationKind) -> bool {
        self.flags.get(kind).copied().unwrap_or(false)
    }

    /// Whether any queried kind is active.
    pub fn has_any(&self) -> bool {
        self.flags.values().any(|active| *active)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NotificationKind, bool)> {
        self.flags.iter().map(|(kind, active)| (kind, *active))
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

/// Durable, priority-merged record of the latest notification per kind.
///
/// One instance per session, owned by whatever hosts the UI shell and shared
/// by reference (or `Arc`) with the push client and the views.
pub struct NotificationStore {
    config: StoreConfig,
    storage: Box<dyn Persistence>,
    clock: Box<dyn Clock>,
    state: Mutex<StoreState>,
    /// Held from a write through its delivery, so listeners observe updates
    /// in the order they were applied. Reentrant: a listener may call back
    /// into the store.
    publish: ReentrantMutex<()>,
    subscriptions: SubscriptionManager,
}

impl NotificationStore {
    /// Open a store over `storage`, hydrating from whatever it holds.
    ///
    /// Hydration never fails: a missing, unreadable or malformed blob means
    /// the session starts empty.
    pub fn open(config: StoreConfig, storage: impl Persistence + 'static) -> Self {
        Self::with_clock(config, storage, SystemClock)
    }

    /// Open a store with an explicit clock.
    pub fn with_clock(
        config: StoreConfig,
        storage: impl Persistence + 'static,
        clock: impl Clock + 'static,
    ) -> Self {
        let entries = Self::hydrate(&config.storage_key, &storage);
        tracing::info!(
            key = %config.storage_key,
            restored = entries.len(),
            "notification store opened"
        );

        let stats = StoreStats {
            active: entries.len(),
            ..Default::default()
        };

        Self {
            config,
            storage: Box::new(storage),
            clock: Box::new(clock),
            state: Mutex::new(StoreState { entries, stats }),
            publish: ReentrantMutex::new(()),
            subscriptions: SubscriptionManager::new(),
        }
    }

    /// Open a store persisted in a directory.
    pub fn open_dir(config: StoreConfig, path: impl AsRef<Path>) -> Result<Self> {
        let storage = FileStorage::open(path)?;
        Ok(Self::open(config, storage))
    }

    fn hydrate(key: &str, storage: &dyn Persistence) -> Entries {
        let blob = match storage.read(key) {
            Ok(Some(blob)) => blob,
            Ok(None) => return Entries::new(),
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to read stored notifications, starting empty");
                return Entries::new();
            }
        };

        match serde_json::from_str::<Entries>(&blob) {
            Ok(entries) => entries
                .into_iter()
                .filter(|(kind, notification)| notification.is_active && notification.kind == *kind)
                .collect(),
            Err(e) => {
                tracing::warn!(key, error = %e, "stored notifications are malformed, starting empty");
                Entries::new()
            }
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // --- Updates ---

    /// Merge an inbound message into the store.
    ///
    /// Accepted updates are persisted and, for broadcast-worthy kinds,
    /// published before this returns. A rejected update changes nothing;
    /// subscribers that asked for it see a `Suppressed` event.
    pub fn accept(&self, message: PushMessage) -> AcceptDecision {
        let kind = message.kind.clone();
        let incoming = message.priority();
        let _publish = self.publish.lock();

        let (notification, rule, cleared) = {
            let mut state = self.state.lock();
            let previous = state
                .entries
                .get(&kind)
                .map(|n| (n.priority, n.received_at));
            let rule = policy::decide(previous.map(|(priority, _)| priority), incoming);

            if !rule.accepts() {
                let stored = previous.map(|(priority, _)| priority).unwrap_or_default();
                state.stats.rejected += 1;
                drop(state);

                tracing::debug!(%kind, %stored, %incoming, "update suppressed by stored priority");
                self.subscriptions
                    .broadcast_suppressed(&kind, stored, incoming);
                return AcceptDecision::Rejected { stored, incoming };
            }

            // Strictly after the entry being replaced, even if the clock is not
            let now = self.clock.now();
            let received_at = match previous {
                Some((_, previous_at)) if now <= previous_at => previous_at.next(),
                _ => now,
            };

            let notification = StoredNotification::from_message(message, received_at);
            state.entries.insert(kind.clone(), notification.clone());

            let mut cleared = Vec::new();
            if let Some(targets) = self.config.reset_rules.get(&kind) {
                for target in targets {
                    if *target != kind && state.entries.remove(target).is_some() {
                        cleared.push(target.clone());
                    }
                }
            }

            state.stats.accepted += 1;
            state.stats.cleared += cleared.len() as u64;
            self.persist_locked(&mut state);

            (notification, rule, cleared)
        };

        let broadcast = self.config.broadcast.is_broadcast(&kind);
        tracing::debug!(%kind, ?rule, broadcast, "notification accepted");

        if broadcast {
            self.subscriptions
                .broadcast_notification(&notification, Origin::Live);
        }
        for target in &cleared {
            tracing::debug!(kind = %target, reset_by = %kind, "notification reset");
            self.subscriptions.broadcast_cleared(target);
        }

        AcceptDecision::Accepted { rule, broadcast }
    }

    /// Remove the stored notification for `kind`. Returns whether one existed.
    pub fn clear(&self, kind: impl Into<NotificationKind>) -> bool {
        let kind = kind.into();
        let _publish = self.publish.lock();

        {
            let mut state = self.state.lock();
            if state.entries.remove(&kind).is_none() {
                tracing::debug!(%kind, "nothing to clear");
                return false;
            }
            state.stats.cleared += 1;
            self.persist_locked(&mut state);
        }

        tracing::debug!(%kind, "notification cleared");
        self.subscriptions.broadcast_cleared(&kind);
        true
    }

    // --- Queries ---

    /// Active flag for each key.
    pub fn query<I, K>(&self, keys: I) -> QueryResult
    where
        I: IntoIterator<Item = K>,
        K: Into<NotificationKind>,
    {
        let state = self.state.lock();
        let flags = keys
            .into_iter()
            .map(|key| {
                let kind: NotificationKind = key.into();
                let active = state.entries.get(&kind).is_some_and(|n| n.is_active);
                (kind, active)
            })
            .collect();
        QueryResult { flags }
    }

    /// Whether any of the keys has an active notification.
    pub fn has_any<I, K>(&self, keys: I) -> bool
    where
        I: IntoIterator<Item = K>,
        K: Into<NotificationKind>,
    {
        self.query(keys).has_any()
    }

    /// Stored notification for a kind.
    pub fn get(&self, kind: impl Into<NotificationKind>) -> Option<StoredNotification> {
        self.state.lock().entries.get(&kind.into()).cloned()
    }

    /// All stored notifications, ordered by kind.
    pub fn snapshot(&self) -> Vec<StoredNotification> {
        self.state.lock().entries.values().cloned().collect()
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.state.lock();
        StoreStats {
            active: state.entries.len(),
            ..state.stats.clone()
        }
    }

    // --- Restoration ---

    /// Re-publish the active notification of each key, in the order given.
    ///
    /// Keys with no active notification produce nothing. Restoration ignores
    /// the broadcast policy: the caller asked for these kinds explicitly.
    /// Returns how many notifications were published.
    pub fn restore<I, K>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: Into<NotificationKind>,
    {
        let mut seen: Vec<NotificationKind> = Vec::new();
        let _publish = self.publish.lock();
        let restored: Vec<StoredNotification> = {
            let mut state = self.state.lock();
            let mut restored = Vec::new();
            for kind in keys.into_iter().map(Into::<NotificationKind>::into) {
                if seen.contains(&kind) {
                    continue;
                }
                if let Some(notification) = state.entries.get(&kind).filter(|n| n.is_active) {
                    restored.push(notification.clone());
                }
                seen.push(kind);
            }
            state.stats.restored += restored.len() as u64;
            restored
        };

        for notification in &restored {
            tracing::debug!(kind = %notification.kind, "restoring notification");
            self.subscriptions
                .broadcast_notification(notification, Origin::Restored);
        }
        restored.len()
    }

    // --- Subscriptions ---

    /// Channel subscription using the configured buffer size.
    pub fn subscribe(&self, filter: SubscriptionFilter) -> SubscriptionHandle {
        self.subscriptions.subscribe(SubscriptionConfig {
            buffer_size: self.config.subscriber_buffer,
            filter,
        })
    }

    /// Callback listener, run synchronously on each matching event.
    pub fn listen<F>(&self, filter: SubscriptionFilter, listener: F) -> SubscriptionId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.subscriptions.listen(filter, listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscriptions.unsubscribe(id)
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    // --- Persistence ---

    /// Write the current mapping to storage.
    pub fn flush(&self) -> Result<()> {
        let state = self.state.lock();
        self.write_entries(&state.entries)
    }

    fn write_entries(&self, entries: &Entries) -> Result<()> {
        let blob = serde_json::to_string(entries)?;
        self.storage.write(&self.config.storage_key, &blob)
    }

    /// Persist while holding the state lock, so blobs land in update order.
    /// Failures are logged and counted; the in-memory state stays current.
    fn persist_locked(&self, state: &mut StoreState) {
        if let Err(e) = self.write_entries(&state.entries) {
            state.stats.persist_failures += 1;
            tracing::error!(
                key = %self.config.storage_key,
                error = %e,
                "failed to persist notifications"
            );
        }
    }
}
