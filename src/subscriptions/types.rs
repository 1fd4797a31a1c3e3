//! Subscription types for live notification updates.

use crate::types::{NotificationKind, Priority, StoredNotification};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// Default: 256
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: SubscriptionFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 256,
            filter: SubscriptionFilter::default(),
        }
    }
}

impl SubscriptionConfig {
    pub fn with_filter(filter: SubscriptionFilter) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }
}

/// Filter criteria for subscriptions.
///
/// The default filter receives every notification but no suppression or
/// clear events.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionFilter {
    /// Restrict to these kinds (None = all kinds).
    pub kinds: Option<BTreeSet<NotificationKind>>,

    /// Also receive an event when the merge rule refuses an update.
    pub include_suppressed: bool,

    /// Also receive an event when a stored notification is cleared.
    pub include_cleared: bool,
}

impl SubscriptionFilter {
    /// Subscribe to specific kinds.
    pub fn kinds<I, K>(kinds: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<NotificationKind>,
    {
        Self {
            kinds: Some(kinds.into_iter().map(Into::<NotificationKind>::into).collect()),
            ..Default::default()
        }
    }

    /// Subscribe to everything, including suppression and clear events.
    pub fn all() -> Self {
        Self {
            kinds: None,
            include_suppressed: true,
            include_cleared: true,
        }
    }

    pub fn with_suppressed(mut self) -> Self {
        self.include_suppressed = true;
        self
    }

    pub fn with_cleared(mut self) -> Self {
        self.include_cleared = true;
        self
    }

    pub(crate) fn matches_kind(&self, kind: &NotificationKind) -> bool {
        match self.kinds {
            Some(ref kinds) => kinds.contains(kind),
            None => true,
        }
    }

    pub(crate) fn matches(&self, event: &StoreEvent) -> bool {
        match event {
            StoreEvent::Notification { notification, .. } => {
                self.matches_kind(&notification.kind)
            }
            StoreEvent::Suppressed { kind, .. } => {
                self.include_suppressed && self.matches_kind(kind)
            }
            StoreEvent::Cleared { kind } => self.include_cleared && self.matches_kind(kind),
            StoreEvent::Dropped { .. } => true,
        }
    }
}

/// How a notification reached the listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Freshly accepted from the push channel.
    Live,
    /// Re-emitted from stored state by `restore`.
    Restored,
}

/// Events emitted to subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StoreEvent {
    /// A notification is active for its kind.
    Notification {
        notification: StoredNotification,
        origin: Origin,
    },

    /// An update lost to a higher-priority stored notification.
    Suppressed {
        kind: NotificationKind,
        stored: Priority,
        incoming: Priority,
    },

    /// The stored notification for a kind was removed.
    Cleared { kind: NotificationKind },

    /// Subscription was dropped.
    Dropped { reason: DropReason },
}

impl StoreEvent {
    /// Kind this event is about, if any.
    pub fn kind(&self) -> Option<&NotificationKind> {
        match self {
            StoreEvent::Notification { notification, .. } => Some(&notification.kind),
            StoreEvent::Suppressed { kind, .. } | StoreEvent::Cleared { kind } => Some(kind),
            StoreEvent::Dropped { .. } => None,
        }
    }
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Receiver went away.
    Disconnected,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Handle to a channel subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<StoreEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<StoreEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<StoreEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<StoreEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything delivered so far, without blocking.
    pub fn drain(&self) -> Vec<StoreEvent> {
        self.receiver.try_iter().collect()
    }
}
