//! Subscription manager for broadcasting store events.

use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::types::{
    DropReason, Origin, StoreEvent, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId,
};
use crate::types::{NotificationKind, Priority, StoredNotification};

/// Listener invoked on the publishing thread.
pub type Listener = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

/// Where a subscription's events go.
enum Sink {
    Channel(Sender<StoreEvent>),
    Callback(Listener),
}

/// Internal subscription state.
struct Subscription {
    filter: SubscriptionFilter,
    sink: Sink,
}

/// Result of offering an event to a channel subscriber.
enum SendOutcome {
    Sent,
    Full,
    Disconnected,
}

fn offer(sender: &Sender<StoreEvent>, event: StoreEvent) -> SendOutcome {
    match sender.try_send(event) {
        Ok(()) => SendOutcome::Sent,
        Err(TrySendError::Full(_)) => SendOutcome::Full,
        Err(TrySendError::Disconnected(_)) => SendOutcome::Disconnected,
    }
}

/// Manages subscriptions and broadcasts events synchronously.
pub struct SubscriptionManager {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    /// Create a new subscription manager.
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Create a channel subscription.
    ///
    /// Only events published after this call are delivered; use the store's
    /// `restore` to replay stored notifications.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        let id = self.allocate_id();
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        self.subscriptions.write().insert(
            id,
            Subscription {
                filter: config.filter,
                sink: Sink::Channel(sender),
            },
        );

        SubscriptionHandle { id, receiver }
    }

    /// Register a callback listener.
    ///
    /// The callback runs on the thread that accepted or restored the event,
    /// before that call returns. It must not block.
    pub fn listen<F>(&self, filter: SubscriptionFilter, listener: F) -> SubscriptionId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.subscriptions.write().insert(
            id,
            Subscription {
                filter,
                sink: Sink::Callback(Arc::new(listener)),
            },
        );
        id
    }

    /// Unsubscribe and clean up. Returns whether the id was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscriptions.write().remove(&id);
        match removed {
            Some(sub) => {
                if let Sink::Channel(sender) = sub.sink {
                    // Best effort; the receiver may already be gone
                    let _ = sender.try_send(StoreEvent::Dropped {
                        reason: DropReason::Unsubscribed,
                    });
                }
                true
            }
            None => false,
        }
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    // --- Broadcasting ---

    /// Publish an active notification.
    pub fn broadcast_notification(&self, notification: &StoredNotification, origin: Origin) {
        self.broadcast(StoreEvent::Notification {
            notification: notification.clone(),
            origin,
        });
    }

    /// Publish a refused update.
    pub fn broadcast_suppressed(
        &self,
        kind: &NotificationKind,
        stored: Priority,
        incoming: Priority,
    ) {
        self.broadcast(StoreEvent::Suppressed {
            kind: kind.clone(),
            stored,
            incoming,
        });
    }

    /// Publish removal of a stored notification.
    pub fn broadcast_cleared(&self, kind: &NotificationKind) {
        self.broadcast(StoreEvent::Cleared { kind: kind.clone() });
    }

    /// Deliver to every matching subscriber. Channel subscribers that fail
    /// to receive are dropped; callbacks run after the lock is released.
    fn broadcast(&self, event: StoreEvent) {
        let mut to_remove = Vec::new();
        let mut callbacks = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if !sub.filter.matches(&event) {
                    continue;
                }
                match sub.sink {
                    Sink::Channel(ref sender) => {
                        match offer(sender, event.clone()) {
                            SendOutcome::Sent => {}
                            SendOutcome::Full => to_remove.push((*id, DropReason::BufferOverflow)),
                            SendOutcome::Disconnected => {
                                to_remove.push((*id, DropReason::Disconnected))
                            }
                        }
                    }
                    Sink::Callback(ref listener) => callbacks.push((*id, Arc::clone(listener))),
                }
            }
        }

        // Ids ascend with registration, so listeners see events in that order
        callbacks.sort_by_key(|(id, _)| *id);
        for (_, listener) in callbacks {
            listener(&event);
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for (id, reason) in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    tracing::warn!(subscription = id.0, ?reason, "dropping subscriber");
                    if let Sink::Channel(sender) = sub.sink {
                        let _ = sender.try_send(StoreEvent::Dropped { reason });
                    }
                }
            }
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PushMessage, Timestamp};
    use parking_lot::Mutex;
    use std::time::Duration;

    fn make_notification(kind: &str) -> StoredNotification {
        StoredNotification::from_message(PushMessage::new(kind), Timestamp(1))
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let manager = SubscriptionManager::new();

        let handle = manager.subscribe(SubscriptionConfig::default());
        assert_eq!(manager.subscription_count(), 1);

        assert!(manager.unsubscribe(handle.id));
        assert_eq!(manager.subscription_count(), 0);
        assert!(!manager.unsubscribe(handle.id));

        let event = handle.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(
            event,
            StoreEvent::Dropped {
                reason: DropReason::Unsubscribed
            }
        );
    }

    #[test]
    fn test_broadcast_to_matching() {
        let manager = SubscriptionManager::new();
        let handle = manager.subscribe(SubscriptionConfig::with_filter(
            SubscriptionFilter::kinds(["diary_available"]),
        ));

        manager.broadcast_notification(&make_notification("diary_available"), Origin::Live);

        match handle.try_recv().unwrap() {
            StoreEvent::Notification {
                notification,
                origin,
            } => {
                assert_eq!(notification.kind, NotificationKind::DiaryAvailable);
                assert_eq!(origin, Origin::Live);
            }
            other => panic!("Expected Notification event, got {:?}", other),
        }
    }

    #[test]
    fn test_broadcast_filters_non_matching() {
        let manager = SubscriptionManager::new();
        let handle = manager.subscribe(SubscriptionConfig::with_filter(
            SubscriptionFilter::kinds(["diary_available"]),
        ));

        manager.broadcast_notification(&make_notification("encourage_available"), Origin::Live);
        manager.broadcast_cleared(&NotificationKind::DiaryAvailable);

        assert!(handle.try_recv().is_err());
    }

    #[test]
    fn test_suppressed_requires_opt_in() {
        let manager = SubscriptionManager::new();
        let plain = manager.subscribe(SubscriptionConfig::default());
        let opted = manager.subscribe(SubscriptionConfig::with_filter(
            SubscriptionFilter::default().with_suppressed(),
        ));

        manager.broadcast_suppressed(
            &NotificationKind::DiaryAvailable,
            Priority::High,
            Priority::Normal,
        );

        assert!(plain.try_recv().is_err());
        assert!(matches!(
            opted.try_recv().unwrap(),
            StoreEvent::Suppressed { .. }
        ));
    }

    #[test]
    fn test_drop_slow_subscriber() {
        let manager = SubscriptionManager::new();
        let _handle = manager.subscribe(SubscriptionConfig {
            buffer_size: 2,
            filter: SubscriptionFilter::default(),
        });

        for _ in 0..10 {
            manager.broadcast_notification(&make_notification("diary_available"), Origin::Live);
        }

        assert_eq!(manager.subscription_count(), 0);
    }

    #[test]
    fn test_drop_disconnected_subscriber() {
        let manager = SubscriptionManager::new();
        let handle = manager.subscribe(SubscriptionConfig::default());
        drop(handle);

        manager.broadcast_notification(&make_notification("diary_available"), Origin::Live);
        assert_eq!(manager.subscription_count(), 0);
    }

    #[test]
    fn test_callbacks_run_in_registration_order() {
        let manager = SubscriptionManager::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            manager.listen(SubscriptionFilter::default(), move |_| seen.lock().push(tag));
        }

        manager.broadcast_notification(&make_notification("diary_available"), Origin::Restored);
        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_callback_may_unsubscribe_itself() {
        let manager = Arc::new(SubscriptionManager::new());
        let id_slot = Arc::new(Mutex::new(None));

        let inner = Arc::clone(&manager);
        let inner_slot = Arc::clone(&id_slot);
        let id = manager.listen(SubscriptionFilter::default(), move |_| {
            if let Some(id) = inner_slot.lock().take() {
                inner.unsubscribe(id);
            }
        });
        *id_slot.lock() = Some(id);

        manager.broadcast_notification(&make_notification("diary_available"), Origin::Live);
        assert_eq!(manager.subscription_count(), 0);
    }
}
