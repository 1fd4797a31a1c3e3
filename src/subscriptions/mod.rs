//! Typed publish/subscribe for notification updates.
//!
//! Every accepted or restored notification is published to all matching
//! subscribers before the store call returns. Two kinds of subscriber exist:
//! - bounded channels, polled by the owner of the handle
//! - callbacks, run synchronously on the publishing thread
//!
//! A channel subscriber whose buffer is full or whose receiver was dropped
//! is removed. There is no replay: late subscribers rely on the store's
//! `restore`.
//!
//! # Example
//!
//! ```ignore
//! let handle = store.subscribe(SubscriptionFilter::kinds([NotificationKind::DiaryAvailable]));
//!
//! store.restore(&View::Study.restore_keys());
//! while let Ok(event) = handle.try_recv() {
//!     if let StoreEvent::Notification { notification, .. } = event {
//!         enable_diary_button(&notification);
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::{Listener, SubscriptionManager};
pub use types::{
    DropReason, Origin, StoreEvent, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId,
};
