//! # Journal Notify
//!
//! Client-side notification state for the growth journal: a durable,
//! priority-merged record of the latest push notification per kind, with
//! typed broadcast to whatever views are mounted.
//!
//! ## Core Concepts
//!
//! - **Merge rule**: high beats normal, latest wins within a tier
//! - **Persistence**: the whole mapping is rewritten on every change
//! - **Broadcast**: accepted updates reach listeners before `accept` returns
//! - **Restoration**: views mounted later re-request stored notifications
//!
//! ## Example
//!
//! ```ignore
//! use journal_notify::{NotificationStore, PushMessage, StoreConfig, View};
//!
//! let store = NotificationStore::open_dir(StoreConfig::default(), "./state")?;
//!
//! store.accept(PushMessage::new("diary_available"));
//! assert!(View::Study.status(&store).available);
//!
//! // After the study view re-mounts
//! View::Study.restore(&store);
//! ```

pub mod config;
pub mod error;
pub mod policy;
pub mod storage;
pub mod store;
pub mod subscriptions;
pub mod transport;
pub mod types;
pub mod views;

// Re-exports
pub use config::{BroadcastPolicy, Config, PushConfig, StoreConfig};
pub use error::{NotifyError, Result};
pub use storage::{FileStorage, MemoryStorage, Persistence};
pub use store::{NotificationStore, QueryResult};
pub use subscriptions::{
    DropReason, Origin, StoreEvent, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId, SubscriptionManager,
};
pub use transport::{
    ConnectionEvent, ConnectionState, PushClient, PushHandle, ReconnectPolicy,
};
pub use types::*;
pub use views::{View, ViewStatus};
