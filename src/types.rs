//! Core types for the notification store.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as i64)
    }

    /// The smallest timestamp strictly after `self`.
    pub fn next(self) -> Self {
        Timestamp(self.0.saturating_add(1))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Source of acceptance timestamps. Injected so tests can pin time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Priority tier of a notification.
///
/// `Normal` is also what an absent or unrecognised wire value means.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

impl Priority {
    /// Parse a wire value. Anything but `high` is `Normal`.
    pub fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("high") => Priority::High,
            _ => Priority::Normal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification category. The wire key is the snake_case name; keys the
/// client does not know about are carried as [`NotificationKind::Other`].
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationKind {
    DiaryAvailable,
    DiaryUnavailable,
    EncourageAvailable,
    EncourageUnavailable,
    DiaryReset,
    PlantGeneration,
    SevenDayReport,
    DailyWrapup,
    Other(String),
}

impl NotificationKind {
    /// Every named kind, in declaration order.
    pub const KNOWN: [NotificationKind; 8] = [
        NotificationKind::DiaryAvailable,
        NotificationKind::DiaryUnavailable,
        NotificationKind::EncourageAvailable,
        NotificationKind::EncourageUnavailable,
        NotificationKind::DiaryReset,
        NotificationKind::PlantGeneration,
        NotificationKind::SevenDayReport,
        NotificationKind::DailyWrapup,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            NotificationKind::DiaryAvailable => "diary_available",
            NotificationKind::DiaryUnavailable => "diary_unavailable",
            NotificationKind::EncourageAvailable => "encourage_available",
            NotificationKind::EncourageUnavailable => "encourage_unavailable",
            NotificationKind::DiaryReset => "diary_reset",
            NotificationKind::PlantGeneration => "plant_generation",
            NotificationKind::SevenDayReport => "seven_day_report",
            NotificationKind::DailyWrapup => "daily_wrapup",
            NotificationKind::Other(key) => key,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, NotificationKind::Other(_))
    }
}

impl From<&str> for NotificationKind {
    fn from(key: &str) -> Self {
        NotificationKind::KNOWN
            .iter()
            .find(|k| k.as_str() == key)
            .cloned()
            .unwrap_or_else(|| NotificationKind::Other(key.to_string()))
    }
}

impl From<String> for NotificationKind {
    fn from(key: String) -> Self {
        match NotificationKind::from(key.as_str()) {
            NotificationKind::Other(_) => NotificationKind::Other(key),
            known => known,
        }
    }
}

impl From<&NotificationKind> for NotificationKind {
    fn from(kind: &NotificationKind) -> Self {
        kind.clone()
    }
}

impl From<NotificationKind> for String {
    fn from(kind: NotificationKind) -> Self {
        match kind {
            NotificationKind::Other(key) => key,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Debug for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kind({})", self.as_str())
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound push message as delivered by the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl PushMessage {
    /// A bare message of the given kind at normal priority.
    pub fn new(kind: impl Into<NotificationKind>) -> Self {
        Self {
            kind: kind.into(),
            priority: None,
            reason: None,
            message: None,
            target: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority.as_str().to_string());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Effective priority of this message.
    pub fn priority(&self) -> Priority {
        Priority::from_wire(self.priority.as_deref())
    }
}

/// An accepted notification as held by the store and written to storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredNotification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default, deserialize_with = "priority_from_wire")]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub received_at: Timestamp,
    pub is_active: bool,
}

/// Stored priorities read like inbound ones: anything but "high" is normal.
fn priority_from_wire<'de, D>(deserializer: D) -> std::result::Result<Priority, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(Priority::from_wire(value.as_deref()))
}

impl StoredNotification {
    pub(crate) fn from_message(message: PushMessage, received_at: Timestamp) -> Self {
        let priority = message.priority();
        Self {
            kind: message.kind,
            priority,
            reason: message.reason,
            message: message.message,
            target: message.target,
            received_at,
            is_active: true,
        }
    }
}

/// Which branch of the merge rule admitted or refused an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeRule {
    /// Nothing was stored for the key.
    First,
    /// A high-priority event replaced a normal one.
    Escalated,
    /// Same tier; the latest wins.
    Replaced,
    /// A normal event arrived while a high one is stored.
    Suppressed,
}

impl MergeRule {
    pub fn accepts(&self) -> bool {
        !matches!(self, MergeRule::Suppressed)
    }
}

/// Outcome of [`NotificationStore::accept`](crate::NotificationStore::accept).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AcceptDecision {
    Accepted {
        rule: MergeRule,
        /// Whether the kind is broadcast-worthy and listeners were notified.
        broadcast: bool,
    },
    Rejected {
        stored: Priority,
        incoming: Priority,
    },
}

impl AcceptDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AcceptDecision::Accepted { .. })
    }
}

/// Counters kept by the store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub active: usize,
    pub accepted: u64,
    pub rejected: u64,
    pub cleared: u64,
    pub restored: u64,
    pub persist_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names() {
        for kind in NotificationKind::KNOWN.iter() {
            assert_eq!(&NotificationKind::from(kind.as_str()), kind);
        }
        assert_eq!(
            NotificationKind::from("mystery"),
            NotificationKind::Other("mystery".to_string())
        );
    }

    #[test]
    fn test_priority_defaults_to_normal() {
        assert_eq!(Priority::from_wire(None), Priority::Normal);
        assert_eq!(Priority::from_wire(Some("urgent")), Priority::Normal);
        assert_eq!(Priority::from_wire(Some("HIGH")), Priority::High);
        assert!(Priority::High > Priority::Normal);
    }

    #[test]
    fn test_push_message_parses_optional_fields() {
        let msg: PushMessage =
            serde_json::from_str(r#"{"type":"diary_unavailable","priority":"high","reason":"done"}"#)
                .unwrap();
        assert_eq!(msg.kind, NotificationKind::DiaryUnavailable);
        assert_eq!(msg.priority(), Priority::High);
        assert_eq!(msg.reason.as_deref(), Some("done"));
        assert!(msg.target.is_none());
    }

    #[test]
    fn test_stored_notification_wire_shape() {
        let stored = StoredNotification::from_message(
            PushMessage::new("encourage_available").with_target("letter-overlay-glow"),
            Timestamp(42),
        );
        let value = serde_json::to_value(&stored).unwrap();
        assert_eq!(value["type"], "encourage_available");
        assert_eq!(value["priority"], "normal");
        assert_eq!(value["receivedAt"], 42);
        assert_eq!(value["isActive"], true);
        assert!(value.get("reason").is_none());
    }

    #[test]
    fn test_stored_priority_is_lenient() {
        let parse = |priority: &str| {
            let json = format!(
                r#"{{"type":"diary_available","priority":{priority},"receivedAt":1,"isActive":true}}"#
            );
            serde_json::from_str::<StoredNotification>(&json).unwrap().priority
        };
        assert_eq!(parse(r#""urgent""#), Priority::Normal);
        assert_eq!(parse(r#""HIGH""#), Priority::High);
        assert_eq!(parse("null"), Priority::Normal);
    }
}
