//! Query helpers for the views that render notification state.

use crate::store::NotificationStore;
use crate::types::NotificationKind;

/// A view whose affordances depend on stored notifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum View {
    /// Diary generation controls.
    Study,
    /// The encouragement letter.
    StudyEncourage,
}

/// Initial rendering state for a view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViewStatus {
    pub available: bool,
    pub unavailable: bool,
    pub any: bool,
}

impl View {
    /// The (available, unavailable) pair this view renders from.
    pub fn keys(&self) -> [NotificationKind; 2] {
        match self {
            View::Study => [
                NotificationKind::DiaryAvailable,
                NotificationKind::DiaryUnavailable,
            ],
            View::StudyEncourage => [
                NotificationKind::EncourageAvailable,
                NotificationKind::EncourageUnavailable,
            ],
        }
    }

    /// Kinds re-emitted when the view is mounted. The study view hosts the
    /// encouragement letter as a subtab, so it restores both pairs.
    pub fn restore_keys(&self) -> Vec<NotificationKind> {
        match self {
            View::Study => View::Study
                .keys()
                .into_iter()
                .chain(View::StudyEncourage.keys())
                .collect(),
            View::StudyEncourage => self.keys().to_vec(),
        }
    }

    /// Current status of this view's keys.
    pub fn status(&self, store: &NotificationStore) -> ViewStatus {
        let [available, unavailable] = self.keys();
        let result = store.query([&available, &unavailable]);
        ViewStatus {
            available: result.is_active(&available),
            unavailable: result.is_active(&unavailable),
            any: result.has_any(),
        }
    }

    /// Re-emit this view's stored notifications. Returns how many.
    pub fn restore(&self, store: &NotificationStore) -> usize {
        store.restore(self.restore_keys())
    }
}
