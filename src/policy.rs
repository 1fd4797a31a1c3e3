//! Priority merge rule.

use crate::types::{MergeRule, Priority};

/// Decide whether an incoming event may replace what is stored for its key.
///
/// The rule never looks at payloads: a high event always beats a normal one,
/// and within a tier the newest arrival wins.
pub fn decide(stored: Option<Priority>, incoming: Priority) -> MergeRule {
    match stored {
        None => MergeRule::First,
        Some(stored) if incoming == Priority::High && stored != Priority::High => {
            MergeRule::Escalated
        }
        Some(stored) if incoming == stored => MergeRule::Replaced,
        Some(_) => MergeRule::Suppressed,
    }
}
