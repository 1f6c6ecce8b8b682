// src/api/condition.rs

//! Status conditions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Condition type reporting whether resolution succeeded
pub const CONDITION_RESOLVED: &str = "Resolved";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
}

/// One observed aspect of a record's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}

/// Insert or update a condition by type
///
/// The transition time of an existing condition is kept unless its status
/// changes.
pub fn set_status_condition(conditions: &mut Vec<Condition>, new: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == new.type_) {
        Some(existing) => {
            if existing.status != new.status {
                existing.status = new.status;
                existing.last_transition_time = new.last_transition_time;
            }
            existing.reason = new.reason;
            existing.message = new.message;
        }
        None => conditions.push(new),
    }
}

pub fn find_status_condition<'a>(
    conditions: &'a [Condition],
    type_: &str,
) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_set_inserts_new_condition() {
        let mut conditions = Vec::new();
        set_status_condition(
            &mut conditions,
            Condition::new(CONDITION_RESOLVED, ConditionStatus::True, "Ok", "fine"),
        );
        assert_eq!(conditions.len(), 1);
        assert_eq!(
            find_status_condition(&conditions, CONDITION_RESOLVED).unwrap().reason,
            "Ok"
        );
    }

    #[test]
    fn test_transition_time_kept_when_status_unchanged() {
        let mut first = Condition::new(CONDITION_RESOLVED, ConditionStatus::False, "A", "a");
        first.last_transition_time = Utc::now() - Duration::hours(1);
        let original = first.last_transition_time;
        let mut conditions = vec![first];

        set_status_condition(
            &mut conditions,
            Condition::new(CONDITION_RESOLVED, ConditionStatus::False, "B", "b"),
        );
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].reason, "B");
        assert_eq!(conditions[0].last_transition_time, original);

        set_status_condition(
            &mut conditions,
            Condition::new(CONDITION_RESOLVED, ConditionStatus::True, "C", "c"),
        );
        assert_eq!(conditions[0].status, ConditionStatus::True);
        assert!(conditions[0].last_transition_time > original);
    }
}
