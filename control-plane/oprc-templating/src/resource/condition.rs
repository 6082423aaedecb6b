use chrono::Utc;
use kube::core::DynamicObject;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Aggregate condition written by the templating reconciler.
pub const TYPE_SYNCED: &str = "Synced";

pub const REASON_RECONCILE_SUCCESS: &str = "ReconcileSuccess";
pub const REASON_RECONCILE_ERROR: &str = "ReconcileError";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// A typed status entry. The type is a plain string and unknown fields land
/// in `extra`, so conditions written by other controllers survive our
/// write-back untouched.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Condition {
    pub fn new(
        type_: &str,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.to_string(),
            status,
            reason: reason.to_string(),
            message: message.into(),
            last_transition_time: Some(Utc::now().to_rfc3339()),
            extra: Map::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Equality ignoring `lastTransitionTime`.
    pub fn equivalent(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

pub fn reconcile_success() -> Condition {
    Condition::new(
        TYPE_SYNCED,
        ConditionStatus::True,
        REASON_RECONCILE_SUCCESS,
        "",
    )
}

pub fn reconcile_error(err: &dyn std::error::Error) -> Condition {
    Condition::new(
        TYPE_SYNCED,
        ConditionStatus::False,
        REASON_RECONCILE_ERROR,
        err.to_string(),
    )
}

/// Conditions currently stored under `status.conditions`.
pub fn conditions(obj: &DynamicObject) -> Result<Vec<Condition>, serde_json::Error> {
    match obj.data.get("status").and_then(|s| s.get("conditions")) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(v) => serde_json::from_value(v.clone()),
    }
}

/// Upsert `incoming` by type. A condition equivalent to the stored one keeps
/// the stored entry (and its transition time); new types are appended so the
/// existing order is preserved.
pub fn set_conditions(
    obj: &mut DynamicObject,
    incoming: impl IntoIterator<Item = Condition>,
) -> Result<(), serde_json::Error> {
    let mut current = conditions(obj)?;
    for inc in incoming {
        match current.iter_mut().find(|c| c.type_ == inc.type_) {
            Some(existing) if existing.equivalent(&inc) => {}
            Some(existing) => *existing = inc,
            None => current.push(inc),
        }
    }
    let encoded = serde_json::to_value(&current)?;

    if !obj.data.is_object() {
        obj.data = json!({});
    }
    if let Some(root) = obj.data.as_object_mut() {
        let status = root.entry("status").or_insert_with(|| json!({}));
        if !status.is_object() {
            *status = json!({});
        }
        if let Some(status) = status.as_object_mut() {
            status.insert("conditions".to_string(), encoded);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::*;

    #[test]
    fn identical_condition_is_stored_once() {
        let mut p = parent("default", "blog");
        set_conditions(&mut p, [reconcile_success()]).unwrap();
        let first = conditions(&p).unwrap();

        let mut again = reconcile_success();
        again.last_transition_time = Some("2030-01-01T00:00:00Z".into());
        set_conditions(&mut p, [again]).unwrap();

        let stored = conditions(&p).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored, first, "transition time must not move");
    }

    #[test]
    fn changed_condition_replaces_same_type() {
        let mut p = parent("default", "blog");
        set_conditions(&mut p, [reconcile_success()]).unwrap();
        let err = std::io::Error::other("boom");
        set_conditions(&mut p, [reconcile_error(&err)]).unwrap();

        let stored = conditions(&p).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, ConditionStatus::False);
        assert_eq!(stored[0].reason, REASON_RECONCILE_ERROR);
        assert_eq!(stored[0].message, "boom");
    }

    #[test]
    fn foreign_conditions_keep_their_position() {
        let mut p = parent("default", "blog");
        p.data["status"] = serde_json::json!({
            "conditions": [
                {"type": "Ready", "status": "True", "reason": "Available"}
            ]
        });
        set_conditions(&mut p, [reconcile_success()]).unwrap();

        let stored = conditions(&p).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].type_, "Ready");
        assert_eq!(stored[1].type_, TYPE_SYNCED);
    }

    #[test]
    fn foreign_condition_fields_are_kept() {
        let mut p = parent("default", "blog");
        p.data["status"] = serde_json::json!({
            "conditions": [{
                "type": "Ready",
                "status": "True",
                "reason": "Available",
                "observedGeneration": 3,
                "severity": "Info"
            }]
        });
        set_conditions(&mut p, [reconcile_success()]).unwrap();

        let ready = &p.data["status"]["conditions"][0];
        assert_eq!(ready["observedGeneration"], 3);
        assert_eq!(ready["severity"], "Info");
        assert!(conditions(&p).unwrap()[1].extra.is_empty());
    }

    #[test]
    fn malformed_conditions_are_reported() {
        let mut p = parent("default", "blog");
        p.data["status"] = serde_json::json!({"conditions": "oops"});
        assert!(set_conditions(&mut p, [reconcile_success()]).is_err());
    }
}
