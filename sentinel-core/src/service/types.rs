//! Shared types of the config service surface.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::ServiceError;

/// A resolved configuration published to running services after a
/// successful update.
///
/// Singleton sections carry exactly one value; list-valued sections carry
/// the full resolved element list so multi-instance services can replace
/// their whole configuration set at once.
#[derive(Debug, Clone)]
pub struct ConfigUpdate {
    /// Declared section name.
    pub name: String,
    /// Resolved section values.
    pub new_config: Vec<Value>,
}

/// Body of a `POST /config/...` request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdateAction {
    /// Option name to value, merged into the stored override record.
    pub set: BTreeMap<String, Value>,
    /// Option names removed from the stored override record.
    pub delete: Vec<String>,
    /// Create a new list element. The element id comes from the path or
    /// from the element-key option in `set`.
    pub create: bool,
    /// Remove the addressed list element and its override record.
    pub remove: bool,
}

impl UpdateAction {
    /// Enforce the self-consistency rules of an action before any store or
    /// engine work happens.
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.remove {
            if !self.set.is_empty() || !self.delete.is_empty() || self.create {
                return Err(ServiceError::InvalidRequest(
                    "remove cannot be combined with set, delete, or create".into(),
                ));
            }
            return Ok(());
        }
        if self.set.is_empty() && self.delete.is_empty() && !self.create {
            return Err(ServiceError::InvalidRequest(
                "action must set or delete at least one option".into(),
            ));
        }
        Ok(())
    }
}

/// What a successful update did, for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Update,
    Create,
    Remove,
}

/// One entry of the in-memory audit trail.
///
/// Only option names are recorded; values may be sensitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    /// Override record id (`section` or `section/element`).
    pub id: String,
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub set: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_action_decoding() {
        let action: UpdateAction =
            serde_json::from_value(json!({"set": {"host": "x"}, "delete": ["port"]})).unwrap();
        assert_eq!(action.set["host"], "x");
        assert_eq!(action.delete, vec!["port"]);
        assert!(!action.create);
        assert!(!action.remove);
    }

    #[test]
    fn test_update_action_rejects_unknown_fields() {
        let result: Result<UpdateAction, _> = serde_json::from_value(json!({"sett": {}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_action_is_invalid() {
        let action = UpdateAction::default();
        assert!(action.validate().is_err());
    }

    #[test]
    fn test_remove_excludes_other_fields() {
        let action: UpdateAction =
            serde_json::from_value(json!({"remove": true, "set": {"a": 1}})).unwrap();
        assert!(action.validate().is_err());

        let action: UpdateAction = serde_json::from_value(json!({"remove": true})).unwrap();
        assert!(action.validate().is_ok());
    }

    #[test]
    fn test_create_alone_is_valid() {
        let action: UpdateAction = serde_json::from_value(json!({"create": true})).unwrap();
        assert!(action.validate().is_ok());
    }
}
