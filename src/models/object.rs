//! Typed view of cluster objects
//!
//! Objects arrive from the API server as schemaless JSON. They are decoded here,
//! once, into the handful of fields the tree builder needs, so nothing downstream
//! walks untyped maps.

use super::reference::ResourceReference;
use crate::error::TreeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Health snapshot derived from the last entry of `status.conditions`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    #[serde(rename = "type")]
    pub condition_type: String,
    pub reason: String,
    pub message: String,
}

impl Health {
    /// Build health from a condition list, tolerating missing or mistyped fields.
    ///
    /// Conditions are taken in stored order; the last entry wins.
    pub fn from_conditions(conditions: &[Value]) -> Self {
        let Some(last) = conditions.last() else {
            return Self::default();
        };

        let field = |key: &str| {
            last.get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        Self {
            status: field("status"),
            condition_type: field("type"),
            reason: field("reason"),
            message: field("message"),
        }
    }

    fn from_status(status: &Value) -> Self {
        status
            .get("conditions")
            .and_then(|c| c.as_array())
            .map(|conditions| Self::from_conditions(conditions))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub namespace: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uid: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub resource_version: String,
    #[serde(default)]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

fn null_as_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawObject {
    #[serde(default, deserialize_with = "null_as_default")]
    api_version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    kind: String,
    #[serde(default)]
    metadata: ObjectMetadata,
    #[serde(default)]
    status: Value,
}

/// A decoded cluster object: identity, health, and the raw managed list if any
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterObject {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMetadata,
    pub health: Health,
    managed: Option<Value>,
}

impl ClusterObject {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let raw: RawObject = serde_json::from_value(value)?;
        let health = Health::from_status(&raw.status);
        let managed = raw.status.get("managed").cloned();

        Ok(Self {
            api_version: raw.api_version,
            kind: raw.kind,
            metadata: raw.metadata,
            health,
            managed,
        })
    }

    pub fn uid(&self) -> &str {
        &self.metadata.uid
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    /// Decode the composition's declared `status.managed` list.
    ///
    /// Fails when the list is absent, not an array, or holds an entry that is
    /// not a resource reference.
    pub fn managed_resources(&self) -> Result<Vec<ResourceReference>, TreeError> {
        let managed = self.managed.as_ref().ok_or_else(|| {
            TreeError::MalformedComposition(format!(
                "composition {} has no 'status.managed' field",
                self.describe()
            ))
        })?;

        let entries = managed.as_array().ok_or_else(|| {
            TreeError::MalformedComposition(format!(
                "'status.managed' of composition {} is not a list",
                self.describe()
            ))
        })?;

        entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| {
                serde_json::from_value::<ResourceReference>(entry.clone()).map_err(|e| {
                    TreeError::MalformedComposition(format!(
                        "entry {} of 'status.managed' in composition {}: {}",
                        idx,
                        self.describe(),
                        e
                    ))
                })
            })
            .collect()
    }

    fn describe(&self) -> String {
        if self.metadata.namespace.is_empty() {
            self.metadata.name.clone()
        } else {
            format!("{}/{}", self.metadata.namespace, self.metadata.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_health_uses_last_condition() {
        let obj = ClusterObject::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "p", "namespace": "ns", "uid": "u-1"},
            "status": {
                "conditions": [
                    {"type": "Initialized", "status": "True"},
                    {"type": "Ready", "status": "False", "reason": "Crash", "message": "boom"}
                ]
            }
        }))
        .unwrap();

        assert_eq!(obj.health.condition_type, "Ready");
        assert_eq!(obj.health.status, "False");
        assert_eq!(obj.health.reason, "Crash");
        assert_eq!(obj.health.message, "boom");
    }

    #[test]
    fn test_health_tolerates_missing_and_mistyped_fields() {
        let health = Health::from_conditions(&[json!({"type": "Ready", "status": true})]);
        assert_eq!(health.condition_type, "Ready");
        assert_eq!(health.status, "");
        assert_eq!(health.reason, "");

        assert_eq!(Health::from_conditions(&[]), Health::default());
        assert_eq!(Health::from_conditions(&[json!("oops")]), Health::default());
    }

    #[test]
    fn test_object_without_status_has_zero_health() {
        let obj = ClusterObject::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": "a",
                "namespace": null,
                "uid": "u-a",
                "resourceVersion": "42",
                "creationTimestamp": "2024-05-01T10:00:00Z"
            }
        }))
        .unwrap();

        assert_eq!(obj.health, Health::default());
        assert_eq!(obj.namespace(), "");
        assert_eq!(obj.metadata.resource_version, "42");
        assert!(obj.metadata.creation_timestamp.is_some());
    }

    #[test]
    fn test_managed_resources_decode() {
        let obj = ClusterObject::from_value(json!({
            "metadata": {"name": "comp", "namespace": "demo"},
            "status": {
                "managed": [
                    {"apiVersion": "v1", "resource": "configmaps", "name": "a", "namespace": "demo"},
                    {"apiVersion": "v1", "resource": "namespaces", "name": "demo"}
                ]
            }
        }))
        .unwrap();

        let managed = obj.managed_resources().unwrap();
        assert_eq!(managed.len(), 2);
        assert_eq!(managed[0].name, "a");
        assert!(managed[1].is_cluster_scoped());
    }

    #[test]
    fn test_missing_managed_list_is_malformed() {
        let obj = ClusterObject::from_value(json!({
            "metadata": {"name": "comp"},
            "status": {}
        }))
        .unwrap();
        assert!(matches!(
            obj.managed_resources(),
            Err(TreeError::MalformedComposition(_))
        ));
    }

    #[test]
    fn test_non_list_managed_is_malformed() {
        let obj = ClusterObject::from_value(json!({
            "metadata": {"name": "comp"},
            "status": {"managed": {"apiVersion": "v1"}}
        }))
        .unwrap();
        assert!(matches!(
            obj.managed_resources(),
            Err(TreeError::MalformedComposition(_))
        ));
    }

    #[test]
    fn test_bad_managed_entry_is_malformed() {
        let obj = ClusterObject::from_value(json!({
            "metadata": {"name": "comp"},
            "status": {"managed": [{"apiVersion": "v1", "resource": "configmaps"}]}
        }))
        .unwrap();
        assert!(matches!(
            obj.managed_resources(),
            Err(TreeError::MalformedComposition(_))
        ));
    }
}
