//! Exclusion rules for managed resources
//!
//! A rule always pins the apiVersion. `resource` and `name` narrow it further
//! when present, so a rule can drop anything from one object up to a whole
//! apiVersion.

use super::reference::ResourceReference;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionRule {
    pub api_version: String,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub resource: Option<String>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
}

impl ExclusionRule {
    /// Exclude every resource with this apiVersion
    pub fn api_version(api_version: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            resource: None,
            name: None,
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn matches(&self, reference: &ResourceReference) -> bool {
        if self.api_version != reference.api_version {
            return false;
        }
        if let Some(resource) = &self.resource {
            if *resource != reference.resource {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if *name != reference.name {
                return false;
            }
        }
        true
    }
}

/// The CRD leaves optional fields as empty strings
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// A set of exclusion rules; a reference is excluded when any rule matches.
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    rules: Vec<ExclusionRule>,
}

impl ExclusionFilter {
    pub fn new(rules: Vec<ExclusionRule>) -> Self {
        Self { rules }
    }

    pub fn excludes(&self, reference: &ResourceReference) -> bool {
        self.rules.iter().any(|rule| rule.matches(reference))
    }

    pub fn rules(&self) -> &[ExclusionRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl From<&[ExclusionRule]> for ExclusionFilter {
    fn from(rules: &[ExclusionRule]) -> Self {
        Self::new(rules.to_vec())
    }
}
