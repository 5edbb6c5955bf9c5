//! Resource references and API version parsing

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a cluster resource by API version, plural resource name, name and namespace.
///
/// An empty namespace means the resource is cluster-scoped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReference {
    pub api_version: String,
    pub resource: String,
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

impl ResourceReference {
    pub fn new(
        api_version: impl Into<String>,
        resource: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            resource: resource.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Split the apiVersion into group and version
    pub fn group_version(&self) -> Result<GroupVersion, ReferenceParseError> {
        GroupVersion::parse(&self.api_version)
    }

    /// Group, version and plural needed to address this resource on the API server
    pub fn group_version_resource(&self) -> Result<GroupVersionResource, ReferenceParseError> {
        let gv = self.group_version()?;
        if self.resource.is_empty() {
            return Err(ReferenceParseError {
                api_version: self.api_version.clone(),
                reason: format!("reference '{}' has no resource kind", self.name),
            });
        }
        Ok(GroupVersionResource {
            group: gv.group,
            version: gv.version,
            resource: self.resource.clone(),
        })
    }

    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace.is_empty()
    }
}

impl fmt::Display for ResourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{} {}", self.api_version, self.resource, self.name)
        } else {
            write!(
                f,
                "{}/{} {}/{}",
                self.api_version, self.resource, self.namespace, self.name
            )
        }
    }
}

/// An apiVersion that could not be split into group and version
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid apiVersion '{api_version}': {reason}")]
pub struct ReferenceParseError {
    pub api_version: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupVersion {
    /// Empty for the core group
    pub group: String,
    pub version: String,
}

impl GroupVersion {
    /// Parse `group/version` or a bare core `version`
    pub fn parse(api_version: &str) -> Result<Self, ReferenceParseError> {
        let err = |reason: &str| ReferenceParseError {
            api_version: api_version.to_string(),
            reason: reason.to_string(),
        };

        if api_version.trim().is_empty() {
            return Err(err("apiVersion is empty"));
        }

        let mut parts = api_version.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(version), None, None) => Ok(Self {
                group: String::new(),
                version: version.to_string(),
            }),
            (Some(group), Some(version), None) => {
                if group.is_empty() || version.is_empty() {
                    return Err(err("group and version must both be set"));
                }
                Ok(Self {
                    group: group.to_string(),
                    version: version.to_string(),
                })
            }
            _ => Err(err("expected at most one '/'")),
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupVersionResource {
    pub group: String,
    pub version: String,
    /// Plural resource name, e.g. `configmaps`
    pub resource: String,
}

impl GroupVersionResource {
    pub fn api_version(&self) -> String {
        GroupVersion {
            group: self.group.clone(),
            version: self.version.clone(),
        }
        .api_version()
    }
}

impl fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.resource)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.resource)
        }
    }
}
