use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// An opaque handle to a node in the hierarchical store.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef(pub Uuid);

impl NodeRef {
    pub fn new() -> Self {
        NodeRef(Uuid::new_v4())
    }
}

impl Default for NodeRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node://{}", self.0)
    }
}

#[derive(Error, Debug)]
pub enum NodeRefParseError {
    #[error("Node reference must start with node://")]
    MissingScheme,
    #[error("Invalid node id: {0}")]
    InvalidId(#[from] uuid::Error),
}

impl FromStr for NodeRef {
    type Err = NodeRefParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s
            .strip_prefix("node://")
            .ok_or(NodeRefParseError::MissingScheme)?;
        Ok(NodeRef(Uuid::parse_str(id)?))
    }
}

/// A namespaced identifier for node types, aspects and properties, written
/// `{namespace}local-name`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QName {
    namespace: String,
    local_name: String,
}

impl QName {
    pub fn new(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        QName {
            namespace: namespace.into(),
            local_name: local_name.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.local_name)
    }
}

#[derive(Error, Debug)]
pub enum QNameParseError {
    #[error("Qualified name must be written {{namespace}}local-name, got: {0}")]
    Malformed(String),
}

impl FromStr for QName {
    type Err = QNameParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix('{')
            .ok_or_else(|| QNameParseError::Malformed(s.to_string()))?;
        let (namespace, local_name) = rest
            .split_once('}')
            .ok_or_else(|| QNameParseError::Malformed(s.to_string()))?;
        if local_name.is_empty() {
            return Err(QNameParseError::Malformed(s.to_string()));
        }
        Ok(QName::new(namespace, local_name))
    }
}

/// A property value stored against a node. The cleaner only reads names and
/// archive timestamps, so the model stays deliberately small.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl PropertyValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            PropertyValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

/// Well-known model names shared between the store and the cleaner.
pub mod model {
    use super::QName;

    pub const SYSTEM_MODEL_URI: &str = "urn:trashcan:model:system:1.0";
    pub const CONTENT_MODEL_URI: &str = "urn:trashcan:model:content:1.0";
    pub const SITE_MODEL_URI: &str = "urn:trashcan:model:site:1.0";

    /// Marker aspect applied to soft-deleted items when they enter the archive.
    pub fn aspect_archived() -> QName {
        QName::new(SYSTEM_MODEL_URI, "archived")
    }

    /// Timestamp of archival; set alongside the archived aspect.
    pub fn prop_archived_date() -> QName {
        QName::new(SYSTEM_MODEL_URI, "archivedDate")
    }

    pub fn prop_name() -> QName {
        QName::new(CONTENT_MODEL_URI, "name")
    }

    pub fn type_folder() -> QName {
        QName::new(CONTENT_MODEL_URI, "folder")
    }

    pub fn type_content() -> QName {
        QName::new(CONTENT_MODEL_URI, "content")
    }

    /// The site container type. Protected by default regardless of caller
    /// configuration; see the cleaner's config loading.
    pub fn type_site() -> QName {
        QName::new(SITE_MODEL_URI, "site")
    }
}
