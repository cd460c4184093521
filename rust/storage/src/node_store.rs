use crate::types::{NodeRef, PropertyValue, QName};
use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;
use trashcan_error::{ErrorCodes, TrashcanError};

#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeRef),
    #[error("Transient storage conflict: {0}")]
    TransientConflict(String),
    #[error("Storage failure: {0}")]
    Internal(String),
}

impl StorageError {
    /// Transient errors are safe to retry in a fresh transaction; everything
    /// else must propagate to the caller unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::TransientConflict(_))
    }
}

impl TrashcanError for StorageError {
    fn code(&self) -> ErrorCodes {
        match self {
            StorageError::NodeNotFound(_) => ErrorCodes::NotFound,
            StorageError::TransientConflict(_) => ErrorCodes::Aborted,
            StorageError::Internal(_) => ErrorCodes::Internal,
        }
    }
}

/// The hierarchical storage engine, as consumed by the cleaner. The engine
/// owns all node state; the cleaner only reads and issues deletes.
///
/// Read operations on a node that does not exist fail with
/// [`StorageError::NodeNotFound`]. `delete_node` on a missing node succeeds:
/// a node deleted concurrently by another actor is already the outcome the
/// caller wanted.
#[async_trait]
pub trait NodeStore: Send + Sync + Debug {
    async fn exists(&self, node: &NodeRef) -> Result<bool, StorageError>;

    async fn node_type(&self, node: &NodeRef) -> Result<QName, StorageError>;

    async fn has_aspect(&self, node: &NodeRef, aspect: &QName) -> Result<bool, StorageError>;

    async fn get_property(
        &self,
        node: &NodeRef,
        name: &QName,
    ) -> Result<Option<PropertyValue>, StorageError>;

    /// Child nodes in their natural enumeration order.
    async fn get_children(&self, node: &NodeRef) -> Result<Vec<NodeRef>, StorageError>;

    async fn delete_node(&self, node: &NodeRef) -> Result<(), StorageError>;

    /// The top-level container holding all archived items awaiting purge.
    async fn archive_root(&self) -> Result<NodeRef, StorageError>;
}

/// The type hierarchy service: transitive subtype checks for qualified type
/// names. Provided by the store's metadata layer, consumed by the
/// protection policy.
pub trait TypeDictionary: Send + Sync + Debug {
    fn is_subclass(&self, ty: &QName, of: &QName) -> bool;
}
