use std::collections::HashSet;
use std::sync::Arc;
use trashcan_storage::{NodeRef, NodeStore, QName, StorageError, TypeDictionary};

/// Decides which nodes a sweep must never delete: an explicit skip list of
/// node references plus a set of protected types matched exactly or through
/// the type hierarchy.
#[derive(Debug)]
pub struct ProtectionPolicy {
    skip_nodes: HashSet<NodeRef>,
    protected_types: Vec<QName>,
    store: Arc<dyn NodeStore>,
    dictionary: Arc<dyn TypeDictionary>,
}

impl ProtectionPolicy {
    pub fn new(
        skip_nodes: HashSet<NodeRef>,
        protected_types: Vec<QName>,
        store: Arc<dyn NodeStore>,
        dictionary: Arc<dyn TypeDictionary>,
    ) -> Self {
        ProtectionPolicy {
            skip_nodes,
            protected_types,
            store,
            dictionary,
        }
    }

    /// The skip list wins before any type lookup, so a skipped node is
    /// protected even if its record is in a bad state. A vanished node
    /// propagates `NodeNotFound`; the caller decides how conservative to be.
    pub async fn must_protect(&self, node: &NodeRef) -> Result<bool, StorageError> {
        if self.skip_nodes.contains(node) {
            return Ok(true);
        }
        let node_type = self.store.node_type(node).await?;
        for protected in &self.protected_types {
            if node_type == *protected || self.dictionary.is_subclass(&node_type, protected) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trashcan_storage::{model, MemoryNodeStore, MemoryTypeDictionary};

    fn policy_with(
        skip_nodes: HashSet<NodeRef>,
        protected_types: Vec<QName>,
        store: &MemoryNodeStore,
        dictionary: &MemoryTypeDictionary,
    ) -> ProtectionPolicy {
        ProtectionPolicy::new(
            skip_nodes,
            protected_types,
            Arc::new(store.clone()),
            Arc::new(dictionary.clone()),
        )
    }

    #[tokio::test]
    async fn test_skip_list_wins_regardless_of_type() {
        let store = MemoryNodeStore::new();
        let dictionary = MemoryTypeDictionary::new();
        let node = store.create_node(store.root(), model::type_content());
        let policy = policy_with(
            HashSet::from([node]),
            vec![],
            &store,
            &dictionary,
        );
        assert!(policy.must_protect(&node).await.unwrap());
    }

    #[tokio::test]
    async fn test_exact_protected_type() {
        let store = MemoryNodeStore::new();
        let dictionary = MemoryTypeDictionary::new();
        let site = store.create_node(store.root(), model::type_site());
        let content = store.create_node(store.root(), model::type_content());
        let policy = policy_with(HashSet::new(), vec![model::type_site()], &store, &dictionary);
        assert!(policy.must_protect(&site).await.unwrap());
        assert!(!policy.must_protect(&content).await.unwrap());
    }

    #[tokio::test]
    async fn test_transitive_subtype_is_protected() {
        let store = MemoryNodeStore::new();
        let dictionary = MemoryTypeDictionary::new();
        let special = QName::new(model::SITE_MODEL_URI, "special-site");
        dictionary.add_subtype(special.clone(), model::type_site());
        let node = store.create_node(store.root(), special);
        let policy = policy_with(HashSet::new(), vec![model::type_site()], &store, &dictionary);
        assert!(policy.must_protect(&node).await.unwrap());
    }

    #[tokio::test]
    async fn test_vanished_node_propagates() {
        let store = MemoryNodeStore::new();
        let dictionary = MemoryTypeDictionary::new();
        let policy = policy_with(HashSet::new(), vec![model::type_site()], &store, &dictionary);
        let gone = NodeRef::new();
        assert!(matches!(
            policy.must_protect(&gone).await,
            Err(StorageError::NodeNotFound(_))
        ));
    }
}
