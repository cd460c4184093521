use crate::node_store::{NodeStore, StorageError, TypeDictionary};
use crate::types::{model, NodeRef, PropertyValue, QName};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct NodeRecord {
    node_type: QName,
    aspects: HashSet<QName>,
    properties: HashMap<QName, PropertyValue>,
    children: Vec<NodeRef>,
    parent: Option<NodeRef>,
}

#[derive(Debug, Default)]
struct Faults {
    /// Number of upcoming delete calls that fail with a transient conflict.
    transient_delete_failures: usize,
}

#[derive(Debug)]
struct Inner {
    nodes: HashMap<NodeRef, NodeRecord>,
    archive_root: NodeRef,
    faults: Faults,
    /// Every trait call increments this; tests assert on it to prove a
    /// code path performed no storage work at all.
    op_count: u64,
}

/// In-memory node store. Clones share state (`Arc<Mutex<Inner>>`), so a
/// handle can be given to the cleaner while a test keeps another to inspect
/// the tree.
#[derive(Debug, Clone)]
pub struct MemoryNodeStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryNodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        let archive_root = NodeRef::new();
        let mut nodes = HashMap::new();
        nodes.insert(
            archive_root,
            NodeRecord {
                node_type: model::type_folder(),
                aspects: HashSet::new(),
                properties: HashMap::new(),
                children: Vec::new(),
                parent: None,
            },
        );
        MemoryNodeStore {
            inner: Arc::new(Mutex::new(Inner {
                nodes,
                archive_root,
                faults: Faults::default(),
                op_count: 0,
            })),
        }
    }

    pub fn root(&self) -> NodeRef {
        self.inner.lock().archive_root
    }

    /// Create a node under `parent`. Mutation entrypoint for tests and
    /// seeding tools; the cleaner itself never creates nodes.
    pub fn create_node(&self, parent: NodeRef, node_type: QName) -> NodeRef {
        let node = NodeRef::new();
        let mut inner = self.inner.lock();
        inner.nodes.insert(
            node,
            NodeRecord {
                node_type,
                aspects: HashSet::new(),
                properties: HashMap::new(),
                children: Vec::new(),
                parent: Some(parent),
            },
        );
        if let Some(parent_record) = inner.nodes.get_mut(&parent) {
            parent_record.children.push(node);
        }
        node
    }

    /// Create a direct child of the archive root carrying the archived
    /// aspect and an archive timestamp, i.e. a well-formed candidate.
    pub fn create_archived_candidate(
        &self,
        node_type: QName,
        archived_at: DateTime<Utc>,
    ) -> NodeRef {
        let root = self.root();
        let node = self.create_node(root, node_type);
        self.add_aspect(node, model::aspect_archived());
        self.set_property(
            node,
            model::prop_archived_date(),
            PropertyValue::Timestamp(archived_at),
        );
        node
    }

    pub fn add_aspect(&self, node: NodeRef, aspect: QName) {
        let mut inner = self.inner.lock();
        if let Some(record) = inner.nodes.get_mut(&node) {
            record.aspects.insert(aspect);
        }
    }

    pub fn set_property(&self, node: NodeRef, name: QName, value: PropertyValue) {
        let mut inner = self.inner.lock();
        if let Some(record) = inner.nodes.get_mut(&node) {
            record.properties.insert(name, value);
        }
    }

    /// Make the next `count` delete calls fail with a transient conflict,
    /// as an optimistic-concurrency violation would.
    pub fn inject_transient_delete_failures(&self, count: usize) {
        self.inner.lock().faults.transient_delete_failures = count;
    }

    pub fn node_count(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    pub fn op_count(&self) -> u64 {
        self.inner.lock().op_count
    }

    fn record<'a>(
        inner: &'a Inner,
        node: &NodeRef,
    ) -> Result<&'a NodeRecord, StorageError> {
        inner
            .nodes
            .get(node)
            .ok_or(StorageError::NodeNotFound(*node))
    }

    fn remove_subtree(inner: &mut Inner, node: NodeRef) {
        if let Some(record) = inner.nodes.remove(&node) {
            if let Some(parent) = record.parent {
                if let Some(parent_record) = inner.nodes.get_mut(&parent) {
                    parent_record.children.retain(|child| *child != node);
                }
            }
            for child in record.children {
                Self::remove_subtree(inner, child);
            }
        }
    }
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    async fn exists(&self, node: &NodeRef) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock();
        inner.op_count += 1;
        Ok(inner.nodes.contains_key(node))
    }

    async fn node_type(&self, node: &NodeRef) -> Result<QName, StorageError> {
        let mut inner = self.inner.lock();
        inner.op_count += 1;
        Ok(Self::record(&inner, node)?.node_type.clone())
    }

    async fn has_aspect(&self, node: &NodeRef, aspect: &QName) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock();
        inner.op_count += 1;
        Ok(Self::record(&inner, node)?.aspects.contains(aspect))
    }

    async fn get_property(
        &self,
        node: &NodeRef,
        name: &QName,
    ) -> Result<Option<PropertyValue>, StorageError> {
        let mut inner = self.inner.lock();
        inner.op_count += 1;
        Ok(Self::record(&inner, node)?.properties.get(name).cloned())
    }

    async fn get_children(&self, node: &NodeRef) -> Result<Vec<NodeRef>, StorageError> {
        let mut inner = self.inner.lock();
        inner.op_count += 1;
        Ok(Self::record(&inner, node)?.children.clone())
    }

    async fn delete_node(&self, node: &NodeRef) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        inner.op_count += 1;
        if inner.faults.transient_delete_failures > 0 {
            inner.faults.transient_delete_failures -= 1;
            return Err(StorageError::TransientConflict(format!(
                "concurrent update while deleting {}",
                node
            )));
        }
        // Deleting a node that is already gone is a success; another actor
        // got there first.
        Self::remove_subtree(&mut inner, *node);
        Ok(())
    }

    async fn archive_root(&self) -> Result<NodeRef, StorageError> {
        let mut inner = self.inner.lock();
        inner.op_count += 1;
        Ok(inner.archive_root)
    }
}

/// In-memory type hierarchy: a parent map walked transitively.
#[derive(Debug, Clone, Default)]
pub struct MemoryTypeDictionary {
    parents: Arc<Mutex<HashMap<QName, QName>>>,
}

impl MemoryTypeDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_subtype(&self, child: QName, parent: QName) {
        self.parents.lock().insert(child, parent);
    }
}

impl TypeDictionary for MemoryTypeDictionary {
    fn is_subclass(&self, ty: &QName, of: &QName) -> bool {
        let parents = self.parents.lock();
        let mut current = ty.clone();
        while let Some(parent) = parents.get(&current) {
            if parent == of {
                return true;
            }
            current = parent.clone();
        }
        false
    }
}
