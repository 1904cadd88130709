//! Object store boundary
//!
//! The reconciliation engine never touches pack files or compression; it
//! asks a collaborator for tree listings and blob bytes by content id.
//! [`MemoryDatabase`] is the bundled implementation for embedders that
//! materialize objects out of band, and for tests.

use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::Tree;
use bytes::Bytes;
use std::collections::HashMap;

/// Tree and blob provider
///
/// `Ok(None)` means the id resolves to nothing; errors are reserved for the
/// store itself failing.
pub trait ObjectStore {
    /// Load the tree listing behind a content id
    fn tree(&self, oid: &ObjectId) -> anyhow::Result<Option<Tree>>;

    /// Load the blob bytes behind a content id
    fn blob(&self, oid: &ObjectId) -> anyhow::Result<Option<Bytes>>;

    /// Whether a blob can be resolved, without keeping its bytes
    fn contains_blob(&self, oid: &ObjectId) -> anyhow::Result<bool> {
        Ok(self.blob(oid)?.is_some())
    }
}

/// In-memory object store
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    trees: HashMap<ObjectId, Tree>,
    blobs: HashMap<ObjectId, Bytes>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_tree(&mut self, oid: ObjectId, tree: Tree) {
        self.trees.insert(oid, tree);
    }

    pub fn insert_blob(&mut self, oid: ObjectId, content: impl Into<Bytes>) {
        self.blobs.insert(oid, content.into());
    }
}

impl ObjectStore for MemoryDatabase {
    fn tree(&self, oid: &ObjectId) -> anyhow::Result<Option<Tree>> {
        Ok(self.trees.get(oid).cloned())
    }

    fn blob(&self, oid: &ObjectId) -> anyhow::Result<Option<Bytes>> {
        Ok(self.blobs.get(oid).cloned())
    }

    fn contains_blob(&self, oid: &ObjectId) -> anyhow::Result<bool> {
        Ok(self.blobs.contains_key(oid))
    }
}
