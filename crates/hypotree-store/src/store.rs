//! Store abstraction - pluggable backend for tree documents.
//!
//! The engine reads and writes whole trees by id. The backend decides where
//! they live. Today: local filesystem or process memory.

use crate::{LocalFsStore, MemoryStore};
use hypotree_core::{Error, Result, StoreBackend, StoreConfig, Tree, TreeId};
use std::sync::Arc;

/// Pluggable tree store. `save` must be atomic from a reader's point of view.
#[async_trait::async_trait]
pub trait TreeStore: Send + Sync {
    /// Write the whole tree document, replacing any previous version.
    async fn save(&self, tree: &Tree) -> Result<()>;

    /// Read a tree back. Fails with `TreeNotFound` if the id is unknown.
    async fn load(&self, id: &TreeId) -> Result<Tree>;

    /// All stored tree ids, sorted.
    async fn list(&self) -> Result<Vec<TreeId>>;

    async fn exists(&self, id: &TreeId) -> Result<bool>;

    /// Remove a tree document. Returns `false` if there was nothing to remove.
    async fn delete(&self, id: &TreeId) -> Result<bool>;

    /// Physical location (for human inspection).
    fn location(&self) -> String;
}

/// Build the backend named in the config.
pub fn open_store(config: &StoreConfig) -> Arc<dyn TreeStore> {
    match config.backend {
        StoreBackend::Fs => Arc::new(LocalFsStore::new(&config.path)),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    }
}

/// Parse a stored document and make sure it is the tree that was asked for
/// and still satisfies the tree invariants.
pub(crate) fn decode(id: &TreeId, text: &str) -> Result<Tree> {
    let tree: Tree = serde_json::from_str(text)?;
    if &tree.id != id {
        return Err(Error::Persistence(format!(
            "document for {} carries id {}",
            id, tree.id
        )));
    }
    tree.validate()
        .map_err(|e| Error::Persistence(format!("corrupt document {}: {}", id, e)))?;
    Ok(tree)
}

pub(crate) fn encode(tree: &Tree) -> Result<String> {
    Ok(serde_json::to_string_pretty(tree)?)
}
