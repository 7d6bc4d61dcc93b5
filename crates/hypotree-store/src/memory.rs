//! In-process store. Documents are kept serialized so a load goes through
//! the same decode and validation path as the filesystem backend.

use crate::store::{decode, encode, TreeStore};
use dashmap::DashMap;
use hypotree_core::{Error, Result, Tree, TreeId};

#[derive(Default)]
pub struct MemoryStore {
    docs: DashMap<TreeId, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TreeStore for MemoryStore {
    async fn save(&self, tree: &Tree) -> Result<()> {
        let text = encode(tree)?;
        self.docs.insert(tree.id.clone(), text);
        Ok(())
    }

    async fn load(&self, id: &TreeId) -> Result<Tree> {
        let text = self
            .docs
            .get(id)
            .map(|doc| doc.value().clone())
            .ok_or_else(|| Error::TreeNotFound(id.to_string()))?;
        decode(id, &text)
    }

    async fn list(&self) -> Result<Vec<TreeId>> {
        let mut ids: Vec<TreeId> = self.docs.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }

    async fn exists(&self, id: &TreeId) -> Result<bool> {
        Ok(self.docs.contains_key(id))
    }

    async fn delete(&self, id: &TreeId) -> Result<bool> {
        Ok(self.docs.remove(id).is_some())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
