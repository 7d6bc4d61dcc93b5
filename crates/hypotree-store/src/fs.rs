//! Local filesystem store - one JSON document per tree.
//!
//! Layout: `<base_dir>/<tree_id>.json`. Writes go to
//! `<tree_id>.json.tmp.<pid>` first and are renamed over the target, so a
//! reader sees either the old document or the new one.

use crate::store::{decode, encode, TreeStore};
use hypotree_core::{Error, Result, Tree, TreeId};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const DOC_SUFFIX: &str = ".json";

pub struct LocalFsStore {
    base_dir: PathBuf,
}

impl LocalFsStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    fn doc_path(&self, id: &TreeId) -> PathBuf {
        self.base_dir.join(format!("{}{}", id, DOC_SUFFIX))
    }

    fn tmp_path(&self, id: &TreeId) -> PathBuf {
        self.base_dir
            .join(format!("{}{}.tmp.{}", id, DOC_SUFFIX, std::process::id()))
    }
}

#[async_trait::async_trait]
impl TreeStore for LocalFsStore {
    async fn save(&self, tree: &Tree) -> Result<()> {
        let text = encode(tree)?;
        tokio::fs::create_dir_all(&self.base_dir).await?;

        let tmp = self.tmp_path(&tree.id);
        let path = self.doc_path(&tree.id);
        let written = match tokio::fs::write(&tmp, text.as_bytes()).await {
            Ok(()) => tokio::fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!("save {} via {} failed: {}", path.display(), tmp.display(), e);
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!("wrote {} (rev {}, {} bytes)", path.display(), tree.revision, text.len());
        Ok(())
    }

    async fn load(&self, id: &TreeId) -> Result<Tree> {
        let path = self.doc_path(id);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::TreeNotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        debug!("read {} ({} bytes)", path.display(), text.len());
        decode(id, &text)
    }

    async fn list(&self) -> Result<Vec<TreeId>> {
        let mut entries = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stem) = name.strip_suffix(DOC_SUFFIX) else { continue };
            if let Ok(id) = TreeId::parse(stem) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn exists(&self, id: &TreeId) -> Result<bool> {
        match tokio::fs::metadata(self.doc_path(id)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: &TreeId) -> Result<bool> {
        match tokio::fs::remove_file(self.doc_path(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn location(&self) -> String {
        self.base_dir.display().to_string()
    }
}
