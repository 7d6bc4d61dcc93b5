//! Tree manager - the mutation API over hypothesis trees
//!
//! Every operation on a tree runs inside that tree's exclusive section:
//! lock, mutate a working copy, persist, publish, unlock. A failed check or
//! a failed save drops the working copy, so callers never observe partial
//! state. Trees are independent; nothing here locks two trees at once.

use crate::aggregate::{aggregate, AggregationPolicy};
use dashmap::DashMap;
use hypotree_core::{
    check_confidence, Context, Error, Node, NodeId, NodeResult, NodeStatus, NodeType, Result,
    Synthesis, Tree, TreeId, TreeStatus,
};
use hypotree_store::TreeStore;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Cached tree for one id. `None` until first loaded from the store.
type Slot = Arc<Mutex<Option<Tree>>>;

/// Loaded trees kept when no cache limit is given.
const DEFAULT_CACHE_LIMIT: usize = 256;

pub struct TreeManager {
    store: Arc<dyn TreeStore>,
    policy: AggregationPolicy,
    trees: DashMap<TreeId, Slot>,
    cache_limit: usize,
}

impl TreeManager {
    pub fn new(store: Arc<dyn TreeStore>) -> Self {
        Self::with_policy(store, AggregationPolicy::default())
    }

    pub fn with_policy(store: Arc<dyn TreeStore>, policy: AggregationPolicy) -> Self {
        Self {
            store,
            policy,
            trees: DashMap::new(),
            cache_limit: DEFAULT_CACHE_LIMIT,
        }
    }

    /// Keep at most `limit` idle trees in memory (at least one).
    pub fn with_cache_limit(mut self, limit: usize) -> Self {
        self.cache_limit = limit.max(1);
        self
    }

    /// Number of trees currently held in memory.
    pub fn cached(&self) -> usize {
        self.trees.len()
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Allocate a new tree with a pending root node.
    pub async fn create_tree(&self, task_description: &str) -> Result<TreeId> {
        let description = required_text("task description", task_description)?;
        let id = TreeId::generate();
        let tree = Tree::new(id.clone(), description);
        self.store.save(&tree).await?;
        self.trees
            .insert(id.clone(), Arc::new(Mutex::new(Some(tree))));
        self.trim_cache();
        info!("Tree {} created: {}", id, truncate(description, 80));
        Ok(id)
    }

    /// Attach a new pending node under a non-terminal parent.
    pub async fn add_child(
        &self,
        tree_id: &str,
        parent_id: &str,
        description: &str,
        node_type: NodeType,
        context: Context,
    ) -> Result<NodeId> {
        let description = required_text("description", description)?.to_string();
        if node_type == NodeType::Root {
            return Err(Error::invalid_input("a tree has exactly one root node"));
        }
        check_context(&context)?;
        let parent_id = NodeId::from(parent_id);

        let id = self
            .mutate(tree_id, move |tree| {
                let parent = existing(tree, &parent_id)?;
                if parent.is_terminal() {
                    return Err(Error::invalid_transition(
                        parent_id.as_str(),
                        parent.status,
                        "add a child to",
                    ));
                }
                let id = tree.allocate_node_id();
                if tree.nodes.contains_key(&id) {
                    return Err(Error::Persistence(format!(
                        "tree {}: node id {} already in use, sequence counter is stale",
                        tree.id, id
                    )));
                }
                let node = Node::new(id.clone(), node_type, description, Some(parent_id.clone()), context);
                tree.nodes.insert(id.clone(), node);
                if let Some(parent) = tree.node_mut(&parent_id) {
                    parent.children.push(id.clone());
                }
                tree.touch();
                Ok(id)
            })
            .await?;
        info!("Tree {}: added {} node {}", tree_id, node_type, id);
        Ok(id)
    }

    /// Move a pending node to in_progress.
    pub async fn start_node(&self, tree_id: &str, node_id: &str) -> Result<()> {
        let node_id = NodeId::from(node_id);
        self.mutate(tree_id, |tree| {
            let node = existing_mut(tree, &node_id)?;
            match node.status {
                NodeStatus::Pending => node.status = NodeStatus::InProgress,
                NodeStatus::InProgress | NodeStatus::Completed | NodeStatus::Rejected => {
                    return Err(Error::invalid_transition(node_id.as_str(), node.status, "start"))
                }
            }
            tree.touch();
            Ok(())
        })
        .await?;
        debug!("Tree {}: node {} in progress", tree_id, node_id);
        Ok(())
    }

    /// Record verified evidence on a node and complete it.
    pub async fn set_node_result(
        &self,
        tree_id: &str,
        node_id: &str,
        confirmed: bool,
        evidence: &str,
        confidence: f64,
    ) -> Result<()> {
        let node_id = NodeId::from(node_id);
        let evidence = evidence.to_string();
        self.mutate(tree_id, |tree| {
            let node = existing_mut(tree, &node_id)?;
            if node.is_terminal() {
                return Err(Error::invalid_transition(node_id.as_str(), node.status, "set a result on"));
            }
            let confidence = check_confidence(confidence)?;
            node.result = Some(NodeResult { confirmed, evidence });
            node.confidence = Some(confidence);
            node.status = NodeStatus::Completed;
            tree.touch();
            Ok(())
        })
        .await?;
        info!(
            "Tree {}: node {} completed (confirmed={}, confidence={})",
            tree_id, node_id, confirmed, confidence
        );
        Ok(())
    }

    /// Cancel or refute a node. Ancestor syntheses stay as they are until
    /// the next aggregation.
    pub async fn reject_node(&self, tree_id: &str, node_id: &str, reason: &str) -> Result<()> {
        let reason = required_text("reason", reason)?.to_string();
        let node_id = NodeId::from(node_id);
        self.mutate(tree_id, |tree| {
            let node = existing_mut(tree, &node_id)?;
            if node.is_terminal() {
                return Err(Error::invalid_transition(node_id.as_str(), node.status, "reject"));
            }
            node.result = Some(NodeResult {
                confirmed: false,
                evidence: reason,
            });
            node.confidence = Some(0.0);
            node.status = NodeStatus::Rejected;
            tree.touch();
            Ok(())
        })
        .await?;
        info!("Tree {}: node {} rejected", tree_id, node_id);
        Ok(())
    }

    /// Recompute every synthesis bottom-up, persist them, return the root's.
    pub async fn aggregate_upward(&self, tree_id: &str) -> Result<Synthesis> {
        let policy = self.policy.clone();
        let (synthesis, revision) = self
            .mutate(tree_id, move |tree| {
                let aggregation = aggregate(tree, &policy);
                if aggregation.apply(tree) {
                    tree.touch();
                }
                Ok((aggregation.root, tree.revision))
            })
            .await?;
        info!(
            "Tree {}: aggregated at rev {} - {} (confidence {}, provisional={})",
            tree_id, revision, synthesis.summary, synthesis.confidence, synthesis.provisional
        );
        Ok(synthesis)
    }

    /// Last stored root synthesis, without recomputing.
    pub async fn get_final_synthesis(&self, tree_id: &str) -> Result<Option<Synthesis>> {
        self.read(tree_id, |tree| tree.root().and_then(|root| root.synthesis.clone()))
            .await
    }

    /// Consistent progress snapshot of the whole tree.
    pub async fn get_status(&self, tree_id: &str) -> Result<TreeStatus> {
        self.read(tree_id, Tree::status).await
    }

    /// Full tree document as of the current revision.
    pub async fn snapshot(&self, tree_id: &str) -> Result<Tree> {
        self.read(tree_id, Tree::clone).await
    }

    /// Every tree the store knows about, including ones not loaded yet.
    pub async fn list_trees(&self) -> Result<Vec<TreeId>> {
        self.store.list().await
    }

    /// Remove a tree document from the store.
    pub async fn delete_tree(&self, tree_id: &str) -> Result<()> {
        let (id, slot) = self.slot(tree_id).await?;
        let mut guard = slot.lock().await;
        if !self.store.delete(&id).await? {
            return Err(Error::TreeNotFound(id.to_string()));
        }
        *guard = None;
        drop(guard);
        self.trees.remove(&id);
        info!("Tree {} deleted", id);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Exclusive section
    // -----------------------------------------------------------------------

    /// Find (or register) the lock slot for a tree that exists.
    async fn slot(&self, tree_id: &str) -> Result<(TreeId, Slot)> {
        let id = TreeId::parse(tree_id)?;
        let cached = self.trees.get(&id).map(|slot| slot.value().clone());
        if let Some(slot) = cached {
            return Ok((id, slot));
        }
        if !self.store.exists(&id).await? {
            return Err(Error::TreeNotFound(id.to_string()));
        }
        let slot = self
            .trees
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .value()
            .clone();
        self.trim_cache();
        Ok((id, slot))
    }

    /// Drop idle slots until the cache is back under its limit. A slot whose
    /// only reference is the map's own is idle: clones are taken under the
    /// shard lock, which `retain` holds while it checks.
    fn trim_cache(&self) {
        let mut excess = self.trees.len().saturating_sub(self.cache_limit);
        if excess == 0 {
            return;
        }
        self.trees.retain(|_, slot| {
            if excess > 0 && Arc::strong_count(slot) == 1 {
                excess -= 1;
                false
            } else {
                true
            }
        });
        debug!("Tree cache trimmed to {} (limit {})", self.trees.len(), self.cache_limit);
    }

    /// Forget a slot that never loaded because its document is gone.
    fn forget_missing(&self, id: &TreeId, slot: Slot) {
        drop(slot);
        let removed = self.trees.remove_if(id, |_, slot| {
            Arc::strong_count(slot) == 1
                && slot.try_lock().map(|tree| tree.is_none()).unwrap_or(false)
        });
        if removed.is_some() {
            debug!("Tree {} no longer in store, dropped from cache", id);
        }
    }

    /// Run `f` on a working copy under the tree's lock. The copy replaces the
    /// cached tree only if `f` succeeds and, when it bumped the revision, the
    /// store accepted it.
    async fn mutate<T, F>(&self, tree_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Tree) -> Result<T> + Send,
        T: Send,
    {
        let (id, slot) = self.slot(tree_id).await?;
        let mut guard = slot.lock().await;
        let current = match loaded(self.store.as_ref(), &id, &mut guard).await {
            Ok(tree) => tree,
            Err(e) => {
                drop(guard);
                if matches!(e, Error::TreeNotFound(_)) {
                    self.forget_missing(&id, slot);
                }
                return Err(e);
            }
        };

        let mut working = current.clone();
        let value = f(&mut working)?;
        if working.revision == current.revision {
            return Ok(value);
        }

        if let Err(e) = self.store.save(&working).await {
            warn!("Tree {}: save of rev {} failed, rolled back: {}", id, working.revision, e);
            return Err(e);
        }
        *guard = Some(working);
        Ok(value)
    }

    async fn read<T, F>(&self, tree_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Tree) -> T + Send,
    {
        let (id, slot) = self.slot(tree_id).await?;
        let mut guard = slot.lock().await;
        match loaded(self.store.as_ref(), &id, &mut guard).await {
            Ok(tree) => Ok(f(tree)),
            Err(e) => {
                drop(guard);
                if matches!(e, Error::TreeNotFound(_)) {
                    self.forget_missing(&id, slot);
                }
                Err(e)
            }
        }
    }
}

async fn loaded<'a>(
    store: &dyn TreeStore,
    id: &TreeId,
    slot: &'a mut Option<Tree>,
) -> Result<&'a Tree> {
    if slot.is_none() {
        let tree = store.load(id).await?;
        debug!("Tree {} loaded at rev {} ({} nodes)", id, tree.revision, tree.len());
        *slot = Some(tree);
    }
    slot.as_ref().ok_or_else(|| Error::TreeNotFound(id.to_string()))
}

fn existing<'a>(tree: &'a Tree, id: &NodeId) -> Result<&'a Node> {
    let tree_id = tree.id.to_string();
    tree.node(id)
        .ok_or_else(|| Error::node_not_found(tree_id, id.as_str()))
}

fn existing_mut<'a>(tree: &'a mut Tree, id: &NodeId) -> Result<&'a mut Node> {
    let tree_id = tree.id.to_string();
    tree.node_mut(id)
        .ok_or_else(|| Error::node_not_found(tree_id, id.as_str()))
}

fn required_text<'a>(what: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(Error::invalid_input(format!("{} must not be empty", what)))
    } else {
        Ok(trimmed)
    }
}

/// Context values are opaque but must be scalars.
fn check_context(context: &Context) -> Result<()> {
    for (key, value) in context {
        if value.is_array() || value.is_object() {
            return Err(Error::invalid_input(format!(
                "context value for {:?} must be a scalar",
                key
            )));
        }
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
