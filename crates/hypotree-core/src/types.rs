//! Core types for hypotree
//!
//! A tree document owns every node it contains. Nodes reference their parent
//! by id only; the parent is fixed at creation, so the graph stays a tree
//! without any cycle check on the write path.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Longest tree id accepted from the outside.
pub const MAX_TREE_ID_LEN: usize = 128;

/// Synthesis summary for a node with nothing resolved underneath it.
pub const INSUFFICIENT_EVIDENCE: &str = "insufficient evidence";

/// Synthesis summary for a node whose resolved children all speak against it.
pub const REFUTED: &str = "refuted";

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Tree identifier - cheaply cloneable
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct TreeId(Arc<str>);

impl TreeId {
    /// Fresh random id (UUID v4).
    pub fn generate() -> Self {
        Self(Arc::from(uuid::Uuid::new_v4().to_string()))
    }

    /// Accept an externally supplied id. Ids outside `[A-Za-z0-9_-]{1,128}`
    /// can never name a stored tree, so they resolve to `TreeNotFound`.
    pub fn parse(s: &str) -> Result<Self> {
        let valid = !s.is_empty()
            && s.len() <= MAX_TREE_ID_LEN
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(Arc::from(s)))
        } else {
            Err(Error::TreeNotFound(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TreeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TreeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TreeId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Node identifier, unique within its tree and never reused.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn from_seq(seq: u64) -> Self {
        Self(format!("n{}", seq))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Sequence number of an allocated `n{seq}` id.
    pub fn seq(&self) -> Option<u64> {
        self.0.strip_prefix('n')?.parse().ok()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Node type / status
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Root,
    Hypothesis,
    Verification,
    Leaf,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Hypothesis => "hypothesis",
            Self::Verification => "verification",
            Self::Leaf => "leaf",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "root" => Ok(Self::Root),
            "hypothesis" => Ok(Self::Hypothesis),
            "verification" => Ok(Self::Verification),
            "leaf" => Ok(Self::Leaf),
            other => Err(Error::invalid_input(format!("unknown node type: {:?}", other))),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    InProgress,
    Completed,
    Rejected,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    /// Completed and rejected nodes accept no further transitions or children.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Completed | Self::Rejected => true,
            Self::Pending | Self::InProgress => false,
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Verdict recorded on a resolved node.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NodeResult {
    pub confirmed: bool,
    pub evidence: String,
}

/// Opaque evidence payload. The core stores it and never reads it.
pub type Context = BTreeMap<String, serde_json::Value>;

/// Check a caller-supplied confidence. NaN is out of range too.
pub fn check_confidence(confidence: f64) -> Result<f64> {
    if confidence.is_finite() && (0.0..=1.0).contains(&confidence) {
        Ok(confidence)
    } else {
        Err(Error::ConfidenceOutOfRange(confidence))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub status: NodeStatus,
    pub description: String,
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub children: Vec<NodeId>,
    #[serde(default)]
    pub context: Context,
    pub result: Option<NodeResult>,
    pub confidence: Option<f64>,
    pub synthesis: Option<Synthesis>,
}

impl Node {
    pub fn new(
        id: NodeId,
        node_type: NodeType,
        description: impl Into<String>,
        parent_id: Option<NodeId>,
        context: Context,
    ) -> Self {
        Self {
            id,
            node_type,
            status: NodeStatus::Pending,
            description: description.into(),
            parent_id,
            children: Vec::new(),
            context,
            result: None,
            confidence: None,
            synthesis: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Confidence as seen by readers: rejected nodes always count as 0,
    /// unresolved nodes have none.
    pub fn effective_confidence(&self) -> Option<f64> {
        match self.status {
            NodeStatus::Rejected => Some(0.0),
            NodeStatus::Completed => self.confidence,
            NodeStatus::Pending | NodeStatus::InProgress => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Synthesis
// ---------------------------------------------------------------------------

/// One ranked child in a synthesis.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CauseEntry {
    pub node_id: NodeId,
    pub description: String,
    pub confidence: f64,
    /// Evidence of the representative resolved node under this child.
    pub evidence: Option<String>,
}

/// Derived explanation stored on a non-leaf node by aggregation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Synthesis {
    pub summary: String,
    pub primary_cause: Option<CauseEntry>,
    #[serde(default)]
    pub secondary_factors: Vec<CauseEntry>,
    pub omitted_count: usize,
    #[serde(default)]
    pub pending_count: usize,
    pub confidence: f64,
    pub provisional: bool,
    #[serde(default)]
    pub refuted: bool,
}

impl Synthesis {
    /// Nothing resolved underneath: no cause can be named yet.
    pub fn insufficient_evidence(pending_count: usize) -> Self {
        Self {
            summary: INSUFFICIENT_EVIDENCE.to_string(),
            primary_cause: None,
            secondary_factors: Vec::new(),
            omitted_count: pending_count,
            pending_count,
            confidence: 0.0,
            provisional: true,
            refuted: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// Persisted tree document. One per tree id.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Tree {
    pub id: TreeId,
    pub task_description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub root_id: NodeId,
    pub revision: u64,
    /// Next node sequence number; ids below it are spent forever.
    pub next_seq: u64,
    pub nodes: BTreeMap<NodeId, Node>,
}

impl Tree {
    /// New tree with a pending root node carrying the task description.
    pub fn new(id: TreeId, task_description: impl Into<String>) -> Self {
        let task_description = task_description.into();
        let now = Utc::now();
        let root_id = NodeId::from_seq(0);
        let root = Node::new(
            root_id.clone(),
            NodeType::Root,
            task_description.clone(),
            None,
            Context::new(),
        );
        let mut nodes = BTreeMap::new();
        nodes.insert(root_id.clone(), root);
        Self {
            id,
            task_description,
            created_at: now,
            updated_at: now,
            root_id,
            revision: 1,
            next_seq: 1,
            nodes,
        }
    }

    pub fn root(&self) -> Option<&Node> {
        self.nodes.get(&self.root_id)
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn allocate_node_id(&mut self) -> NodeId {
        let id = NodeId::from_seq(self.next_seq);
        self.next_seq += 1;
        id
    }

    /// Record a mutation: bump the revision and the update timestamp.
    pub fn touch(&mut self) {
        self.revision += 1;
        self.updated_at = Utc::now();
    }

    /// Node ids reachable from the root, children before parents, siblings in
    /// creation order. Dangling child ids are skipped.
    pub fn post_order(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut seen = HashSet::new();
        let mut stack = vec![(self.root_id.clone(), false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                out.push(id);
                continue;
            }
            if !seen.insert(id.clone()) {
                continue;
            }
            let Some(node) = self.nodes.get(&id) else { continue };
            stack.push((id, true));
            for child in node.children.iter().rev() {
                stack.push((child.clone(), false));
            }
        }
        out
    }

    /// Reachable node ids with their depth, parents before children.
    pub fn pre_order(&self) -> Vec<(NodeId, usize)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut seen = HashSet::new();
        let mut stack = vec![(self.root_id.clone(), 0usize)];
        while let Some((id, depth)) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            let Some(node) = self.nodes.get(&id) else { continue };
            for child in node.children.iter().rev() {
                stack.push((child.clone(), depth + 1));
            }
            out.push((id, depth));
        }
        out
    }

    /// Read-only progress projection.
    pub fn status(&self) -> TreeStatus {
        let mut counts = StatusCounts::default();
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for (id, depth) in self.pre_order() {
            let Some(node) = self.nodes.get(&id) else { continue };
            match node.status {
                NodeStatus::Pending => counts.pending += 1,
                NodeStatus::InProgress => counts.in_progress += 1,
                NodeStatus::Completed => counts.completed += 1,
                NodeStatus::Rejected => counts.rejected += 1,
            }
            nodes.push(NodeStatusEntry {
                id: node.id.clone(),
                node_type: node.node_type,
                status: node.status,
                description: node.description.clone(),
                parent_id: node.parent_id.clone(),
                depth,
                confidence: node.effective_confidence(),
                synthesis_confidence: node.synthesis.as_ref().map(|s| s.confidence),
            });
        }
        TreeStatus {
            tree_id: self.id.clone(),
            task_description: self.task_description.clone(),
            root_id: self.root_id.clone(),
            revision: self.revision,
            created_at: self.created_at,
            updated_at: self.updated_at,
            counts,
            nodes,
        }
    }

    /// Check every structural and per-node invariant. Used when loading
    /// documents and by tests after mutation sequences.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.is_empty() {
            return Err("no nodes".to_string());
        }
        let root = self
            .nodes
            .get(&self.root_id)
            .ok_or_else(|| format!("root {} missing", self.root_id))?;
        if root.parent_id.is_some() {
            return Err(format!("root {} has a parent", self.root_id));
        }
        if root.node_type != NodeType::Root {
            return Err(format!("root {} has type {}", self.root_id, root.node_type));
        }

        let parentless = self.nodes.values().filter(|n| n.parent_id.is_none()).count();
        if parentless != 1 {
            return Err(format!("{} parentless nodes", parentless));
        }

        for (key, node) in &self.nodes {
            if key != &node.id {
                return Err(format!("node keyed {} carries id {}", key, node.id));
            }
            if let Some(seq) = node.id.seq() {
                if seq >= self.next_seq {
                    return Err(format!(
                        "{}: allocated past next_seq {}",
                        node.id, self.next_seq
                    ));
                }
            }
            if let Some(parent_id) = &node.parent_id {
                let parent = self
                    .nodes
                    .get(parent_id)
                    .ok_or_else(|| format!("{}: parent {} missing", node.id, parent_id))?;
                if !parent.children.contains(&node.id) {
                    return Err(format!("{}: not listed under parent {}", node.id, parent_id));
                }
            }
            let mut seen = HashSet::new();
            for child_id in &node.children {
                if !seen.insert(child_id) {
                    return Err(format!("{}: duplicate child {}", node.id, child_id));
                }
                let child = self
                    .nodes
                    .get(child_id)
                    .ok_or_else(|| format!("{}: child {} missing", node.id, child_id))?;
                if child.parent_id.as_ref() != Some(&node.id) {
                    return Err(format!("{}: child {} points elsewhere", node.id, child_id));
                }
            }
            if let Some(c) = node.confidence {
                if check_confidence(c).is_err() {
                    return Err(format!("{}: confidence {} out of range", node.id, c));
                }
            }
            match node.status {
                NodeStatus::Completed => {
                    if node.result.is_none() || node.confidence.is_none() {
                        return Err(format!("{}: completed without result", node.id));
                    }
                }
                NodeStatus::Rejected => {
                    if node.result.is_none() {
                        return Err(format!("{}: rejected without reason", node.id));
                    }
                }
                NodeStatus::Pending | NodeStatus::InProgress => {
                    if node.result.is_some() || node.confidence.is_some() {
                        return Err(format!("{}: unresolved node carries a result", node.id));
                    }
                }
            }
            if node.synthesis.is_some() && node.children.is_empty() {
                return Err(format!("{}: leaf carries a synthesis", node.id));
            }
        }

        let reachable = self.post_order().len();
        if reachable != self.nodes.len() {
            return Err(format!(
                "{} of {} nodes reachable from root",
                reachable,
                self.nodes.len()
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Status projection
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub rejected: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NodeStatusEntry {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub status: NodeStatus,
    pub description: String,
    pub parent_id: Option<NodeId>,
    pub depth: usize,
    pub confidence: Option<f64>,
    pub synthesis_confidence: Option<f64>,
}

/// Snapshot of a tree as of one revision.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TreeStatus {
    pub tree_id: TreeId,
    pub task_description: String,
    pub root_id: NodeId,
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub counts: StatusCounts,
    pub nodes: Vec<NodeStatusEntry>,
}
