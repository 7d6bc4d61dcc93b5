//! Aggregation engine - bottom-up confidence and synthesis
//!
//! A pure function over a tree snapshot. Nodes are visited children first,
//! siblings in creation order. Every node either contributes a resolved
//! `(confidence, confirmed)` pair to its parent or is excluded; excluded is
//! not the same as zero.
//!
//! Combination is disjunctive: a node with children is as strong as its
//! strongest confirmed child, and the earliest such child wins ties.
//! Aggregation never fails. Missing evidence shows up as a provisional
//! synthesis instead.

use hypotree_core::{
    AggregationConfig, CauseEntry, Node, NodeId, NodeStatus, Synthesis, Tree, REFUTED,
};
use std::collections::{BTreeMap, HashMap};

/// Tuning knobs for synthesis construction.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregationPolicy {
    /// Confirmed children below the primary cause are listed as secondary
    /// factors only at or above this confidence.
    pub secondary_threshold: f64,
}

impl Default for AggregationPolicy {
    fn default() -> Self {
        Self {
            secondary_threshold: 0.3,
        }
    }
}

impl From<&AggregationConfig> for AggregationPolicy {
    fn from(config: &AggregationConfig) -> Self {
        Self {
            secondary_threshold: config.secondary_threshold,
        }
    }
}

/// What a resolved node hands up to its parent.
#[derive(Clone, Debug, PartialEq)]
pub struct Contribution {
    pub confidence: f64,
    pub confirmed: bool,
    /// Evidence of the representative resolved node in this subtree.
    pub evidence: Option<String>,
}

impl Contribution {
    fn against(evidence: Option<String>) -> Self {
        Self {
            confidence: 0.0,
            confirmed: false,
            evidence,
        }
    }
}

/// Output of one aggregation pass.
#[derive(Clone, Debug, PartialEq)]
pub struct Aggregation {
    /// A synthesis for every reachable node that has children.
    pub syntheses: BTreeMap<NodeId, Synthesis>,
    /// The root's synthesis. Provisional when the root has no children.
    pub root: Synthesis,
}

impl Aggregation {
    /// Write the syntheses onto their nodes. Returns `true` if any stored
    /// synthesis changed.
    pub fn apply(&self, tree: &mut Tree) -> bool {
        let mut changed = false;
        for (id, synthesis) in &self.syntheses {
            let Some(node) = tree.node_mut(id) else { continue };
            if node.synthesis.as_ref() != Some(synthesis) {
                node.synthesis = Some(synthesis.clone());
                changed = true;
            }
        }
        changed
    }
}

/// Compute per-node syntheses over the tree, bottom-up.
pub fn aggregate(tree: &Tree, policy: &AggregationPolicy) -> Aggregation {
    let mut contributions: HashMap<NodeId, Option<Contribution>> = HashMap::new();
    let mut syntheses = BTreeMap::new();

    for id in tree.post_order() {
        let Some(node) = tree.node(&id) else { continue };
        let contribution = if node.has_children() {
            let synthesis = synthesize(tree, node, &contributions, policy);
            let contribution = propagate(node, &synthesis);
            syntheses.insert(id.clone(), synthesis);
            contribution
        } else {
            own_verdict(node)
        };
        contributions.insert(id, contribution);
    }

    let root = syntheses
        .get(&tree.root_id)
        .cloned()
        .unwrap_or_else(|| Synthesis::insufficient_evidence(0));
    Aggregation { syntheses, root }
}

/// A node's own recorded verdict, ignoring anything below it.
fn own_verdict(node: &Node) -> Option<Contribution> {
    match node.status {
        NodeStatus::Completed => node.result.as_ref().map(|r| Contribution {
            confidence: node.confidence.unwrap_or(0.0),
            confirmed: r.confirmed,
            evidence: Some(r.evidence.clone()),
        }),
        NodeStatus::Rejected => Some(Contribution::against(
            node.result.as_ref().map(|r| r.evidence.clone()),
        )),
        NodeStatus::Pending | NodeStatus::InProgress => None,
    }
}

/// What a node with children hands up, given its synthesis.
fn propagate(node: &Node, synthesis: &Synthesis) -> Option<Contribution> {
    match node.status {
        // rejection overrides whatever the subtree says
        NodeStatus::Rejected => own_verdict(node),
        NodeStatus::Pending | NodeStatus::InProgress | NodeStatus::Completed => {
            if let Some(primary) = &synthesis.primary_cause {
                Some(Contribution {
                    confidence: synthesis.confidence,
                    confirmed: true,
                    evidence: primary.evidence.clone(),
                })
            } else if synthesis.refuted {
                Some(Contribution::against(None))
            } else {
                own_verdict(node)
            }
        }
    }
}

fn synthesize(
    tree: &Tree,
    node: &Node,
    contributions: &HashMap<NodeId, Option<Contribution>>,
    policy: &AggregationPolicy,
) -> Synthesis {
    let mut pending = 0usize;
    let mut resolved = 0usize;
    let mut confirmed: Vec<(&Node, &Contribution)> = Vec::new();

    for child_id in &node.children {
        match contributions.get(child_id).and_then(|c| c.as_ref()) {
            None => pending += 1,
            Some(c) => {
                resolved += 1;
                if c.confirmed {
                    if let Some(child) = tree.node(child_id) {
                        confirmed.push((child, c));
                    }
                }
            }
        }
    }

    if resolved == 0 {
        return Synthesis::insufficient_evidence(pending);
    }

    // stable sort: equal confidences keep creation order
    confirmed.sort_by(|a, b| b.1.confidence.total_cmp(&a.1.confidence));
    let mut ranked = confirmed.into_iter();

    let Some((top, top_contribution)) = ranked.next() else {
        return Synthesis {
            summary: REFUTED.to_string(),
            primary_cause: None,
            secondary_factors: Vec::new(),
            omitted_count: node.children.len(),
            pending_count: pending,
            confidence: 0.0,
            provisional: false,
            refuted: true,
        };
    };

    let secondary_factors: Vec<CauseEntry> = ranked
        .filter(|(_, c)| c.confidence >= policy.secondary_threshold)
        .map(|(child, c)| cause_entry(child, c))
        .collect();

    Synthesis {
        summary: format!("primary cause: {}", top.description),
        primary_cause: Some(cause_entry(top, top_contribution)),
        omitted_count: node.children.len() - 1 - secondary_factors.len(),
        secondary_factors,
        pending_count: pending,
        confidence: top_contribution.confidence,
        provisional: false,
        refuted: false,
    }
}

fn cause_entry(child: &Node, contribution: &Contribution) -> CauseEntry {
    CauseEntry {
        node_id: child.id.clone(),
        description: child.description.clone(),
        confidence: contribution.confidence,
        evidence: contribution.evidence.clone(),
    }
}
