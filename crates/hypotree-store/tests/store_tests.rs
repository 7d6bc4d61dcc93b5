//! Tests for hypotree-store: both backends against the same contract

use hypotree_core::*;
use hypotree_store::*;
use std::sync::Arc;

fn annotated_tree(id: &str) -> Tree {
    let mut tree = Tree::new(TreeId::parse(id).unwrap(), "why did site X lose traffic");
    let root = tree.root_id.clone();
    let h = tree.allocate_node_id();
    tree.nodes.insert(
        h.clone(),
        Node::new(h.clone(), NodeType::Hypothesis, "demand drop", Some(root.clone()), Context::new()),
    );
    tree.node_mut(&root).unwrap().children.push(h.clone());
    tree.node_mut(&root).unwrap().synthesis = Some(Synthesis::insufficient_evidence(1));
    tree.touch();
    tree
}

/// Tree whose numbers need every bit of an f64 to come back unchanged.
fn measured_tree(id: &str) -> Tree {
    let mut tree = annotated_tree(id);
    let h = NodeId::from("n1");
    let leaf = tree.allocate_node_id();
    let mut context = Context::new();
    context.insert("delta_pct".into(), serde_json::json!(-41.37285719320918));
    context.insert("baseline".into(), serde_json::json!(0.1 + 0.2));
    let mut node = Node::new(leaf.clone(), NodeType::Verification, "weekend dip", Some(h.clone()), context);
    node.status = NodeStatus::Completed;
    node.result = Some(NodeResult {
        confirmed: true,
        evidence: "traffic down on all cells".into(),
    });
    node.confidence = Some(0.9556395672092627);
    tree.nodes.insert(leaf.clone(), node);
    tree.node_mut(&h).unwrap().children.push(leaf);
    tree.node_mut(&h).unwrap().synthesis = Some(Synthesis {
        summary: "primary cause: weekend dip".into(),
        primary_cause: Some(CauseEntry {
            node_id: NodeId::from("n2"),
            description: "weekend dip".into(),
            confidence: 0.9556395672092627,
            evidence: None,
        }),
        secondary_factors: Vec::new(),
        omitted_count: 0,
        pending_count: 0,
        confidence: 0.9556395672092627,
        provisional: false,
        refuted: false,
    });
    tree.touch();
    tree
}

async fn contract(store: Arc<dyn TreeStore>) {
    let missing = TreeId::parse("missing").unwrap();
    assert!(matches!(store.load(&missing).await, Err(Error::TreeNotFound(_))));
    assert!(!store.exists(&missing).await.unwrap());
    assert!(store.list().await.unwrap().is_empty());

    let b = annotated_tree("tree-b");
    let a = annotated_tree("tree-a");
    store.save(&b).await.unwrap();
    store.save(&a).await.unwrap();

    // save then load reproduces every field, synthesis included
    let loaded = store.load(&a.id).await.unwrap();
    assert_eq!(loaded, a);
    assert!(loaded.root().unwrap().synthesis.is_some());

    // floats survive bit for bit
    let m = measured_tree("tree-m");
    store.save(&m).await.unwrap();
    let loaded_m = store.load(&m.id).await.unwrap();
    assert_eq!(loaded_m, m);
    assert_eq!(
        loaded_m.node(&NodeId::from("n2")).unwrap().confidence.map(f64::to_bits),
        Some(0.9556395672092627f64.to_bits())
    );
    assert!(store.delete(&m.id).await.unwrap());

    assert!(store.exists(&a.id).await.unwrap());
    assert_eq!(store.list().await.unwrap(), vec![a.id.clone(), b.id.clone()]);

    // overwrite replaces the document
    let mut a2 = loaded.clone();
    a2.touch();
    store.save(&a2).await.unwrap();
    assert_eq!(store.load(&a.id).await.unwrap().revision, a.revision + 1);

    assert!(store.delete(&a.id).await.unwrap());
    assert!(!store.delete(&a.id).await.unwrap());
    assert!(matches!(store.load(&a.id).await, Err(Error::TreeNotFound(_))));
    assert_eq!(store.list().await.unwrap(), vec![b.id.clone()]);
}

// ===========================================================================
// MemoryStore
// ===========================================================================

#[tokio::test]
async fn memory_store_contract() {
    contract(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn memory_store_location() {
    assert_eq!(MemoryStore::new().location(), "memory");
}

// ===========================================================================
// LocalFsStore
// ===========================================================================

#[tokio::test]
async fn fs_store_contract() {
    let tmp = tempfile::tempdir().unwrap();
    contract(Arc::new(LocalFsStore::new(tmp.path().join("trees")))).await;
}

#[tokio::test]
async fn fs_store_list_without_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let store = LocalFsStore::new(tmp.path().join("never-created"));
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn fs_store_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let tree = annotated_tree("resume-me");
    LocalFsStore::new(tmp.path()).save(&tree).await.unwrap();

    let reopened = LocalFsStore::new(tmp.path());
    assert_eq!(reopened.list().await.unwrap(), vec![tree.id.clone()]);
    assert_eq!(reopened.load(&tree.id).await.unwrap(), tree);
}

#[tokio::test]
async fn fs_store_rejects_corrupt_document() {
    let tmp = tempfile::tempdir().unwrap();
    let store = LocalFsStore::new(tmp.path());
    std::fs::write(tmp.path().join("broken.json"), "{ not json").unwrap();
    let err = store.load(&TreeId::parse("broken").unwrap()).await.unwrap_err();
    assert_eq!(err.code(), "PERSISTENCE_ERROR");
}

#[tokio::test]
async fn fs_store_rejects_document_under_wrong_name() {
    let tmp = tempfile::tempdir().unwrap();
    let store = LocalFsStore::new(tmp.path());
    let tree = annotated_tree("original");
    store.save(&tree).await.unwrap();
    std::fs::copy(tmp.path().join("original.json"), tmp.path().join("copy.json")).unwrap();
    let err = store.load(&TreeId::parse("copy").unwrap()).await.unwrap_err();
    assert!(matches!(err, Error::Persistence(_)));
}

#[tokio::test]
async fn fs_store_document_is_readable_json() {
    let tmp = tempfile::tempdir().unwrap();
    let store = LocalFsStore::new(tmp.path());
    let tree = annotated_tree("readable");
    store.save(&tree).await.unwrap();
    let text = std::fs::read_to_string(tmp.path().join("readable.json")).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(doc["id"], "readable");
    assert_eq!(doc["nodes"]["n0"]["synthesis"]["provisional"], true);
}

// ===========================================================================
// open_store
// ===========================================================================

#[tokio::test]
async fn open_store_picks_backend() {
    let tmp = tempfile::tempdir().unwrap();
    let fs = open_store(&StoreConfig {
        backend: StoreBackend::Fs,
        path: tmp.path().to_path_buf(),
    });
    assert_eq!(fs.location(), tmp.path().display().to_string());

    let mem = open_store(&StoreConfig {
        backend: StoreBackend::Memory,
        path: tmp.path().to_path_buf(),
    });
    assert_eq!(mem.location(), "memory");
}
