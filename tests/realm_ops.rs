//! Realm-level operations: batch export, bundle import ordering, prune
//! safety, and property-based checks over generated journeys.

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;

use journey_kernel::{
    describe, ApproveAll, ArtifactRef, Catalog, ConnectionParams, DeploymentTopology, DirSink,
    ExportEngine, ExportError, GraphResolver, ImportEngine, ImportMode, InMemoryPlatform, Journey,
    Node, NodeId, NodeType, PruneEngine, PruneOutcome, Session, SessionManager,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

async fn session_for(client: &Arc<InMemoryPlatform>) -> Session {
    SessionManager::new(Arc::clone(client))
        .authenticate(&ConnectionParams::new(
            "https://am.example.com",
            "amadmin",
            "password",
            "/",
        ))
        .await
        .expect("authentication against the in-memory platform")
}

fn seed_chain(client: &InMemoryPlatform, name: &str, types: &[&str]) -> Vec<NodeId> {
    let ids: Vec<NodeId> = types.iter().map(|_| NodeId::mint()).collect();
    let mut journey = Journey::new(name, "/", ids[0]);
    for (i, (id, tag)) in ids.iter().zip(types).enumerate() {
        let mut node = Node::new(*id, NodeType::from(*tag), format!("step {i}"));
        if i + 1 < ids.len() {
            node = node.with_outcome("outcome", ids[i + 1]);
        }
        journey = journey.with_member(*id, node.node_type.clone(), node.display_name.clone());
        client.add_node("/", node);
    }
    client.add_journey(journey);
    ids
}

/// A journey whose root evaluates another journey by name.
fn seed_wrapper(client: &InMemoryPlatform, name: &str, inner: &str) -> NodeId {
    let root = NodeId::mint();
    let node = Node::new(root, NodeType::from("InnerJourneyEvaluator"), "evaluate")
        .with_artifact(ArtifactRef::InnerJourney(inner.to_string()));
    let journey = Journey::new(name, "/", root).with_member(root, node.node_type.clone(), "evaluate");
    client.add_node("/", node);
    client.add_journey(journey);
    root
}

// ─────────────────────────────────────────────────────────────────────────────
// SEPARATE-ALL ATOMICITY
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_separate_all_is_atomic_on_disk() {
    let client = Arc::new(InMemoryPlatform::new(DeploymentTopology::SelfManaged, "7.2.0"));
    seed_chain(&client, "Alpha", &["UsernameCollector"]);
    seed_chain(&client, "Beta", &["UsernameCollector"]);
    seed_chain(&client, "Gamma", &["UsernameCollector"]);
    let session = session_for(&client).await;

    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("Gamma.json"), "{}").expect("preexisting file");

    let mut sink = DirSink::new(dir.path());
    let err = ExportEngine::new(Arc::clone(&client))
        .separate(&session, &mut sink)
        .await;

    assert!(matches!(err, Err(ExportError::FileConflict(_))));
    // Zero new files: only the pre-existing one remains.
    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn test_separate_all_clean_run_writes_all_files() {
    let client = Arc::new(InMemoryPlatform::new(DeploymentTopology::SelfManaged, "7.2.0"));
    seed_chain(&client, "Alpha", &["UsernameCollector"]);
    seed_chain(&client, "Beta", &["UsernameCollector"]);
    let session = session_for(&client).await;

    let dir = tempfile::tempdir().expect("tempdir");
    let mut sink = DirSink::new(dir.path());
    let report = ExportEngine::new(Arc::clone(&client))
        .separate(&session, &mut sink)
        .await
        .expect("clean export");

    assert!(report.is_clean());
    assert!(dir.path().join("Alpha.json").exists());
    assert!(dir.path().join("Beta.json").exists());
}

// ─────────────────────────────────────────────────────────────────────────────
// BUNDLE IMPORT ORDERING
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_combined_bundle_hoists_and_imports_dependencies_first() {
    let source = Arc::new(InMemoryPlatform::new(DeploymentTopology::SelfManaged, "7.2.0"));
    seed_chain(&source, "Inner", &["UsernameCollector", "PasswordCollector"]);
    seed_wrapper(&source, "Outer", "Inner");
    let source_session = session_for(&source).await;

    let (bundle, report) = ExportEngine::new(Arc::clone(&source))
        .combined(&source_session)
        .await
        .expect("combined export");
    assert!(report.is_clean());
    assert!(bundle.get("Inner").is_some());
    assert!(bundle.get("Outer").is_some());
    // Hoisted: the outer graph references the inner journey by name only.
    assert!(bundle.get("Outer").unwrap().nested.is_empty());

    let target = Arc::new(InMemoryPlatform::new(DeploymentTopology::SelfManaged, "7.2.0"));
    let target_session = session_for(&target).await;
    let (_, import_report) = ImportEngine::new(Arc::clone(&target))
        .import_bundle(&target_session, &bundle, ImportMode::RegenerateIdentity)
        .await
        .expect("bundle import");

    assert!(import_report.is_clean(), "failed: {:?}", import_report.failed);
    assert!(target.journey("/", "Inner").is_some());
    assert!(target.journey("/", "Outer").is_some());
}

#[tokio::test]
async fn test_unresolved_dependency_is_reported_not_fatal() {
    let source = Arc::new(InMemoryPlatform::new(DeploymentTopology::SelfManaged, "7.2.0"));
    seed_chain(&source, "Standalone", &["UsernameCollector"]);
    seed_wrapper(&source, "Outer", "Inner");
    seed_chain(&source, "Inner", &["UsernameCollector"]);
    let source_session = session_for(&source).await;
    let (mut bundle, _) = ExportEngine::new(Arc::clone(&source))
        .combined(&source_session)
        .await
        .expect("combined export");

    // Ship a bundle missing the dependency into an empty realm.
    bundle.journeys.remove("Inner");

    let target = Arc::new(InMemoryPlatform::new(DeploymentTopology::SelfManaged, "7.2.0"));
    let target_session = session_for(&target).await;
    let (_, report) = ImportEngine::new(Arc::clone(&target))
        .import_bundle(&target_session, &bundle, ImportMode::RegenerateIdentity)
        .await
        .expect("bundle import proceeds");

    assert!(report.succeeded.contains(&"Standalone".to_string()));
    assert!(report.failed.contains_key("Outer"));
    assert!(target.journey("/", "Standalone").is_some());
    assert!(target.journey("/", "Outer").is_none());
}

// ─────────────────────────────────────────────────────────────────────────────
// PRUNE SAFETY
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_prune_spares_nodes_reachable_from_any_root() {
    let client = Arc::new(InMemoryPlatform::new(DeploymentTopology::SelfManaged, "7.2.0"));
    let login_ids = seed_chain(&client, "Login", &["UsernameCollector", "PasswordCollector"]);
    let reset_ids = seed_chain(&client, "Reset", &["UsernameCollector"]);
    let wrapper_root = seed_wrapper(&client, "Wrapper", "Login");

    let orphan_a = NodeId::mint();
    let orphan_b = NodeId::mint();
    client.add_node("/", Node::new(orphan_a, NodeType::from("MessageNode"), "stale"));
    client.add_node("/", Node::new(orphan_b, NodeType::from("TimerStart"), "stale"));

    let session = session_for(&client).await;
    let outcome = PruneEngine::new(Arc::clone(&client))
        .prune(&session, &mut ApproveAll)
        .await
        .expect("prune");
    let report = match outcome {
        PruneOutcome::Completed(report) => report,
        PruneOutcome::Declined => panic!("blanket approval cannot decline"),
    };

    let deleted: BTreeSet<NodeId> = report.deleted.iter().map(|n| n.id).collect();
    assert_eq!(deleted, BTreeSet::from([orphan_a, orphan_b]));
    for id in login_ids.iter().chain(reset_ids.iter()).chain([&wrapper_root]) {
        assert!(client.node("/", id).is_some(), "live node {id} was pruned");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PROPERTY TESTS
// ─────────────────────────────────────────────────────────────────────────────

/// Node types drawn from a mix of built-in and custom tags.
fn node_type_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "UsernameCollector",
        "PasswordCollector",
        "DataStoreDecision",
        "MessageNode",
        "CustomScriptNode",
        "AcmeFraudCheck",
    ])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_histogram_sum_equals_node_count(types in prop::collection::vec(node_type_strategy(), 1..8)) {
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        rt.block_on(async {
            let client = Arc::new(InMemoryPlatform::new(DeploymentTopology::SelfManaged, "7.2.0"));
            seed_chain(&client, "Generated", &types);
            let session = session_for(&client).await;

            let resolution = GraphResolver::new(Arc::clone(&client))
                .resolve(&session, "Generated")
                .await
                .expect("resolution");
            let summary = describe(&resolution.graph, Catalog::for_version("7.2.0"));

            let total: usize = summary.node_types.values().sum();
            prop_assert_eq!(total, resolution.graph.node_count());

            let catalog = Catalog::for_version("7.2.0").expect("catalog");
            let expect_custom = types
                .iter()
                .any(|t| !catalog.is_builtin(&NodeType::from(*t)));
            prop_assert_eq!(summary.contains_custom, expect_custom);
            Ok(())
        })?;
    }

    #[test]
    fn prop_regeneration_never_collides_and_keeps_shape(
        types in prop::collection::vec(node_type_strategy(), 1..8),
    ) {
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        rt.block_on(async {
            let client = Arc::new(InMemoryPlatform::new(DeploymentTopology::SelfManaged, "7.2.0"));
            seed_chain(&client, "Generated", &types);
            let session = session_for(&client).await;

            let resolver = GraphResolver::new(Arc::clone(&client));
            let before = resolver.resolve(&session, "Generated").await.expect("resolution").graph;
            let before_ids: BTreeSet<NodeId> = before.nodes.keys().copied().collect();

            ImportEngine::new(Arc::clone(&client))
                .import_single(&session, &before, ImportMode::RegenerateIdentity)
                .await
                .expect("regenerate import");

            let after = resolver.resolve(&session, "Generated").await.expect("resolution").graph;
            let after_ids: BTreeSet<NodeId> = after.nodes.keys().copied().collect();

            prop_assert!(before_ids.is_disjoint(&after_ids));
            prop_assert_eq!(before.nodes.len(), after.nodes.len());

            // The node-type sequence along the chain is unchanged.
            let type_multiset = |g: &journey_kernel::ResolvedGraph| {
                let mut tags: Vec<String> =
                    g.nodes.values().map(|n| n.node_type.to_string()).collect();
                tags.sort();
                tags
            };
            prop_assert_eq!(type_multiset(&before), type_multiset(&after));
            Ok(())
        })?;
    }

    #[test]
    fn prop_prune_never_deletes_reachable_nodes(
        chain_len in 1usize..6,
        orphan_count in 0usize..5,
    ) {
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        rt.block_on(async {
            let client = Arc::new(InMemoryPlatform::new(DeploymentTopology::SelfManaged, "7.2.0"));
            let types: Vec<&str> = std::iter::repeat("UsernameCollector").take(chain_len).collect();
            let live = seed_chain(&client, "Generated", &types);
            let orphans: Vec<NodeId> = (0..orphan_count)
                .map(|i| {
                    let id = NodeId::mint();
                    client.add_node("/", Node::new(id, NodeType::from("MessageNode"), format!("stale {i}")));
                    id
                })
                .collect();

            let session = session_for(&client).await;
            let outcome = PruneEngine::new(Arc::clone(&client))
                .prune(&session, &mut ApproveAll)
                .await
                .expect("prune");
            let report = match outcome {
                PruneOutcome::Completed(report) => report,
                PruneOutcome::Declined => panic!("blanket approval cannot decline"),
            };

            let deleted: BTreeSet<NodeId> = report.deleted.iter().map(|n| n.id).collect();
            for id in &live {
                prop_assert!(!deleted.contains(id));
            }
            for id in &orphans {
                prop_assert!(deleted.contains(id));
            }
            Ok(())
        })?;
    }
}
