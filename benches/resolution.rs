//! Resolution throughput over synthetic journeys.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use journey_kernel::{
    ConnectionParams, DeploymentTopology, GraphResolver, InMemoryPlatform, Journey, Node, NodeId,
    NodeType, Session, SessionManager,
};

fn build_chain_realm(n: usize) -> Arc<InMemoryPlatform> {
    let client = InMemoryPlatform::new(DeploymentTopology::SelfManaged, "7.2.0");
    let ids: Vec<NodeId> = (0..n).map(|_| NodeId::mint()).collect();
    let mut journey = Journey::new("Bench", "/", ids[0]);
    for (i, id) in ids.iter().enumerate() {
        let mut node = Node::new(*id, NodeType::from("UsernameCollector"), format!("step {i}"));
        if i + 1 < n {
            node = node.with_outcome("outcome", ids[i + 1]);
        }
        journey = journey.with_member(*id, node.node_type.clone(), node.display_name.clone());
        client.add_node("/", node);
    }
    client.add_journey(journey);
    Arc::new(client)
}

async fn session_for(client: &Arc<InMemoryPlatform>) -> Session {
    SessionManager::new(Arc::clone(client))
        .authenticate(&ConnectionParams::new(
            "https://bench",
            "amadmin",
            "password",
            "/",
        ))
        .await
        .expect("bench authentication")
}

fn bench_resolution(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("resolve");

    for &size in &[10usize, 100, 500] {
        let client = build_chain_realm(size);
        let session = rt.block_on(session_for(&client));
        let resolver = GraphResolver::new(Arc::clone(&client));

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let resolution = rt
                    .block_on(resolver.resolve(&session, "Bench"))
                    .expect("resolution");
                assert_eq!(resolution.graph.node_count(), size);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_resolution);
criterion_main!(benches);
