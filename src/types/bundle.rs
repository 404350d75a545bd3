//! Export bundle types.
//!
//! A bundle is self-describing: reconstructing the graph it carries never
//! requires an out-of-band lookup. Every map is a `BTreeMap` so that
//! serialized bundles are byte-stable for a given graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::email::EmailTemplate;
use super::journey::Journey;
use super::node::{Node, NodeId};
use super::platform::DeploymentTopology;
use super::script::{Script, ScriptId};

/// Schema version written into bundle metadata.
pub const BUNDLE_FORMAT_VERSION: &str = "1.0.0";

/// Provenance metadata recorded at export time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMeta {
    /// Bundle format version.
    pub format: String,
    /// Version reported by the source platform.
    pub platform_version: String,
    /// Deployment topology of the source platform.
    pub topology: DeploymentTopology,
    /// Fingerprint of the source (host, realm) pair.
    pub origin: String,
    /// Export timestamp.
    pub exported_at: DateTime<Utc>,
}

/// A journey's transitively closed subgraph.
///
/// Produced by the resolver; consumed by export, import, describe, and
/// prune. Nested journeys resolve into `nested`, so a single-journey
/// bundle still closes over everything the journey can evaluate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedGraph {
    /// The journey object itself.
    pub journey: Journey,
    /// Top-level member nodes, keyed by id.
    pub nodes: BTreeMap<NodeId, Node>,
    /// Nodes hosted inside container nodes, keyed by id.
    #[serde(default)]
    pub inner_nodes: BTreeMap<NodeId, Node>,
    /// Scripts referenced anywhere in the graph, deduplicated by id.
    #[serde(default)]
    pub scripts: BTreeMap<ScriptId, Script>,
    /// Email templates referenced anywhere in the graph, keyed by template id.
    #[serde(default)]
    pub email_templates: BTreeMap<String, EmailTemplate>,
    /// Names of nested journeys referenced by member nodes.
    #[serde(default)]
    pub inner_journeys: Vec<String>,
    /// Resolved subgraphs of nested journeys, keyed by name.
    ///
    /// Empty when nested journeys are hoisted to the bundle level
    /// (combined-all export) or when a reference points at an ancestor
    /// in the resolution chain.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nested: BTreeMap<String, ResolvedGraph>,
    /// Export provenance.
    pub meta: BundleMeta,
}

impl ResolvedGraph {
    /// Total distinct node count: members plus inner nodes.
    ///
    /// Nested journeys are counted by their own graphs, not here.
    pub fn node_count(&self) -> usize {
        self.nodes.len() + self.inner_nodes.len()
    }

    /// Iterate over all nodes of this journey, members first, then inner.
    pub fn all_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().chain(self.inner_nodes.values())
    }

    /// All node ids present in this graph and every nested graph.
    pub fn reachable_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().chain(self.inner_nodes.keys()).copied().collect();
        for nested in self.nested.values() {
            ids.extend(nested.reachable_ids());
        }
        ids
    }
}

/// A whole-realm bundle: every journey's resolved graph under one document.
///
/// Serializes as `{ "journeys": { "<name>": <graph>, ... } }`. Shared
/// artifacts and nested journeys are hoisted so each graph appears exactly
/// once at the bundle level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedBundle {
    /// Resolved graphs, keyed by journey name.
    pub journeys: BTreeMap<String, ResolvedGraph>,
}

impl CombinedBundle {
    /// Create an empty bundle.
    pub fn new() -> Self {
        Self {
            journeys: BTreeMap::new(),
        }
    }

    /// Insert a resolved graph, hoisting its nested journeys to the top
    /// level so every graph appears exactly once.
    ///
    /// A nested graph already present at the bundle level is dropped
    /// rather than overwritten; the first resolution wins.
    pub fn insert(&mut self, mut graph: ResolvedGraph) {
        let nested = std::mem::take(&mut graph.nested);
        self.journeys.entry(graph.journey.name.clone()).or_insert(graph);
        for (_, sub) in nested {
            self.insert(sub);
        }
    }

    /// Look up a journey's graph by name.
    pub fn get(&self, name: &str) -> Option<&ResolvedGraph> {
        self.journeys.get(name)
    }
}

impl Default for CombinedBundle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::node::NodeType;

    fn empty_graph(name: &str) -> ResolvedGraph {
        let root = NodeId::mint();
        let journey = Journey::new(name, "/", root).with_member(
            root,
            NodeType::from("UsernameCollector"),
            "collect",
        );
        ResolvedGraph {
            journey,
            nodes: BTreeMap::new(),
            inner_nodes: BTreeMap::new(),
            scripts: BTreeMap::new(),
            email_templates: BTreeMap::new(),
            inner_journeys: Vec::new(),
            nested: BTreeMap::new(),
            meta: BundleMeta {
                format: BUNDLE_FORMAT_VERSION.to_string(),
                platform_version: "7.2.0".to_string(),
                topology: DeploymentTopology::SelfManaged,
                origin: String::new(),
                exported_at: DateTime::<Utc>::MIN_UTC,
            },
        }
    }

    #[test]
    fn test_insert_hoists_nested_graphs() {
        let mut parent = empty_graph("Outer");
        parent.nested.insert("Inner".to_string(), empty_graph("Inner"));

        let mut bundle = CombinedBundle::new();
        bundle.insert(parent);

        assert!(bundle.get("Outer").is_some());
        assert!(bundle.get("Inner").is_some());
        assert!(bundle.get("Outer").unwrap().nested.is_empty());
    }

    #[test]
    fn test_insert_keeps_first_resolution() {
        let mut bundle = CombinedBundle::new();
        let first = empty_graph("Login");
        let first_root = first.journey.root;
        bundle.insert(first);
        bundle.insert(empty_graph("Login"));

        assert_eq!(bundle.journeys.len(), 1);
        assert_eq!(bundle.get("Login").unwrap().journey.root, first_root);
    }
}
