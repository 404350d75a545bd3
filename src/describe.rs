//! Human-readable journey summaries.
//!
//! Pure functions over resolved graphs: no I/O, no client. The same
//! custom-content predicate drives the listing annotation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::catalog::Catalog;
use crate::types::ResolvedGraph;

/// Summary of one resolved journey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSummary {
    /// Journey name.
    pub journey: String,
    /// Occurrence count per node type tag. `BTreeMap` so iteration is
    /// reproducible.
    pub node_types: BTreeMap<String, usize>,
    /// Script inventory: name to description.
    pub scripts: BTreeMap<String, String>,
    /// Whether any node type falls outside the built-in catalog.
    pub contains_custom: bool,
}

/// Summarize a resolved graph.
///
/// Counts member and container-hosted nodes; nested journeys get their
/// own summaries via [`describe_all`]. An unknown platform version
/// (`catalog` is `None`) flags everything as custom.
pub fn describe(graph: &ResolvedGraph, catalog: Option<Catalog>) -> TreeSummary {
    let mut node_types: BTreeMap<String, usize> = BTreeMap::new();
    let mut contains_custom = false;

    for node in graph.all_nodes() {
        *node_types.entry(node.node_type.to_string()).or_insert(0) += 1;
        let builtin = catalog.map(|c| c.is_builtin(&node.node_type)).unwrap_or(false);
        if !builtin {
            contains_custom = true;
        }
    }

    let scripts = graph
        .scripts
        .values()
        .map(|s| (s.name.clone(), s.description.clone()))
        .collect();

    TreeSummary {
        journey: graph.journey.name.clone(),
        node_types,
        scripts,
        contains_custom,
    }
}

/// Summarize a graph and every nested graph it carries, parent first.
pub fn describe_all(graph: &ResolvedGraph, catalog: Option<Catalog>) -> Vec<TreeSummary> {
    let mut summaries = vec![describe(graph, catalog)];
    for nested in graph.nested.values() {
        summaries.extend(describe_all(nested, catalog));
    }
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        BundleMeta, DeploymentTopology, Journey, Node, NodeId, NodeType, Script, ScriptId,
        ScriptLanguage, BUNDLE_FORMAT_VERSION,
    };
    use chrono::{DateTime, Utc};
    use std::collections::BTreeMap;

    fn graph_with_nodes(types: &[&str]) -> ResolvedGraph {
        let ids: Vec<NodeId> = types.iter().map(|_| NodeId::mint()).collect();
        let mut journey = Journey::new("Login", "/", ids[0]);
        let mut nodes = BTreeMap::new();
        for (id, tag) in ids.iter().zip(types) {
            journey = journey.with_member(*id, NodeType::from(*tag), *tag);
            nodes.insert(*id, Node::new(*id, NodeType::from(*tag), *tag));
        }
        ResolvedGraph {
            journey,
            nodes,
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
    fn test_histogram_counts_every_distinct_node() {
        let graph = graph_with_nodes(&[
            "UsernameCollector",
            "PasswordCollector",
            "PasswordCollector",
        ]);
        let summary = describe(&graph, Catalog::for_version("7.2.0"));

        let total: usize = summary.node_types.values().sum();
        assert_eq!(total, graph.node_count());
        assert_eq!(summary.node_types["PasswordCollector"], 2);
        assert!(!summary.contains_custom);
    }

    #[test]
    fn test_custom_flag_set_by_non_catalog_type() {
        let graph = graph_with_nodes(&["UsernameCollector", "CustomScriptNode"]);
        let summary = describe(&graph, Catalog::for_version("7.2.0"));
        assert!(summary.contains_custom);
    }

    #[test]
    fn test_unknown_version_flags_everything() {
        let graph = graph_with_nodes(&["UsernameCollector"]);
        let summary = describe(&graph, Catalog::for_version("9.9.9"));
        assert!(summary.contains_custom);
    }

    #[test]
    fn test_script_inventory_by_name() {
        let mut graph = graph_with_nodes(&["ScriptedDecision"]);
        let mut script = Script::new(ScriptId::mint(), "check-device", ScriptLanguage::JavaScript, "x()");
        script.description = "Device posture check".to_string();
        graph.scripts.insert(script.id, script);

        let summary = describe(&graph, Catalog::for_version("7.2.0"));
        assert_eq!(summary.scripts["check-device"], "Device posture check");
    }
}
