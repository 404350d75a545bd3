//! Bundle import: identity-preserving and identity-regenerating merges.
//!
//! Every journey is validated for closure before its first write. The
//! preserve mode additionally runs its type-compatibility checks up
//! front, so a conflicting journey aborts with zero writes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::client::PlatformClient;
use crate::export::BatchReport;
use crate::session::Session;
use crate::types::{
    ArtifactRef, CombinedBundle, JourneyIntegrityError, Node, NodeId, ResolvedGraph, Script,
    ScriptId,
};

/// How the import treats artifact identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Write ids verbatim, overwriting same-id artifacts in place.
    ///
    /// For updating an existing journey without breaking external
    /// references to it.
    PreserveIdentity,
    /// Mint a fresh id for every node, rewriting all edges and
    /// back-references so the imported journey never collides with a
    /// same-named journey's internals.
    RegenerateIdentity,
}

/// Error type for import operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ImportError {
    /// The bundle references an id it does not contain and the target
    /// realm cannot satisfy.
    #[error("journey {journey}: dangling reference {reference}")]
    Dangling {
        /// Journey being imported.
        journey: String,
        /// Human-readable reference description.
        reference: String,
    },
    /// Preserve-identity import would overwrite an id with a different
    /// type tag.
    #[error("node {id}: type conflict, realm has {existing}, bundle has {incoming}")]
    TypeConflict {
        /// The contested node id.
        id: NodeId,
        /// Type currently in the realm.
        existing: String,
        /// Type carried by the bundle.
        incoming: String,
    },
    /// The journey object in the bundle violates its own invariants.
    #[error(transparent)]
    Integrity(#[from] JourneyIntegrityError),
    /// Email templates need the admin token this session does not hold.
    #[error("journey {journey}: email template {id} requires an admin token")]
    PrivilegeRequired {
        /// Journey being imported.
        journey: String,
        /// Template that could not be written.
        id: String,
    },
    /// Platform client error.
    #[error("platform client error: {0}")]
    Client(String),
}

/// Tally of one journey's import.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportSummary {
    /// Journey that was imported.
    pub journey: String,
    /// Member nodes written.
    pub nodes_written: usize,
    /// Container-hosted nodes written.
    pub inner_nodes_written: usize,
    /// Scripts written.
    pub scripts_written: usize,
    /// Scripts satisfied by an identical script already in the realm.
    pub scripts_reused: usize,
    /// Email templates written.
    pub templates_written: usize,
    /// Email templates skipped (identical content, or unsupported topology).
    pub templates_skipped: usize,
    /// Node ids that received a fresh identity.
    pub ids_regenerated: usize,
}

/// Next name under the `<name> - imported (n)` renaming policy.
fn apply_renaming_policy(name: &str) -> String {
    let pattern = Regex::new(r"^(.* - imported) \(([0-9]+)\)$").expect("renaming pattern is valid");
    if let Some(caps) = pattern.captures(name) {
        let stem = &caps[1];
        let n: u64 = caps[2].parse().unwrap_or(0);
        format!("{} ({})", stem, n + 1)
    } else {
        format!("{name} - imported (1)")
    }
}

/// First renamed variant not taken by the realm.
fn free_name(taken: &BTreeSet<String>, name: &str) -> String {
    let mut candidate = apply_renaming_policy(name);
    while taken.contains(&candidate) {
        candidate = apply_renaming_policy(&candidate);
    }
    candidate
}

/// Imports bundles into a realm.
pub struct ImportEngine<C: PlatformClient> {
    client: Arc<C>,
}

impl<C: PlatformClient + 'static> ImportEngine<C> {
    /// Create an import engine over a platform backend.
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Import one journey's graph and, depth-first, every nested graph
    /// it carries. Any failure aborts the remaining writes of this call.
    pub async fn import_single(
        &self,
        session: &Session,
        graph: &ResolvedGraph,
        mode: ImportMode,
    ) -> Result<Vec<ImportSummary>, ImportError> {
        let mut available: BTreeSet<String> = BTreeSet::new();
        collect_nested_names(graph, &mut available);

        let mut summaries = Vec::new();
        self.import_tree(session, graph, mode, &available, &mut summaries)
            .await?;
        Ok(summaries)
    }

    /// Import a whole-realm bundle in inner-journey dependency order.
    ///
    /// A journey whose dependencies never become available is reported
    /// as failed; siblings continue.
    pub async fn import_bundle(
        &self,
        session: &Session,
        bundle: &CombinedBundle,
        mode: ImportMode,
    ) -> Result<(Vec<ImportSummary>, BatchReport), ImportError> {
        let installed: BTreeSet<String> = self
            .client
            .list_journeys(session.handle(), session.realm())
            .await
            .map_err(|e| ImportError::Client(e.to_string()))?
            .into_iter()
            .map(|j| j.name)
            .collect();
        let bundled: BTreeSet<String> = bundle.journeys.keys().cloned().collect();

        // Order journeys so every in-bundle dependency imports before its
        // dependents. Journeys in a reference cycle never become ready.
        let mut remaining: BTreeMap<&String, &ResolvedGraph> = bundle.journeys.iter().collect();
        let mut done: BTreeSet<String> = BTreeSet::new();
        let mut ordered: Vec<&String> = Vec::new();
        loop {
            let ready: Vec<&String> = remaining
                .iter()
                .filter(|(_, graph)| {
                    graph.inner_journeys.iter().all(|dep| {
                        done.contains(dep) || installed.contains(dep) || !bundled.contains(dep)
                    })
                })
                .map(|(name, _)| *name)
                .collect();
            if ready.is_empty() {
                break;
            }
            for name in ready {
                remaining.remove(name);
                done.insert(name.clone());
                ordered.push(name);
            }
        }

        let mut report = BatchReport::default();
        let mut summaries = Vec::new();
        for (name, graph) in remaining {
            let unmet: Vec<&str> = graph
                .inner_journeys
                .iter()
                .map(|s| s.as_str())
                .filter(|dep| !installed.contains(*dep))
                .collect();
            report.failure(
                name.clone(),
                format!("unresolved journey dependencies: {}", unmet.join(", ")),
            );
        }

        for name in ordered {
            let graph = &bundle.journeys[name];
            match self.import_one(session, graph, mode, &bundled).await {
                Ok(summary) => {
                    summaries.push(summary);
                    report.success(name.clone());
                }
                Err(error) => {
                    warn!(journey = %name, %error, "journey import failed");
                    report.failure(name.clone(), error);
                }
            }
        }
        Ok((summaries, report))
    }

    /// Depth-first import over a nested graph tree, dependencies first.
    fn import_tree<'a>(
        &'a self,
        session: &'a Session,
        graph: &'a ResolvedGraph,
        mode: ImportMode,
        available: &'a BTreeSet<String>,
        summaries: &'a mut Vec<ImportSummary>,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<(), ImportError>> + Send + 'a>,
    > {
        Box::pin(async move {
            for nested in graph.nested.values() {
                self.import_tree(session, nested, mode, available, summaries)
                    .await?;
            }
            let summary = self.import_one(session, graph, mode, available).await?;
            summaries.push(summary);
            Ok(())
        })
    }

    /// Validate and write one journey's graph.
    ///
    /// `available` names journeys satisfiable from the surrounding
    /// bundle rather than the target realm.
    async fn import_one(
        &self,
        session: &Session,
        graph: &ResolvedGraph,
        mode: ImportMode,
        available: &BTreeSet<String>,
    ) -> Result<ImportSummary, ImportError> {
        self.validate(session, graph, available).await?;

        let journey_name = &graph.journey.name;
        let target_origin =
            crate::canonical::origin_fingerprint(session.host(), session.realm());
        if graph.meta.origin == target_origin {
            info!(journey = %journey_name, "importing into the environment the bundle was exported from");
        }

        let mut summary = ImportSummary {
            journey: journey_name.clone(),
            ..ImportSummary::default()
        };

        // Identity plan for every node in the graph.
        let node_map: BTreeMap<NodeId, NodeId> = graph
            .nodes
            .keys()
            .chain(graph.inner_nodes.keys())
            .map(|&id| match mode {
                ImportMode::PreserveIdentity => (id, id),
                ImportMode::RegenerateIdentity => (id, NodeId::mint()),
            })
            .collect();
        summary.ids_regenerated = node_map.iter().filter(|(old, new)| old != new).count();

        if mode == ImportMode::PreserveIdentity {
            // Type-compatibility pre-flight: no write happens if any id
            // would be overwritten with a different type.
            let inventory: BTreeMap<NodeId, String> = self
                .client
                .list_nodes(session.handle(), session.realm())
                .await
                .map_err(|e| ImportError::Client(e.to_string()))?
                .into_iter()
                .map(|n| (n.id, n.node_type.to_string()))
                .collect();
            for node in graph.all_nodes() {
                if let Some(existing) = inventory.get(&node.id) {
                    if existing != node.node_type.as_str() {
                        return Err(ImportError::TypeConflict {
                            id: node.id,
                            existing: existing.clone(),
                            incoming: node.node_type.to_string(),
                        });
                    }
                }
            }
        }

        let script_map = self.import_scripts(session, graph, mode, &mut summary).await?;
        self.import_templates(session, graph, mode, &mut summary).await?;

        for node in graph.inner_nodes.values() {
            let rewritten = rewrite_node(node, &node_map, &script_map);
            self.client
                .put_node(session.handle(), session.realm(), &rewritten)
                .await
                .map_err(|e| ImportError::Client(e.to_string()))?;
            summary.inner_nodes_written += 1;
        }

        for node in graph.nodes.values() {
            let rewritten = rewrite_node(node, &node_map, &script_map);
            self.client
                .put_node(session.handle(), session.realm(), &rewritten)
                .await
                .map_err(|e| ImportError::Client(e.to_string()))?;
            summary.nodes_written += 1;
        }

        let mut journey = graph.journey.clone();
        journey.realm = session.realm().to_string();
        journey.root = node_map[&journey.root];
        journey.members = journey
            .members
            .into_iter()
            .map(|(id, member)| (node_map[&id], member))
            .collect();
        self.client
            .put_journey(session.handle(), session.realm(), &journey)
            .await
            .map_err(|e| ImportError::Client(e.to_string()))?;

        info!(
            journey = %journey_name,
            nodes = summary.nodes_written,
            scripts = summary.scripts_written,
            regenerated = summary.ids_regenerated,
            "journey imported"
        );
        Ok(summary)
    }

    /// Check the bundle is closed before anything is written.
    async fn validate(
        &self,
        session: &Session,
        graph: &ResolvedGraph,
        available: &BTreeSet<String>,
    ) -> Result<(), ImportError> {
        graph.journey.validate()?;
        let journey = &graph.journey.name;

        for id in graph.journey.members.keys() {
            if !graph.nodes.contains_key(id) {
                return Err(ImportError::Dangling {
                    journey: journey.clone(),
                    reference: format!("member node {id}"),
                });
            }
        }

        for node in graph.nodes.values() {
            for (label, target) in &node.outcomes {
                if !graph.journey.members.contains_key(target) {
                    return Err(ImportError::Dangling {
                        journey: journey.clone(),
                        reference: format!("outcome {label:?} of node {} -> {target}", node.id),
                    });
                }
            }
            for inner_ref in &node.inner {
                if !graph.inner_nodes.contains_key(&inner_ref.id) {
                    return Err(ImportError::Dangling {
                        journey: journey.clone(),
                        reference: format!("inner node {}", inner_ref.id),
                    });
                }
            }
        }

        for node in graph.all_nodes() {
            match &node.artifact {
                Some(ArtifactRef::Script(id)) => {
                    if !graph.scripts.contains_key(id) {
                        let in_realm = self
                            .client
                            .fetch_script(session.handle(), session.realm(), id)
                            .await
                            .map_err(|e| ImportError::Client(e.to_string()))?
                            .is_some();
                        if !in_realm {
                            return Err(ImportError::Dangling {
                                journey: journey.clone(),
                                reference: format!("script {id}"),
                            });
                        }
                    }
                }
                Some(ArtifactRef::EmailTemplate(id)) => {
                    // Templates are only checkable where the topology
                    // serves them; elsewhere the reference rides along.
                    if !graph.email_templates.contains_key(id)
                        && session.capabilities().supports_email_templates
                    {
                        let admin = session.admin_token().ok_or_else(|| {
                            ImportError::PrivilegeRequired {
                                journey: journey.clone(),
                                id: id.clone(),
                            }
                        })?;
                        let in_store = self
                            .client
                            .fetch_email_template(admin, id)
                            .await
                            .map_err(|e| ImportError::Client(e.to_string()))?
                            .is_some();
                        if !in_store {
                            return Err(ImportError::Dangling {
                                journey: journey.clone(),
                                reference: format!("email template {id}"),
                            });
                        }
                    }
                }
                Some(ArtifactRef::InnerJourney(name)) => {
                    if !available.contains(name) {
                        let in_realm = self
                            .client
                            .fetch_journey(session.handle(), session.realm(), name)
                            .await
                            .map_err(|e| ImportError::Client(e.to_string()))?
                            .is_some();
                        if !in_realm {
                            return Err(ImportError::Dangling {
                                journey: journey.clone(),
                                reference: format!("nested journey {name}"),
                            });
                        }
                    }
                }
                None => {}
            }
        }

        Ok(())
    }

    /// Write or reuse the graph's scripts; returns the id remapping.
    async fn import_scripts(
        &self,
        session: &Session,
        graph: &ResolvedGraph,
        mode: ImportMode,
        summary: &mut ImportSummary,
    ) -> Result<BTreeMap<ScriptId, ScriptId>, ImportError> {
        let mut script_map: BTreeMap<ScriptId, ScriptId> = BTreeMap::new();
        if graph.scripts.is_empty() {
            return Ok(script_map);
        }

        let realm_scripts: Vec<Script> = match mode {
            ImportMode::PreserveIdentity => Vec::new(),
            ImportMode::RegenerateIdentity => self
                .client
                .list_scripts(session.handle(), session.realm())
                .await
                .map_err(|e| ImportError::Client(e.to_string()))?,
        };
        let by_name: BTreeMap<&str, &Script> =
            realm_scripts.iter().map(|s| (s.name.as_str(), s)).collect();
        let mut taken: BTreeSet<String> = realm_scripts.iter().map(|s| s.name.clone()).collect();

        for script in graph.scripts.values() {
            script_map.insert(script.id, script.id);
            if mode == ImportMode::PreserveIdentity {
                self.client
                    .put_script(session.handle(), session.realm(), script)
                    .await
                    .map_err(|e| ImportError::Client(e.to_string()))?;
                summary.scripts_written += 1;
                continue;
            }

            match by_name.get(script.name.as_str()) {
                Some(existing) if existing.content_hash() == script.content_hash() => {
                    // Identical script already in the realm: reuse it.
                    debug!(script = %script.name, "script content matches realm, reusing");
                    script_map.insert(script.id, existing.id);
                    summary.scripts_reused += 1;
                }
                Some(_) => {
                    // Same name, different content: rename the import.
                    let mut renamed = script.clone();
                    renamed.id = ScriptId::mint();
                    renamed.name = free_name(&taken, &script.name);
                    warn!(from = %script.name, to = %renamed.name, "script name conflict, renaming");
                    taken.insert(renamed.name.clone());
                    script_map.insert(script.id, renamed.id);
                    self.client
                        .put_script(session.handle(), session.realm(), &renamed)
                        .await
                        .map_err(|e| ImportError::Client(e.to_string()))?;
                    summary.scripts_written += 1;
                }
                None => {
                    self.client
                        .put_script(session.handle(), session.realm(), script)
                        .await
                        .map_err(|e| ImportError::Client(e.to_string()))?;
                    summary.scripts_written += 1;
                }
            }
        }
        Ok(script_map)
    }

    /// Write the graph's email templates where the topology supports them.
    async fn import_templates(
        &self,
        session: &Session,
        graph: &ResolvedGraph,
        mode: ImportMode,
        summary: &mut ImportSummary,
    ) -> Result<(), ImportError> {
        if graph.email_templates.is_empty() {
            return Ok(());
        }
        if !session.capabilities().supports_email_templates {
            warn!(
                journey = %graph.journey.name,
                count = graph.email_templates.len(),
                "topology has no email templates, skipping"
            );
            summary.templates_skipped += graph.email_templates.len();
            return Ok(());
        }
        let admin = session
            .admin_token()
            .ok_or_else(|| ImportError::PrivilegeRequired {
                journey: graph.journey.name.clone(),
                id: graph
                    .email_templates
                    .keys()
                    .next()
                    .cloned()
                    .unwrap_or_default(),
            })?;

        for template in graph.email_templates.values() {
            if mode == ImportMode::RegenerateIdentity {
                let existing = self
                    .client
                    .fetch_email_template(admin, &template.id)
                    .await
                    .map_err(|e| ImportError::Client(e.to_string()))?;
                if let Some(existing) = existing {
                    if existing.name == template.name
                        && existing.content_hash() == template.content_hash()
                    {
                        summary.templates_skipped += 1;
                        continue;
                    }
                }
            }
            self.client
                .put_email_template(admin, template)
                .await
                .map_err(|e| ImportError::Client(e.to_string()))?;
            summary.templates_written += 1;
        }
        Ok(())
    }
}

/// All journey names present in a nested graph tree, the root included.
fn collect_nested_names(graph: &ResolvedGraph, names: &mut BTreeSet<String>) {
    names.insert(graph.journey.name.clone());
    for nested in graph.nested.values() {
        collect_nested_names(nested, names);
    }
}

/// Apply the identity plan to one node.
fn rewrite_node(
    node: &Node,
    node_map: &BTreeMap<NodeId, NodeId>,
    script_map: &BTreeMap<ScriptId, ScriptId>,
) -> Node {
    let mut rewritten = node.clone();
    rewritten.id = node_map.get(&node.id).copied().unwrap_or(node.id);
    rewritten.outcomes = node
        .outcomes
        .iter()
        .map(|(label, target)| {
            (label.clone(), node_map.get(target).copied().unwrap_or(*target))
        })
        .collect();
    rewritten.inner = node
        .inner
        .iter()
        .map(|r| {
            let mut r = r.clone();
            r.id = node_map.get(&r.id).copied().unwrap_or(r.id);
            r
        })
        .collect();
    if let Some(ArtifactRef::Script(id)) = &node.artifact {
        if let Some(mapped) = script_map.get(id) {
            rewritten.artifact = Some(ArtifactRef::Script(*mapped));
        }
    }
    rewritten
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renaming_policy_first_and_subsequent() {
        assert_eq!(apply_renaming_policy("check"), "check - imported (1)");
        assert_eq!(
            apply_renaming_policy("check - imported (1)"),
            "check - imported (2)"
        );
        assert_eq!(
            apply_renaming_policy("check - imported (9)"),
            "check - imported (10)"
        );
    }

    #[test]
    fn test_free_name_skips_taken_variants() {
        let taken: BTreeSet<String> = ["check - imported (1)", "check - imported (2)"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(free_name(&taken, "check"), "check - imported (3)");
    }

    #[test]
    fn test_rewrite_node_remaps_edges_and_refs() {
        let a = NodeId::mint();
        let b = NodeId::mint();
        let new_b = NodeId::mint();
        let old_script = ScriptId::mint();
        let new_script = ScriptId::mint();

        let node = Node::new(a, crate::types::NodeType::from("ScriptedDecision"), "n")
            .with_outcome("true", b)
            .with_artifact(ArtifactRef::Script(old_script));

        let node_map = BTreeMap::from([(a, a), (b, new_b)]);
        let script_map = BTreeMap::from([(old_script, new_script)]);
        let rewritten = rewrite_node(&node, &node_map, &script_map);

        assert_eq!(rewritten.outcomes["true"], new_b);
        assert_eq!(rewritten.artifact, Some(ArtifactRef::Script(new_script)));
    }
}
