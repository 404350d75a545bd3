//! Graph resolution: transitive closure over a journey root.
//!
//! The resolver walks outcome edges breadth-first from the entry node,
//! dereferencing scripts, email templates, container-hosted nodes, and
//! nested journeys as it goes. Visited sets guarantee termination on
//! cyclic graphs and on mutually referencing journeys.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::canonical::origin_fingerprint;
use crate::client::PlatformClient;
use crate::session::Session;
use crate::types::{BundleMeta, JourneyIntegrityError, Node, NodeId, ResolvedGraph, BUNDLE_FORMAT_VERSION};

/// Error type for graph resolution.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    /// The journey itself could not be found.
    #[error("journey {0} not found")]
    JourneyNotFound(String),
    /// A member node could not be fetched.
    #[error("journey {journey}: node {id} ({node_type}) could not be fetched")]
    MissingNode {
        /// Journey being resolved.
        journey: String,
        /// Missing node id.
        id: NodeId,
        /// Expected node type.
        node_type: String,
    },
    /// A referenced script could not be fetched.
    #[error("journey {journey}: script {id} could not be fetched")]
    MissingScript {
        /// Journey being resolved.
        journey: String,
        /// Missing script id.
        id: String,
    },
    /// A referenced email template could not be fetched.
    #[error("journey {journey}: email template {id} could not be fetched")]
    MissingTemplate {
        /// Journey being resolved.
        journey: String,
        /// Missing template id.
        id: String,
    },
    /// An outcome edge targets a node outside the journey's roster.
    #[error("journey {journey}: node {id} is referenced but is not a member")]
    NotAMember {
        /// Journey being resolved.
        journey: String,
        /// The non-member node id.
        id: NodeId,
    },
    /// The journey object violates its own structural invariants.
    #[error(transparent)]
    Integrity(#[from] JourneyIntegrityError),
    /// Email templates need the admin token this session does not hold.
    #[error("journey {journey}: email template {id} requires an admin token")]
    PrivilegeRequired {
        /// Journey being resolved.
        journey: String,
        /// Template that could not be dereferenced.
        id: String,
    },
    /// Platform client error.
    #[error("platform client error: {0}")]
    Client(String),
}

/// A nested journey whose resolution failed.
///
/// The failure is attached to the branch; the parent graph stays intact
/// and the caller decides whether to abort or continue.
#[derive(Debug, Clone)]
pub struct BranchFailure {
    /// Name of the nested journey that failed.
    pub journey: String,
    /// Why it failed.
    pub error: ResolveError,
}

/// Outcome of resolving a journey root.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The resolved graph, closed over everything that resolved.
    pub graph: ResolvedGraph,
    /// Nested journeys that failed to resolve, if any.
    pub failures: Vec<BranchFailure>,
}

impl Resolution {
    /// Whether every branch resolved.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Resolves journey roots into closed graphs.
pub struct GraphResolver<C: PlatformClient> {
    client: Arc<C>,
}

impl<C: PlatformClient + 'static> GraphResolver<C> {
    /// Create a resolver over a platform backend.
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Resolve the transitive closure of a journey.
    ///
    /// Top-level missing references fail the whole resolution; nested
    /// journeys that fail attach to [`Resolution::failures`] instead.
    pub async fn resolve(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<Resolution, ResolveError> {
        let mut visited_journeys = BTreeSet::new();
        let mut failures = Vec::new();
        let graph = self
            .resolve_journey(session, name, &mut visited_journeys, &mut failures)
            .await?;
        Ok(Resolution { graph, failures })
    }

    /// Recursive resolution step, sharing one visited-journey set across
    /// the whole expansion so mutually referencing journeys terminate.
    fn resolve_journey<'a>(
        &'a self,
        session: &'a Session,
        name: &'a str,
        visited_journeys: &'a mut BTreeSet<String>,
        failures: &'a mut Vec<BranchFailure>,
    ) -> Pin<Box<dyn Future<Output = Result<ResolvedGraph, ResolveError>> + Send + 'a>> {
        Box::pin(async move {
            visited_journeys.insert(name.to_string());

            let journey = self
                .client
                .fetch_journey(session.handle(), session.realm(), name)
                .await
                .map_err(|e| ResolveError::Client(e.to_string()))?
                .ok_or_else(|| ResolveError::JourneyNotFound(name.to_string()))?;
            journey.validate()?;

            let mut graph = ResolvedGraph {
                nodes: BTreeMap::new(),
                inner_nodes: BTreeMap::new(),
                scripts: BTreeMap::new(),
                email_templates: BTreeMap::new(),
                inner_journeys: Vec::new(),
                nested: BTreeMap::new(),
                meta: BundleMeta {
                    format: BUNDLE_FORMAT_VERSION.to_string(),
                    platform_version: session.platform_version().to_string(),
                    topology: session.topology(),
                    origin: origin_fingerprint(session.host(), session.realm()),
                    exported_at: Utc::now(),
                },
                journey,
            };

            // BFS from the root; disconnected roster members are swept
            // afterwards in id order so the bundle still closes over them.
            let mut pending: VecDeque<NodeId> = VecDeque::new();
            let mut visited: BTreeSet<NodeId> = BTreeSet::new();
            pending.push_back(graph.journey.root);
            visited.insert(graph.journey.root);

            loop {
                let id = match pending.pop_front() {
                    Some(id) => id,
                    None => match graph.journey.members.keys().find(|m| !visited.contains(*m)) {
                        Some(&id) => {
                            visited.insert(id);
                            id
                        }
                        None => break,
                    },
                };

                let member = graph.journey.members.get(&id).cloned().ok_or_else(|| {
                    ResolveError::NotAMember {
                        journey: graph.journey.name.clone(),
                        id,
                    }
                })?;
                let node = self
                    .client
                    .fetch_node(session.handle(), session.realm(), &id, &member.node_type)
                    .await
                    .map_err(|e| ResolveError::Client(e.to_string()))?
                    .ok_or_else(|| ResolveError::MissingNode {
                        journey: graph.journey.name.clone(),
                        id,
                        node_type: member.node_type.to_string(),
                    })?;

                for target in node.outcomes.values() {
                    if !graph.journey.members.contains_key(target) {
                        return Err(ResolveError::NotAMember {
                            journey: graph.journey.name.clone(),
                            id: *target,
                        });
                    }
                    if visited.insert(*target) {
                        pending.push_back(*target);
                    }
                }

                for inner_ref in node.inner.clone() {
                    if graph.inner_nodes.contains_key(&inner_ref.id) {
                        continue;
                    }
                    let inner = self
                        .client
                        .fetch_node(
                            session.handle(),
                            session.realm(),
                            &inner_ref.id,
                            &inner_ref.node_type,
                        )
                        .await
                        .map_err(|e| ResolveError::Client(e.to_string()))?
                        .ok_or_else(|| ResolveError::MissingNode {
                            journey: graph.journey.name.clone(),
                            id: inner_ref.id,
                            node_type: inner_ref.node_type.to_string(),
                        })?;
                    self.collect_artifacts(session, &inner, &mut graph, visited_journeys, failures)
                        .await?;
                    graph.inner_nodes.insert(inner_ref.id, inner);
                }

                self.collect_artifacts(session, &node, &mut graph, visited_journeys, failures)
                    .await?;
                graph.nodes.insert(id, node);
            }

            debug!(
                journey = %graph.journey.name,
                nodes = graph.node_count(),
                scripts = graph.scripts.len(),
                "journey resolved"
            );
            Ok(graph)
        })
    }

    /// Dereference a node's artifact: script, email template, or nested
    /// journey. Deduplicated by id across the whole resolved graph.
    async fn collect_artifacts(
        &self,
        session: &Session,
        node: &Node,
        graph: &mut ResolvedGraph,
        visited_journeys: &mut BTreeSet<String>,
        failures: &mut Vec<BranchFailure>,
    ) -> Result<(), ResolveError> {
        if let Some(script_id) = node.script_ref() {
            if !graph.scripts.contains_key(script_id) {
                let script = self
                    .client
                    .fetch_script(session.handle(), session.realm(), script_id)
                    .await
                    .map_err(|e| ResolveError::Client(e.to_string()))?
                    .ok_or_else(|| ResolveError::MissingScript {
                        journey: graph.journey.name.clone(),
                        id: script_id.to_string(),
                    })?;
                graph.scripts.insert(*script_id, script);
            }
        }

        if let Some(template_id) = node.email_template_ref() {
            if !session.capabilities().supports_email_templates {
                debug!(template = template_id, "topology has no email templates, reference kept by id");
            } else if !graph.email_templates.contains_key(template_id) {
                let admin = session.admin_token().ok_or_else(|| {
                    ResolveError::PrivilegeRequired {
                        journey: graph.journey.name.clone(),
                        id: template_id.to_string(),
                    }
                })?;
                let template = self
                    .client
                    .fetch_email_template(admin, template_id)
                    .await
                    .map_err(|e| ResolveError::Client(e.to_string()))?
                    .ok_or_else(|| ResolveError::MissingTemplate {
                        journey: graph.journey.name.clone(),
                        id: template_id.to_string(),
                    })?;
                graph.email_templates.insert(template_id.to_string(), template);
            }
        }

        if let Some(nested_name) = node.inner_journey_ref() {
            if !graph.inner_journeys.iter().any(|n| n == nested_name) {
                graph.inner_journeys.push(nested_name.to_string());
            }
            if !visited_journeys.contains(nested_name)
                && session.capabilities().supports_nested_journeys
            {
                let nested_name = nested_name.to_string();
                match self
                    .resolve_journey(session, &nested_name, visited_journeys, failures)
                    .await
                {
                    Ok(nested) => {
                        graph.nested.insert(nested_name, nested);
                    }
                    Err(error) => {
                        warn!(journey = %nested_name, %error, "nested journey failed to resolve");
                        failures.push(BranchFailure {
                            journey: nested_name,
                            error,
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryPlatform;
    use crate::session::SessionManager;
    use crate::types::{
        ArtifactRef, ConnectionParams, DeploymentTopology, Journey, NodeType, Script, ScriptId,
        ScriptLanguage,
    };

    async fn session_for(client: &Arc<InMemoryPlatform>) -> Session {
        SessionManager::new(Arc::clone(client))
            .authenticate(&ConnectionParams::new("https://mem", "amadmin", "password", "/"))
            .await
            .unwrap()
    }

    fn linear_journey(client: &InMemoryPlatform, name: &str, n: usize) -> Vec<NodeId> {
        let ids: Vec<NodeId> = (0..n).map(|_| NodeId::mint()).collect();
        let mut journey = crate::types::Journey::new(name, "/", ids[0]);
        for (i, id) in ids.iter().enumerate() {
            let mut node = Node::new(*id, NodeType::from("UsernameCollector"), format!("step {i}"));
            if i + 1 < n {
                node = node.with_outcome("outcome", ids[i + 1]);
            }
            journey = journey.with_member(*id, node.node_type.clone(), node.display_name.clone());
            client.add_node("/", node);
        }
        client.add_journey(journey);
        ids
    }

    #[tokio::test]
    async fn test_resolves_linear_journey() {
        let client = Arc::new(InMemoryPlatform::new(DeploymentTopology::SelfManaged, "7.2.0"));
        linear_journey(&client, "Login", 3);
        let session = session_for(&client).await;

        let resolution = GraphResolver::new(Arc::clone(&client))
            .resolve(&session, "Login")
            .await
            .unwrap();

        assert!(resolution.is_complete());
        assert_eq!(resolution.graph.node_count(), 3);
    }

    #[tokio::test]
    async fn test_terminates_on_cycles() {
        let client = Arc::new(InMemoryPlatform::new(DeploymentTopology::SelfManaged, "7.2.0"));
        let a = NodeId::mint();
        let b = NodeId::mint();
        let node_a = Node::new(a, NodeType::from("UsernameCollector"), "a").with_outcome("next", b);
        let node_b = Node::new(b, NodeType::from("PasswordCollector"), "b").with_outcome("back", a);
        let journey = Journey::new("Loop", "/", a)
            .with_member(a, node_a.node_type.clone(), "a")
            .with_member(b, node_b.node_type.clone(), "b");
        client.add_node("/", node_a);
        client.add_node("/", node_b);
        client.add_journey(journey);

        let session = session_for(&client).await;
        let resolution = GraphResolver::new(Arc::clone(&client))
            .resolve(&session, "Loop")
            .await
            .unwrap();
        assert_eq!(resolution.graph.nodes.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_node_is_fatal_for_the_journey() {
        let client = Arc::new(InMemoryPlatform::new(DeploymentTopology::SelfManaged, "7.2.0"));
        let root = NodeId::mint();
        let journey =
            Journey::new("Broken", "/", root).with_member(root, NodeType::from("UsernameCollector"), "gone");
        client.add_journey(journey);

        let session = session_for(&client).await;
        let err = GraphResolver::new(Arc::clone(&client))
            .resolve(&session, "Broken")
            .await;
        assert!(matches!(err, Err(ResolveError::MissingNode { .. })));
    }

    #[tokio::test]
    async fn test_scripts_dedupe_across_graph() {
        let client = Arc::new(InMemoryPlatform::new(DeploymentTopology::SelfManaged, "7.2.0"));
        let script = Script::new(ScriptId::mint(), "shared", ScriptLanguage::JavaScript, "x()");
        let script_id = script.id;
        client.add_script("/", script);

        let a = NodeId::mint();
        let b = NodeId::mint();
        let node_a = Node::new(a, NodeType::from("ScriptedDecision"), "a")
            .with_outcome("true", b)
            .with_artifact(ArtifactRef::Script(script_id));
        let node_b = Node::new(b, NodeType::from("ScriptedDecision"), "b")
            .with_artifact(ArtifactRef::Script(script_id));
        let journey = Journey::new("Scripted", "/", a)
            .with_member(a, node_a.node_type.clone(), "a")
            .with_member(b, node_b.node_type.clone(), "b");
        client.add_node("/", node_a);
        client.add_node("/", node_b);
        client.add_journey(journey);

        let session = session_for(&client).await;
        let resolution = GraphResolver::new(Arc::clone(&client))
            .resolve(&session, "Scripted")
            .await
            .unwrap();
        assert_eq!(resolution.graph.scripts.len(), 1);
    }

    #[tokio::test]
    async fn test_nested_failure_attaches_to_branch() {
        let client = Arc::new(InMemoryPlatform::new(DeploymentTopology::SelfManaged, "7.2.0"));
        let root = NodeId::mint();
        let node = Node::new(root, NodeType::from("InnerJourneyEvaluator"), "inner")
            .with_artifact(ArtifactRef::InnerJourney("DoesNotExist".to_string()));
        let journey = Journey::new("Outer", "/", root).with_member(root, node.node_type.clone(), "inner");
        client.add_node("/", node);
        client.add_journey(journey);

        let session = session_for(&client).await;
        let resolution = GraphResolver::new(Arc::clone(&client))
            .resolve(&session, "Outer")
            .await
            .unwrap();

        assert!(!resolution.is_complete());
        assert_eq!(resolution.failures.len(), 1);
        assert_eq!(resolution.failures[0].journey, "DoesNotExist");
        assert_eq!(resolution.graph.nodes.len(), 1);
    }

    #[tokio::test]
    async fn test_mutual_references_terminate() {
        let client = Arc::new(InMemoryPlatform::new(DeploymentTopology::SelfManaged, "7.2.0"));
        for (name, other) in [("A", "B"), ("B", "A")] {
            let root = NodeId::mint();
            let node = Node::new(root, NodeType::from("InnerJourneyEvaluator"), "eval")
                .with_artifact(ArtifactRef::InnerJourney(other.to_string()));
            let journey = Journey::new(name, "/", root).with_member(root, node.node_type.clone(), "eval");
            client.add_node("/", node);
            client.add_journey(journey);
        }

        let session = session_for(&client).await;
        let resolution = GraphResolver::new(Arc::clone(&client))
            .resolve(&session, "A")
            .await
            .unwrap();

        assert!(resolution.is_complete());
        let nested = resolution.graph.nested.get("B").unwrap();
        // B references A, which is already on the path: name-only.
        assert_eq!(nested.inner_journeys, vec!["A".to_string()]);
        assert!(nested.nested.is_empty());
    }

    #[tokio::test]
    async fn test_disconnected_members_still_resolve() {
        let client = Arc::new(InMemoryPlatform::new(DeploymentTopology::SelfManaged, "7.2.0"));
        let ids = linear_journey(&client, "Login", 2);
        let stray = NodeId::mint();
        let stray_node = Node::new(stray, NodeType::from("MessageNode"), "unreached");
        client.add_node("/", stray_node.clone());
        let mut journey = client.journey("/", "Login").unwrap();
        journey
            .members
            .insert(stray, crate::types::MemberNode {
                node_type: stray_node.node_type.clone(),
                display_name: "unreached".to_string(),
            });
        client.add_journey(journey);

        let session = session_for(&client).await;
        let resolution = GraphResolver::new(Arc::clone(&client))
            .resolve(&session, "Login")
            .await
            .unwrap();
        assert_eq!(resolution.graph.nodes.len(), ids.len() + 1);
        assert!(resolution.graph.nodes.contains_key(&stray));
    }
}
