//! Node types for journey graphs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::script::ScriptId;

/// Unique identifier for a node in a journey graph.
///
/// Wraps a UUID and implements `Ord` for deterministic ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Create a new NodeId from a UUID.
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse a NodeId from a UUID string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Mint a fresh random NodeId.
    ///
    /// Used by the identity-regenerating import mode.
    pub fn mint() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for NodeId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Type tag of a node.
///
/// Node types are an open set: the platform ships a built-in catalog
/// (see [`crate::catalog`]), and anything outside it is custom content.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeType(String);

impl NodeType {
    /// Create a node type from a tag string.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Reference from a node to an artifact it depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactRef {
    /// A script executed by the node.
    Script(ScriptId),
    /// An email template rendered by the node, keyed by template id.
    EmailTemplate(String),
    /// A nested journey evaluated by the node, keyed by journey name.
    InnerJourney(String),
}

/// Reference to a node hosted inside a container node.
///
/// Container nodes carry an ordered list of these; order is part of the
/// journey's semantics and must survive export/import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerNodeRef {
    /// Id of the hosted node.
    pub id: NodeId,
    /// Type tag of the hosted node.
    pub node_type: NodeType,
}

/// A vertex in a journey graph.
///
/// Outcome edges may form cycles; traversal relies on visited sets,
/// never on acyclicity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node identifier.
    pub id: NodeId,
    /// Type tag.
    pub node_type: NodeType,
    /// Human-readable display name.
    pub display_name: String,
    /// Node configuration. `BTreeMap` keeps serialization deterministic.
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
    /// Outcome-labeled edges to successor nodes.
    #[serde(default)]
    pub outcomes: BTreeMap<String, NodeId>,
    /// Artifact this node depends on, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactRef>,
    /// Nodes hosted inside this node (container nodes only), in page order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inner: Vec<InnerNodeRef>,
}

impl Node {
    /// Create a node with no config, edges, or references.
    pub fn new(id: NodeId, node_type: NodeType, display_name: impl Into<String>) -> Self {
        Self {
            id,
            node_type,
            display_name: display_name.into(),
            config: BTreeMap::new(),
            outcomes: BTreeMap::new(),
            artifact: None,
            inner: Vec::new(),
        }
    }

    /// Add an outcome edge.
    pub fn with_outcome(mut self, label: impl Into<String>, target: NodeId) -> Self {
        self.outcomes.insert(label.into(), target);
        self
    }

    /// Set the artifact reference.
    pub fn with_artifact(mut self, artifact: ArtifactRef) -> Self {
        self.artifact = Some(artifact);
        self
    }

    /// Whether this node hosts inner nodes.
    pub fn is_container(&self) -> bool {
        !self.inner.is_empty()
    }

    /// The script this node references, if any.
    pub fn script_ref(&self) -> Option<&ScriptId> {
        match &self.artifact {
            Some(ArtifactRef::Script(id)) => Some(id),
            _ => None,
        }
    }

    /// The email template this node references, if any.
    pub fn email_template_ref(&self) -> Option<&str> {
        match &self.artifact {
            Some(ArtifactRef::EmailTemplate(id)) => Some(id),
            _ => None,
        }
    }

    /// The nested journey this node references, if any.
    pub fn inner_journey_ref(&self) -> Option<&str> {
        match &self.artifact {
            Some(ArtifactRef::InnerJourney(name)) => Some(name),
            _ => None,
        }
    }
}

/// Minimal node record returned by realm-wide node listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    /// Node id.
    pub id: NodeId,
    /// Node type tag.
    pub node_type: NodeType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_ordering() {
        let a = NodeId::parse("00000000-0000-0000-0000-000000000001").unwrap();
        let b = NodeId::parse("00000000-0000-0000-0000-000000000002").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_minted_ids_are_distinct() {
        assert_ne!(NodeId::mint(), NodeId::mint());
    }

    #[test]
    fn test_artifact_accessors() {
        let id = NodeId::mint();
        let node = Node::new(id, NodeType::from("ScriptedDecision"), "run script")
            .with_artifact(ArtifactRef::Script(ScriptId::mint()));
        assert!(node.script_ref().is_some());
        assert!(node.email_template_ref().is_none());
        assert!(node.inner_journey_ref().is_none());
    }

    #[test]
    fn test_outcome_edges_are_ordered() {
        let n = Node::new(NodeId::mint(), NodeType::from("ChoiceCollector"), "choice")
            .with_outcome("true", NodeId::mint())
            .with_outcome("false", NodeId::mint());
        let labels: Vec<&str> = n.outcomes.keys().map(|s| s.as_str()).collect();
        assert_eq!(labels, vec!["false", "true"]);
    }
}
