//! Journey types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::node::{NodeId, NodeType};

/// Per-member record in a journey's node roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberNode {
    /// Type tag of the member node.
    pub node_type: NodeType,
    /// Display name shown in the journey editor.
    pub display_name: String,
}

/// A named, realm-scoped authentication flow modeled as a directed node graph.
///
/// The name is the journey's identity within its realm. The roster maps
/// every member node id to its type tag; the root must be a member
/// ([`Journey::validate`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journey {
    /// Journey name, unique within the realm.
    pub name: String,
    /// Realm the journey belongs to.
    pub realm: String,
    /// Entry node id.
    pub root: NodeId,
    /// Whether the journey is enabled for evaluation.
    pub enabled: bool,
    /// Member nodes, keyed by id.
    pub members: BTreeMap<NodeId, MemberNode>,
}

/// Structural integrity violation in a journey object.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JourneyIntegrityError {
    /// The root node id is not in the member roster.
    #[error("journey {journey}: root node {root} is not a member")]
    RootNotMember {
        /// Journey name.
        journey: String,
        /// The offending root id.
        root: NodeId,
    },
}

impl Journey {
    /// Create a journey with an empty roster.
    pub fn new(name: impl Into<String>, realm: impl Into<String>, root: NodeId) -> Self {
        Self {
            name: name.into(),
            realm: realm.into(),
            root,
            enabled: true,
            members: BTreeMap::new(),
        }
    }

    /// Register a member node.
    pub fn with_member(mut self, id: NodeId, node_type: NodeType, display_name: impl Into<String>) -> Self {
        self.members.insert(
            id,
            MemberNode {
                node_type,
                display_name: display_name.into(),
            },
        );
        self
    }

    /// Check structural invariants: the root must be a member.
    pub fn validate(&self) -> Result<(), JourneyIntegrityError> {
        if !self.members.contains_key(&self.root) {
            return Err(JourneyIntegrityError::RootNotMember {
                journey: self.name.clone(),
                root: self.root,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_must_be_member() {
        let root = NodeId::mint();
        let journey = Journey::new("Login", "/", root);
        assert!(journey.validate().is_err());

        let journey = journey.with_member(root, NodeType::from("UsernameCollector"), "collect");
        assert!(journey.validate().is_ok());
    }
}
