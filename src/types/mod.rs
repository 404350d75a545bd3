//! Core types for the journey kernel.

pub mod bundle;
pub mod email;
pub mod journey;
pub mod node;
pub mod platform;
pub mod script;

pub use bundle::{BundleMeta, CombinedBundle, ResolvedGraph, BUNDLE_FORMAT_VERSION};
pub use email::EmailTemplate;
pub use journey::{Journey, JourneyIntegrityError, MemberNode};
pub use node::{ArtifactRef, InnerNodeRef, Node, NodeId, NodeSummary, NodeType};
pub use platform::{
    AdminToken, AuthOutcome, ConnectionParams, DeploymentTopology, SessionHandle,
};
pub use script::{Script, ScriptId, ScriptLanguage};
