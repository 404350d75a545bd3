//! # journey-kernel
//!
//! Graph-faithful export, import, and pruning for authentication journeys.
//!
//! A journey is the root of a reference graph: nodes point at scripts,
//! email templates, and nested journeys. This crate answers three
//! questions about that graph:
//!
//! 1. **Export**: pull a journey and everything it depends on into a
//!    portable, self-contained bundle
//! 2. **Import**: push a bundle back into a realm, preserving or
//!    regenerating artifact identity
//! 3. **Prune**: find and remove artifacts unreachable from every
//!    journey root
//!
//! ## Architecture
//!
//! ```text
//! SessionManager → Session (topology + capabilities)
//!        ↓
//! GraphResolver → ResolvedGraph
//!        ↓
//! ExportEngine / ImportEngine / PruneEngine / describe
//!        ↓
//! PlatformClient (REST or in-memory)
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Maps in bundle documents are `BTreeMap`: serialization is stable
//! - Traversal is breadth-first from the journey root with visited sets,
//!   so cyclic graphs and mutually referencing journeys terminate
//! - Identity regeneration preserves graph isomorphism: edges and
//!   back-references are rewritten consistently

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod canonical;
pub mod catalog;
pub mod client;
pub mod describe;
pub mod export;
pub mod import;
pub mod list;
pub mod prune;
pub mod resolver;
pub mod session;
pub mod sink;
pub mod types;

// Re-exports
pub use types::{
    AdminToken, ArtifactRef, AuthOutcome, BundleMeta, CombinedBundle, ConnectionParams,
    DeploymentTopology, EmailTemplate, InnerNodeRef, Journey, JourneyIntegrityError, MemberNode,
    Node, NodeId, NodeSummary, NodeType, ResolvedGraph, Script, ScriptId, ScriptLanguage,
    SessionHandle, BUNDLE_FORMAT_VERSION,
};

pub use canonical::{canonical_hash, canonical_hash_hex, origin_fingerprint, to_canonical_bytes};
pub use catalog::Catalog;
pub use client::{AuthenticationError, InMemoryPlatform, PlatformClient, TokenExchangeError};
pub use describe::{describe, describe_all, TreeSummary};
pub use export::{BatchReport, ExportEngine, ExportError};
pub use import::{ImportEngine, ImportError, ImportMode, ImportSummary};
pub use list::{list_journeys, JourneyListEntry, ListError};
pub use prune::{ApproveAll, Confirm, PruneEngine, PruneError, PruneOutcome, PruneReport};
pub use resolver::{BranchFailure, GraphResolver, Resolution, ResolveError};
pub use session::{Capabilities, Session, SessionManager, SessionState};
pub use sink::{DirSink, ExportSink, MemorySink, SinkError};

#[cfg(feature = "rest")]
pub use client::RestPlatform;
