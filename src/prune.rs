//! Orphaned-node pruning.
//!
//! An orphan is a node instance unreachable from every journey root in
//! the realm. Deletion is never silent: a confirmation collaborator sees
//! the orphan set first and may veto it wholesale or per artifact.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::client::PlatformClient;
use crate::resolver::{GraphResolver, ResolveError};
use crate::session::Session;
use crate::types::{NodeId, NodeSummary};

/// Error type for prune operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PruneError {
    /// A journey failed to resolve, so reachability cannot be proven.
    ///
    /// Pruning with an unproven reachable set could delete live nodes;
    /// the whole operation aborts instead.
    #[error("journey {journey} failed to resolve, aborting prune: {error}")]
    Unprovable {
        /// Journey that failed.
        journey: String,
        /// Why it failed.
        error: ResolveError,
    },
    /// Platform client error.
    #[error("platform client error: {0}")]
    Client(String),
}

/// Confirmation collaborator consulted before any deletion.
pub trait Confirm {
    /// Approve or veto the operation, given the full orphan set.
    fn confirm(&mut self, orphans: &[NodeSummary]) -> bool;

    /// Approve or veto one artifact. Vetoed artifacts count as skipped.
    fn approve(&mut self, orphan: &NodeSummary) -> bool {
        let _ = orphan;
        true
    }
}

/// Blanket approval, for non-interactive callers that already prompted.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproveAll;

impl Confirm for ApproveAll {
    fn confirm(&mut self, _orphans: &[NodeSummary]) -> bool {
        true
    }
}

/// Tally of a completed prune pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PruneReport {
    /// Nodes that were deleted.
    pub deleted: Vec<NodeSummary>,
    /// Nodes whose deletion failed, with the reason. One failure never
    /// aborts the rest of the pass.
    pub failed: BTreeMap<NodeId, String>,
    /// Nodes vetoed by the confirmation collaborator.
    pub skipped: Vec<NodeSummary>,
}

/// Outcome of a prune invocation.
#[derive(Debug, Clone)]
pub enum PruneOutcome {
    /// The confirmation collaborator declined; nothing was deleted.
    Declined,
    /// The pass ran; the report tallies what happened.
    Completed(PruneReport),
}

/// Removes nodes unreachable from any journey root.
pub struct PruneEngine<C: PlatformClient> {
    client: Arc<C>,
    resolver: GraphResolver<C>,
}

impl<C: PlatformClient + 'static> PruneEngine<C> {
    /// Create a prune engine over a platform backend.
    pub fn new(client: Arc<C>) -> Self {
        let resolver = GraphResolver::new(Arc::clone(&client));
        Self { client, resolver }
    }

    /// Compute the realm's orphan set.
    ///
    /// The reachable set is the union over **every** journey root; a
    /// single unresolvable journey makes reachability unprovable and
    /// aborts with [`PruneError::Unprovable`].
    pub async fn find_orphans(
        &self,
        session: &Session,
    ) -> Result<Vec<NodeSummary>, PruneError> {
        let journeys = self
            .client
            .list_journeys(session.handle(), session.realm())
            .await
            .map_err(|e| PruneError::Client(e.to_string()))?;

        let mut reachable: BTreeSet<NodeId> = BTreeSet::new();
        for journey in &journeys {
            let resolution = self
                .resolver
                .resolve(session, &journey.name)
                .await
                .map_err(|error| PruneError::Unprovable {
                    journey: journey.name.clone(),
                    error,
                })?;
            // Branch failures name journeys absent from the realm; every
            // journey that exists is resolved top-level in this loop.
            reachable.extend(resolution.graph.reachable_ids());
        }

        let inventory = self
            .client
            .list_nodes(session.handle(), session.realm())
            .await
            .map_err(|e| PruneError::Client(e.to_string()))?;

        let orphans: Vec<NodeSummary> = inventory
            .into_iter()
            .filter(|n| !reachable.contains(&n.id))
            .collect();
        info!(
            journeys = journeys.len(),
            reachable = reachable.len(),
            orphans = orphans.len(),
            "orphan set computed"
        );
        Ok(orphans)
    }

    /// Find orphans and, after confirmation, delete them one by one.
    ///
    /// Per-artifact failures are recorded and the pass continues.
    pub async fn prune(
        &self,
        session: &Session,
        confirm: &mut impl Confirm,
    ) -> Result<PruneOutcome, PruneError> {
        let orphans = self.find_orphans(session).await?;
        if orphans.is_empty() {
            return Ok(PruneOutcome::Completed(PruneReport::default()));
        }
        if !confirm.confirm(&orphans) {
            info!("prune declined, nothing deleted");
            return Ok(PruneOutcome::Declined);
        }

        let mut report = PruneReport::default();
        for orphan in orphans {
            if !confirm.approve(&orphan) {
                report.skipped.push(orphan);
                continue;
            }
            match self
                .client
                .delete_node(session.handle(), session.realm(), &orphan.id, &orphan.node_type)
                .await
            {
                Ok(()) => report.deleted.push(orphan),
                Err(error) => {
                    warn!(node = %orphan.id, %error, "orphan deletion failed");
                    report.failed.insert(orphan.id, error.to_string());
                }
            }
        }
        info!(
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "prune completed"
        );
        Ok(PruneOutcome::Completed(report))
    }
}
