//! Bundle export: single journey, whole realm, or one file per journey.
//!
//! All three modes are built on the resolver. Batch modes never abort on
//! one journey's failure; the failure lands in the report and siblings
//! continue. The separate-all mode is all-or-nothing with respect to
//! pre-existing files: the pre-flight check runs over every intended
//! output name before any graph is resolved or any byte is written.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::client::PlatformClient;
use crate::resolver::{GraphResolver, ResolveError};
use crate::session::Session;
use crate::sink::{ExportSink, SinkError};
use crate::types::{CombinedBundle, ResolvedGraph};

/// Error type for export operations.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// An intended output name already exists; nothing was written.
    #[error("output {0} already exists")]
    FileConflict(String),
    /// Serializing a bundle document failed before any write.
    #[error("bundle serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Resolution of the requested journey failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// The journey resolved, but one of its nested journeys did not.
    #[error("journey {journey}: nested journeys failed to resolve: {details}")]
    IncompleteResolution {
        /// Journey being exported.
        journey: String,
        /// Names and reasons of the failed branches.
        details: String,
    },
    /// Writing to the output sink failed.
    #[error(transparent)]
    Sink(#[from] SinkError),
    /// Platform client error.
    #[error("platform client error: {0}")]
    Client(String),
}

/// Per-batch success/failure tally.
///
/// Batch operations record failures instead of aborting siblings and
/// surface everything once, here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    /// Journeys that completed.
    pub succeeded: Vec<String>,
    /// Journeys that failed, with the reason.
    pub failed: BTreeMap<String, String>,
}

impl BatchReport {
    /// Record a success.
    pub fn success(&mut self, name: impl Into<String>) {
        self.succeeded.push(name.into());
    }

    /// Record a failure.
    pub fn failure(&mut self, name: impl Into<String>, reason: impl ToString) {
        self.failed.insert(name.into(), reason.to_string());
    }

    /// Whether every journey succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Render a value as JSON with a custom indent unit.
fn render_indented<T: serde::Serialize>(value: &T, indent: &[u8]) -> Result<String, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent);
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Render a single-journey document: `{ "<name>": <graph> }`, 2-space indent.
pub fn render_single(name: &str, graph: &ResolvedGraph) -> Result<String, serde_json::Error> {
    let doc = BTreeMap::from([(name, graph)]);
    serde_json::to_string_pretty(&doc)
}

/// Render a single-journey export for terminal display:
/// a `<name>:` header followed by the JSON document.
pub fn render_single_display(name: &str, graph: &ResolvedGraph) -> Result<String, serde_json::Error> {
    Ok(format!("{}:\n{}", name, serde_json::to_string_pretty(graph)?))
}

/// Render a combined-all document: `{ "journeys": ... }`, 4-space indent.
pub fn render_combined(bundle: &CombinedBundle) -> Result<String, serde_json::Error> {
    render_indented(bundle, b"    ")
}

/// Render one journey's raw graph document, 4-space indent (separate-all).
pub fn render_graph(graph: &ResolvedGraph) -> Result<String, serde_json::Error> {
    render_indented(graph, b"    ")
}

/// Parse a single-journey document back into its name and graph.
pub fn parse_single(document: &str) -> Result<(String, ResolvedGraph), serde_json::Error> {
    let mut doc: BTreeMap<String, ResolvedGraph> = serde_json::from_str(document)?;
    match doc.pop_first() {
        Some((name, graph)) => Ok((name, graph)),
        None => Err(serde::de::Error::custom("document holds no journey")),
    }
}

/// Parse a combined-all document.
pub fn parse_combined(document: &str) -> Result<CombinedBundle, serde_json::Error> {
    serde_json::from_str(document)
}

/// Parse a separate-all per-journey document (raw graph at top level).
pub fn parse_graph(document: &str) -> Result<ResolvedGraph, serde_json::Error> {
    serde_json::from_str(document)
}

/// Exports journeys as portable bundles.
pub struct ExportEngine<C: PlatformClient> {
    client: Arc<C>,
    resolver: GraphResolver<C>,
}

impl<C: PlatformClient + 'static> ExportEngine<C> {
    /// Create an export engine over a platform backend.
    pub fn new(client: Arc<C>) -> Self {
        let resolver = GraphResolver::new(Arc::clone(&client));
        Self { client, resolver }
    }

    /// Resolve one journey, failing if any nested branch failed.
    async fn resolve_strict(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<ResolvedGraph, ExportError> {
        let resolution = self.resolver.resolve(session, name).await?;
        if !resolution.is_complete() {
            let details = resolution
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.journey, f.error))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ExportError::IncompleteResolution {
                journey: name.to_string(),
                details,
            });
        }
        Ok(resolution.graph)
    }

    /// Export one journey as a resolved graph.
    pub async fn single(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<ResolvedGraph, ExportError> {
        self.resolve_strict(session, name).await
    }

    /// Export one journey to a sink document.
    ///
    /// Refuses to overwrite an existing document, checked before any
    /// resolution happens.
    pub async fn single_to_sink<S: ExportSink>(
        &self,
        session: &Session,
        name: &str,
        file_name: &str,
        sink: &mut S,
    ) -> Result<(), ExportError> {
        if sink.exists(file_name) {
            return Err(ExportError::FileConflict(file_name.to_string()));
        }
        let graph = self.resolve_strict(session, name).await?;
        let document = render_single(name, &graph)?;
        sink.write(file_name, &document)?;
        info!(journey = name, file = file_name, "journey exported");
        Ok(())
    }

    /// Export every journey in the realm into one combined bundle.
    ///
    /// Shared nested journeys are hoisted and deduplicated at the bundle
    /// level; per-journey resolution failures land in the report.
    pub async fn combined(
        &self,
        session: &Session,
    ) -> Result<(CombinedBundle, BatchReport), ExportError> {
        let mut names: Vec<String> = self
            .client
            .list_journeys(session.handle(), session.realm())
            .await
            .map_err(|e| ExportError::Client(e.to_string()))?
            .into_iter()
            .map(|j| j.name)
            .collect();
        names.sort();

        let mut bundle = CombinedBundle::new();
        let mut report = BatchReport::default();
        for name in names {
            if bundle.get(&name).is_some() {
                // Already hoisted out of an earlier journey's nesting.
                report.success(name);
                continue;
            }
            match self.resolve_strict(session, &name).await {
                Ok(graph) => {
                    bundle.insert(graph);
                    report.success(name);
                }
                Err(error) => {
                    warn!(journey = %name, %error, "journey skipped");
                    report.failure(name, error);
                }
            }
        }
        Ok((bundle, report))
    }

    /// Export the whole realm into one document in a sink.
    ///
    /// The document is written only after every journey resolved, so an
    /// interrupted run leaves no partial output.
    pub async fn combined_to_sink<S: ExportSink>(
        &self,
        session: &Session,
        file_name: &str,
        sink: &mut S,
    ) -> Result<BatchReport, ExportError> {
        if sink.exists(file_name) {
            return Err(ExportError::FileConflict(file_name.to_string()));
        }
        let (bundle, report) = self.combined(session).await?;
        let document = render_combined(&bundle)?;
        sink.write(file_name, &document)?;
        info!(file = file_name, journeys = bundle.journeys.len(), "realm exported");
        Ok(report)
    }

    /// Export every journey to its own `<name>.json` document.
    ///
    /// All-or-nothing with respect to existing documents: every target
    /// name is checked before any resolution or write, and one conflict
    /// aborts the whole batch with zero writes. Interruption mid-batch
    /// may leave a prefix of completed documents.
    pub async fn separate<S: ExportSink>(
        &self,
        session: &Session,
        sink: &mut S,
    ) -> Result<BatchReport, ExportError> {
        let mut names: Vec<String> = self
            .client
            .list_journeys(session.handle(), session.realm())
            .await
            .map_err(|e| ExportError::Client(e.to_string()))?
            .into_iter()
            .map(|j| j.name)
            .collect();
        names.sort();

        for name in &names {
            let file_name = format!("{name}.json");
            if sink.exists(&file_name) {
                return Err(ExportError::FileConflict(file_name));
            }
        }

        let mut report = BatchReport::default();
        for name in names {
            match self.resolve_strict(session, &name).await {
                Ok(graph) => {
                    let document = render_graph(&graph)?;
                    sink.write(&format!("{name}.json"), &document)?;
                    report.success(name);
                }
                Err(error) => {
                    warn!(journey = %name, %error, "journey skipped");
                    report.failure(name, error);
                }
            }
        }
        Ok(report)
    }
}
