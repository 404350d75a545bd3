//! Realm journey listing with custom-content annotation.
//!
//! Uses the same catalog predicate as [`crate::describe`]: a journey is
//! annotated when any of its node types, container-hosted nodes
//! included, falls outside the built-in catalog.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::{is_container_type, Catalog};
use crate::client::PlatformClient;
use crate::session::Session;

/// Error type for listing.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ListError {
    /// Platform client error.
    #[error("platform client error: {0}")]
    Client(String),
}

/// One listed journey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneyListEntry {
    /// Journey name.
    pub name: String,
    /// Whether the journey contains custom content.
    pub contains_custom: bool,
}

/// List the realm's journeys in name order, flagging custom content.
///
/// Container nodes are fetched so their hosted node types count too; an
/// unknown platform version flags every journey.
pub async fn list_journeys<C: PlatformClient>(
    client: &Arc<C>,
    session: &Session,
) -> Result<Vec<JourneyListEntry>, ListError> {
    let catalog = Catalog::for_version(session.platform_version());
    let mut journeys = client
        .list_journeys(session.handle(), session.realm())
        .await
        .map_err(|e| ListError::Client(e.to_string()))?;
    journeys.sort_by(|a, b| a.name.cmp(&b.name));

    let mut entries = Vec::with_capacity(journeys.len());
    for journey in journeys {
        let mut contains_custom = false;
        match catalog {
            None => contains_custom = true,
            Some(catalog) => {
                for (id, member) in &journey.members {
                    if !catalog.is_builtin(&member.node_type) {
                        contains_custom = true;
                        break;
                    }
                    if is_container_type(&member.node_type) {
                        let container = client
                            .fetch_node(session.handle(), session.realm(), id, &member.node_type)
                            .await
                            .map_err(|e| ListError::Client(e.to_string()))?;
                        if let Some(container) = container {
                            if container
                                .inner
                                .iter()
                                .any(|r| !catalog.is_builtin(&r.node_type))
                            {
                                contains_custom = true;
                                break;
                            }
                        }
                    }
                }
            }
        }
        entries.push(JourneyListEntry {
            name: journey.name,
            contains_custom,
        });
    }
    Ok(entries)
}
