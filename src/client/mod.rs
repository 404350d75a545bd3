//! Platform client backends.
//!
//! The identity platform's REST surface is an external collaborator; the
//! engine talks to it only through [`PlatformClient`]. Implementations must
//! return results in deterministic order.

pub mod memory;

#[cfg(feature = "rest")]
pub mod rest;

use async_trait::async_trait;

use crate::types::{
    AdminToken, AuthOutcome, ConnectionParams, EmailTemplate, Journey, Node, NodeId, NodeSummary,
    NodeType, Script, ScriptId, SessionHandle,
};

/// Authentication failed: bad credentials or unreachable host.
///
/// Fatal to the invocation; there are no retries.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthenticationError {
    /// The platform rejected the credentials.
    #[error("authentication rejected for {user}: {reason}")]
    Rejected {
        /// User the attempt was made for.
        user: String,
        /// Platform-reported reason.
        reason: String,
    },
    /// The host could not be reached at all.
    #[error("platform unreachable at {host}: {reason}")]
    Unreachable {
        /// Host that was dialed.
        host: String,
        /// Transport-level reason.
        reason: String,
    },
}

/// The admin-token exchange failed.
///
/// Non-fatal: callers may continue with session-only privileges, and
/// operations that need the token fail individually downstream.
#[derive(Debug, Clone, thiserror::Error)]
#[error("admin token exchange failed: {reason}")]
pub struct TokenExchangeError {
    /// Platform-reported reason.
    pub reason: String,
}

/// Trait for identity-platform backends.
///
/// Journey, node, and script operations are realm-scoped and authenticate
/// with the session handle. Email templates live in the configuration
/// store and require the administrative bearer token.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Error type for data operations.
    type Error: std::error::Error + Send + Sync;

    /// Run the authentication handshake once.
    async fn authenticate(&self, params: &ConnectionParams)
        -> Result<AuthOutcome, AuthenticationError>;

    /// Exchange the session for an administrative bearer token.
    async fn exchange_admin_token(&self, handle: &SessionHandle)
        -> Result<AdminToken, TokenExchangeError>;

    /// List every journey in a realm.
    async fn list_journeys(&self, handle: &SessionHandle, realm: &str)
        -> Result<Vec<Journey>, Self::Error>;

    /// Fetch a journey by name.
    async fn fetch_journey(&self, handle: &SessionHandle, realm: &str, name: &str)
        -> Result<Option<Journey>, Self::Error>;

    /// Fetch a node by id and type.
    async fn fetch_node(
        &self,
        handle: &SessionHandle,
        realm: &str,
        id: &NodeId,
        node_type: &NodeType,
    ) -> Result<Option<Node>, Self::Error>;

    /// List every node instance in a realm, of any type.
    async fn list_nodes(&self, handle: &SessionHandle, realm: &str)
        -> Result<Vec<NodeSummary>, Self::Error>;

    /// Fetch a script by id.
    async fn fetch_script(&self, handle: &SessionHandle, realm: &str, id: &ScriptId)
        -> Result<Option<Script>, Self::Error>;

    /// List every script in a realm.
    async fn list_scripts(&self, handle: &SessionHandle, realm: &str)
        -> Result<Vec<Script>, Self::Error>;

    /// Fetch an email template from the configuration store.
    async fn fetch_email_template(&self, admin: &AdminToken, id: &str)
        -> Result<Option<EmailTemplate>, Self::Error>;

    /// Create or overwrite a journey.
    async fn put_journey(&self, handle: &SessionHandle, realm: &str, journey: &Journey)
        -> Result<(), Self::Error>;

    /// Create or overwrite a node.
    async fn put_node(&self, handle: &SessionHandle, realm: &str, node: &Node)
        -> Result<(), Self::Error>;

    /// Create or overwrite a script.
    async fn put_script(&self, handle: &SessionHandle, realm: &str, script: &Script)
        -> Result<(), Self::Error>;

    /// Create or overwrite an email template in the configuration store.
    async fn put_email_template(&self, admin: &AdminToken, template: &EmailTemplate)
        -> Result<(), Self::Error>;

    /// Delete a node.
    async fn delete_node(
        &self,
        handle: &SessionHandle,
        realm: &str,
        id: &NodeId,
        node_type: &NodeType,
    ) -> Result<(), Self::Error>;
}

pub use memory::InMemoryPlatform;

#[cfg(feature = "rest")]
pub use rest::RestPlatform;
