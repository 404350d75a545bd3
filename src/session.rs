//! Session establishment and capability detection.
//!
//! One invocation performs exactly one authentication handshake; the
//! resulting [`Session`] is the immutable per-invocation context every
//! engine receives. Topology-dependent behavior is computed once, here,
//! as a [`Capabilities`] descriptor instead of re-testing topology tags
//! at call sites.

use std::sync::Arc;

use tracing::{info, warn};

use crate::client::{AuthenticationError, PlatformClient, TokenExchangeError};
use crate::types::{AdminToken, ConnectionParams, DeploymentTopology, SessionHandle};

/// What the detected topology allows this invocation to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Whether configuration-store artifacts need an admin bearer token.
    pub requires_admin_token: bool,
    /// Whether the platform serves email templates at all.
    pub supports_email_templates: bool,
    /// Whether journeys may evaluate nested journeys.
    pub supports_nested_journeys: bool,
}

impl Capabilities {
    /// Compute the capability descriptor for a topology.
    pub fn for_topology(topology: DeploymentTopology) -> Self {
        match topology {
            DeploymentTopology::SelfManaged => Self {
                requires_admin_token: false,
                supports_email_templates: false,
                supports_nested_journeys: true,
            },
            DeploymentTopology::Containerized | DeploymentTopology::ManagedCloud => Self {
                requires_admin_token: true,
                supports_email_templates: true,
                supports_nested_journeys: true,
            },
        }
    }
}

/// Lifecycle state of a session.
///
/// `Unauthenticated → Established → (AdminTokenAcquired | AdminTokenSkipped)`;
/// terminal on process exit, never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No handshake attempted yet.
    Unauthenticated,
    /// Handshake succeeded; no admin token yet.
    Established,
    /// Admin token exchange succeeded.
    AdminTokenAcquired,
    /// Admin token exchange failed or was unnecessary; session continues
    /// with session-only privileges.
    AdminTokenSkipped,
}

/// Immutable per-invocation context: credentials, topology, capabilities.
#[derive(Debug, Clone)]
pub struct Session {
    handle: SessionHandle,
    realm: String,
    host: String,
    topology: DeploymentTopology,
    platform_version: String,
    capabilities: Capabilities,
    admin_token: Option<AdminToken>,
    state: SessionState,
}

impl Session {
    /// The session credential for realm-scoped operations.
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// The realm this invocation operates in.
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// The host this session was established against.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Detected deployment topology.
    pub fn topology(&self) -> DeploymentTopology {
        self.topology
    }

    /// Version reported by the platform.
    pub fn platform_version(&self) -> &str {
        &self.platform_version
    }

    /// Capability descriptor computed from the topology.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// The admin bearer token, when the exchange succeeded.
    pub fn admin_token(&self) -> Option<&AdminToken> {
        self.admin_token.as_ref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }
}

/// Establishes sessions against a platform backend.
pub struct SessionManager<C: PlatformClient> {
    client: Arc<C>,
}

impl<C: PlatformClient + 'static> SessionManager<C> {
    /// Create a session manager over a platform backend.
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Authenticate once and, when the topology requires it, attempt the
    /// admin-token exchange.
    ///
    /// A failed exchange is degraded continuation, not failure: the
    /// session comes back in [`SessionState::AdminTokenSkipped`] and
    /// privileged operations fail individually downstream.
    pub async fn authenticate(
        &self,
        params: &ConnectionParams,
    ) -> Result<Session, AuthenticationError> {
        let outcome = self.client.authenticate(params).await?;
        let capabilities = Capabilities::for_topology(outcome.topology);
        info!(
            host = %params.host,
            realm = %params.realm,
            topology = %outcome.topology,
            version = %outcome.platform_version,
            "session established"
        );

        let mut session = Session {
            handle: outcome.handle,
            realm: params.realm.clone(),
            host: params.host.clone(),
            topology: outcome.topology,
            platform_version: outcome.platform_version,
            capabilities,
            admin_token: None,
            state: SessionState::Established,
        };

        if capabilities.requires_admin_token {
            match self.client.exchange_admin_token(&session.handle).await {
                Ok(token) => {
                    session.admin_token = Some(token);
                    session.state = SessionState::AdminTokenAcquired;
                }
                Err(TokenExchangeError { reason }) => {
                    warn!(%reason, "admin token exchange failed, continuing with session-only privileges");
                    session.state = SessionState::AdminTokenSkipped;
                }
            }
        } else {
            session.state = SessionState::AdminTokenSkipped;
        }

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryPlatform;

    fn params() -> ConnectionParams {
        ConnectionParams::new("https://mem.example.com", "amadmin", "password", "/")
    }

    #[tokio::test]
    async fn test_self_managed_skips_admin_token() {
        let client = Arc::new(InMemoryPlatform::new(DeploymentTopology::SelfManaged, "7.2.0"));
        let session = SessionManager::new(client).authenticate(&params()).await.unwrap();

        assert_eq!(session.state(), SessionState::AdminTokenSkipped);
        assert!(session.admin_token().is_none());
        assert!(!session.capabilities().requires_admin_token);
        assert!(!session.capabilities().supports_email_templates);
    }

    #[tokio::test]
    async fn test_cloud_acquires_admin_token() {
        let client = Arc::new(InMemoryPlatform::new(DeploymentTopology::ManagedCloud, "7.2.0"));
        let session = SessionManager::new(client).authenticate(&params()).await.unwrap();

        assert_eq!(session.state(), SessionState::AdminTokenAcquired);
        assert!(session.admin_token().is_some());
    }

    #[tokio::test]
    async fn test_failed_exchange_degrades_instead_of_failing() {
        let client = Arc::new(
            InMemoryPlatform::new(DeploymentTopology::ManagedCloud, "7.2.0").without_admin_token(),
        );
        let session = SessionManager::new(client).authenticate(&params()).await.unwrap();

        assert_eq!(session.state(), SessionState::AdminTokenSkipped);
        assert!(session.admin_token().is_none());
    }

    #[tokio::test]
    async fn test_bad_credentials_are_fatal() {
        let client = Arc::new(InMemoryPlatform::new(DeploymentTopology::SelfManaged, "7.2.0"));
        let bad = ConnectionParams::new("https://mem.example.com", "amadmin", "nope", "/");
        let err = SessionManager::new(client).authenticate(&bad).await;
        assert!(matches!(err, Err(AuthenticationError::Rejected { .. })));
    }
}
