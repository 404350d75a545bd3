//! Platform-facing contract types: topology, credentials, session handles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Deployment topology of the identity platform.
///
/// The topology decides the authentication flow and whether a secondary
/// administrative token is required for configuration-store artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeploymentTopology {
    /// Platform installed and operated directly by the customer.
    SelfManaged,
    /// Platform running in customer-operated containers.
    Containerized,
    /// Vendor-managed cloud tenant.
    ManagedCloud,
}

impl DeploymentTopology {
    /// Parse a topology tag from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "self-managed" | "classic" => Some(Self::SelfManaged),
            "containerized" => Some(Self::Containerized),
            "managed-cloud" | "cloud" => Some(Self::ManagedCloud),
            _ => None,
        }
    }
}

impl fmt::Display for DeploymentTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelfManaged => write!(f, "self-managed"),
            Self::Containerized => write!(f, "containerized"),
            Self::ManagedCloud => write!(f, "managed-cloud"),
        }
    }
}

/// Connection parameters for a single invocation.
///
/// Immutable once built; handlers receive it by reference instead of
/// consulting shared mutable flags.
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    /// Base URL of the platform.
    pub host: String,
    /// Administrative user name.
    pub user: String,
    /// Administrative password.
    pub password: String,
    /// Realm to operate in.
    pub realm: String,
}

impl ConnectionParams {
    /// Create connection parameters.
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        realm: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: password.into(),
            realm: realm.into(),
        }
    }
}

/// Opaque session credential returned by authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle(String);

impl SessionHandle {
    /// Wrap a raw session credential.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw credential value.
    pub fn secret(&self) -> &str {
        &self.0
    }
}

/// Opaque administrative bearer token for configuration-store artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminToken(String);

impl AdminToken {
    /// Wrap a raw bearer token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token value.
    pub fn secret(&self) -> &str {
        &self.0
    }
}

/// Result of a successful authentication handshake.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    /// Session credential.
    pub handle: SessionHandle,
    /// Detected deployment topology.
    pub topology: DeploymentTopology,
    /// Platform version string, e.g. `7.2.0`.
    pub platform_version: String,
}
