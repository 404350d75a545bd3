//! In-memory platform backend for testing.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::types::{
    AdminToken, AuthOutcome, ConnectionParams, DeploymentTopology, EmailTemplate, Journey, Node,
    NodeId, NodeSummary, NodeType, Script, ScriptId, SessionHandle,
};

use super::{AuthenticationError, PlatformClient, TokenExchangeError};

/// Error type for the in-memory backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InMemoryError {
    /// The shared state lock was poisoned by a panicking test.
    #[error("platform state lock poisoned")]
    Poisoned,
}

#[derive(Debug, Default)]
struct PlatformState {
    journeys: BTreeMap<(String, String), Journey>,
    nodes: BTreeMap<(String, NodeId), Node>,
    scripts: BTreeMap<(String, ScriptId), Script>,
    templates: BTreeMap<String, EmailTemplate>,
}

/// In-memory platform for tests.
///
/// Uses `BTreeMap`s for deterministic iteration order; mutation goes
/// through a mutex so engines can hold the backend behind `Arc`.
#[derive(Debug)]
pub struct InMemoryPlatform {
    topology: DeploymentTopology,
    platform_version: String,
    user: String,
    password: String,
    admin_token_available: bool,
    state: Mutex<PlatformState>,
}

impl InMemoryPlatform {
    /// Create a platform that accepts the given credentials.
    pub fn new(topology: DeploymentTopology, platform_version: impl Into<String>) -> Self {
        Self {
            topology,
            platform_version: platform_version.into(),
            user: "amadmin".to_string(),
            password: "password".to_string(),
            admin_token_available: true,
            state: Mutex::new(PlatformState::default()),
        }
    }

    /// Override the accepted credentials.
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Make the admin-token exchange fail, simulating a degraded session.
    pub fn without_admin_token(mut self) -> Self {
        self.admin_token_available = false;
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, PlatformState>, InMemoryError> {
        self.state.lock().map_err(|_| InMemoryError::Poisoned)
    }

    /// Seed a journey.
    pub fn add_journey(&self, journey: Journey) {
        if let Ok(mut state) = self.lock() {
            state
                .journeys
                .insert((journey.realm.clone(), journey.name.clone()), journey);
        }
    }

    /// Seed a node.
    pub fn add_node(&self, realm: &str, node: Node) {
        if let Ok(mut state) = self.lock() {
            state.nodes.insert((realm.to_string(), node.id), node);
        }
    }

    /// Seed a script.
    pub fn add_script(&self, realm: &str, script: Script) {
        if let Ok(mut state) = self.lock() {
            state.scripts.insert((realm.to_string(), script.id), script);
        }
    }

    /// Seed an email template.
    pub fn add_template(&self, template: EmailTemplate) {
        if let Ok(mut state) = self.lock() {
            state.templates.insert(template.id.clone(), template);
        }
    }

    /// Snapshot a journey, if present.
    pub fn journey(&self, realm: &str, name: &str) -> Option<Journey> {
        self.lock()
            .ok()?
            .journeys
            .get(&(realm.to_string(), name.to_string()))
            .cloned()
    }

    /// Snapshot a node, if present.
    pub fn node(&self, realm: &str, id: &NodeId) -> Option<Node> {
        self.lock().ok()?.nodes.get(&(realm.to_string(), *id)).cloned()
    }

    /// Snapshot a script, if present.
    pub fn script(&self, realm: &str, id: &ScriptId) -> Option<Script> {
        self.lock().ok()?.scripts.get(&(realm.to_string(), *id)).cloned()
    }

    /// All scripts in a realm.
    pub fn scripts_in(&self, realm: &str) -> Vec<Script> {
        match self.lock() {
            Ok(state) => state
                .scripts
                .iter()
                .filter(|((r, _), _)| r == realm)
                .map(|(_, s)| s.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Number of node instances in a realm.
    pub fn node_count(&self, realm: &str) -> usize {
        match self.lock() {
            Ok(state) => state.nodes.keys().filter(|(r, _)| r == realm).count(),
            Err(_) => 0,
        }
    }
}

#[async_trait]
impl PlatformClient for InMemoryPlatform {
    type Error = InMemoryError;

    async fn authenticate(
        &self,
        params: &ConnectionParams,
    ) -> Result<AuthOutcome, AuthenticationError> {
        if params.user != self.user || params.password != self.password {
            return Err(AuthenticationError::Rejected {
                user: params.user.clone(),
                reason: "invalid credentials".to_string(),
            });
        }
        Ok(AuthOutcome {
            handle: SessionHandle::new(format!("mem-session-{}", params.user)),
            topology: self.topology,
            platform_version: self.platform_version.clone(),
        })
    }

    async fn exchange_admin_token(
        &self,
        _handle: &SessionHandle,
    ) -> Result<AdminToken, TokenExchangeError> {
        if !self.admin_token_available {
            return Err(TokenExchangeError {
                reason: "admin client not provisioned".to_string(),
            });
        }
        Ok(AdminToken::new("mem-admin-token"))
    }

    async fn list_journeys(
        &self,
        _handle: &SessionHandle,
        realm: &str,
    ) -> Result<Vec<Journey>, Self::Error> {
        Ok(self
            .lock()?
            .journeys
            .iter()
            .filter(|((r, _), _)| r == realm)
            .map(|(_, j)| j.clone())
            .collect())
    }

    async fn fetch_journey(
        &self,
        _handle: &SessionHandle,
        realm: &str,
        name: &str,
    ) -> Result<Option<Journey>, Self::Error> {
        Ok(self
            .lock()?
            .journeys
            .get(&(realm.to_string(), name.to_string()))
            .cloned())
    }

    async fn fetch_node(
        &self,
        _handle: &SessionHandle,
        realm: &str,
        id: &NodeId,
        node_type: &NodeType,
    ) -> Result<Option<Node>, Self::Error> {
        Ok(self
            .lock()?
            .nodes
            .get(&(realm.to_string(), *id))
            .filter(|n| &n.node_type == node_type)
            .cloned())
    }

    async fn list_nodes(
        &self,
        _handle: &SessionHandle,
        realm: &str,
    ) -> Result<Vec<NodeSummary>, Self::Error> {
        Ok(self
            .lock()?
            .nodes
            .iter()
            .filter(|((r, _), _)| r == realm)
            .map(|(_, n)| NodeSummary {
                id: n.id,
                node_type: n.node_type.clone(),
            })
            .collect())
    }

    async fn fetch_script(
        &self,
        _handle: &SessionHandle,
        realm: &str,
        id: &ScriptId,
    ) -> Result<Option<Script>, Self::Error> {
        Ok(self.lock()?.scripts.get(&(realm.to_string(), *id)).cloned())
    }

    async fn list_scripts(
        &self,
        _handle: &SessionHandle,
        realm: &str,
    ) -> Result<Vec<Script>, Self::Error> {
        Ok(self
            .lock()?
            .scripts
            .iter()
            .filter(|((r, _), _)| r == realm)
            .map(|(_, s)| s.clone())
            .collect())
    }

    async fn fetch_email_template(
        &self,
        _admin: &AdminToken,
        id: &str,
    ) -> Result<Option<EmailTemplate>, Self::Error> {
        Ok(self.lock()?.templates.get(id).cloned())
    }

    async fn put_journey(
        &self,
        _handle: &SessionHandle,
        realm: &str,
        journey: &Journey,
    ) -> Result<(), Self::Error> {
        self.lock()?
            .journeys
            .insert((realm.to_string(), journey.name.clone()), journey.clone());
        Ok(())
    }

    async fn put_node(
        &self,
        _handle: &SessionHandle,
        realm: &str,
        node: &Node,
    ) -> Result<(), Self::Error> {
        self.lock()?.nodes.insert((realm.to_string(), node.id), node.clone());
        Ok(())
    }

    async fn put_script(
        &self,
        _handle: &SessionHandle,
        realm: &str,
        script: &Script,
    ) -> Result<(), Self::Error> {
        self.lock()?
            .scripts
            .insert((realm.to_string(), script.id), script.clone());
        Ok(())
    }

    async fn put_email_template(
        &self,
        _admin: &AdminToken,
        template: &EmailTemplate,
    ) -> Result<(), Self::Error> {
        self.lock()?.templates.insert(template.id.clone(), template.clone());
        Ok(())
    }

    async fn delete_node(
        &self,
        _handle: &SessionHandle,
        realm: &str,
        id: &NodeId,
        _node_type: &NodeType,
    ) -> Result<(), Self::Error> {
        self.lock()?.nodes.remove(&(realm.to_string(), *id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_authenticate_checks_credentials() {
        let platform = InMemoryPlatform::new(DeploymentTopology::SelfManaged, "7.2.0");
        let good = ConnectionParams::new("https://mem", "amadmin", "password", "/");
        assert!(platform.authenticate(&good).await.is_ok());

        let bad = ConnectionParams::new("https://mem", "amadmin", "wrong", "/");
        assert!(matches!(
            platform.authenticate(&bad).await,
            Err(AuthenticationError::Rejected { .. })
        ));
    }

    #[tokio::test]
    async fn test_admin_token_can_be_disabled() {
        let platform =
            InMemoryPlatform::new(DeploymentTopology::ManagedCloud, "7.2.0").without_admin_token();
        let handle = SessionHandle::new("s");
        assert!(platform.exchange_admin_token(&handle).await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_node_requires_matching_type() {
        let platform = InMemoryPlatform::new(DeploymentTopology::SelfManaged, "7.2.0");
        let node = Node::new(NodeId::mint(), NodeType::from("UsernameCollector"), "collect");
        let id = node.id;
        platform.add_node("/", node);

        let handle = SessionHandle::new("s");
        let hit = platform
            .fetch_node(&handle, "/", &id, &NodeType::from("UsernameCollector"))
            .await
            .unwrap();
        assert!(hit.is_some());

        let miss = platform
            .fetch_node(&handle, "/", &id, &NodeType::from("PasswordCollector"))
            .await
            .unwrap();
        assert!(miss.is_none());
    }
}
