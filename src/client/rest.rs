//! REST platform backend.
//!
//! Speaks the identity platform's administrative REST surface. One
//! instance serves one invocation: the cookie name discovered during
//! authentication is cached for the data calls that follow.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::types::{
    AdminToken, ArtifactRef, AuthOutcome, ConnectionParams, DeploymentTopology, EmailTemplate,
    InnerNodeRef, Journey, MemberNode, Node, NodeId, NodeSummary, NodeType, Script, ScriptId,
    ScriptLanguage, SessionHandle,
};

use super::{AuthenticationError, PlatformClient, TokenExchangeError};

const API_VERSION: &str = "resource=1.0";
const CLOUD_ADMIN_CLIENT: &str = "idm-admin-client";
const CONTAINER_ADMIN_CLIENT: &str = "idm-admin-ui";

/// Error type for the REST backend.
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Unexpected HTTP status.
    #[error("{url} returned {status}")]
    Status {
        /// Request URL.
        url: String,
        /// Response status.
        status: StatusCode,
    },
    /// Response payload did not match the expected shape.
    #[error("decode error at {url}: {reason}")]
    Decode {
        /// Request URL.
        url: String,
        /// What was wrong.
        reason: String,
    },
    /// A URL could not be built.
    #[error("invalid url: {0}")]
    Url(String),
    /// No authenticated session state is cached.
    #[error("no session established on this client")]
    NoSession,
}

/// REST platform backend over reqwest.
pub struct RestPlatform {
    http: reqwest::Client,
    base: Url,
    cookie_name: Mutex<Option<String>>,
}

impl RestPlatform {
    /// Create a backend for a platform base URL.
    pub fn new(host: &str) -> Result<Self, RestError> {
        let base = Url::parse(host).map_err(|e| RestError::Url(e.to_string()))?;
        // Redirects are classification signals during topology probing,
        // so the client must surface them instead of following.
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            http,
            base,
            cookie_name: Mutex::new(None),
        })
    }

    /// Realm path segment: `/realms/root` plus `/realms/<name>` for
    /// non-root realms.
    fn realm_path(realm: &str) -> String {
        let realm = realm.strip_prefix('/').unwrap_or(realm);
        if realm.is_empty() {
            "/realms/root".to_string()
        } else {
            format!("/realms/root/realms/{realm}")
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, RestError> {
        self.base
            .join(path)
            .map_err(|e| RestError::Url(e.to_string()))
    }

    fn cookie_header(&self, handle: &SessionHandle) -> Result<String, RestError> {
        let name = self
            .cookie_name
            .lock()
            .map_err(|_| RestError::NoSession)?
            .clone()
            .ok_or(RestError::NoSession)?;
        Ok(format!("{}={}", name, handle.secret()))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        handle: &SessionHandle,
        path: &str,
    ) -> Result<Option<T>, RestError> {
        let url = self.endpoint(path)?;
        let response = self
            .http
            .get(url.clone())
            .header("Accept-API-Version", API_VERSION)
            .header("Cookie", self.cookie_header(handle)?)
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json::<T>().await?)),
            status => Err(RestError::Status {
                url: url.to_string(),
                status,
            }),
        }
    }

    async fn put_json<T: Serialize>(
        &self,
        handle: &SessionHandle,
        path: &str,
        body: &T,
    ) -> Result<(), RestError> {
        let url = self.endpoint(path)?;
        let response = self
            .http
            .put(url.clone())
            .header("Accept-API-Version", API_VERSION)
            .header("Cookie", self.cookie_header(handle)?)
            .json(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RestError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }
        Ok(())
    }

    /// Probe the OAuth authorize endpoint to classify the deployment.
    ///
    /// A redirect for the cloud admin client means a managed-cloud
    /// tenant; a redirect for the container admin client means a
    /// containerized install; neither means self-managed.
    async fn detect_topology(&self, handle: &SessionHandle) -> Result<DeploymentTopology, RestError> {
        for (client_id, topology) in [
            (CLOUD_ADMIN_CLIENT, DeploymentTopology::ManagedCloud),
            (CONTAINER_ADMIN_CLIENT, DeploymentTopology::Containerized),
        ] {
            let url = self.endpoint("/oauth2/authorize")?;
            let response = self
                .http
                .post(url)
                .header("Cookie", self.cookie_header(handle)?)
                .form(&[
                    ("client_id", client_id),
                    ("response_type", "code"),
                    ("decision", "allow"),
                ])
                .send()
                .await?;
            if response.status().is_redirection() {
                debug!(client_id, %topology, "admin client responded, topology detected");
                return Ok(topology);
            }
        }
        Ok(DeploymentTopology::SelfManaged)
    }
}

// ── Wire shapes ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ServerInfo {
    #[serde(rename = "cookieName")]
    cookie_name: String,
}

#[derive(Deserialize)]
struct VersionInfo {
    version: String,
}

#[derive(Deserialize)]
struct AuthenticateResponse {
    #[serde(rename = "tokenId")]
    token_id: String,
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct QueryResult<T> {
    result: Vec<T>,
}

#[derive(Serialize, Deserialize)]
struct WireMember {
    #[serde(rename = "nodeType")]
    node_type: String,
    #[serde(rename = "displayName")]
    display_name: String,
}

#[derive(Serialize, Deserialize)]
struct WireTree {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "entryNodeId")]
    entry_node_id: String,
    enabled: bool,
    nodes: BTreeMap<String, WireMember>,
}

impl WireTree {
    fn into_journey(self, realm: &str) -> Result<Journey, String> {
        let root = NodeId::parse(&self.entry_node_id).map_err(|e| e.to_string())?;
        let mut journey = Journey::new(self.id, realm, root);
        journey.enabled = self.enabled;
        for (id, member) in self.nodes {
            let id = NodeId::parse(&id).map_err(|e| e.to_string())?;
            journey.members.insert(
                id,
                MemberNode {
                    node_type: NodeType::new(member.node_type),
                    display_name: member.display_name,
                },
            );
        }
        Ok(journey)
    }

    fn from_journey(journey: &Journey) -> Self {
        Self {
            id: journey.name.clone(),
            entry_node_id: journey.root.to_string(),
            enabled: journey.enabled,
            nodes: journey
                .members
                .iter()
                .map(|(id, m)| {
                    (
                        id.to_string(),
                        WireMember {
                            node_type: m.node_type.to_string(),
                            display_name: m.display_name.clone(),
                        },
                    )
                })
                .collect(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireInnerRef {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "nodeType")]
    node_type: String,
}

#[derive(Serialize, Deserialize)]
struct WireNode {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_type")]
    node_type: WireTypeRef,
    #[serde(rename = "displayName", default)]
    display_name: String,
    #[serde(default)]
    connections: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    script: Option<String>,
    #[serde(rename = "emailTemplateName", default, skip_serializing_if = "Option::is_none")]
    email_template_name: Option<String>,
    #[serde(rename = "tree", default, skip_serializing_if = "Option::is_none")]
    inner_tree: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    nodes: Vec<WireInnerRef>,
    #[serde(flatten)]
    config: BTreeMap<String, serde_json::Value>,
}

#[derive(Serialize, Deserialize)]
struct WireTypeRef {
    #[serde(rename = "_id")]
    id: String,
}

impl WireNode {
    fn into_node(self) -> Result<Node, String> {
        let id = NodeId::parse(&self.id).map_err(|e| e.to_string())?;
        let mut node = Node::new(id, NodeType::new(self.node_type.id), self.display_name);
        for (label, target) in self.connections {
            let target = NodeId::parse(&target).map_err(|e| e.to_string())?;
            node.outcomes.insert(label, target);
        }
        if let Some(script) = self.script {
            let script = ScriptId::parse(&script).map_err(|e| e.to_string())?;
            node.artifact = Some(ArtifactRef::Script(script));
        } else if let Some(template) = self.email_template_name {
            node.artifact = Some(ArtifactRef::EmailTemplate(template));
        } else if let Some(tree) = self.inner_tree {
            node.artifact = Some(ArtifactRef::InnerJourney(tree));
        }
        for inner in self.nodes {
            node.inner.push(InnerNodeRef {
                id: NodeId::parse(&inner.id).map_err(|e| e.to_string())?,
                node_type: NodeType::new(inner.node_type),
            });
        }
        node.config = self.config;
        Ok(node)
    }

    fn from_node(node: &Node) -> Self {
        let (script, email_template_name, inner_tree) = match &node.artifact {
            Some(ArtifactRef::Script(id)) => (Some(id.to_string()), None, None),
            Some(ArtifactRef::EmailTemplate(id)) => (None, Some(id.clone()), None),
            Some(ArtifactRef::InnerJourney(name)) => (None, None, Some(name.clone())),
            None => (None, None, None),
        };
        Self {
            id: node.id.to_string(),
            node_type: WireTypeRef {
                id: node.node_type.to_string(),
            },
            display_name: node.display_name.clone(),
            connections: node
                .outcomes
                .iter()
                .map(|(label, target)| (label.clone(), target.to_string()))
                .collect(),
            script,
            email_template_name,
            inner_tree,
            nodes: node
                .inner
                .iter()
                .map(|r| WireInnerRef {
                    id: r.id.to_string(),
                    node_type: r.node_type.to_string(),
                })
                .collect(),
            config: node.config.clone(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireScript {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    language: String,
    script: String,
    #[serde(default)]
    context: BTreeMap<String, String>,
}

impl WireScript {
    fn into_script(self) -> Result<Script, String> {
        let id = ScriptId::parse(&self.id).map_err(|e| e.to_string())?;
        let language = ScriptLanguage::parse(&self.language)
            .ok_or_else(|| format!("unknown script language {}", self.language))?;
        let mut script = Script::new(id, self.name, language, self.script);
        script.description = self.description;
        script.bindings = self.context;
        Ok(script)
    }

    fn from_script(script: &Script) -> Self {
        Self {
            id: script.id.to_string(),
            name: script.name.clone(),
            description: script.description.clone(),
            language: script.language.to_string(),
            script: script.source.clone(),
            context: script.bindings.clone(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireTemplate {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    #[serde(default)]
    subject: BTreeMap<String, String>,
    #[serde(default)]
    message: BTreeMap<String, String>,
}

// ── Trait implementation ─────────────────────────────────────────────────

#[async_trait]
impl PlatformClient for RestPlatform {
    type Error = RestError;

    async fn authenticate(
        &self,
        params: &ConnectionParams,
    ) -> Result<AuthOutcome, AuthenticationError> {
        let unreachable = |reason: String| AuthenticationError::Unreachable {
            host: params.host.clone(),
            reason,
        };

        let info_url = self
            .endpoint("/json/serverinfo/*")
            .map_err(|e| unreachable(e.to_string()))?;
        let info: ServerInfo = self
            .http
            .get(info_url)
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?
            .json()
            .await
            .map_err(|e| unreachable(e.to_string()))?;
        if let Ok(mut name) = self.cookie_name.lock() {
            *name = Some(info.cookie_name);
        }

        let auth_url = self
            .endpoint(&format!(
                "/json{}/authenticate",
                Self::realm_path(&params.realm)
            ))
            .map_err(|e| unreachable(e.to_string()))?;
        let response = self
            .http
            .post(auth_url)
            .header("Accept-API-Version", API_VERSION)
            .header("X-OpenAM-Username", &params.user)
            .header("X-OpenAM-Password", &params.password)
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(AuthenticationError::Rejected {
                user: params.user.clone(),
                reason: "invalid credentials".to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(unreachable(format!(
                "authenticate returned {}",
                response.status()
            )));
        }
        let auth: AuthenticateResponse = response
            .json()
            .await
            .map_err(|e| unreachable(e.to_string()))?;
        let handle = SessionHandle::new(auth.token_id);

        let version: VersionInfo = self
            .get_json(&handle, "/json/serverinfo/version")
            .await
            .map_err(|e| unreachable(e.to_string()))?
            .ok_or_else(|| unreachable("no version info".to_string()))?;
        let topology = self
            .detect_topology(&handle)
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        Ok(AuthOutcome {
            handle,
            topology,
            platform_version: version.version,
        })
    }

    async fn exchange_admin_token(
        &self,
        handle: &SessionHandle,
    ) -> Result<AdminToken, TokenExchangeError> {
        let fail = |reason: String| TokenExchangeError { reason };
        let url = self
            .endpoint("/oauth2/access_token")
            .map_err(|e| fail(e.to_string()))?;
        let cookie = self
            .cookie_header(handle)
            .map_err(|e| fail(e.to_string()))?;
        let response = self
            .http
            .post(url)
            .header("Cookie", cookie)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", CLOUD_ADMIN_CLIENT),
                ("scope", "fr:idm:*"),
            ])
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;
        if !response.status().is_success() {
            return Err(fail(format!("token endpoint returned {}", response.status())));
        }
        let token: AccessTokenResponse =
            response.json().await.map_err(|e| fail(e.to_string()))?;
        Ok(AdminToken::new(token.access_token))
    }

    async fn list_journeys(
        &self,
        handle: &SessionHandle,
        realm: &str,
    ) -> Result<Vec<Journey>, Self::Error> {
        let path = format!(
            "/json{}/realm-config/authentication/authenticationtrees/trees?_queryFilter=true",
            Self::realm_path(realm)
        );
        let result: QueryResult<WireTree> = self
            .get_json(handle, &path)
            .await?
            .ok_or_else(|| RestError::Decode {
                url: path.clone(),
                reason: "query endpoint returned 404".to_string(),
            })?;
        result
            .result
            .into_iter()
            .map(|tree| {
                tree.into_journey(realm).map_err(|reason| RestError::Decode {
                    url: path.clone(),
                    reason,
                })
            })
            .collect()
    }

    async fn fetch_journey(
        &self,
        handle: &SessionHandle,
        realm: &str,
        name: &str,
    ) -> Result<Option<Journey>, Self::Error> {
        let path = format!(
            "/json{}/realm-config/authentication/authenticationtrees/trees/{name}",
            Self::realm_path(realm)
        );
        match self.get_json::<WireTree>(handle, &path).await? {
            None => Ok(None),
            Some(tree) => tree
                .into_journey(realm)
                .map(Some)
                .map_err(|reason| RestError::Decode { url: path, reason }),
        }
    }

    async fn fetch_node(
        &self,
        handle: &SessionHandle,
        realm: &str,
        id: &NodeId,
        node_type: &NodeType,
    ) -> Result<Option<Node>, Self::Error> {
        let path = format!(
            "/json{}/realm-config/authentication/authenticationtrees/nodes/{node_type}/{id}",
            Self::realm_path(realm)
        );
        match self.get_json::<WireNode>(handle, &path).await? {
            None => Ok(None),
            Some(node) => node
                .into_node()
                .map(Some)
                .map_err(|reason| RestError::Decode { url: path, reason }),
        }
    }

    async fn list_nodes(
        &self,
        handle: &SessionHandle,
        realm: &str,
    ) -> Result<Vec<NodeSummary>, Self::Error> {
        let path = format!(
            "/json{}/realm-config/authentication/authenticationtrees/nodes?_action=nextdescendents",
            Self::realm_path(realm)
        );
        let url = self.endpoint(&path)?;
        let response = self
            .http
            .post(url.clone())
            .header("Accept-API-Version", API_VERSION)
            .header("Cookie", self.cookie_header(handle)?)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RestError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }
        let result: QueryResult<WireNode> = response.json().await?;
        result
            .result
            .into_iter()
            .map(|node| {
                let id = NodeId::parse(&node.id).map_err(|e| RestError::Decode {
                    url: path.clone(),
                    reason: e.to_string(),
                })?;
                Ok(NodeSummary {
                    id,
                    node_type: NodeType::new(node.node_type.id),
                })
            })
            .collect()
    }

    async fn fetch_script(
        &self,
        handle: &SessionHandle,
        realm: &str,
        id: &ScriptId,
    ) -> Result<Option<Script>, Self::Error> {
        let path = format!("/json{}/scripts/{id}", Self::realm_path(realm));
        match self.get_json::<WireScript>(handle, &path).await? {
            None => Ok(None),
            Some(script) => script
                .into_script()
                .map(Some)
                .map_err(|reason| RestError::Decode { url: path, reason }),
        }
    }

    async fn list_scripts(
        &self,
        handle: &SessionHandle,
        realm: &str,
    ) -> Result<Vec<Script>, Self::Error> {
        let path = format!("/json{}/scripts?_queryFilter=true", Self::realm_path(realm));
        let result: QueryResult<WireScript> = self
            .get_json(handle, &path)
            .await?
            .ok_or_else(|| RestError::Decode {
                url: path.clone(),
                reason: "query endpoint returned 404".to_string(),
            })?;
        result
            .result
            .into_iter()
            .map(|script| {
                script.into_script().map_err(|reason| RestError::Decode {
                    url: path.clone(),
                    reason,
                })
            })
            .collect()
    }

    async fn fetch_email_template(
        &self,
        admin: &AdminToken,
        id: &str,
    ) -> Result<Option<EmailTemplate>, Self::Error> {
        let url = self.endpoint(&format!("/openidm/config/emailTemplate/{id}"))?;
        let response = self
            .http
            .get(url.clone())
            .bearer_auth(admin.secret())
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let wire: WireTemplate = response.json().await?;
                Ok(Some(EmailTemplate {
                    id: wire.id,
                    name: wire.name,
                    subject: wire.subject,
                    message: wire.message,
                }))
            }
            status => Err(RestError::Status {
                url: url.to_string(),
                status,
            }),
        }
    }

    async fn put_journey(
        &self,
        handle: &SessionHandle,
        realm: &str,
        journey: &Journey,
    ) -> Result<(), Self::Error> {
        let path = format!(
            "/json{}/realm-config/authentication/authenticationtrees/trees/{}",
            Self::realm_path(realm),
            journey.name
        );
        self.put_json(handle, &path, &WireTree::from_journey(journey)).await
    }

    async fn put_node(
        &self,
        handle: &SessionHandle,
        realm: &str,
        node: &Node,
    ) -> Result<(), Self::Error> {
        let path = format!(
            "/json{}/realm-config/authentication/authenticationtrees/nodes/{}/{}",
            Self::realm_path(realm),
            node.node_type,
            node.id
        );
        self.put_json(handle, &path, &WireNode::from_node(node)).await
    }

    async fn put_script(
        &self,
        handle: &SessionHandle,
        realm: &str,
        script: &Script,
    ) -> Result<(), Self::Error> {
        let path = format!("/json{}/scripts/{}", Self::realm_path(realm), script.id);
        self.put_json(handle, &path, &WireScript::from_script(script)).await
    }

    async fn put_email_template(
        &self,
        admin: &AdminToken,
        template: &EmailTemplate,
    ) -> Result<(), Self::Error> {
        let url = self.endpoint(&format!("/openidm/config/emailTemplate/{}", template.id))?;
        let wire = WireTemplate {
            id: template.id.clone(),
            name: template.name.clone(),
            subject: template.subject.clone(),
            message: template.message.clone(),
        };
        let response = self
            .http
            .put(url.clone())
            .bearer_auth(admin.secret())
            .json(&wire)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RestError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }
        Ok(())
    }

    async fn delete_node(
        &self,
        handle: &SessionHandle,
        realm: &str,
        id: &NodeId,
        node_type: &NodeType,
    ) -> Result<(), Self::Error> {
        let path = format!(
            "/json{}/realm-config/authentication/authenticationtrees/nodes/{node_type}/{id}",
            Self::realm_path(realm)
        );
        let url = self.endpoint(&path)?;
        let response = self
            .http
            .delete(url.clone())
            .header("Accept-API-Version", API_VERSION)
            .header("Cookie", self.cookie_header(handle)?)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RestError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realm_path_root_and_named() {
        assert_eq!(RestPlatform::realm_path("/"), "/realms/root");
        assert_eq!(
            RestPlatform::realm_path("/customers"),
            "/realms/root/realms/customers"
        );
        assert_eq!(
            RestPlatform::realm_path("customers"),
            "/realms/root/realms/customers"
        );
    }

    #[test]
    fn test_wire_tree_round_trip() {
        let root = NodeId::mint();
        let journey = Journey::new("Login", "/", root).with_member(
            root,
            NodeType::from("UsernameCollector"),
            "collect",
        );
        let wire = WireTree::from_journey(&journey);
        let back = wire.into_journey("/").unwrap();
        assert_eq!(back, journey);
    }

    #[test]
    fn test_wire_node_round_trip() {
        let id = NodeId::mint();
        let target = NodeId::mint();
        let node = Node::new(id, NodeType::from("ScriptedDecision"), "check")
            .with_outcome("true", target)
            .with_artifact(ArtifactRef::Script(ScriptId::mint()));
        let wire = WireNode::from_node(&node);
        let back = wire.into_node().unwrap();
        assert_eq!(back, node);
    }
}
