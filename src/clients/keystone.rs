use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::fmt;
use std::time::Duration;

/// Errors surfaced by the identity-service boundary.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The remote service already has a user with this name.
    #[error("User name \"{0}\" is already used")]
    Conflict(String),

    #[error("Identity service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Identity service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Domain {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteProject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
}

/// A user as reported by the identity service. Never persisted locally.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteUser {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub domain_id: Option<String>,
}

/// Payload for identity-service user creation. The password is carried
/// in the clear to the remote call and nowhere else; `Debug` redacts it.
#[derive(Clone)]
pub struct UserCreate {
    pub name: String,
    pub email: Option<String>,
    pub description: Option<String>,
    pub password: String,
    pub enabled: bool,
    pub domain_id: String,
    pub project_id: Option<String>,
    pub extra: Map<String, Value>,
}

impl fmt::Debug for UserCreate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCreate")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("description", &self.description)
            .field("password", &"<redacted>")
            .field("enabled", &self.enabled)
            .field("domain_id", &self.domain_id)
            .field("project_id", &self.project_id)
            .field("extra", &self.extra)
            .finish()
    }
}

/// The identity-service call surface the rest of the crate depends on.
/// `KeystoneClient` is the production implementation; tests script their
/// own.
#[async_trait]
pub trait IdentityApi: Send + Sync {
    async fn get_default_domain(&self) -> Result<Domain, IdentityError>;

    /// Role preselected for activation, when the configured name exists
    /// remotely.
    async fn get_default_role(&self) -> Result<Option<Role>, IdentityError>;

    async fn tenant_list(&self) -> Result<(Vec<RemoteProject>, bool), IdentityError>;

    async fn role_list(&self) -> Result<Vec<Role>, IdentityError>;

    async fn user_create(&self, payload: &UserCreate) -> Result<RemoteUser, IdentityError>;

    async fn roles_for_user(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<Vec<Role>, IdentityError>;

    async fn add_tenant_user_role(
        &self,
        project_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> Result<(), IdentityError>;
}

#[derive(Debug, Deserialize)]
struct DomainsResponse {
    domains: Vec<Domain>,
}

#[derive(Debug, Deserialize)]
struct RolesResponse {
    roles: Vec<Role>,
}

#[derive(Debug, Deserialize)]
struct ProjectsResponse {
    projects: Vec<RemoteProject>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    user: RemoteUser,
}

#[derive(Clone)]
pub struct KeystoneClient {
    client: Client,
    base_url: String,
    token: String,
    domain_name: String,
    default_role: String,
}

impl KeystoneClient {
    /// Build a client with a bounded request timeout. A hung identity
    /// service must not block an operator request indefinitely.
    pub fn new(config: &crate::config::KeystoneConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent("Gatepass/0.1")
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build identity HTTP client: {e}"))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            domain_name: config.domain_name.clone(),
            default_role: config.default_role.clone(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, IdentityError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header("X-Auth-Token", &self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(IdentityError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl IdentityApi for KeystoneClient {
    async fn get_default_domain(&self) -> Result<Domain, IdentityError> {
        let path = format!("/v3/domains?name={}", urlencoding::encode(&self.domain_name));
        let response: DomainsResponse = self.get_json(&path).await?;

        response
            .domains
            .into_iter()
            .next()
            .ok_or_else(|| IdentityError::Api {
                status: 404,
                message: format!("Domain \"{}\" not found", self.domain_name),
            })
    }

    async fn get_default_role(&self) -> Result<Option<Role>, IdentityError> {
        let roles = self.role_list().await?;
        Ok(roles.into_iter().find(|r| r.name == self.default_role))
    }

    async fn tenant_list(&self) -> Result<(Vec<RemoteProject>, bool), IdentityError> {
        let response: ProjectsResponse = self.get_json("/v3/projects").await?;
        // Keystone returns the full listing; no server-side paging here.
        Ok((response.projects, false))
    }

    async fn role_list(&self) -> Result<Vec<Role>, IdentityError> {
        let response: RolesResponse = self.get_json("/v3/roles").await?;
        Ok(response.roles)
    }

    async fn user_create(&self, payload: &UserCreate) -> Result<RemoteUser, IdentityError> {
        let mut user = Map::new();
        user.insert("name".to_string(), json!(payload.name));
        user.insert("password".to_string(), json!(payload.password));
        user.insert("enabled".to_string(), json!(payload.enabled));
        user.insert("domain_id".to_string(), json!(payload.domain_id));
        if let Some(email) = &payload.email {
            user.insert("email".to_string(), json!(email));
        }
        if let Some(description) = &payload.description {
            user.insert("description".to_string(), json!(description));
        }
        if let Some(project_id) = &payload.project_id {
            user.insert("default_project_id".to_string(), json!(project_id));
        }
        for (key, value) in &payload.extra {
            user.insert(key.clone(), value.clone());
        }

        let url = format!("{}/v3/users", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("X-Auth-Token", &self.token)
            .json(&json!({ "user": user }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            return Err(IdentityError::Conflict(payload.name.clone()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(IdentityError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let response: UserResponse = response.json().await?;
        Ok(response.user)
    }

    async fn roles_for_user(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<Vec<Role>, IdentityError> {
        let path = format!("/v3/projects/{project_id}/users/{user_id}/roles");
        let response: RolesResponse = self.get_json(&path).await?;
        Ok(response.roles)
    }

    async fn add_tenant_user_role(
        &self,
        project_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> Result<(), IdentityError> {
        let url = format!(
            "{}/v3/projects/{project_id}/users/{user_id}/roles/{role_id}",
            self.base_url
        );
        let response = self
            .client
            .put(&url)
            .header("X-Auth-Token", &self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(IdentityError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_create_debug_redacts_password() {
        let payload = UserCreate {
            name: "alice".to_string(),
            email: None,
            description: None,
            password: "hunter2".to_string(),
            enabled: true,
            domain_id: "default".to_string(),
            project_id: None,
            extra: Map::new(),
        };

        let printed = format!("{payload:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
    }
}
