//! Activation: turning a locally tracked pending user into a real
//! identity-service account with a role grant on its primary project.
//!
//! The workflow is deliberately not transactional. Once the remote user
//! exists the operation has partially succeeded and is never rolled
//! back; later steps downgrade to warnings instead of failing the whole
//! activation.

use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::clients::keystone::{
    IdentityApi, IdentityError, RemoteProject, RemoteUser, Role, UserCreate,
};

/// Errors that abort an activation. Grant-stage failures never appear
/// here; they degrade the result instead (see [`Activation::warnings`]).
#[derive(Debug, Error)]
pub enum ActivationError {
    /// Default-domain lookup failed. Nothing was created, locally or
    /// remotely.
    #[error("Unable to look up the default domain")]
    DomainLookup(#[source] IdentityError),

    /// The identity service already has a user with this name.
    #[error("User name \"{0}\" is already used")]
    NameConflict(String),

    /// User creation failed for a reason other than a name conflict.
    /// Not retried; the operator resubmits.
    #[error("Unable to create user")]
    CreateFailed(#[source] IdentityError),
}

/// What the identity service's active API generation supports. Computed
/// once from configuration and passed in, instead of version checks
/// scattered through the workflow.
#[derive(Debug, Clone, Copy)]
pub struct IdentityCapabilities {
    pub supports_extra_attributes: bool,
    pub supports_description: bool,
    pub project_required: bool,
}

impl IdentityCapabilities {
    #[must_use]
    pub const fn from_generation(generation: u8) -> Self {
        if generation >= 3 {
            Self {
                supports_extra_attributes: true,
                supports_description: true,
                project_required: false,
            }
        } else {
            Self {
                supports_extra_attributes: false,
                supports_description: false,
                project_required: true,
            }
        }
    }
}

/// Provisioning knobs threaded into the reconciler.
#[derive(Debug, Clone)]
pub struct ProvisioningSettings {
    /// Substituted when the operator omits a password. Issuing a known
    /// default credential is intentional here, not an accident.
    pub default_password: String,

    /// Names of extra fields forwarded verbatim on user creation.
    pub extra_attributes: Vec<String>,
}

/// The local record data an activation works from.
#[derive(Debug, Clone)]
pub struct UserSnapshot {
    pub name: String,
    pub email: String,
}

/// Operator-chosen inputs for one activation.
#[derive(Debug, Clone, Default)]
pub struct ActivationRequest {
    pub project_id: Option<String>,
    pub role_id: Option<String>,
    pub password: Option<String>,
    pub description: Option<String>,
    pub enabled: bool,
    pub extra: Map<String, Value>,
}

/// Outcome of a successful (possibly degraded) activation.
#[derive(Debug, Clone)]
pub struct Activation {
    pub user: RemoteUser,
    pub warnings: Vec<String>,
}

pub struct ActivationService {
    identity: Arc<dyn IdentityApi>,
    capabilities: IdentityCapabilities,
    settings: ProvisioningSettings,
}

impl ActivationService {
    #[must_use]
    pub fn new(
        identity: Arc<dyn IdentityApi>,
        capabilities: IdentityCapabilities,
        settings: ProvisioningSettings,
    ) -> Self {
        Self {
            identity,
            capabilities,
            settings,
        }
    }

    #[must_use]
    pub const fn capabilities(&self) -> IdentityCapabilities {
        self.capabilities
    }

    /// Create (or report as duplicate) an identity-service user for the
    /// snapshot and ensure a role grant on the chosen project.
    ///
    /// "Already granted" is success. A grant that cannot be listed is
    /// assumed absent. A grant that cannot be added leaves the created
    /// user intact and surfaces as a warning.
    pub async fn activate(
        &self,
        snapshot: &UserSnapshot,
        request: ActivationRequest,
    ) -> Result<Activation, ActivationError> {
        let domain = self
            .identity
            .get_default_domain()
            .await
            .map_err(ActivationError::DomainLookup)?;

        let password = request
            .password
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.settings.default_password.clone());

        let description = if self.capabilities.supports_description {
            request.description.filter(|d| !d.is_empty())
        } else {
            None
        };

        let extra = if self.capabilities.supports_extra_attributes {
            request
                .extra
                .into_iter()
                .filter(|(key, _)| self.settings.extra_attributes.iter().any(|a| a == key))
                .collect()
        } else {
            Map::new()
        };

        let payload = UserCreate {
            name: snapshot.name.clone(),
            email: Some(snapshot.email.clone()).filter(|e| !e.is_empty()),
            description,
            password,
            enabled: request.enabled,
            domain_id: domain.id,
            project_id: request.project_id.clone(),
            extra,
        };

        info!("Creating identity user \"{}\"", payload.name);

        let user = match self.identity.user_create(&payload).await {
            Ok(user) => user,
            Err(IdentityError::Conflict(name)) => {
                return Err(ActivationError::NameConflict(name));
            }
            Err(err) => return Err(ActivationError::CreateFailed(err)),
        };

        let mut warnings = Vec::new();

        if let (Some(project_id), Some(role_id)) =
            (request.project_id.as_deref(), request.role_id.as_deref())
        {
            // The user exists now; a grant-listing failure must not fail
            // the activation. Assume no grants and carry on.
            let existing = match self.identity.roles_for_user(&user.id, project_id).await {
                Ok(roles) => roles,
                Err(err) => {
                    warn!(
                        "Unable to list role grants for user \"{}\": {err}",
                        user.name
                    );
                    Vec::new()
                }
            };

            let assigned = existing.iter().any(|role| role.id == role_id);
            if !assigned {
                if let Err(err) = self
                    .identity
                    .add_tenant_user_role(project_id, &user.id, role_id)
                    .await
                {
                    warn!("Unable to grant role to user \"{}\": {err}", user.name);
                    warnings.push("Unable to add user to primary project.".to_string());
                }
            }
        }

        Ok(Activation { user, warnings })
    }

    /// Remote project choices for the activation form. The project whose
    /// name matches the user's locally recorded project comes first;
    /// other enabled projects follow in remote-listing order; disabled
    /// projects are dropped.
    pub async fn project_choices(
        &self,
        local_project_name: Option<&str>,
    ) -> Result<Vec<RemoteProject>, IdentityError> {
        let (projects, _has_more) = self.identity.tenant_list().await?;

        let mut choices = Vec::new();
        let mut matching = None;

        for project in projects {
            if !project.enabled {
                continue;
            }
            if local_project_name == Some(project.name.as_str()) {
                matching = Some(project);
            } else {
                choices.push(project);
            }
        }

        if let Some(matching) = matching {
            choices.insert(0, matching);
        }

        Ok(choices)
    }

    /// Remote roles sorted by id, plus the id of the configured default
    /// role when it exists.
    pub async fn role_choices(&self) -> Result<(Vec<Role>, Option<String>), IdentityError> {
        let mut roles = self.identity.role_list().await?;
        roles.sort_by(|a, b| a.id.cmp(&b.id));

        let default_role_id = self
            .identity
            .get_default_role()
            .await?
            .map(|role| role.id);

        Ok((roles, default_role_id))
    }
}
