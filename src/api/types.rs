use serde::{Deserialize, Serialize};

use crate::clients::keystone::{RemoteProject, RemoteUser, Role};
use crate::db::User;
use crate::entities::projects;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Local user record as exposed to operators. The stored credential is
/// deliberately absent.
#[derive(Debug, Serialize)]
pub struct UserDto {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub idp: String,
    pub cn: Option<String>,
    pub source: Option<String>,
    pub duration: Option<i32>,
    pub project: Option<i32>,
    pub created: String,
    pub updated: String,
}

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            idp: user.idp,
            cn: user.cn,
            source: user.source,
            duration: user.duration,
            project: user.project,
            created: user.created,
            updated: user.updated,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectDto {
    pub id: i32,
    pub name: String,
    pub os_id: String,
    pub start: String,
    pub state: Option<i32>,
    pub remaining: Option<f64>,
    pub last_update: String,
}

impl From<projects::Model> for ProjectDto {
    fn from(project: projects::Model) -> Self {
        Self {
            id: project.id,
            name: project.name,
            os_id: project.os_id,
            start: project.start,
            state: project.state,
            remaining: project.remaining,
            last_update: project.last_update,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RemoteUserDto {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub description: Option<String>,
    pub enabled: bool,
    pub domain_id: Option<String>,
}

impl From<RemoteUser> for RemoteUserDto {
    fn from(user: RemoteUser) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            description: user.description,
            enabled: user.enabled,
            domain_id: user.domain_id,
        }
    }
}

/// Activation result: the created identity user plus any non-fatal
/// warnings from the grant stage.
#[derive(Debug, Serialize)]
pub struct ActivationDto {
    pub user: RemoteUserDto,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ProjectChoiceDto {
    pub id: String,
    pub name: String,
}

impl From<RemoteProject> for ProjectChoiceDto {
    fn from(project: RemoteProject) -> Self {
        Self {
            id: project.id,
            name: project.name,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RoleDto {
    pub id: String,
    pub name: String,
}

impl From<Role> for RoleDto {
    fn from(role: Role) -> Self {
        Self {
            id: role.id,
            name: role.name,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RoleChoicesDto {
    pub roles: Vec<RoleDto>,
    pub default_role_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchDeleteDto {
    pub deleted: usize,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime: u64,
    pub users: u64,
    pub projects: u64,
}
