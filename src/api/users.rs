use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState};
use crate::api::types::{ActivationDto, BatchDeleteDto, UserDto};
use crate::db::{NewUser, RawUserFilter, Store, UserFilter, UserUpdate};
use crate::services::{ActivationRequest, UserSnapshot};

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub name: Option<String>,
    pub email: Option<String>,
    pub idp: Option<String>,
    pub cn: Option<String>,
    pub source: Option<String>,
    pub duration: Option<String>,
    pub project: Option<String>,
}

impl ListUsersQuery {
    /// Listings are narrowed by at most one field/value pair.
    fn into_filter(self) -> Result<Option<RawUserFilter>, ApiError> {
        let mut filters = Vec::new();

        if let Some(v) = self.name {
            filters.push(RawUserFilter::Field(UserFilter::Name(v)));
        }
        if let Some(v) = self.email {
            filters.push(RawUserFilter::Field(UserFilter::Email(v)));
        }
        if let Some(v) = self.idp {
            filters.push(RawUserFilter::Field(UserFilter::Idp(v)));
        }
        if let Some(v) = self.cn {
            filters.push(RawUserFilter::Field(UserFilter::Cn(v)));
        }
        if let Some(v) = self.source {
            filters.push(RawUserFilter::Field(UserFilter::Source(v)));
        }
        if let Some(v) = self.duration {
            let duration: i32 = v
                .parse()
                .map_err(|_| ApiError::validation("duration filter must be an integer"))?;
            filters.push(RawUserFilter::Field(UserFilter::Duration(duration)));
        }
        if let Some(v) = self.project {
            filters.push(RawUserFilter::Project(v));
        }

        if filters.len() > 1 {
            return Err(ApiError::validation(
                "At most one filter field may be given",
            ));
        }

        Ok(filters.pop())
    }
}

// No Debug derive: the payload can carry a plaintext password.
#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub idp: String,
    pub cn: Option<String>,
    pub source: Option<String>,
    pub duration: Option<i32>,
    /// Local project id as a string; empty means no project.
    pub project: Option<String>,
    /// Write-only; hashed before storage and never returned.
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: String,
    pub email: String,
    pub idp: String,
    pub cn: Option<String>,
    pub source: Option<String>,
    pub duration: Option<i32>,
    pub project: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchDeleteRequest {
    pub ids: Vec<i32>,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub password: String,
}

#[derive(Deserialize)]
pub struct ActivateUserRequest {
    pub project_id: Option<String>,
    pub role_id: Option<String>,
    pub password: Option<String>,
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

const fn default_enabled() -> bool {
    true
}

/// Resolve the project field of a create/update payload. An empty
/// string clears the reference; a non-empty value must name an existing
/// local project id.
async fn resolve_project(store: &Store, field: Option<String>) -> Result<Option<i32>, ApiError> {
    let Some(raw) = field.filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    let id: i32 = raw
        .parse()
        .map_err(|_| ApiError::validation("project must be a project id"))?;

    store
        .get_project(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project", id))?;

    Ok(Some(id))
}

fn validate_required(name: &str, email: &str, idp: &str) -> Result<(), ApiError> {
    if name.is_empty() {
        return Err(ApiError::validation("name must not be empty"));
    }
    if email.is_empty() {
        return Err(ApiError::validation("email must not be empty"));
    }
    if idp.is_empty() {
        return Err(ApiError::validation("idp must not be empty"));
    }
    Ok(())
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<ApiResponse<Vec<UserDto>>>, ApiError> {
    let filter = query.into_filter()?;
    let users = state.store.list_users(filter).await?;

    Ok(Json(ApiResponse::success(
        users.into_iter().map(UserDto::from).collect(),
    )))
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    validate_required(&payload.name, &payload.email, &payload.idp)?;
    let project = resolve_project(&state.store, payload.project).await?;

    tracing::info!("Creating external user \"{}\"", payload.name);

    let user = state
        .store
        .create_user(NewUser {
            name: payload.name,
            email: payload.email,
            idp: payload.idp,
            cn: payload.cn,
            source: payload.source,
            duration: payload.duration,
            project,
            password: payload.password,
        })
        .await?;

    Ok(Json(ApiResponse::success(UserDto::from(user))))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    let user = state
        .store
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    Ok(Json(ApiResponse::success(UserDto::from(user))))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    validate_required(&payload.name, &payload.email, &payload.idp)?;
    let project = resolve_project(&state.store, payload.project).await?;

    let user = state
        .store
        .update_user(
            id,
            UserUpdate {
                name: payload.name,
                email: payload.email,
                idp: payload.idp,
                cn: payload.cn,
                source: payload.source,
                duration: payload.duration,
                project,
            },
        )
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    Ok(Json(ApiResponse::success(UserDto::from(user))))
}

/// Deleting is local-only and idempotent: a missing id counts as
/// already deleted. A previously activated identity user is left alone.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.store.delete_user(id).await?;

    Ok(Json(ApiResponse::success(())))
}

pub async fn batch_delete_users(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BatchDeleteRequest>,
) -> Result<Json<ApiResponse<BatchDeleteDto>>, ApiError> {
    let mut deleted = 0;
    for id in payload.ids {
        if state.store.delete_user(id).await? {
            deleted += 1;
        }
    }

    Ok(Json(ApiResponse::success(BatchDeleteDto { deleted })))
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    if payload.password.is_empty() {
        return Err(ApiError::validation("password must not be empty"));
    }

    state
        .store
        .set_user_password(id, &payload.password)
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    Ok(Json(ApiResponse::success(())))
}

/// Provision the local record into the identity service. The local
/// record is kept afterwards as a provisioning log.
pub async fn activate_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<ActivateUserRequest>,
) -> Result<Json<ApiResponse<ActivationDto>>, ApiError> {
    let user = state
        .store
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    if state.activation.capabilities().project_required && payload.project_id.is_none() {
        return Err(ApiError::validation("A primary project is required"));
    }

    let snapshot = UserSnapshot {
        name: user.name,
        email: user.email,
    };

    let activation = state
        .activation
        .activate(
            &snapshot,
            ActivationRequest {
                project_id: payload.project_id,
                role_id: payload.role_id,
                password: payload.password,
                description: payload.description,
                enabled: payload.enabled,
                extra: payload.extra,
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(ActivationDto {
        user: activation.user.into(),
        warnings: activation.warnings,
    })))
}
