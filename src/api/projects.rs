use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState};
use crate::api::types::{ProjectChoiceDto, ProjectDto, RoleChoicesDto, RoleDto};
use crate::entities::projects;

pub async fn list_projects(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<ProjectDto>>>, ApiError> {
    let projects = state.store.list_projects().await?;

    Ok(Json(ApiResponse::success(
        projects.into_iter().map(ProjectDto::from).collect(),
    )))
}

#[derive(Debug, Deserialize)]
pub struct UpsertProjectRequest {
    pub id: i32,
    pub name: String,
    pub os_id: String,
    pub start: String,
    pub state: Option<i32>,
    pub remaining: Option<f64>,
    /// Stamped with now when the sync does not provide one.
    pub last_update: Option<String>,
}

/// Mirror a remote project into the local lookup table. Ids come from
/// the upstream accounting sync and are taken as-is.
pub async fn upsert_project(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpsertProjectRequest>,
) -> Result<Json<ApiResponse<ProjectDto>>, ApiError> {
    if payload.name.is_empty() {
        return Err(ApiError::validation("name must not be empty"));
    }

    let project = state
        .store
        .upsert_project(projects::Model {
            id: payload.id,
            name: payload.name,
            os_id: payload.os_id,
            start: payload.start,
            state: payload.state,
            remaining: payload.remaining,
            last_update: payload
                .last_update
                .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
        })
        .await?;

    Ok(Json(ApiResponse::success(ProjectDto::from(project))))
}

#[derive(Debug, Deserialize)]
pub struct ProjectChoicesQuery {
    /// Local user whose recorded project should be listed first.
    pub user_id: Option<i32>,
}

/// Remote project choices for the activation form: the user's matching
/// project first, then the remaining enabled projects in remote order.
pub async fn project_choices(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProjectChoicesQuery>,
) -> Result<Json<ApiResponse<Vec<ProjectChoiceDto>>>, ApiError> {
    let local_project_name = match query.user_id {
        Some(user_id) => {
            let user = state
                .store
                .get_user(user_id)
                .await?
                .ok_or_else(|| ApiError::not_found("User", user_id))?;

            match user.project {
                Some(project_id) => state
                    .store
                    .get_project(project_id)
                    .await?
                    .map(|project| project.name),
                None => None,
            }
        }
        None => None,
    };

    let choices = state
        .activation
        .project_choices(local_project_name.as_deref())
        .await?;

    Ok(Json(ApiResponse::success(
        choices.into_iter().map(ProjectChoiceDto::from).collect(),
    )))
}

pub async fn role_choices(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<RoleChoicesDto>>, ApiError> {
    let (roles, default_role_id) = state.activation.role_choices().await?;

    Ok(Json(ApiResponse::success(RoleChoicesDto {
        roles: roles.into_iter().map(RoleDto::from).collect(),
        default_role_id,
    })))
}
