use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::clients::keystone::{IdentityApi, KeystoneClient};
use crate::config::Config;
use crate::db::Store;
use crate::services::{ActivationService, IdentityCapabilities, ProvisioningSettings};

mod error;
mod projects;
mod system;
mod types;
mod users;

pub use error::ApiError;
pub use types::*;

pub struct AppState {
    pub config: Arc<Config>,

    pub store: Store,

    pub activation: Arc<ActivationService>,

    pub start_time: std::time::Instant,
}

pub async fn create_app_state(config: Config) -> anyhow::Result<Arc<AppState>> {
    let identity: Arc<dyn IdentityApi> = Arc::new(KeystoneClient::new(&config.keystone)?);
    create_app_state_with_identity(config, identity).await
}

/// Wire the state around a caller-supplied identity client. Tests use
/// this to script the remote side.
pub async fn create_app_state_with_identity(
    config: Config,
    identity: Arc<dyn IdentityApi>,
) -> anyhow::Result<Arc<AppState>> {
    let store = Store::new(&config.general.database_path).await?;

    let capabilities = IdentityCapabilities::from_generation(config.keystone.api_generation);
    let activation = Arc::new(ActivationService::new(
        identity,
        capabilities,
        ProvisioningSettings {
            default_password: config.provisioning.default_password.clone(),
            extra_attributes: config.provisioning.extra_attributes.clone(),
        },
    ));

    Ok(Arc::new(AppState {
        config: Arc::new(config),
        store,
        activation,
        start_time: std::time::Instant::now(),
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config.server.cors_allowed_origins.clone();

    let api_router = Router::new()
        .route("/users", get(users::list_users))
        .route("/users", post(users::create_user))
        .route("/users/batch-delete", post(users::batch_delete_users))
        .route("/users/{id}", get(users::get_user))
        .route("/users/{id}", put(users::update_user))
        .route("/users/{id}", axum::routing::delete(users::delete_user))
        .route("/users/{id}/password", put(users::change_password))
        .route("/users/{id}/activate", post(users::activate_user))
        .route("/projects", get(projects::list_projects))
        .route("/projects", post(projects::upsert_project))
        .route("/choices/projects", get(projects::project_choices))
        .route("/choices/roles", get(projects::role_choices))
        .route("/system/status", get(system::get_status))
        .with_state(state);

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}
