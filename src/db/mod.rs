use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::entities::projects;

pub mod migrator;
pub mod repositories;

pub use repositories::user::{NewUser, User, UserFilter, UserUpdate};

/// Failure mode for filtered listings: a project filter names a project
/// that does not exist locally. Distinct from an empty result set.
#[derive(Debug, Error)]
pub enum ListError {
    #[error("No project named \"{0}\"")]
    ProjectNotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        // An in-memory sqlite database exists per connection; keep the
        // pool at one so every query sees the migrated schema.
        let (max_connections, min_connections) = if db_url.contains(":memory:") {
            (1, 1)
        } else {
            (max_connections, min_connections)
        };

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn project_repo(&self) -> repositories::project::ProjectRepository {
        repositories::project::ProjectRepository::new(self.conn.clone())
    }

    pub async fn create_user(&self, new_user: NewUser) -> Result<User> {
        self.user_repo().create(new_user).await
    }

    pub async fn get_user(&self, id: i32) -> Result<Option<User>> {
        self.user_repo().get(id).await
    }

    pub async fn update_user(&self, id: i32, fields: UserUpdate) -> Result<Option<User>> {
        self.user_repo().update(id, fields).await
    }

    /// List users, optionally narrowed by one field/value pair. A filter
    /// on `project` takes the project *name* and is resolved to the
    /// local project id first; an unknown name is an error rather than
    /// an empty result.
    pub async fn list_users(&self, filter: Option<RawUserFilter>) -> Result<Vec<User>, ListError> {
        let filter = match filter {
            None => None,
            Some(RawUserFilter::Project(name)) => {
                let project = self
                    .project_repo()
                    .get_by_name(&name)
                    .await?
                    .ok_or_else(|| ListError::ProjectNotFound(name.clone()))?;
                Some(UserFilter::ProjectId(project.id))
            }
            Some(RawUserFilter::Field(f)) => Some(f),
        };

        Ok(self.user_repo().list(filter).await?)
    }

    pub async fn delete_user(&self, id: i32) -> Result<bool> {
        self.user_repo().delete(id).await
    }

    pub async fn set_user_password(&self, id: i32, password: &str) -> Result<Option<()>> {
        self.user_repo().set_password(id, password).await
    }

    pub async fn count_users(&self) -> Result<u64> {
        self.user_repo().count().await
    }

    pub async fn get_project(&self, id: i32) -> Result<Option<projects::Model>> {
        self.project_repo().get(id).await
    }

    pub async fn get_project_by_name(&self, name: &str) -> Result<Option<projects::Model>> {
        self.project_repo().get_by_name(name).await
    }

    pub async fn list_projects(&self) -> Result<Vec<projects::Model>> {
        self.project_repo().list().await
    }

    pub async fn upsert_project(&self, project: projects::Model) -> Result<projects::Model> {
        self.project_repo().upsert(project).await
    }

    pub async fn count_projects(&self) -> Result<u64> {
        self.project_repo().count().await
    }
}

/// Filter as it arrives from the caller, before project-name resolution.
#[derive(Debug, Clone)]
pub enum RawUserFilter {
    /// Filter by the name of the user's local project.
    Project(String),

    /// Any directly applicable field filter.
    Field(UserFilter),
}
