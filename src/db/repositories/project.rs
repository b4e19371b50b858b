use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::entities::projects;

pub struct ProjectRepository {
    conn: DatabaseConnection,
}

impl ProjectRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get(&self, id: i32) -> Result<Option<projects::Model>> {
        projects::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query project by id")
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<projects::Model>> {
        projects::Entity::find()
            .filter(projects::Column::Name.eq(name))
            .one(&self.conn)
            .await
            .context("Failed to query project by name")
    }

    pub async fn list(&self) -> Result<Vec<projects::Model>> {
        projects::Entity::find()
            .order_by_asc(projects::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list projects")
    }

    /// Insert or refresh a mirrored project row. The id comes from the
    /// upstream accounting sync, not from the local store.
    pub async fn upsert(&self, project: projects::Model) -> Result<projects::Model> {
        let existing = self.get(project.id).await?;

        let active = projects::ActiveModel {
            id: Set(project.id),
            name: Set(project.name),
            os_id: Set(project.os_id),
            start: Set(project.start),
            state: Set(project.state),
            remaining: Set(project.remaining),
            last_update: Set(project.last_update),
        };

        let model = if existing.is_some() {
            active
                .update(&self.conn)
                .await
                .context("Failed to update project")?
        } else {
            active
                .insert(&self.conn)
                .await
                .context("Failed to insert project")?
        };

        Ok(model)
    }

    pub async fn count(&self) -> Result<u64> {
        use sea_orm::PaginatorTrait;

        projects::Entity::find()
            .count(&self.conn)
            .await
            .context("Failed to count projects")
    }
}
