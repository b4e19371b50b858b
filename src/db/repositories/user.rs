use anyhow::{Context, Result};
use argon2::{
    Argon2,
    password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tokio::task;

use crate::entities::users;

/// User data returned from the repository (without the password hash).
#[derive(Debug, Clone)]
pub struct User {
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

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            idp: model.idp,
            cn: model.cn,
            source: model.source,
            duration: model.duration,
            project: model.project,
            created: model.created,
            updated: model.updated,
        }
    }
}

/// Fields accepted when creating a local user record.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub idp: String,
    pub cn: Option<String>,
    pub source: Option<String>,
    pub duration: Option<i32>,
    pub project: Option<i32>,
    pub password: Option<String>,
}

/// Fields accepted when updating a local user record. The stored
/// credential is only touched through `set_password`.
#[derive(Debug, Clone)]
pub struct UserUpdate {
    pub name: String,
    pub email: String,
    pub idp: String,
    pub cn: Option<String>,
    pub source: Option<String>,
    pub duration: Option<i32>,
    pub project: Option<i32>,
}

/// A single field/value filter for user listings. Project filters are
/// resolved from a project name to its id before reaching this level.
#[derive(Debug, Clone)]
pub enum UserFilter {
    Name(String),
    Email(String),
    Idp(String),
    Cn(String),
    Source(String),
    Duration(i32),
    ProjectId(i32),
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Insert a new record. `created` and `updated` are stamped with the
    /// same instant; an optional plaintext password is hashed before
    /// storage and never kept around.
    pub async fn create(&self, new_user: NewUser) -> Result<User> {
        let password_hash = match new_user.password {
            Some(password) => Some(
                task::spawn_blocking(move || hash_password(&password))
                    .await
                    .context("Password hashing task panicked")??,
            ),
            None => None,
        };

        let now = chrono::Utc::now().to_rfc3339();

        let active = users::ActiveModel {
            name: Set(new_user.name),
            email: Set(new_user.email),
            idp: Set(new_user.idp),
            cn: Set(new_user.cn),
            source: Set(new_user.source),
            duration: Set(new_user.duration),
            project: Set(new_user.project),
            password_hash: Set(password_hash),
            created: Set(now.clone()),
            updated: Set(now),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert user")?;

        Ok(User::from(model))
    }

    pub async fn get(&self, id: i32) -> Result<Option<User>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by id")?;

        Ok(user.map(User::from))
    }

    /// Update the editable fields of a record and stamp `updated`.
    /// `created` is never touched. Returns `None` when the id is unknown.
    pub async fn update(&self, id: i32, fields: UserUpdate) -> Result<Option<User>> {
        let Some(user) = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for update")?
        else {
            return Ok(None);
        };

        let now = chrono::Utc::now().to_rfc3339();

        let mut active: users::ActiveModel = user.into();
        active.name = Set(fields.name);
        active.email = Set(fields.email);
        active.idp = Set(fields.idp);
        active.cn = Set(fields.cn);
        active.source = Set(fields.source);
        active.duration = Set(fields.duration);
        active.project = Set(fields.project);
        active.updated = Set(now);

        let model = active
            .update(&self.conn)
            .await
            .context("Failed to update user")?;

        Ok(Some(User::from(model)))
    }

    /// List records in insertion order, optionally narrowed by a single
    /// field/value pair.
    pub async fn list(&self, filter: Option<UserFilter>) -> Result<Vec<User>> {
        let mut query = users::Entity::find().order_by_asc(users::Column::Id);

        if let Some(filter) = filter {
            query = match filter {
                UserFilter::Name(v) => query.filter(users::Column::Name.eq(v)),
                UserFilter::Email(v) => query.filter(users::Column::Email.eq(v)),
                UserFilter::Idp(v) => query.filter(users::Column::Idp.eq(v)),
                UserFilter::Cn(v) => query.filter(users::Column::Cn.eq(v)),
                UserFilter::Source(v) => query.filter(users::Column::Source.eq(v)),
                UserFilter::Duration(v) => query.filter(users::Column::Duration.eq(v)),
                UserFilter::ProjectId(v) => query.filter(users::Column::Project.eq(v)),
            };
        }

        let models = query
            .all(&self.conn)
            .await
            .context("Failed to list users")?;

        Ok(models.into_iter().map(User::from).collect())
    }

    /// Delete a record. Missing ids are treated as already deleted so
    /// batch deletes stay idempotent.
    pub async fn delete(&self, id: i32) -> Result<bool> {
        let result = users::Entity::delete_by_id(id)
            .exec(&self.conn)
            .await
            .context("Failed to delete user")?;

        Ok(result.rows_affected > 0)
    }

    /// Replace the stored credential with a fresh hash of `password`.
    /// Returns `None` when the id is unknown.
    pub async fn set_password(&self, id: i32, password: &str) -> Result<Option<()>> {
        let Some(user) = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for password change")?
        else {
            return Ok(None);
        };

        let password = password.to_string();
        let new_hash = task::spawn_blocking(move || hash_password(&password))
            .await
            .context("Password hashing task panicked")??;

        let now = chrono::Utc::now().to_rfc3339();

        let mut active: users::ActiveModel = user.into();
        active.password_hash = Set(Some(new_hash));
        active.updated = Set(now);
        active.update(&self.conn).await?;

        Ok(Some(()))
    }

    pub async fn count(&self) -> Result<u64> {
        use sea_orm::PaginatorTrait;

        users::Entity::find()
            .count(&self.conn)
            .await
            .context("Failed to count users")
    }
}

/// Hash a password using Argon2id with default params.
fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}
