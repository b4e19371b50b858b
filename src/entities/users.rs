use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub name: String,

    pub email: String,

    /// Identity-provider tag the candidate account came from.
    pub idp: String,

    pub cn: Option<String>,

    pub source: Option<String>,

    /// Requested access lifetime in days.
    pub duration: Option<i32>,

    /// Nullable reference to the mirrored project table.
    pub project: Option<i32>,

    /// Argon2id hash of the pending credential. Write-only from the API;
    /// never serialized back out.
    pub password_hash: Option<String>,

    pub created: String,

    pub updated: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::projects::Entity",
        from = "Column::Project",
        to = "super::projects::Column::Id"
    )]
    Project,
}

impl Related<super::projects::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
