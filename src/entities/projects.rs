use sea_orm::entity::prelude::*;

/// Local mirror of a remote project, kept for lookups and filtering.
/// The primary key is expected to match the remote project's numeric id.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "project")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,

    #[sea_orm(unique)]
    pub name: String,

    /// Identifier of the project on the identity-service side.
    pub os_id: String,

    pub start: String,

    pub state: Option<i32>,

    /// Remaining quota/balance, as reported by the upstream sync.
    pub remaining: Option<f64>,

    pub last_update: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::users::Entity")]
    Users,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
