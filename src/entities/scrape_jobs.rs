use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "scrape_jobs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// `scrape` or `relations`.
    pub kind: String,
    /// Serialized job message.
    #[sea_orm(column_type = "Text")]
    pub payload: String,
    /// Identical payloads share a fingerprint; at most one is in flight.
    pub fingerprint: String,
    pub priority: i32,
    /// `pending`, `running` or `failed`. Completed jobs are deleted.
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    #[sea_orm(column_type = "Text", nullable)]
    pub last_error: Option<String>,
    /// Not eligible for dequeue before this time (RFC 3339).
    pub run_after: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
