use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Named grouping of activities inside one course unit.
///
/// Uniqueness of (course_unit_id, name) is enforced by a database index
/// created in `seed::ensure_indexes`; the classifier relies on it for its
/// guarded conditional create. An activity id appears in at most one
/// category of its unit; empty categories are pruned.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "category")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub course_unit_id: i32,
    #[sea_orm(belongs_to, from = "course_unit_id", to = "id")]
    pub course_unit: HasOne<super::course_unit::Entity>,

    pub name: String,
    pub description: Option<String>,

    /// Ordered JSON array of activity ids (UUID strings).
    #[sea_orm(column_type = "JsonBinary")]
    pub activity_ids: Json,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
