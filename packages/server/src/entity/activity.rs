use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Variant tag of an activity. Immutable after creation.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    #[sea_orm(string_value = "announcement")]
    Announcement,
    #[sea_orm(string_value = "single_file")]
    SingleFile,
    #[sea_orm(string_value = "depository")]
    Depository,
}

/// Urgency level of an announcement.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    #[sea_orm(string_value = "normal")]
    Normal,
    #[sea_orm(string_value = "important")]
    Important,
    #[sea_orm(string_value = "urgent")]
    Urgent,
}

/// One participant's completion mark on an activity.
/// Stored as JSON array in the `completions` column, append-ordered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMark {
    pub participant_id: i32,
    pub completed_at: DateTimeUtc,
}

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "activity")]
pub struct Model {
    /// UUIDv7 primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub course_unit_id: i32,
    #[sea_orm(belongs_to, from = "course_unit_id", to = "id")]
    pub course_unit: HasOne<super::course_unit::Entity>,

    pub kind: ActivityKind,

    pub title: String,
    pub body: String,
    pub pinned: bool,

    /// Group ids the activity is restricted to, as a JSON array of i32.
    /// NULL means visible to every group of the course unit.
    #[sea_orm(column_type = "JsonBinary")]
    pub restricted_group_ids: Option<Json>,

    /// Ordered JSON array of [`CompletionMark`] objects.
    #[sea_orm(column_type = "JsonBinary")]
    pub completions: Json,

    /// Announcement only.
    pub urgency: Option<Urgency>,

    /// Single-file only: coarse kind tag and object key in the
    /// activity-files bucket.
    pub file_kind: Option<String>,
    pub file_key: Option<String>,

    /// Depository only. Instructions are either inline text or one stored
    /// blob, never both.
    pub instructions_text: Option<String>,
    pub instructions_key: Option<String>,
    /// Accepted file-kind tags as a JSON array of strings. NULL accepts all.
    #[sea_orm(column_type = "JsonBinary")]
    pub allowed_kinds: Option<Json>,
    pub max_files: Option<i32>,
    pub due_at: Option<DateTimeUtc>,

    #[sea_orm(has_many)]
    pub deposits: HasMany<super::deposit::Entity>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
