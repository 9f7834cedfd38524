use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A single stored file in a deposit.
/// Stored as JSON array in the `files` column, upload-ordered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositFile {
    /// Object key in the deposits bucket.
    pub key: String,
    /// Original upload filename.
    pub filename: String,
    /// MIME content type.
    pub content_type: Option<String>,
    /// Purposefully denormalized to avoid store round-trips for list queries.
    pub size: i64,
}

/// One participant's submission against a depository activity.
///
/// At most one row exists per (activity_id, participant_id); the unique
/// index created in `seed::ensure_indexes` is the enforcement point, not
/// application-level locking.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "deposit")]
pub struct Model {
    /// UUIDv7 primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub activity_id: Uuid,
    #[sea_orm(belongs_to, from = "activity_id", to = "id")]
    pub activity: HasOne<super::activity::Entity>,

    pub participant_id: i32,
    #[sea_orm(belongs_to, from = "participant_id", to = "id")]
    pub participant: HasOne<super::user::Entity>,

    /// Denormalized from the activity for per-unit queries.
    pub course_unit_id: i32,

    /// Ordered, non-empty JSON array of [`DepositFile`] objects.
    #[sea_orm(column_type = "JsonBinary")]
    pub files: Json,

    /// Evaluation overlay. All four columns are set together by grading;
    /// `score` stays within [0, 20].
    pub score: Option<f32>,
    pub comment: Option<String>,
    pub grader_id: Option<i32>,
    pub graded_at: Option<DateTimeUtc>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
