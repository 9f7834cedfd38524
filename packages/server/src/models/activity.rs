use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::activity::{ActivityKind, Urgency};
use crate::error::AppError;

use super::shared::{double_option, validate_category_name, validate_title};

/// Variant-specific creation payload, carried in the `meta` multipart field.
/// The variant tag is fixed at creation and can never change.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CreateActivityDetail {
    Announcement {
        title: String,
        body: String,
        #[serde(default)]
        urgency: Option<Urgency>,
    },
    /// The blob itself arrives in the `file` multipart field.
    SingleFile { title: String, body: String },
    Depository {
        title: String,
        body: String,
        /// Inline instructions. Mutually exclusive with an uploaded
        /// instructions file.
        #[serde(default)]
        instructions: Option<String>,
        /// Accepted file-kind tags. Absent accepts every kind.
        #[serde(default)]
        allowed_kinds: Option<Vec<String>>,
        max_files: i32,
        #[serde(default)]
        due_at: Option<DateTime<Utc>>,
    },
}

/// Creation payload (`meta` multipart field).
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateActivityRequest {
    #[serde(default)]
    pub pinned: bool,
    /// Restricts visibility (and the completion population) to these groups.
    #[serde(default)]
    pub restricted_group_ids: Option<Vec<i32>>,
    /// Category to classify the new activity into.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(flatten)]
    pub detail: CreateActivityDetail,
}

/// PATCH payload. Only fields legal for the stored variant may be present.
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct UpdateActivityRequest {
    /// Rejected if present: the variant tag is immutable.
    pub kind: Option<ActivityKind>,

    pub title: Option<String>,
    pub body: Option<String>,
    pub pinned: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<Vec<i32>>, nullable)]
    pub restricted_group_ids: Option<Option<Vec<i32>>>,

    // Announcement.
    pub urgency: Option<Urgency>,

    // Depository.
    pub instructions: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<Vec<String>>, nullable)]
    pub allowed_kinds: Option<Option<Vec<String>>>,
    pub max_files: Option<i32>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<DateTime<Utc>>, nullable)]
    pub due_at: Option<Option<DateTime<Utc>>>,
}

/// Reclassification payload. `category = null` removes the activity from any
/// category.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ClassifyRequest {
    pub category: Option<String>,
}

/// Retrieval reference for a stored blob. Raw object keys never leave the
/// engine; the URL may be time-boxed.
#[derive(Serialize, utoipa::ToSchema)]
pub struct FileRef {
    #[schema(example = "sujet_tp2.pdf")]
    pub filename: String,
    pub content_type: Option<String>,
    pub url: String,
}

/// Variant-specific response payload, flattened into [`ActivityResponse`].
#[derive(Serialize, utoipa::ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityDetail {
    Announcement {
        urgency: Urgency,
    },
    SingleFile {
        file_kind: Option<String>,
        file: FileRef,
    },
    Depository {
        instructions_text: Option<String>,
        instructions_file: Option<FileRef>,
        allowed_kinds: Option<Vec<String>>,
        max_files: i32,
        due_at: Option<DateTime<Utc>>,
    },
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ActivityResponse {
    /// Activity ID (UUIDv7).
    pub id: String,
    pub course_unit_id: i32,
    pub title: String,
    pub body: String,
    pub pinned: bool,
    pub restricted_group_ids: Option<Vec<i32>>,
    /// Name of the category holding this activity, if any.
    pub category: Option<String>,
    pub completion_count: usize,
    /// Whether the requesting participant has marked this activity complete.
    pub completed_by_me: bool,
    #[serde(flatten)]
    pub detail: ActivityDetail,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ActivityListResponse {
    pub data: Vec<ActivityResponse>,
    pub total: u64,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct CompletionRateResponse {
    /// Percentage in [0, 100], rounded to two decimals. 0 when the relevant
    /// population is empty.
    #[schema(example = 66.67)]
    pub rate: f64,
    pub completed: u64,
    pub population: u64,
}

pub fn validate_create_activity(payload: &CreateActivityRequest) -> Result<(), AppError> {
    if let Some(ref category) = payload.category {
        validate_category_name(category)?;
    }

    match &payload.detail {
        CreateActivityDetail::Announcement { title, .. }
        | CreateActivityDetail::SingleFile { title, .. } => validate_title(title),
        CreateActivityDetail::Depository {
            title,
            allowed_kinds,
            max_files,
            ..
        } => {
            validate_title(title)?;
            if *max_files < 1 {
                return Err(AppError::InvalidActivity(
                    "max_files must be at least 1".into(),
                ));
            }
            validate_allowed_kinds(allowed_kinds.as_deref())
        }
    }
}

pub fn validate_allowed_kinds(kinds: Option<&[String]>) -> Result<(), AppError> {
    const KNOWN: &[&str] = &[
        "pdf", "image", "video", "audio", "archive", "document", "text", "code",
    ];
    if let Some(kinds) = kinds {
        if kinds.is_empty() {
            return Err(AppError::InvalidActivity(
                "allowed_kinds must not be empty; omit it to accept every kind".into(),
            ));
        }
        for kind in kinds {
            if !KNOWN.contains(&kind.as_str()) {
                return Err(AppError::InvalidActivity(format!(
                    "Unknown file kind '{kind}'"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depository(max_files: i32, kinds: Option<Vec<String>>) -> CreateActivityRequest {
        CreateActivityRequest {
            pinned: false,
            restricted_group_ids: None,
            category: None,
            detail: CreateActivityDetail::Depository {
                title: "TP2".into(),
                body: "Submit your work".into(),
                instructions: Some("Read the subject first".into()),
                allowed_kinds: kinds,
                max_files,
                due_at: None,
            },
        }
    }

    #[test]
    fn depository_requires_positive_max_files() {
        assert!(validate_create_activity(&depository(1, None)).is_ok());
        assert!(matches!(
            validate_create_activity(&depository(0, None)),
            Err(AppError::InvalidActivity(_))
        ));
    }

    #[test]
    fn allowed_kinds_must_be_known() {
        assert!(validate_create_activity(&depository(3, Some(vec!["pdf".into()]))).is_ok());
        assert!(matches!(
            validate_create_activity(&depository(3, Some(vec!["floppy".into()]))),
            Err(AppError::InvalidActivity(_))
        ));
        assert!(matches!(
            validate_create_activity(&depository(3, Some(vec![]))),
            Err(AppError::InvalidActivity(_))
        ));
    }

    #[test]
    fn create_meta_deserializes_tagged_variants() {
        let meta: CreateActivityRequest = serde_json::from_str(
            r#"{"kind":"announcement","title":"Exam moved","body":"New room","urgency":"urgent","pinned":true}"#,
        )
        .unwrap();
        assert!(meta.pinned);
        assert!(matches!(
            meta.detail,
            CreateActivityDetail::Announcement {
                urgency: Some(Urgency::Urgent),
                ..
            }
        ));
    }

    #[test]
    fn update_distinguishes_null_from_absent() {
        let patch: UpdateActivityRequest = serde_json::from_str(r#"{"due_at":null}"#).unwrap();
        assert_eq!(patch.due_at, Some(None));

        let patch: UpdateActivityRequest = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(patch.due_at, None);
    }
}
