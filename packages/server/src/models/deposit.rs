use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Retrieval reference for one deposited file. The presigned URL is built at
/// read time; raw object keys never leave the engine.
#[derive(Serialize, utoipa::ToSchema)]
pub struct DepositFileRef {
    #[schema(example = "rapport_final.pdf")]
    pub filename: String,
    pub content_type: Option<String>,
    /// Size in bytes.
    pub size: i64,
    pub url: String,
}

/// The graded outcome attached to a deposit.
#[derive(Serialize, utoipa::ToSchema)]
pub struct EvaluationResponse {
    /// Score out of 20.
    #[schema(example = 14.5)]
    pub score: Option<f32>,
    pub comment: Option<String>,
    pub grader_id: Option<i32>,
    pub graded_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct DepositResponse {
    /// Deposit ID (UUIDv7).
    pub id: String,
    pub activity_id: String,
    pub participant_id: i32,
    pub course_unit_id: i32,
    pub files: Vec<DepositFileRef>,
    pub evaluation: Option<EvaluationResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// List entry seen by graders: the deposit plus the depositor's name.
#[derive(Serialize, utoipa::ToSchema)]
pub struct DepositListItem {
    pub id: String,
    pub participant_id: i32,
    pub first_name: String,
    pub last_name: String,
    pub file_count: usize,
    pub graded: bool,
    pub score: Option<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct DepositListResponse {
    pub data: Vec<DepositListItem>,
    pub total: u64,
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct DepositListQuery {
    /// Keep only graded (`true`) or ungraded (`false`) deposits.
    pub graded: Option<bool>,
}

/// Grading payload. Merge semantics: omitted fields are left unchanged.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct GradeRequest {
    /// Score out of 20.
    pub score: Option<f32>,
    pub comment: Option<String>,
}

pub fn validate_grade(payload: &GradeRequest) -> Result<(), AppError> {
    if payload.score.is_none() && payload.comment.is_none() {
        return Err(AppError::Validation(
            "Provide at least one of score, comment".into(),
        ));
    }
    if let Some(score) = payload.score
        && !(0.0..=20.0).contains(&score)
    {
        return Err(AppError::Validation("Score must be within [0, 20]".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_requires_some_field() {
        assert!(validate_grade(&GradeRequest {
            score: None,
            comment: None
        })
        .is_err());
    }

    #[test]
    fn grade_score_bounds() {
        let ok = |score| GradeRequest {
            score: Some(score),
            comment: None,
        };
        assert!(validate_grade(&ok(0.0)).is_ok());
        assert!(validate_grade(&ok(20.0)).is_ok());
        assert!(validate_grade(&ok(20.5)).is_err());
        assert!(validate_grade(&ok(-0.5)).is_err());
    }

    #[test]
    fn comment_alone_is_valid() {
        assert!(validate_grade(&GradeRequest {
            score: None,
            comment: Some("good work".into())
        })
        .is_ok());
    }
}
