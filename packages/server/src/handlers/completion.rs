use std::collections::HashSet;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use sea_orm::*;
use tracing::instrument;
use uuid::Uuid;

use crate::entity::activity::CompletionMark;
use crate::entity::{course_group, group_member};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::models::activity::CompletionRateResponse;
use crate::state::AppState;
use crate::utils::access::require_unit_teacher;
use crate::utils::period::AcademicPeriod;

use super::activity::find_activity;

#[utoipa::path(
    post,
    path = "/{id}/complete",
    tag = "Completion",
    operation_id = "markComplete",
    summary = "Mark an activity as completed",
    description = "Appends a timestamped completion mark for the calling participant. A \
        second mark for the same participant is rejected with ALREADY_COMPLETED.",
    params(("id" = String, Path, description = "Activity ID (UUID)")),
    responses(
        (status = 204, description = "Completion recorded"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Activity not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Already completed (ALREADY_COMPLETED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn mark_complete(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    find_activity(&state.db, id).await?;

    // Guarded jsonb append: the NOT-contains clause makes the duplicate
    // check and the write one atomic statement, so concurrent marks from
    // the same participant cannot both land.
    let mark = serde_json::json!([{
        "participant_id": auth_user.user_id,
        "completed_at": Utc::now(),
    }]);
    let guard = serde_json::json!([{ "participant_id": auth_user.user_id }]);

    let stmt = Statement::from_sql_and_values(
        DbBackend::Postgres,
        r#"UPDATE "activity"
           SET "completions" = "completions" || $1::jsonb, "updated_at" = $2
           WHERE "id" = $3 AND NOT ("completions" @> $4::jsonb)"#,
        [mark.into(), Utc::now().into(), id.into(), guard.into()],
    );

    let result = state.db.execute_raw(stmt).await?;
    if result.rows_affected() == 0 {
        return Err(AppError::AlreadyCompleted);
    }

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/{id}/completion-rate",
    tag = "Completion",
    operation_id = "completionRate",
    summary = "Completion percentage of an activity",
    description = "Percentage of the relevant population holding a completion mark. The \
        population is the restricting groups' members if the activity is restricted, \
        otherwise every group of the course unit, in both cases limited to groups of the \
        current academic period. Teachers of the unit only.",
    params(("id" = String, Path, description = "Activity ID (UUID)")),
    responses(
        (status = 200, description = "Completion rate", body = CompletionRateResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Activity not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn completion_rate(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CompletionRateResponse>, AppError> {
    let activity = find_activity(&state.db, id).await?;
    require_unit_teacher(&state.db, &auth_user, activity.course_unit_id).await?;

    let restricted: Option<Vec<i32>> = activity
        .restricted_group_ids
        .as_ref()
        .and_then(|v| serde_json::from_value(v.clone()).ok());

    let population = relevant_population(
        &state.db,
        activity.course_unit_id,
        restricted.as_deref(),
        AcademicPeriod::current(),
    )
    .await?;

    let marks: Vec<CompletionMark> =
        serde_json::from_value(activity.completions.clone()).unwrap_or_default();

    let (rate, completed) = rate_of(&marks, &population);

    Ok(Json(CompletionRateResponse {
        rate,
        completed,
        population: population.len() as u64,
    }))
}

/// Participants counted toward the completion rate: members of the
/// restricting groups if any, else members of every group of the course
/// unit, limited to groups of the given academic period.
async fn relevant_population<C: ConnectionTrait>(
    db: &C,
    course_unit_id: i32,
    restricted_group_ids: Option<&[i32]>,
    period: AcademicPeriod,
) -> Result<HashSet<i32>, AppError> {
    let mut groups = course_group::Entity::find()
        .filter(course_group::Column::CourseUnitId.eq(course_unit_id))
        .filter(course_group::Column::AcademicYear.eq(period.year))
        .filter(course_group::Column::Semester.eq(period.semester));

    if let Some(ids) = restricted_group_ids {
        groups = groups.filter(course_group::Column::Id.is_in(ids.to_vec()));
    }

    let group_ids: Vec<i32> = groups
        .select_only()
        .column(course_group::Column::Id)
        .into_tuple()
        .all(db)
        .await?;

    if group_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let members: Vec<i32> = group_member::Entity::find()
        .filter(group_member::Column::GroupId.is_in(group_ids))
        .select_only()
        .column(group_member::Column::ParticipantId)
        .into_tuple()
        .all(db)
        .await?;

    Ok(members.into_iter().collect())
}

/// Pure rate computation: percentage in [0, 100] rounded to two decimals,
/// and the number of distinct completed participants inside the population.
/// Defined as 0 for an empty population.
fn rate_of(marks: &[CompletionMark], population: &HashSet<i32>) -> (f64, u64) {
    if population.is_empty() {
        return (0.0, 0);
    }

    let completed: HashSet<i32> = marks
        .iter()
        .map(|m| m.participant_id)
        .filter(|id| population.contains(id))
        .collect();

    let rate = 100.0 * completed.len() as f64 / population.len() as f64;
    ((rate * 100.0).round() / 100.0, completed.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mark(participant_id: i32) -> CompletionMark {
        CompletionMark {
            participant_id,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn empty_population_is_zero() {
        let (rate, completed) = rate_of(&[mark(1), mark(2)], &HashSet::new());
        assert_eq!(rate, 0.0);
        assert_eq!(completed, 0);
    }

    #[test]
    fn full_population_is_hundred() {
        let population: HashSet<i32> = [1, 2, 3].into_iter().collect();
        let (rate, completed) = rate_of(&[mark(1), mark(2), mark(3)], &population);
        assert_eq!(rate, 100.0);
        assert_eq!(completed, 3);
    }

    #[test]
    fn marks_outside_population_do_not_count() {
        let population: HashSet<i32> = [1, 2].into_iter().collect();
        let (rate, completed) = rate_of(&[mark(1), mark(99)], &population);
        assert_eq!(rate, 50.0);
        assert_eq!(completed, 1);
    }

    #[test]
    fn duplicate_marks_count_once() {
        let population: HashSet<i32> = [1, 2].into_iter().collect();
        let (rate, _) = rate_of(&[mark(1), mark(1)], &population);
        assert_eq!(rate, 50.0);
    }

    #[test]
    fn rate_rounds_to_two_decimals() {
        let population: HashSet<i32> = [1, 2, 3].into_iter().collect();
        let (rate, _) = rate_of(&[mark(1), mark(2)], &population);
        assert_eq!(rate, 66.67);
    }

    #[test]
    fn rate_stays_within_bounds() {
        let population: HashSet<i32> = (0..7).collect();
        for n in 0..=7 {
            let marks: Vec<CompletionMark> = (0..n).map(mark).collect();
            let (rate, _) = rate_of(&marks, &population);
            assert!((0.0..=100.0).contains(&rate));
        }
    }
}
