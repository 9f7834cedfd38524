use axum::Json;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use common::storage::{Bucket, ObjectStore, file_kind};
use sea_orm::prelude::Expr;
use sea_orm::sea_query::OnConflict;
use sea_orm::*;
use tracing::instrument;
use uuid::Uuid;

use crate::archive::{self, ArchiveEntry};
use crate::entity::activity::{self, ActivityKind};
use crate::entity::deposit::{self, DepositFile};
use crate::entity::{group_member, user};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::deposit::*;
use crate::state::AppState;
use crate::utils::access::require_unit_teacher;
use crate::utils::upload::{SpooledFile, rollback_uploads, upload_spooled};

use super::activity::find_activity;

/// Body limit layer for deposit multipart routes.
pub fn deposit_upload_body_limit() -> DefaultBodyLimit {
    DefaultBodyLimit::max(256 * 1024 * 1024)
}

/// Constraints a depository activity places on submissions.
pub(crate) struct DepositoryRules {
    pub max_files: i32,
    pub allowed_kinds: Option<Vec<String>>,
    pub due_at: Option<DateTime<Utc>>,
}

impl DepositoryRules {
    fn of(activity: &activity::Model) -> Result<Self, AppError> {
        if activity.kind != ActivityKind::Depository {
            return Err(AppError::Validation(
                "This activity does not accept deposits".into(),
            ));
        }
        Ok(Self {
            max_files: activity.max_files.unwrap_or(1),
            allowed_kinds: activity
                .allowed_kinds
                .as_ref()
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
            due_at: activity.due_at,
        })
    }
}

/// A deposit as persisted by [`submit_files`]. Carries everything the
/// response needs without a read-back round-trip.
pub(crate) struct StoredDeposit {
    pub id: Uuid,
    pub files: Vec<DepositFile>,
    pub created_at: DateTime<Utc>,
}

#[utoipa::path(
    post,
    path = "/{id}/deposits",
    tag = "Deposits",
    operation_id = "submitDeposit",
    summary = "Submit files against a depository activity",
    description = "First submission for the calling participant: repeated `files` multipart \
        fields. At most one deposit exists per (activity, participant); a second submission \
        is rejected with CONFLICT — use replace instead. A failure after some files were \
        uploaded deletes them again before the error is returned.",
    params(("id" = String, Path, description = "Activity ID (UUID)")),
    request_body(content_type = "multipart/form-data", description = "repeated files fields"),
    responses(
        (status = 201, description = "Deposit created", body = DepositResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Activity not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Deposit already exists (CONFLICT)", body = ErrorBody),
        (status = 422, description = "Files outside the activity's policy (POLICY_VIOLATION)", body = ErrorBody),
        (status = 502, description = "Object store unreachable (STORAGE_UNAVAILABLE)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(activity_id))]
pub async fn submit_deposit(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(activity_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let activity = find_activity(&state.db, activity_id).await?;
    let rules = DepositoryRules::of(&activity)?;
    check_submit_access(&state.db, &auth_user, &activity).await?;

    if find_deposit(&state.db, activity_id, auth_user.user_id)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(
            "You already submitted to this activity; replace your deposit instead".into(),
        ));
    }

    let staged = spool_deposit_fields(multipart).await?;
    let result = async {
        validate_deposit_files(&rules, &staged, Utc::now())?;
        submit_files(
            &state.db,
            &*state.store,
            activity_id,
            activity.course_unit_id,
            auth_user.user_id,
            &staged,
        )
        .await
    }
    .await;

    for file in &staged {
        file.cleanup().await;
    }
    let stored = result?;

    let response = DepositResponse {
        id: stored.id.to_string(),
        activity_id: activity_id.to_string(),
        participant_id: auth_user.user_id,
        course_unit_id: activity.course_unit_id,
        files: files_to_refs(&state, &stored.files).await?,
        evaluation: None,
        created_at: stored.created_at,
        updated_at: stored.created_at,
    };

    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    put,
    path = "/{id}/deposits/mine",
    tag = "Deposits",
    operation_id = "replaceDeposit",
    summary = "Replace the calling participant's deposit",
    description = "Wholesale file replacement. The new set is uploaded and referenced by \
        the record before any previous file is deleted, so a mid-operation failure leaves \
        the prior submission intact.",
    params(("id" = String, Path, description = "Activity ID (UUID)")),
    request_body(content_type = "multipart/form-data", description = "repeated files fields"),
    responses(
        (status = 200, description = "Deposit replaced", body = DepositResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "No deposit to replace (NOT_FOUND)", body = ErrorBody),
        (status = 422, description = "Files outside the activity's policy (POLICY_VIOLATION)", body = ErrorBody),
        (status = 502, description = "Object store unreachable (STORAGE_UNAVAILABLE)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(activity_id))]
pub async fn replace_deposit(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(activity_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<DepositResponse>, AppError> {
    let activity = find_activity(&state.db, activity_id).await?;
    let rules = DepositoryRules::of(&activity)?;

    let existing = find_deposit(&state.db, activity_id, auth_user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No deposit to replace".into()))?;
    let old_files = parse_files(&existing.files);

    let staged = spool_deposit_fields(multipart).await?;
    let result = async {
        validate_deposit_files(&rules, &staged, Utc::now())?;
        replace_files(&state.db, &*state.store, existing.id, &old_files, &staged).await
    }
    .await;

    for file in &staged {
        file.cleanup().await;
    }
    let new_files = result?;

    let response = DepositResponse {
        id: existing.id.to_string(),
        activity_id: activity_id.to_string(),
        participant_id: auth_user.user_id,
        course_unit_id: existing.course_unit_id,
        files: files_to_refs(&state, &new_files).await?,
        evaluation: evaluation_of(&existing),
        created_at: existing.created_at,
        updated_at: Utc::now(),
    };

    Ok(Json(response))
}

#[utoipa::path(
    delete,
    path = "/{id}/deposits/mine",
    tag = "Deposits",
    operation_id = "withdrawDeposit",
    summary = "Withdraw the calling participant's deposit",
    description = "Deletes the deposit record, then its stored files. Blob deletions that \
        fail are logged only: once the record is gone, a missing blob beats a dangling \
        reference.",
    params(("id" = String, Path, description = "Activity ID (UUID)")),
    responses(
        (status = 204, description = "Deposit withdrawn"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "No deposit to withdraw (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(activity_id))]
pub async fn withdraw_deposit(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(activity_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let existing = find_deposit(&state.db, activity_id, auth_user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No deposit to withdraw".into()))?;

    let files = parse_files(&existing.files);
    withdraw_files(&state.db, &*state.store, existing.id, &files).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/{id}/deposits/mine",
    tag = "Deposits",
    operation_id = "getMyDeposit",
    summary = "Get the calling participant's deposit",
    params(("id" = String, Path, description = "Activity ID (UUID)")),
    responses(
        (status = 200, description = "Deposit details", body = DepositResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "No deposit (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(activity_id))]
pub async fn get_my_deposit(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(activity_id): Path<Uuid>,
) -> Result<Json<DepositResponse>, AppError> {
    let existing = find_deposit(&state.db, activity_id, auth_user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No deposit found".into()))?;

    Ok(Json(deposit_response(&state, existing).await?))
}

#[utoipa::path(
    get,
    path = "/{id}/deposits",
    tag = "Deposits",
    operation_id = "listDeposits",
    summary = "List deposits of an activity",
    description = "Grader view: every deposit with the depositor's name, optionally \
        filtered by grading status. Teachers of the unit only.",
    params(
        ("id" = String, Path, description = "Activity ID (UUID)"),
        DepositListQuery,
    ),
    responses(
        (status = 200, description = "Deposit list", body = DepositListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Activity not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query), fields(activity_id))]
pub async fn list_deposits(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(activity_id): Path<Uuid>,
    Query(query): Query<DepositListQuery>,
) -> Result<Json<DepositListResponse>, AppError> {
    let activity = find_activity(&state.db, activity_id).await?;
    require_unit_teacher(&state.db, &auth_user, activity.course_unit_id).await?;

    let mut select =
        deposit::Entity::find().filter(deposit::Column::ActivityId.eq(activity_id));
    match query.graded {
        Some(true) => select = select.filter(deposit::Column::GradedAt.is_not_null()),
        Some(false) => select = select.filter(deposit::Column::GradedAt.is_null()),
        None => {}
    }

    let rows = select
        .find_also_related(user::Entity)
        .order_by_asc(deposit::Column::CreatedAt)
        .all(&state.db)
        .await?;

    let total = rows.len() as u64;
    let data = rows
        .into_iter()
        .map(|(dep, participant)| {
            let participant = participant
                .ok_or_else(|| AppError::Internal("Deposit participant not found".into()))?;
            Ok(DepositListItem {
                id: dep.id.to_string(),
                participant_id: dep.participant_id,
                first_name: participant.first_name,
                last_name: participant.last_name,
                file_count: parse_files(&dep.files).len(),
                graded: dep.graded_at.is_some(),
                score: dep.score,
                created_at: dep.created_at,
                updated_at: dep.updated_at,
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    Ok(Json(DepositListResponse { data, total }))
}

#[utoipa::path(
    patch,
    path = "/{id}/evaluation",
    tag = "Deposits",
    operation_id = "gradeDeposit",
    summary = "Grade a deposit",
    description = "Merges score and/or comment into the deposit's evaluation; omitted \
        fields are left unchanged, never cleared. Stamps the grader and the time. \
        Idempotent and repeatable. Teachers of the unit only.",
    params(("id" = String, Path, description = "Deposit ID (UUID)")),
    request_body = GradeRequest,
    responses(
        (status = 200, description = "Deposit graded", body = DepositResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Deposit not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(deposit_id))]
pub async fn grade_deposit(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(deposit_id): Path<Uuid>,
    AppJson(payload): AppJson<GradeRequest>,
) -> Result<Json<DepositResponse>, AppError> {
    let existing = find_deposit_by_id(&state.db, deposit_id).await?;
    require_unit_teacher(&state.db, &auth_user, existing.course_unit_id).await?;

    apply_grade(&state.db, deposit_id, auth_user.user_id, &payload).await?;

    let updated = find_deposit_by_id(&state.db, deposit_id).await?;
    Ok(Json(deposit_response(&state, updated).await?))
}

#[utoipa::path(
    get,
    path = "/{id}/archive",
    tag = "Deposits",
    operation_id = "exportDeposit",
    summary = "Download one deposit as a zip archive",
    description = "Streams a compressed archive of the deposit's files, produced on the \
        fly. Accessible to the depositor and to teachers of the unit.",
    params(("id" = String, Path, description = "Deposit ID (UUID)")),
    responses(
        (status = 200, description = "Zip archive stream"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Deposit not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(deposit_id))]
pub async fn export_deposit(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(deposit_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let existing = find_deposit_by_id(&state.db, deposit_id).await?;
    if existing.participant_id != auth_user.user_id {
        require_unit_teacher(&state.db, &auth_user, existing.course_unit_id).await?;
    }

    let activity = find_activity(&state.db, existing.activity_id).await?;
    let participant = find_participant(&state.db, existing.participant_id).await?;

    let entries: Vec<ArchiveEntry> = parse_files(&existing.files)
        .into_iter()
        .map(|f| ArchiveEntry {
            path: f.filename,
            bucket: Bucket::Deposits,
            key: f.key,
        })
        .collect();

    let filename = archive::single_archive_name(
        &participant.last_name,
        &participant.first_name,
        &activity.title,
    );

    archive::zip_response(filename, entries, state.store.clone())
}

#[utoipa::path(
    get,
    path = "/{id}/deposits/archive",
    tag = "Deposits",
    operation_id = "exportAllDeposits",
    summary = "Download every deposit of an activity as one zip archive",
    description = "Streams a compressed archive with one `lastname_firstname/` folder per \
        participant. A file that cannot be fetched is skipped, not fatal. Teachers of the \
        unit only.",
    params(("id" = String, Path, description = "Activity ID (UUID)")),
    responses(
        (status = 200, description = "Zip archive stream"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Activity not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(activity_id))]
pub async fn export_all_deposits(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(activity_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let activity = find_activity(&state.db, activity_id).await?;
    require_unit_teacher(&state.db, &auth_user, activity.course_unit_id).await?;

    let rows = deposit::Entity::find()
        .filter(deposit::Column::ActivityId.eq(activity_id))
        .find_also_related(user::Entity)
        .order_by_asc(deposit::Column::CreatedAt)
        .all(&state.db)
        .await?;

    let mut entries = Vec::new();
    for (dep, participant) in rows {
        let participant =
            participant.ok_or_else(|| AppError::Internal("Deposit participant not found".into()))?;
        let folder =
            archive::participant_folder(&participant.last_name, &participant.first_name);
        for file in parse_files(&dep.files) {
            entries.push(ArchiveEntry {
                path: format!("{folder}/{}", file.filename),
                bucket: Bucket::Deposits,
                key: file.key,
            });
        }
    }

    let filename = archive::bulk_archive_name(&activity.title);
    archive::zip_response(filename, entries, state.store.clone())
}

// ---- Repository core ------------------------------------------------------
//
// The three mutating flows below enforce the ordering rules that keep the
// record store and the object store consistent:
//   submit:   upload new -> insert record  (rollback uploads on failure)
//   replace:  upload new -> update record -> delete old
//   withdraw: delete record -> delete blobs

/// Upload every staged file; on a partial failure, already-uploaded objects
/// are deleted before the error propagates.
async fn store_deposit_files(
    store: &dyn ObjectStore,
    staged: &[SpooledFile],
) -> Result<Vec<DepositFile>, AppError> {
    let mut stored: Vec<DepositFile> = Vec::with_capacity(staged.len());

    for file in staged {
        match upload_spooled(store, Bucket::Deposits, file).await {
            Ok(key) => stored.push(DepositFile {
                key,
                filename: file.filename.clone(),
                content_type: file.content_type.clone(),
                size: file.size as i64,
            }),
            Err(e) => {
                let keys: Vec<String> = stored.into_iter().map(|f| f.key).collect();
                rollback_uploads(store, Bucket::Deposits, &keys).await;
                return Err(e);
            }
        }
    }

    Ok(stored)
}

/// Submit flow: uploads first, record insert second. The unique index on
/// (activity_id, participant_id) decides concurrent duplicate submissions;
/// the loser's uploads are deleted before the Conflict is returned.
pub(crate) async fn submit_files<C: ConnectionTrait>(
    db: &C,
    store: &dyn ObjectStore,
    activity_id: Uuid,
    course_unit_id: i32,
    participant_id: i32,
    staged: &[SpooledFile],
) -> Result<StoredDeposit, AppError> {
    let files = store_deposit_files(store, staged).await?;
    let files_json = serde_json::json!(files);

    let id = Uuid::now_v7();
    let now = Utc::now();
    let new_deposit = deposit::ActiveModel {
        id: Set(id),
        activity_id: Set(activity_id),
        participant_id: Set(participant_id),
        course_unit_id: Set(course_unit_id),
        files: Set(files_json),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    let inserted = deposit::Entity::insert(new_deposit)
        .on_conflict(
            OnConflict::columns([
                deposit::Column::ActivityId,
                deposit::Column::ParticipantId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(db)
        .await;

    let keys: Vec<String> = files.iter().map(|f| f.key.clone()).collect();
    match inserted {
        Ok(rows) if rows > 0 => Ok(StoredDeposit {
            id,
            files,
            created_at: now,
        }),
        Ok(_) | Err(DbErr::RecordNotInserted) => {
            rollback_uploads(store, Bucket::Deposits, &keys).await;
            Err(AppError::Conflict(
                "You already submitted to this activity; replace your deposit instead".into(),
            ))
        }
        Err(e) => {
            rollback_uploads(store, Bucket::Deposits, &keys).await;
            Err(e.into())
        }
    }
}

/// Replace flow. Old files are deleted only after the record points at the
/// new set; a failed record write rolls the new uploads back and leaves the
/// prior submission untouched.
pub(crate) async fn replace_files<C: ConnectionTrait>(
    db: &C,
    store: &dyn ObjectStore,
    deposit_id: Uuid,
    old_files: &[DepositFile],
    staged: &[SpooledFile],
) -> Result<Vec<DepositFile>, AppError> {
    let new_files = store_deposit_files(store, staged).await?;
    let files_json = serde_json::json!(new_files);

    let updated = deposit::Entity::update_many()
        .col_expr(deposit::Column::Files, Expr::value(files_json))
        .col_expr(deposit::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(deposit::Column::Id.eq(deposit_id))
        .exec(db)
        .await;

    match updated {
        Ok(res) if res.rows_affected > 0 => {
            let old_keys: Vec<String> = old_files.iter().map(|f| f.key.clone()).collect();
            rollback_uploads(store, Bucket::Deposits, &old_keys).await;
            Ok(new_files)
        }
        other => {
            let new_keys: Vec<String> = new_files.into_iter().map(|f| f.key).collect();
            rollback_uploads(store, Bucket::Deposits, &new_keys).await;
            match other {
                Ok(_) => Err(AppError::NotFound("No deposit to replace".into())),
                Err(e) => Err(e.into()),
            }
        }
    }
}

/// Withdraw flow: record first, blobs second.
pub(crate) async fn withdraw_files<C: ConnectionTrait>(
    db: &C,
    store: &dyn ObjectStore,
    deposit_id: Uuid,
    files: &[DepositFile],
) -> Result<(), AppError> {
    let res = deposit::Entity::delete_by_id(deposit_id).exec(db).await?;
    if res.rows_affected == 0 {
        return Err(AppError::NotFound("No deposit to withdraw".into()));
    }

    let keys: Vec<String> = files.iter().map(|f| f.key.clone()).collect();
    rollback_uploads(store, Bucket::Deposits, &keys).await;
    Ok(())
}

/// Grading merge: only the provided fields are written, so an omitted score
/// or comment survives regrading untouched.
pub(crate) async fn apply_grade<C: ConnectionTrait>(
    db: &C,
    deposit_id: Uuid,
    grader_id: i32,
    payload: &GradeRequest,
) -> Result<(), AppError> {
    validate_grade(payload)?;

    let now = Utc::now();
    let mut update = deposit::Entity::update_many()
        .col_expr(deposit::Column::GraderId, Expr::value(Some(grader_id)))
        .col_expr(deposit::Column::GradedAt, Expr::value(Some(now)))
        .col_expr(deposit::Column::UpdatedAt, Expr::value(now));

    if let Some(score) = payload.score {
        update = update.col_expr(deposit::Column::Score, Expr::value(Some(score)));
    }
    if let Some(ref comment) = payload.comment {
        update = update.col_expr(deposit::Column::Comment, Expr::value(Some(comment.clone())));
    }

    let res = update
        .filter(deposit::Column::Id.eq(deposit_id))
        .exec(db)
        .await?;

    if res.rows_affected == 0 {
        return Err(AppError::NotFound("Deposit not found".into()));
    }
    Ok(())
}

/// Count, kind, and per-file policy checks. Pure; runs before any byte
/// reaches the object store.
pub(crate) fn validate_deposit_files(
    rules: &DepositoryRules,
    staged: &[SpooledFile],
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if let Some(due_at) = rules.due_at
        && now > due_at
    {
        return Err(AppError::PolicyViolation("The deadline has passed".into()));
    }

    if staged.is_empty() {
        return Err(AppError::Validation("At least one file is required".into()));
    }

    if staged.len() > rules.max_files as usize {
        return Err(AppError::PolicyViolation(format!(
            "Maximum {} files allowed",
            rules.max_files
        )));
    }

    let policy = Bucket::Deposits.policy();
    for file in staged {
        policy
            .check(&file.filename, file.content_type.as_deref(), file.size)
            .map_err(|e| AppError::PolicyViolation(e.to_string()))?;

        if let Some(ref allowed) = rules.allowed_kinds {
            let kind = file_kind(&file.filename);
            if !kind.is_some_and(|k| allowed.iter().any(|a| a == k)) {
                return Err(AppError::PolicyViolation(format!(
                    "File kind not accepted for '{}'; allowed: {}",
                    file.filename,
                    allowed.join(", ")
                )));
            }
        }
    }

    Ok(())
}

// ---- Helpers --------------------------------------------------------------

/// Spool every `files` multipart field to a temp file.
async fn spool_deposit_fields(mut multipart: Multipart) -> Result<Vec<SpooledFile>, AppError> {
    let max_size = Bucket::Deposits.policy().max_size;
    let mut staged: Vec<SpooledFile> = Vec::new();

    let result = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
        {
            match field.name() {
                Some("files") | Some("file") => {
                    staged.push(SpooledFile::from_field(field, max_size).await?);
                }
                _ => {} // Ignore unknown fields.
            }
        }
        Ok::<_, AppError>(())
    }
    .await;

    if let Err(e) = result {
        for file in &staged {
            file.cleanup().await;
        }
        return Err(e);
    }

    Ok(staged)
}

/// Participants may only submit when the activity is open to them: an
/// unrestricted activity accepts anyone authenticated, a restricted one
/// requires membership in one of its groups.
async fn check_submit_access<C: ConnectionTrait>(
    db: &C,
    auth_user: &AuthUser,
    activity: &activity::Model,
) -> Result<(), AppError> {
    let restricted: Option<Vec<i32>> = activity
        .restricted_group_ids
        .as_ref()
        .and_then(|v| serde_json::from_value(v.clone()).ok());

    let Some(group_ids) = restricted else {
        return Ok(());
    };

    let is_member = group_member::Entity::find()
        .filter(group_member::Column::GroupId.is_in(group_ids))
        .filter(group_member::Column::ParticipantId.eq(auth_user.user_id))
        .one(db)
        .await?
        .is_some();

    if is_member {
        Ok(())
    } else {
        Err(AppError::PermissionDenied)
    }
}

async fn find_deposit<C: ConnectionTrait>(
    db: &C,
    activity_id: Uuid,
    participant_id: i32,
) -> Result<Option<deposit::Model>, AppError> {
    Ok(deposit::Entity::find()
        .filter(deposit::Column::ActivityId.eq(activity_id))
        .filter(deposit::Column::ParticipantId.eq(participant_id))
        .one(db)
        .await?)
}

async fn find_deposit_by_id<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
) -> Result<deposit::Model, AppError> {
    deposit::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Deposit not found".into()))
}

async fn find_participant<C: ConnectionTrait>(db: &C, id: i32) -> Result<user::Model, AppError> {
    user::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::Internal("Deposit participant not found".into()))
}

fn parse_files(value: &serde_json::Value) -> Vec<DepositFile> {
    serde_json::from_value(value.clone()).unwrap_or_default()
}

fn evaluation_of(model: &deposit::Model) -> Option<EvaluationResponse> {
    model.graded_at?;
    Some(EvaluationResponse {
        score: model.score,
        comment: model.comment.clone(),
        grader_id: model.grader_id,
        graded_at: model.graded_at,
    })
}

/// Presign a retrieval URL per file at read time; keys stay internal.
async fn files_to_refs(
    state: &AppState,
    files: &[DepositFile],
) -> Result<Vec<DepositFileRef>, AppError> {
    let ttl = state.config.storage.presign_ttl_secs;
    let mut refs = Vec::with_capacity(files.len());
    for file in files {
        let url = state
            .store
            .presign_get(Bucket::Deposits, &file.key, ttl)
            .await?;
        refs.push(DepositFileRef {
            filename: file.filename.clone(),
            content_type: file.content_type.clone(),
            size: file.size,
            url,
        });
    }
    Ok(refs)
}

async fn deposit_response(
    state: &AppState,
    model: deposit::Model,
) -> Result<DepositResponse, AppError> {
    let files = parse_files(&model.files);
    Ok(DepositResponse {
        id: model.id.to_string(),
        activity_id: model.activity_id.to_string(),
        participant_id: model.participant_id,
        course_unit_id: model.course_unit_id,
        files: files_to_refs(state, &files).await?,
        evaluation: evaluation_of(&model),
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

#[cfg(test)]
mod tests {
    use common::storage::memory::MemoryObjectStore;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    use super::*;

    fn activity_id() -> Uuid {
        Uuid::parse_str("018f3a00-0000-7000-8000-00000000000a").unwrap()
    }

    fn deposit_id() -> Uuid {
        Uuid::parse_str("018f3a00-0000-7000-8000-00000000000d").unwrap()
    }

    fn rules(max_files: i32) -> DepositoryRules {
        DepositoryRules {
            max_files,
            allowed_kinds: None,
            due_at: None,
        }
    }

    async fn staged_pair() -> Vec<SpooledFile> {
        vec![
            SpooledFile::from_bytes("rapport.pdf", b"pdf bytes").await,
            SpooledFile::from_bytes("annexe.zip", b"zip bytes").await,
        ]
    }

    async fn cleanup(staged: &[SpooledFile]) {
        for file in staged {
            file.cleanup().await;
        }
    }

    fn exec_ok(rows: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: rows,
        }
    }

    // -- validation ---------------------------------------------------------

    #[tokio::test]
    async fn rejects_too_many_files() {
        let staged = staged_pair().await;
        let err = validate_deposit_files(&rules(1), &staged, Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::PolicyViolation(msg) if msg.contains("Maximum 1")));
        cleanup(&staged).await;
    }

    #[tokio::test]
    async fn rejects_empty_submission() {
        assert!(matches!(
            validate_deposit_files(&rules(3), &[], Utc::now()),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn rejects_disallowed_kind() {
        let staged = staged_pair().await;
        let restrictive = DepositoryRules {
            max_files: 5,
            allowed_kinds: Some(vec!["pdf".into()]),
            due_at: None,
        };
        // annexe.zip is an archive, not a pdf.
        assert!(matches!(
            validate_deposit_files(&restrictive, &staged, Utc::now()),
            Err(AppError::PolicyViolation(_))
        ));
        cleanup(&staged).await;
    }

    #[tokio::test]
    async fn rejects_past_deadline() {
        let staged = staged_pair().await;
        let closed = DepositoryRules {
            max_files: 5,
            allowed_kinds: None,
            due_at: Some(Utc::now() - chrono::Duration::hours(1)),
        };
        assert!(matches!(
            validate_deposit_files(&closed, &staged, Utc::now()),
            Err(AppError::PolicyViolation(_))
        ));
        cleanup(&staged).await;
    }

    // -- submit -------------------------------------------------------------

    #[tokio::test]
    async fn submit_persists_record_and_files() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec_ok(1)])
            .into_connection();
        let store = MemoryObjectStore::new();
        let staged = staged_pair().await;

        let stored = submit_files(&db, &store, activity_id(), 1, 42, &staged)
            .await
            .unwrap();

        assert_eq!(stored.files.len(), 2);
        assert_eq!(stored.files[0].filename, "rapport.pdf");
        assert_eq!(store.object_count().await, 2);
        for file in &stored.files {
            assert!(store.contains(Bucket::Deposits, &file.key).await);
        }
        cleanup(&staged).await;
    }

    #[tokio::test]
    async fn duplicate_submit_is_conflict_and_leaves_no_orphans() {
        // Unique index blocks the insert: zero rows affected.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec_ok(0)])
            .into_connection();
        let store = MemoryObjectStore::new();
        let staged = staged_pair().await;

        let err = submit_files(&db, &store, activity_id(), 1, 42, &staged)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.object_count().await, 0);
        cleanup(&staged).await;
    }

    #[tokio::test]
    async fn failed_record_write_deletes_every_uploaded_blob() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_errors([DbErr::Custom("connection reset".into())])
            .into_connection();
        let store = MemoryObjectStore::new();
        let staged = staged_pair().await;

        let err = submit_files(&db, &store, activity_id(), 1, 42, &staged)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(store.object_count().await, 0);
        cleanup(&staged).await;
    }

    #[tokio::test]
    async fn fresh_submit_after_failure_uses_disjoint_keys() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec_ok(0), exec_ok(1)])
            .into_connection();
        let store = MemoryObjectStore::new();
        let staged = staged_pair().await;

        assert!(submit_files(&db, &store, activity_id(), 1, 42, &staged)
            .await
            .is_err());
        let stored = submit_files(&db, &store, activity_id(), 1, 42, &staged)
            .await
            .unwrap();

        // Only the second attempt's objects exist.
        assert_eq!(store.object_count().await, stored.files.len());
        cleanup(&staged).await;
    }

    // -- replace ------------------------------------------------------------

    async fn preload_old_files(store: &MemoryObjectStore) -> Vec<DepositFile> {
        let old = vec![DepositFile {
            key: "1000-aaaaaaaa-old.pdf".to_string(),
            filename: "old.pdf".to_string(),
            content_type: Some("application/pdf".into()),
            size: 3,
        }];
        store
            .put(
                Bucket::Deposits,
                &old[0].key,
                Box::new(std::io::Cursor::new(b"old".to_vec())),
                3,
            )
            .await
            .unwrap();
        old
    }

    #[tokio::test]
    async fn replace_swaps_old_files_for_new() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec_ok(1)])
            .into_connection();
        let store = MemoryObjectStore::new();
        let old = preload_old_files(&store).await;
        let staged = staged_pair().await;

        let new_files = replace_files(&db, &store, deposit_id(), &old, &staged)
            .await
            .unwrap();

        assert_eq!(new_files.len(), 2);
        assert!(!store.contains(Bucket::Deposits, &old[0].key).await);
        assert_eq!(store.object_count().await, 2);
        cleanup(&staged).await;
    }

    #[tokio::test]
    async fn replace_failure_preserves_previous_submission() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_errors([DbErr::Custom("record store down".into())])
            .into_connection();
        let store = MemoryObjectStore::new();
        let old = preload_old_files(&store).await;
        let staged = staged_pair().await;

        let err = replace_files(&db, &store, deposit_id(), &old, &staged)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Internal(_)));
        // Old blob untouched, new uploads rolled back.
        assert!(store.contains(Bucket::Deposits, &old[0].key).await);
        assert_eq!(store.object_count().await, 1);
        cleanup(&staged).await;
    }

    // -- withdraw -----------------------------------------------------------

    #[tokio::test]
    async fn withdraw_deletes_record_then_blobs() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec_ok(1)])
            .into_connection();
        let store = MemoryObjectStore::new();
        let old = preload_old_files(&store).await;

        withdraw_files(&db, &store, deposit_id(), &old).await.unwrap();
        assert_eq!(store.object_count().await, 0);
    }

    #[tokio::test]
    async fn withdraw_missing_deposit_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec_ok(0)])
            .into_connection();
        let store = MemoryObjectStore::new();

        let err = withdraw_files(&db, &store, deposit_id(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    // -- grading ------------------------------------------------------------

    #[tokio::test]
    async fn grade_merges_only_provided_fields() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec_ok(1), exec_ok(1)])
            .into_connection();

        apply_grade(
            &db,
            deposit_id(),
            9,
            &GradeRequest {
                score: Some(15.0),
                comment: Some("good".into()),
            },
        )
        .await
        .unwrap();

        apply_grade(
            &db,
            deposit_id(),
            9,
            &GradeRequest {
                score: None,
                comment: Some("revised".into()),
            },
        )
        .await
        .unwrap();

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 2);
        let first = format!("{:?}", log[0]);
        let second = format!("{:?}", log[1]);
        // First grading writes both fields; regrading with only a comment
        // must leave the stored score column untouched.
        assert!(first.contains("score"));
        assert!(first.contains("comment"));
        assert!(second.contains("comment"));
        assert!(!second.contains("score"));
    }

    #[tokio::test]
    async fn grade_unknown_deposit_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec_ok(0)])
            .into_connection();

        let err = apply_grade(
            &db,
            deposit_id(),
            9,
            &GradeRequest {
                score: Some(10.0),
                comment: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
