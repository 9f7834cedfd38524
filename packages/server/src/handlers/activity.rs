use axum::Json;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use common::storage::{Bucket, ObjectStore, file_kind, original_filename};
use sea_orm::*;
use tracing::instrument;
use uuid::Uuid;

use crate::entity::activity::{self, ActivityKind, CompletionMark, Urgency};
use crate::entity::course_unit;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::activity::*;
use crate::state::AppState;
use crate::utils::access::require_unit_teacher;
use crate::utils::classify;
use crate::utils::upload::{SpooledFile, rollback_uploads, upload_spooled};

/// Body limit layer for activity multipart routes (file + metadata).
pub fn activity_upload_body_limit() -> DefaultBodyLimit {
    DefaultBodyLimit::max(160 * 1024 * 1024)
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Activities",
    operation_id = "createActivity",
    summary = "Create an activity in a course unit",
    description = "Creates an activity of a fixed variant. Multipart: a `meta` JSON field \
        (tagged by `kind`) plus an optional `file` field, required for `single_file` \
        activities and allowed as depository instructions. Teachers of the unit only.",
    params(("id" = i32, Path, description = "Course unit ID")),
    request_body(content_type = "multipart/form-data", description = "meta JSON + optional file"),
    responses(
        (status = 201, description = "Activity created", body = ActivityResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR, INVALID_ACTIVITY)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Course unit not found (NOT_FOUND)", body = ErrorBody),
        (status = 422, description = "File outside policy (POLICY_VIOLATION)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(course_unit_id))]
pub async fn create_activity(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(course_unit_id): Path<i32>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    require_unit_teacher(&state.db, &auth_user, course_unit_id).await?;
    find_course_unit(&state.db, course_unit_id).await?;

    let mut meta: Option<CreateActivityRequest> = None;
    let mut spooled: Option<SpooledFile> = None;

    let parsed = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
        {
            match field.name() {
                Some("meta") => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| AppError::Validation(format!("Failed to read meta: {e}")))?;
                    meta = Some(
                        serde_json::from_str(&text)
                            .map_err(|e| AppError::Validation(format!("Invalid meta: {e}")))?,
                    );
                }
                Some("file") => {
                    spooled = Some(
                        SpooledFile::from_field(field, Bucket::ActivityFiles.policy().max_size)
                            .await?,
                    );
                }
                _ => {} // Ignore unknown fields.
            }
        }
        Ok::<_, AppError>(())
    }
    .await;

    let result = match (parsed, meta) {
        (Ok(()), Some(meta)) => {
            create_activity_inner(&state, &auth_user, course_unit_id, meta, spooled.as_ref())
                .await
        }
        (Ok(()), None) => Err(AppError::Validation("Missing 'meta' field".into())),
        (Err(e), _) => Err(e),
    };

    if let Some(file) = spooled {
        file.cleanup().await;
    }

    let response = result?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn create_activity_inner(
    state: &AppState,
    auth_user: &AuthUser,
    course_unit_id: i32,
    meta: CreateActivityRequest,
    file: Option<&SpooledFile>,
) -> Result<ActivityResponse, AppError> {
    validate_create_activity(&meta)?;

    if let Some(file) = file {
        Bucket::ActivityFiles
            .policy()
            .check(&file.filename, file.content_type.as_deref(), file.size)
            .map_err(|e| AppError::PolicyViolation(e.to_string()))?;
    }

    let now = Utc::now();
    let id = Uuid::now_v7();

    let mut new_activity = activity::ActiveModel {
        id: Set(id),
        course_unit_id: Set(course_unit_id),
        pinned: Set(meta.pinned),
        restricted_group_ids: Set(meta
            .restricted_group_ids
            .as_ref()
            .map(|ids| serde_json::json!(ids))),
        completions: Set(serde_json::json!([])),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    // Uploaded before the record write; compensated below if that write
    // fails.
    let mut uploaded_key: Option<String> = None;

    match meta.detail {
        CreateActivityDetail::Announcement {
            title,
            body,
            urgency,
        } => {
            if file.is_some() {
                return Err(AppError::InvalidActivity(
                    "Announcements do not carry a file".into(),
                ));
            }
            new_activity.kind = Set(ActivityKind::Announcement);
            new_activity.title = Set(title.trim().to_string());
            new_activity.body = Set(body);
            new_activity.urgency = Set(Some(urgency.unwrap_or(Urgency::Normal)));
        }
        CreateActivityDetail::SingleFile { title, body } => {
            let file = file.ok_or_else(|| {
                AppError::InvalidActivity("A single_file activity requires a file upload".into())
            })?;
            let key = upload_spooled(&*state.store, Bucket::ActivityFiles, file).await?;
            new_activity.kind = Set(ActivityKind::SingleFile);
            new_activity.title = Set(title.trim().to_string());
            new_activity.body = Set(body);
            new_activity.file_kind = Set(file_kind(&file.filename).map(str::to_string));
            new_activity.file_key = Set(Some(key.clone()));
            uploaded_key = Some(key);
        }
        CreateActivityDetail::Depository {
            title,
            body,
            instructions,
            allowed_kinds,
            max_files,
            due_at,
        } => {
            match (&instructions, file) {
                (Some(_), Some(_)) => {
                    return Err(AppError::InvalidActivity(
                        "Instructions are either inline text or a file, not both".into(),
                    ));
                }
                (None, None) => {
                    return Err(AppError::InvalidActivity(
                        "A depository requires instructions (text or file)".into(),
                    ));
                }
                _ => {}
            }
            if let Some(file) = file {
                let key = upload_spooled(&*state.store, Bucket::ActivityFiles, file).await?;
                new_activity.instructions_key = Set(Some(key.clone()));
                uploaded_key = Some(key);
            }
            new_activity.kind = Set(ActivityKind::Depository);
            new_activity.title = Set(title.trim().to_string());
            new_activity.body = Set(body);
            new_activity.instructions_text = Set(instructions);
            new_activity.allowed_kinds =
                Set(allowed_kinds.as_ref().map(|k| serde_json::json!(k)));
            new_activity.max_files = Set(Some(max_files));
            new_activity.due_at = Set(due_at);
        }
    }

    let model = match new_activity.insert(&state.db).await {
        Ok(model) => model,
        Err(e) => {
            if let Some(key) = uploaded_key {
                rollback_uploads(&*state.store, Bucket::ActivityFiles, &[key]).await;
            }
            return Err(e.into());
        }
    };

    if let Some(ref category) = meta.category {
        classify::classify(&state.db, course_unit_id, model.id, category.trim()).await?;
    }

    activity_response(state, model, auth_user.user_id).await
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Activities",
    operation_id = "listActivities",
    summary = "List activities of a course unit",
    description = "Returns the unit's activities, pinned first, newest first.",
    params(("id" = i32, Path, description = "Course unit ID")),
    responses(
        (status = 200, description = "Activity list", body = ActivityListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Course unit not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(course_unit_id))]
pub async fn list_activities(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(course_unit_id): Path<i32>,
) -> Result<Json<ActivityListResponse>, AppError> {
    find_course_unit(&state.db, course_unit_id).await?;

    let models = activity::Entity::find()
        .filter(activity::Column::CourseUnitId.eq(course_unit_id))
        .order_by_desc(activity::Column::Pinned)
        .order_by_desc(activity::Column::CreatedAt)
        .all(&state.db)
        .await?;

    let total = models.len() as u64;
    let mut data = Vec::with_capacity(models.len());
    for model in models {
        data.push(activity_response(&state, model, auth_user.user_id).await?);
    }

    Ok(Json(ActivityListResponse { data, total }))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Activities",
    operation_id = "getActivity",
    summary = "Get an activity by ID",
    params(("id" = String, Path, description = "Activity ID (UUID)")),
    responses(
        (status = 200, description = "Activity details", body = ActivityResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Activity not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn get_activity(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActivityResponse>, AppError> {
    let model = find_activity(&state.db, id).await?;
    Ok(Json(activity_response(&state, model, auth_user.user_id).await?))
}

#[utoipa::path(
    patch,
    path = "/{id}",
    tag = "Activities",
    operation_id = "updateActivity",
    summary = "Update an activity",
    description = "PATCH semantics; only fields legal for the activity's variant may be set, \
        and the variant tag itself can never change. Teachers of the unit only.",
    params(("id" = String, Path, description = "Activity ID (UUID)")),
    request_body = UpdateActivityRequest,
    responses(
        (status = 200, description = "Activity updated", body = ActivityResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR, INVALID_ACTIVITY)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Activity not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(id))]
pub async fn update_activity(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<UpdateActivityRequest>,
) -> Result<Json<ActivityResponse>, AppError> {
    let existing = find_activity(&state.db, id).await?;
    require_unit_teacher(&state.db, &auth_user, existing.course_unit_id).await?;

    if payload.kind.is_some() {
        return Err(AppError::InvalidActivity(
            "The activity variant cannot be changed".into(),
        ));
    }
    reject_foreign_variant_fields(existing.kind, &payload)?;

    if let Some(ref title) = payload.title {
        crate::models::shared::validate_title(title)?;
    }
    if let Some(max_files) = payload.max_files
        && max_files < 1
    {
        return Err(AppError::InvalidActivity(
            "max_files must be at least 1".into(),
        ));
    }
    if let Some(Some(ref kinds)) = payload.allowed_kinds {
        validate_allowed_kinds(Some(kinds.as_slice()))?;
    }

    // Setting inline instructions supersedes a previously uploaded
    // instructions file; its blob is released after the record write.
    let mut stale_instructions_key: Option<String> = None;

    let mut active: activity::ActiveModel = existing.clone().into();
    if let Some(title) = payload.title {
        active.title = Set(title.trim().to_string());
    }
    if let Some(body) = payload.body {
        active.body = Set(body);
    }
    if let Some(pinned) = payload.pinned {
        active.pinned = Set(pinned);
    }
    match payload.restricted_group_ids {
        Some(Some(ids)) => active.restricted_group_ids = Set(Some(serde_json::json!(ids))),
        Some(None) => active.restricted_group_ids = Set(None),
        None => {}
    }
    if let Some(urgency) = payload.urgency {
        active.urgency = Set(Some(urgency));
    }
    if let Some(instructions) = payload.instructions {
        if let Some(key) = existing.instructions_key.clone() {
            stale_instructions_key = Some(key);
            active.instructions_key = Set(None);
        }
        active.instructions_text = Set(Some(instructions));
    }
    match payload.allowed_kinds {
        Some(Some(kinds)) => active.allowed_kinds = Set(Some(serde_json::json!(kinds))),
        Some(None) => active.allowed_kinds = Set(None),
        None => {}
    }
    if let Some(max_files) = payload.max_files {
        active.max_files = Set(Some(max_files));
    }
    match payload.due_at {
        Some(due_at) => active.due_at = Set(due_at),
        None => {}
    }
    active.updated_at = Set(Utc::now());

    let model = active.update(&state.db).await?;

    if let Some(key) = stale_instructions_key {
        rollback_uploads(&*state.store, Bucket::ActivityFiles, &[key]).await;
    }

    Ok(Json(activity_response(&state, model, auth_user.user_id).await?))
}

#[utoipa::path(
    put,
    path = "/{id}/file",
    tag = "Activities",
    operation_id = "replaceActivityFile",
    summary = "Replace the blob owned by an activity",
    description = "Replaces a single_file activity's file, or a depository's instructions \
        file. The new blob is uploaded and referenced before the old one is deleted, so a \
        mid-operation failure leaves the previous file intact. Teachers of the unit only.",
    params(("id" = String, Path, description = "Activity ID (UUID)")),
    request_body(content_type = "multipart/form-data", description = "file field"),
    responses(
        (status = 200, description = "File replaced", body = ActivityResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR, INVALID_ACTIVITY)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Activity not found (NOT_FOUND)", body = ErrorBody),
        (status = 422, description = "File outside policy (POLICY_VIOLATION)", body = ErrorBody),
        (status = 502, description = "Object store unreachable (STORAGE_UNAVAILABLE)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(id))]
pub async fn replace_activity_file(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<ActivityResponse>, AppError> {
    let existing = find_activity(&state.db, id).await?;
    require_unit_teacher(&state.db, &auth_user, existing.course_unit_id).await?;

    if existing.kind == ActivityKind::Announcement {
        return Err(AppError::InvalidActivity(
            "Announcements do not carry a file".into(),
        ));
    }

    let mut spooled: Option<SpooledFile> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        if field.name() == Some("file") {
            spooled =
                Some(SpooledFile::from_field(field, Bucket::ActivityFiles.policy().max_size).await?);
            break;
        }
    }
    let spooled = spooled.ok_or_else(|| AppError::Validation("Missing 'file' field".into()))?;

    let result = replace_activity_file_inner(&state, existing, &spooled).await;
    spooled.cleanup().await;
    let model = result?;

    Ok(Json(activity_response(&state, model, auth_user.user_id).await?))
}

async fn replace_activity_file_inner(
    state: &AppState,
    existing: activity::Model,
    file: &SpooledFile,
) -> Result<activity::Model, AppError> {
    Bucket::ActivityFiles
        .policy()
        .check(&file.filename, file.content_type.as_deref(), file.size)
        .map_err(|e| AppError::PolicyViolation(e.to_string()))?;

    // New blob first; the old one is only released once the record points
    // at its replacement.
    let new_key = upload_spooled(&*state.store, Bucket::ActivityFiles, file).await?;

    let old_key = match existing.kind {
        ActivityKind::SingleFile => existing.file_key.clone(),
        ActivityKind::Depository => existing.instructions_key.clone(),
        ActivityKind::Announcement => unreachable!("checked by caller"),
    };

    let mut active: activity::ActiveModel = existing.clone().into();
    match existing.kind {
        ActivityKind::SingleFile => {
            active.file_key = Set(Some(new_key.clone()));
            active.file_kind = Set(file_kind(&file.filename).map(str::to_string));
        }
        ActivityKind::Depository => {
            active.instructions_key = Set(Some(new_key.clone()));
            active.instructions_text = Set(None);
        }
        ActivityKind::Announcement => unreachable!("checked by caller"),
    }
    active.updated_at = Set(Utc::now());

    let model = match active.update(&state.db).await {
        Ok(model) => model,
        Err(e) => {
            rollback_uploads(&*state.store, Bucket::ActivityFiles, &[new_key]).await;
            return Err(e.into());
        }
    };

    if let Some(old_key) = old_key {
        rollback_uploads(&*state.store, Bucket::ActivityFiles, &[old_key]).await;
    }

    Ok(model)
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Activities",
    operation_id = "deleteActivity",
    summary = "Delete an activity",
    description = "Deletes the activity, removes it from its category (pruning the category \
        if it empties), and best-effort deletes any blob the activity owns. Deposits \
        referencing the activity are left for the caller to reconcile. Teachers of the unit \
        only.",
    params(("id" = String, Path, description = "Activity ID (UUID)")),
    responses(
        (status = 204, description = "Activity deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Activity not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn delete_activity(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let existing = find_activity(&state.db, id).await?;
    require_unit_teacher(&state.db, &auth_user, existing.course_unit_id).await?;

    activity::Entity::delete_by_id(id).exec(&state.db).await?;

    classify::remove_from_category(&state.db, existing.course_unit_id, id).await?;

    let owned_key = existing.file_key.or(existing.instructions_key);
    if let Some(key) = owned_key {
        rollback_uploads(&*state.store, Bucket::ActivityFiles, &[key]).await;
    }

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/{id}/category",
    tag = "Activities",
    operation_id = "reclassifyActivity",
    summary = "Move an activity to a category",
    description = "Removes the activity from its current category (pruning it if emptied), \
        then classifies it into the given category, creating it on first use. `category: \
        null` leaves the activity uncategorized. Race-free and idempotent. Teachers of the \
        unit only.",
    params(("id" = String, Path, description = "Activity ID (UUID)")),
    request_body = ClassifyRequest,
    responses(
        (status = 204, description = "Activity reclassified"),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Activity not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(id))]
pub async fn reclassify_activity(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<ClassifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let existing = find_activity(&state.db, id).await?;
    require_unit_teacher(&state.db, &auth_user, existing.course_unit_id).await?;

    let name = match payload.category {
        Some(ref name) => {
            crate::models::shared::validate_category_name(name)?;
            Some(name.trim())
        }
        None => None,
    };

    classify::reclassify(&state.db, existing.course_unit_id, id, name).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn find_activity<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
) -> Result<activity::Model, AppError> {
    activity::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Activity not found".into()))
}

async fn find_course_unit<C: ConnectionTrait>(
    db: &C,
    id: i32,
) -> Result<course_unit::Model, AppError> {
    course_unit::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Course unit not found".into()))
}

/// Name of the category currently holding an activity, if any.
async fn category_name_of<C: ConnectionTrait>(
    db: &C,
    course_unit_id: i32,
    activity_id: Uuid,
) -> Result<Option<String>, AppError> {
    let stmt = Statement::from_sql_and_values(
        DbBackend::Postgres,
        r#"SELECT "name" FROM "category"
           WHERE "course_unit_id" = $1 AND "activity_ids" @> $2::jsonb"#,
        [
            course_unit_id.into(),
            serde_json::json!([activity_id.to_string()]).into(),
        ],
    );

    let row = db.query_one_raw(stmt).await?;
    match row {
        Some(row) => Ok(Some(row.try_get("", "name")?)),
        None => Ok(None),
    }
}

/// Build a retrieval reference for a stored blob. URLs are presigned at
/// read time since the bucket may not be public.
async fn file_ref(
    store: &dyn ObjectStore,
    bucket: Bucket,
    key: &str,
    ttl_secs: u32,
) -> Result<FileRef, AppError> {
    let filename = original_filename(key).to_string();
    let content_type = mime_guess::from_path(&filename)
        .first()
        .map(|m| m.to_string());
    let url = store.presign_get(bucket, key, ttl_secs).await?;
    Ok(FileRef {
        filename,
        content_type,
        url,
    })
}

/// Assemble the full response DTO, switching exhaustively on the variant.
pub async fn activity_response(
    state: &AppState,
    model: activity::Model,
    viewer_id: i32,
) -> Result<ActivityResponse, AppError> {
    let ttl = state.config.storage.presign_ttl_secs;
    let category = category_name_of(&state.db, model.course_unit_id, model.id).await?;

    let marks: Vec<CompletionMark> =
        serde_json::from_value(model.completions.clone()).unwrap_or_default();
    let completed_by_me = marks.iter().any(|m| m.participant_id == viewer_id);

    let restricted_group_ids = model
        .restricted_group_ids
        .as_ref()
        .and_then(|v| serde_json::from_value::<Vec<i32>>(v.clone()).ok());

    let detail = match model.kind {
        ActivityKind::Announcement => ActivityDetail::Announcement {
            urgency: model.urgency.unwrap_or(Urgency::Normal),
        },
        ActivityKind::SingleFile => {
            let key = model
                .file_key
                .as_deref()
                .ok_or_else(|| AppError::Internal("single_file activity has no blob key".into()))?;
            ActivityDetail::SingleFile {
                file_kind: model.file_kind.clone(),
                file: file_ref(&*state.store, Bucket::ActivityFiles, key, ttl).await?,
            }
        }
        ActivityKind::Depository => {
            let instructions_file = match model.instructions_key.as_deref() {
                Some(key) => {
                    Some(file_ref(&*state.store, Bucket::ActivityFiles, key, ttl).await?)
                }
                None => None,
            };
            ActivityDetail::Depository {
                instructions_text: model.instructions_text.clone(),
                instructions_file,
                allowed_kinds: model
                    .allowed_kinds
                    .as_ref()
                    .and_then(|v| serde_json::from_value::<Vec<String>>(v.clone()).ok()),
                max_files: model.max_files.unwrap_or(1),
                due_at: model.due_at,
            }
        }
    };

    Ok(ActivityResponse {
        id: model.id.to_string(),
        course_unit_id: model.course_unit_id,
        title: model.title,
        body: model.body,
        pinned: model.pinned,
        restricted_group_ids,
        category,
        completion_count: marks.len(),
        completed_by_me,
        detail,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

/// Reject update fields that do not belong to the stored variant.
fn reject_foreign_variant_fields(
    kind: ActivityKind,
    payload: &UpdateActivityRequest,
) -> Result<(), AppError> {
    let mut illegal: Vec<&str> = Vec::new();

    if kind != ActivityKind::Announcement && payload.urgency.is_some() {
        illegal.push("urgency");
    }
    if kind != ActivityKind::Depository {
        if payload.instructions.is_some() {
            illegal.push("instructions");
        }
        if payload.allowed_kinds.is_some() {
            illegal.push("allowed_kinds");
        }
        if payload.max_files.is_some() {
            illegal.push("max_files");
        }
        if payload.due_at.is_some() {
            illegal.push("due_at");
        }
    }

    if illegal.is_empty() {
        Ok(())
    } else {
        Err(AppError::InvalidActivity(format!(
            "Fields not valid for this activity variant: {}",
            illegal.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch() -> UpdateActivityRequest {
        UpdateActivityRequest::default()
    }

    #[test]
    fn urgency_is_announcement_only() {
        let payload = UpdateActivityRequest {
            urgency: Some(Urgency::Urgent),
            ..patch()
        };
        assert!(reject_foreign_variant_fields(ActivityKind::Announcement, &payload).is_ok());
        assert!(reject_foreign_variant_fields(ActivityKind::Depository, &payload).is_err());
    }

    #[test]
    fn depository_fields_are_depository_only() {
        let payload = UpdateActivityRequest {
            max_files: Some(3),
            due_at: Some(Some(Utc::now())),
            ..patch()
        };
        assert!(reject_foreign_variant_fields(ActivityKind::Depository, &payload).is_ok());
        assert!(reject_foreign_variant_fields(ActivityKind::SingleFile, &payload).is_err());
        assert!(reject_foreign_variant_fields(ActivityKind::Announcement, &payload).is_err());
    }

    #[test]
    fn common_fields_are_always_legal() {
        let payload = UpdateActivityRequest {
            title: Some("New title".into()),
            pinned: Some(true),
            ..patch()
        };
        for kind in [
            ActivityKind::Announcement,
            ActivityKind::SingleFile,
            ActivityKind::Depository,
        ] {
            assert!(reject_foreign_variant_fields(kind, &payload).is_ok());
        }
    }
}
