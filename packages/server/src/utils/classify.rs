use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ConnectionTrait, DbBackend, DbErr, EntityTrait, Set, Statement};
use serde_json::json;
use uuid::Uuid;

use crate::entity::category;
use crate::error::AppError;

/// Assign an activity to the named category of its course unit.
///
/// Two sequential guarded updates, no locks; cross-process safety comes from
/// the conditional clauses and the (course_unit_id, name) unique index:
///
/// 1. conditional append — matches only if the category exists and does not
///    already contain the activity;
/// 2. conditional create — `ON CONFLICT DO NOTHING`, so a concurrent creator
///    of the same category wins silently and we fall back to one more
///    conditional append.
///
/// Idempotent: classifying an activity into a category that already holds it
/// succeeds without touching the row.
pub async fn classify<C: ConnectionTrait>(
    db: &C,
    course_unit_id: i32,
    activity_id: Uuid,
    name: &str,
) -> Result<(), AppError> {
    if append_to_category(db, course_unit_id, activity_id, name).await? {
        return Ok(());
    }

    let now = Utc::now();
    let new_category = category::ActiveModel {
        course_unit_id: Set(course_unit_id),
        name: Set(name.to_string()),
        description: Set(None),
        activity_ids: Set(json!([activity_id.to_string()])),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    let inserted = category::Entity::insert(new_category)
        .on_conflict(
            OnConflict::columns([category::Column::CourseUnitId, category::Column::Name])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await;

    match inserted {
        Ok(rows) if rows > 0 => return Ok(()),
        Ok(_) | Err(DbErr::RecordNotInserted) => {}
        Err(e) => return Err(e.into()),
    }

    // Lost the create race, or the append was a no-op because the activity
    // is already classified here. One more conditional append settles it:
    // the failed create proves the category exists, so a second no-op
    // append can only mean the id is already present.
    if !append_to_category(db, course_unit_id, activity_id, name).await? {
        tracing::debug!(%activity_id, category = %name, "Already classified");
    }
    Ok(())
}

/// Move an activity to a different category, or out of any category.
///
/// Removal first, then classification into the new name if one was given;
/// categories emptied by the removal are pruned.
pub async fn reclassify<C: ConnectionTrait>(
    db: &C,
    course_unit_id: i32,
    activity_id: Uuid,
    new_name: Option<&str>,
) -> Result<(), AppError> {
    remove_from_category(db, course_unit_id, activity_id).await?;
    if let Some(name) = new_name {
        classify(db, course_unit_id, activity_id, name).await?;
    }
    Ok(())
}

/// Remove an activity from whichever category of its unit currently holds
/// it, then prune empty categories.
pub async fn remove_from_category<C: ConnectionTrait>(
    db: &C,
    course_unit_id: i32,
    activity_id: Uuid,
) -> Result<(), AppError> {
    let stmt = Statement::from_sql_and_values(
        DbBackend::Postgres,
        r#"UPDATE "category"
           SET "activity_ids" = "activity_ids" - $1::text, "updated_at" = $2
           WHERE "course_unit_id" = $3 AND "activity_ids" @> $4::jsonb"#,
        [
            activity_id.to_string().into(),
            Utc::now().into(),
            course_unit_id.into(),
            json!([activity_id.to_string()]).into(),
        ],
    );
    db.execute_raw(stmt).await?;

    let stmt = Statement::from_sql_and_values(
        DbBackend::Postgres,
        r#"DELETE FROM "category"
           WHERE "course_unit_id" = $1 AND "activity_ids" = '[]'::jsonb"#,
        [course_unit_id.into()],
    );
    db.execute_raw(stmt).await?;

    Ok(())
}

/// Conditional jsonb append. Returns whether a row matched.
async fn append_to_category<C: ConnectionTrait>(
    db: &C,
    course_unit_id: i32,
    activity_id: Uuid,
    name: &str,
) -> Result<bool, AppError> {
    let member = json!([activity_id.to_string()]);
    let stmt = Statement::from_sql_and_values(
        DbBackend::Postgres,
        r#"UPDATE "category"
           SET "activity_ids" = "activity_ids" || $1::jsonb, "updated_at" = $2
           WHERE "course_unit_id" = $3 AND "name" = $4
             AND NOT ("activity_ids" @> $1::jsonb)"#,
        [
            member.into(),
            Utc::now().into(),
            course_unit_id.into(),
            name.into(),
        ],
    );

    let result = db.execute_raw(stmt).await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    use super::*;

    fn uuid() -> Uuid {
        Uuid::parse_str("018f3a00-0000-7000-8000-000000000001").unwrap()
    }

    #[tokio::test]
    async fn classify_stops_after_matching_append() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        classify(&db, 1, uuid(), "Lectures").await.unwrap();

        // A single UPDATE, no INSERT.
        assert_eq!(db.into_transaction_log().len(), 1);
    }

    #[tokio::test]
    async fn classify_creates_category_when_absent() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                // Conditional append matches nothing.
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
                // Conditional create wins.
                MockExecResult {
                    last_insert_id: 1,
                    rows_affected: 1,
                },
            ])
            .into_connection();

        classify(&db, 1, uuid(), "Lectures").await.unwrap();
        assert_eq!(db.into_transaction_log().len(), 2);
    }

    #[tokio::test]
    async fn classify_retries_append_after_lost_create_race() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                // Append: category does not exist yet.
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
                // Create: concurrent caller won, ON CONFLICT DO NOTHING.
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
                // Retried append lands in the survivor.
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
            ])
            .into_connection();

        classify(&db, 1, uuid(), "Lectures").await.unwrap();
        assert_eq!(db.into_transaction_log().len(), 3);
    }

    #[tokio::test]
    async fn classify_is_idempotent_when_already_classified() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                // Append no-op: guard sees the id already present.
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
                // Create no-op: category exists.
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
                // Retried append is still a no-op.
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
            ])
            .into_connection();

        classify(&db, 1, uuid(), "Lectures").await.unwrap();
        assert_eq!(db.into_transaction_log().len(), 3);
    }
}
