use sea_orm::*;
use sea_query::{Index, PostgresQueryBuilder};
use tracing::info;

use crate::entity::{category, deposit};

/// Ensure required database indexes exist.
///
/// SeaORM's schema-sync doesn't support composite unique indexes, so we
/// create them manually on startup. Both unique indexes here are correctness
/// mechanisms, not query accelerators: the deposit index enforces the
/// one-deposit-per-(activity, participant) invariant, and the category index
/// is the guard the classifier's conditional create runs against. Failing to
/// create either is fatal.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    let stmt = Index::create()
        .if_not_exists()
        .unique()
        .name("uq_deposit_activity_participant")
        .table(deposit::Entity)
        .col(deposit::Column::ActivityId)
        .col(deposit::Column::ParticipantId)
        .to_string(PostgresQueryBuilder);
    db.execute_unprepared(&stmt).await?;
    info!("Ensured index uq_deposit_activity_participant exists");

    let stmt = Index::create()
        .if_not_exists()
        .unique()
        .name("uq_category_unit_name")
        .table(category::Entity)
        .col(category::Column::CourseUnitId)
        .col(category::Column::Name)
        .to_string(PostgresQueryBuilder);
    db.execute_unprepared(&stmt).await?;
    info!("Ensured index uq_category_unit_name exists");

    // Composite index for per-unit deposit listings:
    // SELECT ... FROM deposit WHERE course_unit_id = ?
    let stmt = Index::create()
        .if_not_exists()
        .name("idx_deposit_course_unit")
        .table(deposit::Entity)
        .col(deposit::Column::CourseUnitId)
        .to_string(PostgresQueryBuilder);

    match db.execute_unprepared(&stmt).await {
        Ok(_) => {
            info!("Ensured index idx_deposit_course_unit exists");
        }
        Err(e) => {
            tracing::warn!("Failed to create index idx_deposit_course_unit: {}", e);
        }
    }

    Ok(())
}
