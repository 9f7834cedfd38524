use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};

use crate::entity::unit_teacher;
use crate::error::AppError;
use crate::extractors::auth::AuthUser;

/// Whether a teacher is assigned to a course unit.
pub async fn teaches_unit<C: ConnectionTrait>(
    db: &C,
    teacher_id: i32,
    course_unit_id: i32,
) -> Result<bool, AppError> {
    let exists = unit_teacher::Entity::find()
        .filter(unit_teacher::Column::CourseUnitId.eq(course_unit_id))
        .filter(unit_teacher::Column::TeacherId.eq(teacher_id))
        .one(db)
        .await?
        .is_some();
    Ok(exists)
}

/// Teacher-role gate scoped to one course unit: graders may only act on
/// deposits and activities of units they teach.
pub async fn require_unit_teacher<C: ConnectionTrait>(
    db: &C,
    auth_user: &AuthUser,
    course_unit_id: i32,
) -> Result<(), AppError> {
    auth_user.require_teacher()?;
    if teaches_unit(db, auth_user.user_id, course_unit_id).await? {
        Ok(())
    } else {
        Err(AppError::PermissionDenied)
    }
}
