use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "unit_teacher")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub course_unit_id: i32,
    #[sea_orm(primary_key)]
    pub teacher_id: i32,
    #[sea_orm(belongs_to, from = "course_unit_id", to = "id")]
    pub course_unit: Option<super::course_unit::Entity>,
    #[sea_orm(belongs_to, from = "teacher_id", to = "id")]
    pub teacher: Option<super::user::Entity>,

    pub assigned_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
