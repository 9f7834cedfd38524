use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "course_group")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub course_unit_id: i32,
    #[sea_orm(belongs_to, from = "course_unit_id", to = "id")]
    pub course_unit: HasOne<super::course_unit::Entity>,

    pub name: String,

    /// Academic period the group belongs to: starting calendar year and
    /// semester (1 or 2).
    pub academic_year: i32,
    pub semester: i32,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
