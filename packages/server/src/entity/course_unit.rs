use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "course_unit")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub code: String,
    pub title: String,

    /// Course illustration in the course-images bucket.
    pub image_key: Option<String>,

    #[sea_orm(has_many)]
    pub activities: HasMany<super::activity::Entity>,

    #[sea_orm(has_many)]
    pub groups: HasMany<super::course_group::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
