use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "group_member")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub group_id: i32,
    #[sea_orm(primary_key)]
    pub participant_id: i32,
    #[sea_orm(belongs_to, from = "group_id", to = "id")]
    pub group: Option<super::course_group::Entity>,
    #[sea_orm(belongs_to, from = "participant_id", to = "id")]
    pub participant: Option<super::user::Entity>,

    pub joined_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
