//! Sea-ORM entity for the outbox table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Row status; `processed` is terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "outbox_status")]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processed")]
    Processed,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "outbox")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub queue: String,
    pub payload: Json,
    pub created_at: DateTimeWithTimeZone,
    pub processed_at: Option<DateTimeWithTimeZone>,
    pub status: Status,
    pub attempts: i32,
    pub last_error: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for crate::outbox::OutboxRow {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            queue: model.queue,
            payload: model.payload,
            created_at: model.created_at.into(),
            processed_at: model.processed_at.map(Into::into),
            status: match model.status {
                Status::Pending => crate::outbox::OutboxStatus::Pending,
                Status::Processed => crate::outbox::OutboxStatus::Processed,
            },
            attempts: model.attempts as u32,
            last_error: model.last_error,
        }
    }
}
