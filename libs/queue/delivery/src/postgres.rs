//! Postgres outbox repository (sea-orm).

use crate::entity;
use crate::error::{DeliveryError, DeliveryResult};
use crate::outbox::{NewOutboxRow, OutboxRepository, OutboxRow};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use uuid::Uuid;

pub struct PgOutboxRepository {
    db: DatabaseConnection,
}

impl PgOutboxRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OutboxRepository for PgOutboxRepository {
    async fn append_in_txn(
        &self,
        txn: &DatabaseTransaction,
        row: NewOutboxRow,
    ) -> DeliveryResult<OutboxRow> {
        let active = entity::ActiveModel {
            id: Set(Uuid::now_v7()),
            queue: Set(row.queue),
            payload: Set(row.payload),
            created_at: Set(Utc::now().into()),
            processed_at: Set(None),
            status: Set(entity::Status::Pending),
            attempts: Set(0),
            last_error: Set(None),
        };

        let model = active.insert(txn).await?;
        tracing::debug!(row_id = %model.id, queue = %model.queue, "Appended outbox row");
        Ok(model.into())
    }

    async fn fetch_pending(&self, limit: u64, max_attempts: u32) -> DeliveryResult<Vec<OutboxRow>> {
        let rows = entity::Entity::find()
            .filter(entity::Column::Status.eq(entity::Status::Pending))
            .filter(entity::Column::Attempts.lt(max_attempts as i32))
            .order_by_asc(entity::Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_processed(&self, id: Uuid) -> DeliveryResult<()> {
        let row = entity::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(DeliveryError::RowNotFound(id))?;

        let mut active: entity::ActiveModel = row.into();
        active.status = Set(entity::Status::Processed);
        active.processed_at = Set(Some(Utc::now().into()));
        active.update(&self.db).await?;
        Ok(())
    }

    async fn record_failure(&self, id: Uuid, error: &str) -> DeliveryResult<()> {
        let row = entity::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(DeliveryError::RowNotFound(id))?;

        let attempts = row.attempts + 1;
        let mut active: entity::ActiveModel = row.into();
        active.attempts = Set(attempts);
        active.last_error = Set(Some(error.to_string()));
        active.update(&self.db).await?;
        Ok(())
    }

    async fn pending_count(&self) -> DeliveryResult<u64> {
        let count = entity::Entity::find()
            .filter(entity::Column::Status.eq(entity::Status::Pending))
            .count(&self.db)
            .await?;
        Ok(count)
    }
}
