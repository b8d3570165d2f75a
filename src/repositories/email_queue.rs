//! # Email Queue Repository
//!
//! Outbound messages waiting for delivery. The delivery worker pulls
//! batches with [`EmailQueueRepository::get_pending`] and
//! [`EmailQueueRepository::get_scheduled`] and reports back through the
//! `mark_*` methods.

use std::sync::Arc;

use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, Order, QueryFilter, QueryOrder, QuerySelect,
};

use crate::db::DbConnections;
use crate::error::{OperationExt, RepositoryError};
use crate::models::email_queue::{self, EmailPriority, Entity as EmailQueue, QueueStatus};
use crate::optimistic::{UpdateMode, update_with_version};
use crate::pulid::Pulid;
use crate::query::{
    ENUM_OPS, FieldConfig, FieldKind, FieldSpec, ID_OPS, ListRequest, ListResult, NUMBER_OPS,
    SearchConfig, TEXT_OPS, TIMESTAMP_OPS, TenantInfo,
};
use crate::record::{EnvelopeColumn, Record, now_unix};

use super::{find_in_tenant, insert_new, list_with_config, tenant_condition};

pub static EMAIL_QUEUE_FIELDS: FieldConfig = FieldConfig {
    fields: &[
        FieldSpec {
            api_name: "profileId",
            column: "profile_id",
            kind: FieldKind::Text,
            ops: ID_OPS,
            sortable: false,
        },
        FieldSpec {
            api_name: "subject",
            column: "subject",
            kind: FieldKind::Text,
            ops: TEXT_OPS,
            sortable: true,
        },
        FieldSpec {
            api_name: "priority",
            column: "priority",
            kind: FieldKind::Enum,
            ops: ENUM_OPS,
            sortable: true,
        },
        FieldSpec {
            api_name: "status",
            column: "status",
            kind: FieldKind::Enum,
            ops: ENUM_OPS,
            sortable: true,
        },
        FieldSpec {
            api_name: "retryCount",
            column: "retry_count",
            kind: FieldKind::Integer,
            ops: NUMBER_OPS,
            sortable: true,
        },
        FieldSpec {
            api_name: "scheduledAt",
            column: "scheduled_at",
            kind: FieldKind::Timestamp,
            ops: TIMESTAMP_OPS,
            sortable: true,
        },
        FieldSpec {
            api_name: "createdAt",
            column: "created_at",
            kind: FieldKind::Timestamp,
            ops: TIMESTAMP_OPS,
            sortable: true,
        },
    ],
    search: SearchConfig {
        vector_column: None,
        columns: &["to_addresses", "subject", "error_message"],
    },
};

/// Repository for email queue database operations
#[derive(Debug, Clone)]
pub struct EmailQueueRepository {
    db: Arc<DbConnections>,
}

impl EmailQueueRepository {
    pub fn new(db: Arc<DbConnections>) -> Self {
        Self { db }
    }

    pub async fn list(
        &self,
        req: &ListRequest,
    ) -> Result<ListResult<email_queue::Model>, RepositoryError> {
        list_with_config::<EmailQueue>(&self.db, &EMAIL_QUEUE_FIELDS, req)
            .await
            .with_op("email_queue.list")
    }

    pub async fn get_by_id(
        &self,
        id: &Pulid,
        tenant: &TenantInfo,
    ) -> Result<email_queue::Model, RepositoryError> {
        self.db
            .with_read(|conn| {
                let (id, tenant) = (id.clone(), tenant.clone());
                async move { find_in_tenant::<email_queue::Model, _>(&conn, &id, &tenant).await }
            })
            .await
            .map_err(RepositoryError::from)
            .and_then(|found| {
                found.ok_or_else(|| RepositoryError::not_found(email_queue::Model::RESOURCE, id))
            })
            .with_op("email_queue.get_by_id")
    }

    pub async fn create(
        &self,
        tenant: &TenantInfo,
        mut entry: email_queue::Model,
    ) -> Result<email_queue::Model, RepositoryError> {
        stamp_sent_at(&mut entry);

        let txn = self.db.begin_write().await.with_op("email_queue.create")?;
        let entry = insert_new(&txn, entry, tenant)
            .await
            .with_op("email_queue.create")?;
        txn.commit().await.with_op("email_queue.create")?;

        tracing::debug!(
            id = %entry.id,
            org_id = %tenant.org_id,
            status = ?entry.status,
            "Queued email"
        );
        Ok(entry)
    }

    pub async fn update(
        &self,
        tenant: &TenantInfo,
        mut entry: email_queue::Model,
    ) -> Result<email_queue::Model, RepositoryError> {
        entry.set_tenant(&tenant.org_id, &tenant.bu_id);
        stamp_sent_at(&mut entry);

        let txn = self.db.begin_write().await.with_op("email_queue.update")?;
        update_with_version(&txn, &mut entry, UpdateMode::Full)
            .await
            .with_op("email_queue.update")?;
        txn.commit().await.with_op("email_queue.update")?;
        Ok(entry)
    }

    /// Up to `limit` pending messages, highest priority first, then oldest.
    pub async fn get_pending(
        &self,
        tenant: &TenantInfo,
        limit: u64,
    ) -> Result<Vec<email_queue::Model>, RepositoryError> {
        self.db
            .with_read(|conn| {
                let tenant = tenant.clone();
                async move {
                    EmailQueue::find()
                        .filter(tenant_condition::<email_queue::Model>(&tenant))
                        .filter(email_queue::Column::Status.eq(QueueStatus::Pending))
                        .order_by(priority_rank(), Order::Asc)
                        .order_by_asc(email_queue::Column::CreatedAt)
                        .order_by_asc(email_queue::Column::Id)
                        .limit(limit)
                        .all(&conn)
                        .await
                }
            })
            .await
            .with_op("email_queue.get_pending")
    }

    /// Up to `limit` scheduled messages that are due at `now`, highest
    /// priority first, then earliest schedule.
    pub async fn get_scheduled(
        &self,
        tenant: &TenantInfo,
        now: i64,
        limit: u64,
    ) -> Result<Vec<email_queue::Model>, RepositoryError> {
        self.db
            .with_read(|conn| {
                let tenant = tenant.clone();
                async move {
                    EmailQueue::find()
                        .filter(tenant_condition::<email_queue::Model>(&tenant))
                        .filter(email_queue::Column::Status.eq(QueueStatus::Scheduled))
                        .filter(email_queue::Column::ScheduledAt.lte(now))
                        .order_by(priority_rank(), Order::Asc)
                        .order_by_asc(email_queue::Column::ScheduledAt)
                        .order_by_asc(email_queue::Column::Id)
                        .limit(limit)
                        .all(&conn)
                        .await
                }
            })
            .await
            .with_op("email_queue.get_scheduled")
    }

    pub async fn mark_as_sent(
        &self,
        id: &Pulid,
        tenant: &TenantInfo,
        message_id: &str,
    ) -> Result<(), RepositoryError> {
        let changes = vec![
            (email_queue::Column::Status, Expr::value(QueueStatus::Sent)),
            (email_queue::Column::SentAt, Expr::value(now_unix())),
            (email_queue::Column::MessageId, Expr::value(message_id)),
        ];
        self.apply(id, tenant, changes)
            .await
            .with_op("email_queue.mark_as_sent")
    }

    pub async fn mark_as_failed(
        &self,
        id: &Pulid,
        tenant: &TenantInfo,
        error_message: &str,
    ) -> Result<(), RepositoryError> {
        let changes = vec![
            (email_queue::Column::Status, Expr::value(QueueStatus::Failed)),
            (email_queue::Column::ErrorMessage, Expr::value(error_message)),
        ];
        self.apply(id, tenant, changes)
            .await
            .with_op("email_queue.mark_as_failed")
    }

    pub async fn increment_retry_count(
        &self,
        id: &Pulid,
        tenant: &TenantInfo,
    ) -> Result<(), RepositoryError> {
        let changes = vec![(
            email_queue::Column::RetryCount,
            Expr::col(email_queue::Column::RetryCount).add(1),
        )];
        self.apply(id, tenant, changes)
            .await
            .with_op("email_queue.increment_retry_count")
    }

    /// Applies `changes` to one row of the tenant, bumping its version.
    async fn apply(
        &self,
        id: &Pulid,
        tenant: &TenantInfo,
        changes: Vec<(email_queue::Column, SimpleExpr)>,
    ) -> Result<(), RepositoryError> {
        let txn = self.db.begin_write().await?;
        let rows = update_row(&txn, id, tenant, changes).await?;
        if rows == 0 {
            return Err(RepositoryError::not_found(email_queue::Model::RESOURCE, id));
        }
        txn.commit().await?;
        Ok(())
    }
}

async fn update_row<C: ConnectionTrait>(
    conn: &C,
    id: &Pulid,
    tenant: &TenantInfo,
    changes: Vec<(email_queue::Column, SimpleExpr)>,
) -> Result<u64, RepositoryError> {
    let mut update = EmailQueue::update_many()
        .col_expr(
            email_queue::Column::Version,
            Expr::col(email_queue::Column::Version).add(1),
        )
        .col_expr(email_queue::Column::UpdatedAt, Expr::value(now_unix()));
    for (column, value) in changes {
        update = update.col_expr(column, value);
    }

    let result = update
        .filter(email_queue::Model::column(EnvelopeColumn::Id).eq(id.clone()))
        .filter(tenant_condition::<email_queue::Model>(tenant))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

/// A message saved as sent always carries the time it went out.
fn stamp_sent_at(entry: &mut email_queue::Model) {
    if entry.status == QueueStatus::Sent && entry.sent_at.is_none() {
        entry.sent_at = Some(now_unix());
    }
}

/// `1` for high, `2` for medium, `3` for low priority.
fn priority_rank() -> SimpleExpr {
    Expr::case(
        email_queue::Column::Priority.eq(EmailPriority::High),
        Expr::val(1),
    )
    .case(
        email_queue::Column::Priority.eq(EmailPriority::Medium),
        Expr::val(2),
    )
    .finally(Expr::val(3))
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(status: QueueStatus, sent_at: Option<i64>) -> email_queue::Model {
        email_queue::Model {
            id: Pulid::nil(),
            organization_id: Pulid::nil(),
            business_unit_id: Pulid::nil(),
            profile_id: Pulid::new("ep_"),
            template_id: None,
            to_addresses: "ops@example.com".to_string(),
            cc_addresses: None,
            subject: "Load tendered".to_string(),
            html_body: None,
            text_body: Some("See attached".to_string()),
            priority: EmailPriority::Medium,
            status,
            scheduled_at: None,
            sent_at,
            message_id: None,
            error_message: None,
            retry_count: 0,
            version: 0,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn sent_rows_get_a_sent_at() {
        let mut sent = entry(QueueStatus::Sent, None);
        stamp_sent_at(&mut sent);
        assert!(sent.sent_at.is_some());

        let mut kept = entry(QueueStatus::Sent, Some(42));
        stamp_sent_at(&mut kept);
        assert_eq!(kept.sent_at, Some(42));

        let mut pending = entry(QueueStatus::Pending, None);
        stamp_sent_at(&mut pending);
        assert_eq!(pending.sent_at, None);
    }
}
