//! # Notification Repository
//!
//! In-app notifications. A notification without a target user is a broadcast
//! visible to every user of the tenant.

use std::sync::Arc;

use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter, TransactionTrait};

use crate::db::DbConnections;
use crate::error::{OperationExt, RepositoryError};
use crate::models::notification::{self, Entity as Notification, NotificationStatus};
use crate::optimistic::{UpdateMode, update_with_version};
use crate::pulid::Pulid;
use crate::query::{
    ENUM_OPS, FieldConfig, FieldKind, FieldSpec, ListRequest, ListResult, QueryBuilder,
    SearchConfig, TEXT_OPS, TIMESTAMP_OPS, TenantInfo,
};
use crate::record::{Record, now_unix};

use super::{find_in_tenant, insert_new, tenant_condition};

pub static NOTIFICATION_FIELDS: FieldConfig = FieldConfig {
    fields: &[
        FieldSpec {
            api_name: "eventType",
            column: "event_type",
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
            api_name: "createdAt",
            column: "created_at",
            kind: FieldKind::Timestamp,
            ops: TIMESTAMP_OPS,
            sortable: true,
        },
        FieldSpec {
            api_name: "expiresAt",
            column: "expires_at",
            kind: FieldKind::Timestamp,
            ops: TIMESTAMP_OPS,
            sortable: true,
        },
    ],
    search: SearchConfig {
        vector_column: None,
        columns: &["title", "message"],
    },
};

/// Repository for notification database operations
#[derive(Debug, Clone)]
pub struct NotificationRepository {
    db: Arc<DbConnections>,
}

impl NotificationRepository {
    pub fn new(db: Arc<DbConnections>) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        tenant: &TenantInfo,
        notification: notification::Model,
    ) -> Result<notification::Model, RepositoryError> {
        let txn = self.db.begin_write().await.with_op("notification.create")?;
        let notification = insert_new(&txn, notification, tenant)
            .await
            .with_op("notification.create")?;
        txn.commit().await.with_op("notification.create")?;
        Ok(notification)
    }

    /// Lists notifications; with `target_user_id` only that user's and
    /// broadcast notifications are returned.
    pub async fn list(
        &self,
        req: &ListRequest,
        target_user_id: Option<&Pulid>,
    ) -> Result<ListResult<notification::Model>, RepositoryError> {
        let mut builder = QueryBuilder::from_request(
            Notification::find(),
            &NOTIFICATION_FIELDS,
            self.db.backend(),
            req,
        )
        .with_op("notification.list")?;

        if let Some(user_id) = target_user_id {
            builder = builder.and_where(
                Condition::any()
                    .add(notification::Column::TargetUserId.eq(user_id.clone()))
                    .add(notification::Column::TargetUserId.is_null()),
            );
        }
        let paged = builder.finish(req.pagination);

        self.db
            .with_read(|conn| {
                let paged = paged.clone();
                async move { paged.scan_and_count(&conn).await }
            })
            .await
            .with_op("notification.list")
    }

    pub async fn get_by_id(
        &self,
        id: &Pulid,
        tenant: &TenantInfo,
    ) -> Result<notification::Model, RepositoryError> {
        self.db
            .with_read(|conn| {
                let (id, tenant) = (id.clone(), tenant.clone());
                async move { find_in_tenant::<notification::Model, _>(&conn, &id, &tenant).await }
            })
            .await
            .map_err(RepositoryError::from)
            .and_then(|found| {
                found.ok_or_else(|| RepositoryError::not_found(notification::Model::RESOURCE, id))
            })
            .with_op("notification.get_by_id")
    }

    pub async fn mark_read(
        &self,
        id: &Pulid,
        tenant: &TenantInfo,
        version: i64,
    ) -> Result<notification::Model, RepositoryError> {
        self.transition(id, tenant, version, NotificationStatus::Read)
            .await
            .with_op("notification.mark_read")
    }

    pub async fn mark_dismissed(
        &self,
        id: &Pulid,
        tenant: &TenantInfo,
        version: i64,
    ) -> Result<notification::Model, RepositoryError> {
        self.transition(id, tenant, version, NotificationStatus::Dismissed)
            .await
            .with_op("notification.mark_dismissed")
    }

    /// Marks every notification of the tenant whose expiry is at or before
    /// `now` as expired. Returns the number of rows changed.
    pub async fn expire_stale(&self, tenant: &TenantInfo, now: i64) -> Result<u64, RepositoryError> {
        let txn = self.db.begin_write().await.with_op("notification.expire_stale")?;
        let result = Notification::update_many()
            .col_expr(
                notification::Column::Status,
                Expr::value(NotificationStatus::Expired),
            )
            .col_expr(
                notification::Column::Version,
                Expr::col(notification::Column::Version).add(1),
            )
            .col_expr(notification::Column::UpdatedAt, Expr::value(now_unix()))
            .filter(tenant_condition::<notification::Model>(tenant))
            .filter(notification::Column::ExpiresAt.lte(now))
            .filter(notification::Column::Status.is_not_in([
                NotificationStatus::Expired,
                NotificationStatus::Dismissed,
            ]))
            .exec(&txn)
            .await
            .with_op("notification.expire_stale")?;
        txn.commit().await.with_op("notification.expire_stale")?;

        if result.rows_affected > 0 {
            tracing::info!(
                org_id = %tenant.org_id,
                expired = result.rows_affected,
                "Expired stale notifications"
            );
        }
        Ok(result.rows_affected)
    }

    async fn transition(
        &self,
        id: &Pulid,
        tenant: &TenantInfo,
        version: i64,
        status: NotificationStatus,
    ) -> Result<notification::Model, RepositoryError> {
        let txn = self.db.write().begin().await?;
        let mut notification = find_in_tenant::<notification::Model, _>(&txn, id, tenant)
            .await?
            .ok_or_else(|| RepositoryError::not_found(notification::Model::RESOURCE, id))?;

        // The caller's version guards the write, not the one just read.
        notification.version = version;
        notification.status = status;
        if status == NotificationStatus::Read && notification.read_at.is_none() {
            notification.read_at = Some(now_unix());
        }

        update_with_version(&txn, &mut notification, UpdateMode::Full).await?;
        txn.commit().await?;
        Ok(notification)
    }
}
