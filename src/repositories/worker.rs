//! # Worker Repository
//!
//! Drivers and other workers with their paid time off. PTO entries are owned
//! by the worker; an entry id that does not belong to the worker is rejected
//! rather than silently inserted.

use std::sync::Arc;

use sea_orm::TransactionTrait;
use serde::{Deserialize, Serialize};

use crate::db::DbConnections;
use crate::error::{OperationExt, RepositoryError};
use crate::models::worker::{self, Entity as Worker};
use crate::models::worker_pto;
use crate::optimistic::{UpdateMode, update_with_version};
use crate::pulid::Pulid;
use crate::query::{
    ARRAY_OPS, ENUM_OPS, FieldConfig, FieldKind, FieldSpec, ListRequest, ListResult, SearchConfig,
    TEXT_OPS, TIMESTAMP_OPS, TenantInfo,
};
use crate::reconcile::{ParentRef, reconcile};
use crate::record::Record;

use super::{children_by_parent, find_in_tenant, insert_new, list_with_config};

pub static WORKER_FIELDS: FieldConfig = FieldConfig {
    fields: &[
        FieldSpec {
            api_name: "status",
            column: "status",
            kind: FieldKind::Enum,
            ops: ENUM_OPS,
            sortable: true,
        },
        FieldSpec {
            api_name: "firstName",
            column: "first_name",
            kind: FieldKind::Text,
            ops: TEXT_OPS,
            sortable: true,
        },
        FieldSpec {
            api_name: "lastName",
            column: "last_name",
            kind: FieldKind::Text,
            ops: TEXT_OPS,
            sortable: true,
        },
        FieldSpec {
            api_name: "workerType",
            column: "worker_type",
            kind: FieldKind::Text,
            ops: ENUM_OPS,
            sortable: true,
        },
        FieldSpec {
            api_name: "endorsements",
            column: "endorsements",
            kind: FieldKind::JsonArray,
            ops: ARRAY_OPS,
            sortable: false,
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
        columns: &["first_name", "last_name"],
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerDetails {
    #[serde(flatten)]
    pub worker: worker::Model,
    #[serde(default)]
    pub pto: Vec<worker_pto::Model>,
}

/// Repository for worker database operations
#[derive(Debug, Clone)]
pub struct WorkerRepository {
    db: Arc<DbConnections>,
}

impl WorkerRepository {
    pub fn new(db: Arc<DbConnections>) -> Self {
        Self { db }
    }

    pub async fn list(&self, req: &ListRequest) -> Result<ListResult<worker::Model>, RepositoryError> {
        list_with_config::<Worker>(&self.db, &WORKER_FIELDS, req)
            .await
            .with_op("worker.list")
    }

    pub async fn get_by_id(
        &self,
        id: &Pulid,
        tenant: &TenantInfo,
        include_pto: bool,
    ) -> Result<WorkerDetails, RepositoryError> {
        self.db
            .with_read(|conn| {
                let (id, tenant) = (id.clone(), tenant.clone());
                async move {
                    let Some(found) = find_in_tenant::<worker::Model, _>(&conn, &id, &tenant).await?
                    else {
                        return Ok(None);
                    };
                    let pto = if include_pto {
                        children_by_parent::<worker_pto::Model, _>(
                            &conn,
                            vec![found.id.clone()],
                            &tenant,
                            worker_pto::Column::StartDate,
                        )
                        .await?
                        .remove(&found.id)
                        .unwrap_or_default()
                    } else {
                        Vec::new()
                    };
                    Ok(Some(WorkerDetails { worker: found, pto }))
                }
            })
            .await
            .map_err(RepositoryError::from)
            .and_then(|found| {
                found.ok_or_else(|| RepositoryError::not_found(worker::Model::RESOURCE, id))
            })
            .with_op("worker.get_by_id")
    }

    pub async fn create(
        &self,
        tenant: &TenantInfo,
        details: WorkerDetails,
    ) -> Result<WorkerDetails, RepositoryError> {
        let txn = self.db.write().begin().await.with_op("worker.create")?;
        let worker = insert_new(&txn, details.worker, tenant)
            .await
            .with_op("worker.create")?;
        let pto = reconcile(&txn, &parent_of(&worker), details.pto, true)
            .await
            .with_op("worker.create")?
            .children;
        txn.commit().await.with_op("worker.create")?;

        tracing::info!(id = %worker.id, org_id = %tenant.org_id, "Created worker");
        Ok(WorkerDetails { worker, pto })
    }

    /// Updates the worker and makes its PTO entries match `details.pto`.
    pub async fn update(
        &self,
        tenant: &TenantInfo,
        details: WorkerDetails,
    ) -> Result<WorkerDetails, RepositoryError> {
        let WorkerDetails { mut worker, pto } = details;
        worker.set_tenant(&tenant.org_id, &tenant.bu_id);

        let txn = self.db.write().begin().await.with_op("worker.update")?;
        update_with_version(&txn, &mut worker, UpdateMode::Full)
            .await
            .with_op("worker.update")?;
        let outcome = reconcile(&txn, &parent_of(&worker), pto, false)
            .await
            .with_op("worker.update")?;
        txn.commit().await.with_op("worker.update")?;

        tracing::debug!(
            id = %worker.id,
            version = worker.version,
            pto_inserted = outcome.inserted,
            pto_updated = outcome.updated,
            pto_deleted = outcome.deleted,
            "Updated worker"
        );
        Ok(WorkerDetails {
            worker,
            pto: outcome.children,
        })
    }
}

fn parent_of(worker: &worker::Model) -> ParentRef {
    ParentRef::new(
        worker.id.clone(),
        worker.organization_id.clone(),
        worker.business_unit_id.clone(),
    )
}
