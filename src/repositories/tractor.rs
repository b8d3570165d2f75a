//! # Tractor Repository
//!
//! Tractors with their assigned workers. `code` is unique within a tenant and
//! a worker is the primary driver of at most one tractor at a time.

use std::sync::Arc;

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, TransactionTrait};

use crate::db::DbConnections;
use crate::error::{OperationExt, RepositoryError};
use crate::models::tractor::{self, Entity as Tractor};
use crate::optimistic::{UpdateMode, update_with_version};
use crate::pulid::Pulid;
use crate::query::{
    ENUM_OPS, FieldConfig, FieldKind, FieldSpec, ID_OPS, ListRequest, ListResult, NUMBER_OPS,
    SearchConfig, TEXT_OPS, TIMESTAMP_OPS, TenantInfo,
};
use crate::record::Record;

use super::{find_in_tenant, insert_new, list_with_config, tenant_condition, unique_on};

const DUPLICATE_CODE: &str = "Tractor with this code already exists";

pub static TRACTOR_FIELDS: FieldConfig = FieldConfig {
    fields: &[
        FieldSpec {
            api_name: "status",
            column: "status",
            kind: FieldKind::Enum,
            ops: ENUM_OPS,
            sortable: true,
        },
        FieldSpec {
            api_name: "code",
            column: "code",
            kind: FieldKind::Text,
            ops: TEXT_OPS,
            sortable: true,
        },
        FieldSpec {
            api_name: "equipmentTypeId",
            column: "equipment_type_id",
            kind: FieldKind::Text,
            ops: ID_OPS,
            sortable: false,
        },
        FieldSpec {
            api_name: "primaryWorkerId",
            column: "primary_worker_id",
            kind: FieldKind::Text,
            ops: ID_OPS,
            sortable: false,
        },
        FieldSpec {
            api_name: "year",
            column: "year",
            kind: FieldKind::Integer,
            ops: NUMBER_OPS,
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
        columns: &["code", "make"],
    },
};

/// Repository for tractor database operations
#[derive(Debug, Clone)]
pub struct TractorRepository {
    db: Arc<DbConnections>,
}

impl TractorRepository {
    pub fn new(db: Arc<DbConnections>) -> Self {
        Self { db }
    }

    pub async fn list(&self, req: &ListRequest) -> Result<ListResult<tractor::Model>, RepositoryError> {
        list_with_config::<Tractor>(&self.db, &TRACTOR_FIELDS, req)
            .await
            .with_op("tractor.list")
    }

    pub async fn get_by_id(
        &self,
        id: &Pulid,
        tenant: &TenantInfo,
    ) -> Result<tractor::Model, RepositoryError> {
        self.db
            .with_read(|conn| {
                let (id, tenant) = (id.clone(), tenant.clone());
                async move { find_in_tenant::<tractor::Model, _>(&conn, &id, &tenant).await }
            })
            .await
            .map_err(RepositoryError::from)
            .and_then(|found| {
                found.ok_or_else(|| RepositoryError::not_found(tractor::Model::RESOURCE, id))
            })
            .with_op("tractor.get_by_id")
    }

    /// The tractor `worker_id` is the primary driver of.
    pub async fn get_by_primary_worker_id(
        &self,
        worker_id: &Pulid,
        tenant: &TenantInfo,
    ) -> Result<tractor::Model, RepositoryError> {
        self.db
            .with_read(|conn| {
                let (worker_id, tenant) = (worker_id.clone(), tenant.clone());
                async move {
                    Tractor::find()
                        .filter(tractor::Column::PrimaryWorkerId.eq(worker_id))
                        .filter(tenant_condition::<tractor::Model>(&tenant))
                        .order_by_desc(tractor::Column::UpdatedAt)
                        .one(&conn)
                        .await
                }
            })
            .await
            .map_err(RepositoryError::from)
            .and_then(|found| {
                found.ok_or_else(|| RepositoryError::NotFound {
                    resource: tractor::Model::RESOURCE,
                    message: format!("No tractor is assigned to worker {worker_id}"),
                })
            })
            .with_op("tractor.get_by_primary_worker_id")
    }

    pub async fn create(
        &self,
        tenant: &TenantInfo,
        tractor: tractor::Model,
    ) -> Result<tractor::Model, RepositoryError> {
        let txn = self.db.begin_write().await.with_op("tractor.create")?;
        let tractor = insert_new(&txn, tractor, tenant)
            .await
            .map_err(|err| RepositoryError::from_db_with_field(err, "code", DUPLICATE_CODE))
            .with_op("tractor.create")?;
        txn.commit().await.with_op("tractor.create")?;
        Ok(tractor)
    }

    pub async fn update(
        &self,
        tenant: &TenantInfo,
        mut tractor: tractor::Model,
    ) -> Result<tractor::Model, RepositoryError> {
        tractor.set_tenant(&tenant.org_id, &tenant.bu_id);

        let txn = self.db.write().begin().await.with_op("tractor.update")?;
        update_with_version(&txn, &mut tractor, UpdateMode::Full)
            .await
            .map_err(unique_on("code", DUPLICATE_CODE))
            .with_op("tractor.update")?;
        txn.commit().await.with_op("tractor.update")?;
        Ok(tractor)
    }
}
