//! # Customer Repository
//!
//! Tenant-scoped CRUD for customers. `code` is unique within a tenant.

use std::sync::Arc;

use sea_orm::TransactionTrait;

use crate::db::DbConnections;
use crate::error::{OperationExt, RepositoryError};
use crate::models::customer::{self, Entity as Customer};
use crate::optimistic::{UpdateMode, update_with_version};
use crate::pulid::Pulid;
use crate::query::{
    ENUM_OPS, FieldConfig, FieldKind, FieldSpec, ListRequest, ListResult, SearchConfig, TEXT_OPS,
    TIMESTAMP_OPS, TenantInfo,
};
use crate::record::Record;

use super::{find_in_tenant, insert_new, list_with_config, unique_on};

const DUPLICATE_CODE: &str = "Customer with this code already exists";

pub static CUSTOMER_FIELDS: FieldConfig = FieldConfig {
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
            api_name: "name",
            column: "name",
            kind: FieldKind::Text,
            ops: TEXT_OPS,
            sortable: true,
        },
        FieldSpec {
            api_name: "city",
            column: "city",
            kind: FieldKind::Text,
            ops: TEXT_OPS,
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
        columns: &["code", "name"],
    },
};

/// Repository for customer database operations
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    db: Arc<DbConnections>,
}

impl CustomerRepository {
    pub fn new(db: Arc<DbConnections>) -> Self {
        Self { db }
    }

    pub async fn list(
        &self,
        req: &ListRequest,
    ) -> Result<ListResult<customer::Model>, RepositoryError> {
        list_with_config::<Customer>(&self.db, &CUSTOMER_FIELDS, req)
            .await
            .with_op("customer.list")
    }

    pub async fn get_by_id(
        &self,
        id: &Pulid,
        tenant: &TenantInfo,
    ) -> Result<customer::Model, RepositoryError> {
        let found = self
            .db
            .with_read(|conn| {
                let (id, tenant) = (id.clone(), tenant.clone());
                async move { find_in_tenant::<customer::Model, _>(&conn, &id, &tenant).await }
            })
            .await
            .with_op("customer.get_by_id")?;

        found
            .ok_or_else(|| RepositoryError::not_found(customer::Model::RESOURCE, id))
            .with_op("customer.get_by_id")
    }

    pub async fn create(
        &self,
        tenant: &TenantInfo,
        customer: customer::Model,
    ) -> Result<customer::Model, RepositoryError> {
        let txn = self.db.begin_write().await.with_op("customer.create")?;
        let customer = insert_new(&txn, customer, tenant)
            .await
            .map_err(|err| RepositoryError::from_db_with_field(err, "code", DUPLICATE_CODE))
            .with_op("customer.create")?;
        txn.commit().await.with_op("customer.create")?;
        Ok(customer)
    }

    pub async fn update(
        &self,
        tenant: &TenantInfo,
        mut customer: customer::Model,
    ) -> Result<customer::Model, RepositoryError> {
        customer.set_tenant(&tenant.org_id, &tenant.bu_id);

        let txn = self.db.write().begin().await.with_op("customer.update")?;
        update_with_version(&txn, &mut customer, UpdateMode::Full)
            .await
            .map_err(unique_on("code", DUPLICATE_CODE))
            .with_op("customer.update")?;
        txn.commit().await.with_op("customer.update")?;

        tracing::debug!(
            id = %customer.id,
            org_id = %tenant.org_id,
            version = customer.version,
            "Updated customer"
        );
        Ok(customer)
    }
}
