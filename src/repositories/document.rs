//! # Document Repository
//!
//! Metadata for files attached to other resources. The owning resource is
//! identified by `resource_id` plus a `resource_type` discriminator.

use std::sync::Arc;

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};

use crate::db::DbConnections;
use crate::error::{OperationExt, RepositoryError};
use crate::models::document::{self, Entity as Document};
use crate::pulid::Pulid;
use crate::query::{
    ENUM_OPS, FieldConfig, FieldKind, FieldSpec, ID_OPS, ListRequest, ListResult, NUMBER_OPS,
    SearchConfig, TEXT_OPS, TIMESTAMP_OPS, TenantInfo,
};
use crate::record::{EnvelopeColumn, Record};

use super::{find_in_tenant, insert_new, list_with_config, tenant_condition};

pub static DOCUMENT_FIELDS: FieldConfig = FieldConfig {
    fields: &[
        FieldSpec {
            api_name: "resourceId",
            column: "resource_id",
            kind: FieldKind::Text,
            ops: ID_OPS,
            sortable: false,
        },
        FieldSpec {
            api_name: "resourceType",
            column: "resource_type",
            kind: FieldKind::Text,
            ops: ENUM_OPS,
            sortable: true,
        },
        FieldSpec {
            api_name: "fileName",
            column: "file_name",
            kind: FieldKind::Text,
            ops: TEXT_OPS,
            sortable: true,
        },
        FieldSpec {
            api_name: "fileSize",
            column: "file_size",
            kind: FieldKind::Integer,
            ops: NUMBER_OPS,
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
    ],
    search: SearchConfig {
        vector_column: None,
        columns: &["file_name"],
    },
};

/// Repository for document database operations
#[derive(Debug, Clone)]
pub struct DocumentRepository {
    db: Arc<DbConnections>,
}

impl DocumentRepository {
    pub fn new(db: Arc<DbConnections>) -> Self {
        Self { db }
    }

    pub async fn list(
        &self,
        req: &ListRequest,
    ) -> Result<ListResult<document::Model>, RepositoryError> {
        list_with_config::<Document>(&self.db, &DOCUMENT_FIELDS, req)
            .await
            .with_op("document.list")
    }

    pub async fn get_by_id(
        &self,
        id: &Pulid,
        tenant: &TenantInfo,
    ) -> Result<document::Model, RepositoryError> {
        self.db
            .with_read(|conn| {
                let (id, tenant) = (id.clone(), tenant.clone());
                async move { find_in_tenant::<document::Model, _>(&conn, &id, &tenant).await }
            })
            .await
            .map_err(RepositoryError::from)
            .and_then(|found| {
                found.ok_or_else(|| RepositoryError::not_found(document::Model::RESOURCE, id))
            })
            .with_op("document.get_by_id")
    }

    /// Every document attached to `resource_id`, newest first.
    pub async fn find_by_resource_id(
        &self,
        resource_id: &Pulid,
        tenant: &TenantInfo,
    ) -> Result<Vec<document::Model>, RepositoryError> {
        self.db
            .with_read(|conn| {
                let (resource_id, tenant) = (resource_id.clone(), tenant.clone());
                async move {
                    Document::find()
                        .filter(document::Column::ResourceId.eq(resource_id))
                        .filter(tenant_condition::<document::Model>(&tenant))
                        .order_by_desc(document::Column::CreatedAt)
                        .order_by_asc(document::Column::Id)
                        .all(&conn)
                        .await
                }
            })
            .await
            .with_op("document.find_by_resource_id")
    }

    pub async fn create(
        &self,
        tenant: &TenantInfo,
        document: document::Model,
    ) -> Result<document::Model, RepositoryError> {
        if document.resource_id.is_nil() || document.resource_type.trim().is_empty() {
            return Err(RepositoryError::validation(
                "resourceId",
                "required",
                "Document must be attached to a resource",
            ))
            .with_op("document.create");
        }

        let txn = self.db.begin_write().await.with_op("document.create")?;
        let document = insert_new(&txn, document, tenant)
            .await
            .with_op("document.create")?;
        txn.commit().await.with_op("document.create")?;
        Ok(document)
    }

    pub async fn delete(&self, id: &Pulid, tenant: &TenantInfo) -> Result<(), RepositoryError> {
        let txn = self.db.begin_write().await.with_op("document.delete")?;
        let result = Document::delete_many()
            .filter(document::Model::column(EnvelopeColumn::Id).eq(id.clone()))
            .filter(tenant_condition::<document::Model>(tenant))
            .exec(&txn)
            .await
            .with_op("document.delete")?;

        if result.rows_affected == 0 {
            // Dropping the transaction rolls it back.
            return Err(RepositoryError::not_found(document::Model::RESOURCE, id))
                .with_op("document.delete");
        }
        txn.commit().await.with_op("document.delete")?;

        tracing::debug!(id = %id, org_id = %tenant.org_id, "Deleted document");
        Ok(())
    }
}
