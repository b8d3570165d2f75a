//! # Dedicated Lane Repository
//!
//! Dedicated lanes pin a customer's origin/destination pair to a set of
//! workers and equipment types. [`DedicatedLaneRepository::find_by_shipment`]
//! is the lookup used when auto-assigning a new shipment.

use std::sync::Arc;

use sea_orm::sea_query::SimpleExpr;
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, TransactionTrait};
use serde::{Deserialize, Serialize};

use crate::db::DbConnections;
use crate::error::{OperationExt, RepositoryError};
use crate::models::dedicated_lane::{self, Entity as DedicatedLane, LaneStatus};
use crate::optimistic::{UpdateMode, update_with_version};
use crate::pulid::Pulid;
use crate::query::{
    BOOL_OPS, ENUM_OPS, FieldConfig, FieldKind, FieldSpec, ID_OPS, ListRequest, ListResult,
    SearchConfig, TEXT_OPS, TIMESTAMP_OPS, TenantInfo,
};
use crate::record::Record;

use super::{find_in_tenant, insert_new, list_with_config, tenant_condition};

pub static DEDICATED_LANE_FIELDS: FieldConfig = FieldConfig {
    fields: &[
        FieldSpec {
            api_name: "name",
            column: "name",
            kind: FieldKind::Text,
            ops: TEXT_OPS,
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
            api_name: "customerId",
            column: "customer_id",
            kind: FieldKind::Text,
            ops: ID_OPS,
            sortable: false,
        },
        FieldSpec {
            api_name: "originLocationId",
            column: "origin_location_id",
            kind: FieldKind::Text,
            ops: ID_OPS,
            sortable: false,
        },
        FieldSpec {
            api_name: "destinationLocationId",
            column: "destination_location_id",
            kind: FieldKind::Text,
            ops: ID_OPS,
            sortable: false,
        },
        FieldSpec {
            api_name: "autoAssign",
            column: "auto_assign",
            kind: FieldKind::Boolean,
            ops: BOOL_OPS,
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
        columns: &["name"],
    },
};

/// Shipment attributes a dedicated lane is matched on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindDedicatedLaneByShipmentRequest {
    pub tenant: TenantInfo,
    pub customer_id: Pulid,
    pub origin_location_id: Pulid,
    pub destination_location_id: Pulid,
    #[serde(default)]
    pub tractor_type_id: Option<Pulid>,
    #[serde(default)]
    pub trailer_type_id: Option<Pulid>,
}

/// Repository for dedicated lane database operations
#[derive(Debug, Clone)]
pub struct DedicatedLaneRepository {
    db: Arc<DbConnections>,
}

impl DedicatedLaneRepository {
    pub fn new(db: Arc<DbConnections>) -> Self {
        Self { db }
    }

    pub async fn list(
        &self,
        req: &ListRequest,
    ) -> Result<ListResult<dedicated_lane::Model>, RepositoryError> {
        list_with_config::<DedicatedLane>(&self.db, &DEDICATED_LANE_FIELDS, req)
            .await
            .with_op("dedicated_lane.list")
    }

    pub async fn get_by_id(
        &self,
        id: &Pulid,
        tenant: &TenantInfo,
    ) -> Result<dedicated_lane::Model, RepositoryError> {
        self.db
            .with_read(|conn| {
                let (id, tenant) = (id.clone(), tenant.clone());
                async move { find_in_tenant::<dedicated_lane::Model, _>(&conn, &id, &tenant).await }
            })
            .await
            .map_err(RepositoryError::from)
            .and_then(|found| {
                found.ok_or_else(|| RepositoryError::not_found(dedicated_lane::Model::RESOURCE, id))
            })
            .with_op("dedicated_lane.get_by_id")
    }

    /// Active lane matching the shipment's customer, lane and equipment.
    ///
    /// Equipment types must match exactly: a lane without a tractor type only
    /// matches shipments without one.
    pub async fn find_by_shipment(
        &self,
        req: &FindDedicatedLaneByShipmentRequest,
    ) -> Result<dedicated_lane::Model, RepositoryError> {
        let condition = Condition::all()
            .add(tenant_condition::<dedicated_lane::Model>(&req.tenant))
            .add(dedicated_lane::Column::Status.eq(LaneStatus::Active))
            .add(dedicated_lane::Column::CustomerId.eq(req.customer_id.clone()))
            .add(dedicated_lane::Column::OriginLocationId.eq(req.origin_location_id.clone()))
            .add(
                dedicated_lane::Column::DestinationLocationId
                    .eq(req.destination_location_id.clone()),
            )
            .add(optional_match(
                dedicated_lane::Column::TractorTypeId,
                req.tractor_type_id.as_ref(),
            ))
            .add(optional_match(
                dedicated_lane::Column::TrailerTypeId,
                req.trailer_type_id.as_ref(),
            ));

        self.db
            .with_read(|conn| {
                let condition = condition.clone();
                async move {
                    DedicatedLane::find()
                        .filter(condition)
                        .order_by_asc(dedicated_lane::Column::CreatedAt)
                        .one(&conn)
                        .await
                }
            })
            .await
            .map_err(RepositoryError::from)
            .and_then(|found| {
                found.ok_or_else(|| RepositoryError::NotFound {
                    resource: dedicated_lane::Model::RESOURCE,
                    message: "No dedicated lane matches this shipment".to_string(),
                })
            })
            .with_op("dedicated_lane.find_by_shipment")
    }

    pub async fn create(
        &self,
        tenant: &TenantInfo,
        lane: dedicated_lane::Model,
    ) -> Result<dedicated_lane::Model, RepositoryError> {
        let txn = self.db.begin_write().await.with_op("dedicated_lane.create")?;
        let lane = insert_new(&txn, lane, tenant)
            .await
            .with_op("dedicated_lane.create")?;
        txn.commit().await.with_op("dedicated_lane.create")?;
        Ok(lane)
    }

    pub async fn update(
        &self,
        tenant: &TenantInfo,
        mut lane: dedicated_lane::Model,
    ) -> Result<dedicated_lane::Model, RepositoryError> {
        lane.set_tenant(&tenant.org_id, &tenant.bu_id);

        let txn = self.db.write().begin().await.with_op("dedicated_lane.update")?;
        update_with_version(&txn, &mut lane, UpdateMode::Full)
            .await
            .with_op("dedicated_lane.update")?;
        txn.commit().await.with_op("dedicated_lane.update")?;
        Ok(lane)
    }
}

fn optional_match(column: dedicated_lane::Column, value: Option<&Pulid>) -> SimpleExpr {
    match value.filter(|id| !id.is_nil()) {
        Some(id) => column.eq(id.clone()),
        None => column.is_null(),
    }
}
