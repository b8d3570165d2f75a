//! # Consolidation Repository
//!
//! Consolidation groups bundle shipments that move together. A shipment
//! joins a group by having its `consolidation_group_id` set, and belongs to
//! at most one group at a time. Canceling a group cancels every member
//! shipment along with its moves and stops.

use std::collections::HashMap;
use std::sync::Arc;

use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Value,
};
use serde::{Deserialize, Serialize};

use crate::db::DbConnections;
use crate::error::{OperationExt, RepositoryError};
use crate::models::consolidation_group::{self, Entity as ConsolidationGroup, GroupStatus};
use crate::models::shipment::{self, Entity as Shipment, ShipmentStatus};
use crate::models::shipment_move::{self, MoveStatus};
use crate::models::stop::{self, StopStatus};
use crate::optimistic::{UpdateMode, update_with_version};
use crate::pulid::Pulid;
use crate::query::{
    ENUM_OPS, FieldConfig, FieldKind, FieldSpec, ListRequest, ListResult, SearchConfig, TEXT_OPS,
    TIMESTAMP_OPS, TenantInfo,
};
use crate::record::{ColumnOf, EnvelopeColumn, Record, now_unix};
use crate::sequence::{SequenceGenerator, SequenceRequest, SequenceType};

use super::shipment::ShipmentDetails;
use super::shipment_move::load_moves;
use super::{find_in_tenant, insert_new, list_with_config, tenant_condition, unique_on};

const DUPLICATE_NUMBER: &str = "Consolidation group with this number already exists";

pub static CONSOLIDATION_FIELDS: FieldConfig = FieldConfig {
    fields: &[
        FieldSpec {
            api_name: "consolidationNumber",
            column: "consolidation_number",
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
            api_name: "createdAt",
            column: "created_at",
            kind: FieldKind::Timestamp,
            ops: TIMESTAMP_OPS,
            sortable: true,
        },
    ],
    search: SearchConfig {
        vector_column: None,
        columns: &["consolidation_number", "status"],
    },
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsolidationOptions {
    /// Load member shipments of every listed group.
    pub expand_details: bool,
}

/// A group with its member shipments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationDetails {
    #[serde(flatten)]
    pub group: consolidation_group::Model,
    #[serde(default)]
    pub shipments: Vec<shipment::Model>,
}

/// Repository for consolidation group database operations
#[derive(Clone)]
pub struct ConsolidationRepository {
    db: Arc<DbConnections>,
    sequences: Arc<SequenceGenerator>,
}

impl ConsolidationRepository {
    pub fn new(db: Arc<DbConnections>, sequences: Arc<SequenceGenerator>) -> Self {
        Self { db, sequences }
    }

    pub async fn list(
        &self,
        req: &ListRequest,
        options: ConsolidationOptions,
    ) -> Result<ListResult<ConsolidationDetails>, RepositoryError> {
        let groups = list_with_config::<ConsolidationGroup>(&self.db, &CONSOLIDATION_FIELDS, req)
            .await
            .with_op("consolidation.list")?;

        let mut members = if options.expand_details {
            let ids: Vec<Pulid> = groups.items.iter().map(|group| group.id.clone()).collect();
            self.db
                .with_read(|conn| {
                    let (ids, tenant) = (ids.clone(), req.tenant.clone());
                    async move { members_by_group(&conn, ids, &tenant).await }
                })
                .await
                .with_op("consolidation.list")?
        } else {
            HashMap::new()
        };

        Ok(groups.map(|group| ConsolidationDetails {
            shipments: members.remove(&group.id).unwrap_or_default(),
            group,
        }))
    }

    pub async fn get_by_id(
        &self,
        id: &Pulid,
        tenant: &TenantInfo,
    ) -> Result<ConsolidationDetails, RepositoryError> {
        self.db
            .with_read(|conn| {
                let (id, tenant) = (id.clone(), tenant.clone());
                async move {
                    match find_in_tenant::<consolidation_group::Model, _>(&conn, &id, &tenant)
                        .await?
                    {
                        Some(group) => with_members(&conn, group, &tenant).await.map(Some),
                        None => Ok(None),
                    }
                }
            })
            .await
            .map_err(RepositoryError::from)
            .and_then(|found| {
                found.ok_or_else(|| {
                    RepositoryError::not_found(consolidation_group::Model::RESOURCE, id)
                })
            })
            .with_op("consolidation.get_by_id")
    }

    pub async fn get_by_consolidation_number(
        &self,
        consolidation_number: &str,
        tenant: &TenantInfo,
    ) -> Result<ConsolidationDetails, RepositoryError> {
        self.db
            .with_read(|conn| {
                let (number, tenant) = (consolidation_number.to_string(), tenant.clone());
                async move {
                    let group = ConsolidationGroup::find()
                        .filter(consolidation_group::Column::ConsolidationNumber.eq(number))
                        .filter(tenant_condition::<consolidation_group::Model>(&tenant))
                        .one(&conn)
                        .await?;
                    match group {
                        Some(group) => with_members(&conn, group, &tenant).await.map(Some),
                        None => Ok(None),
                    }
                }
            })
            .await
            .map_err(RepositoryError::from)
            .and_then(|found| {
                found.ok_or_else(|| RepositoryError::NotFound {
                    resource: consolidation_group::Model::RESOURCE,
                    message: "Consolidation group not found".to_string(),
                })
            })
            .with_op("consolidation.get_by_consolidation_number")
    }

    pub async fn next_consolidation_number(
        &self,
        org_id: &Pulid,
        bu_id: &Pulid,
    ) -> Result<String, RepositoryError> {
        self.sequences
            .generate_one(SequenceType::Consolidation, org_id, bu_id)
            .await
            .with_op("consolidation.next_consolidation_number")
    }

    /// `count` fresh numbers; empty when `count` is zero.
    pub async fn next_consolidation_numbers(
        &self,
        org_id: &Pulid,
        bu_id: &Pulid,
        count: u32,
    ) -> Result<Vec<String>, RepositoryError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let request =
            SequenceRequest::new(SequenceType::Consolidation, org_id.clone(), bu_id.clone())
                .count(count);
        self.sequences
            .generate(request)
            .await
            .with_op("consolidation.next_consolidation_numbers")
    }

    /// Creates a group; a blank number is allocated before the insert.
    pub async fn create(
        &self,
        tenant: &TenantInfo,
        mut group: consolidation_group::Model,
    ) -> Result<consolidation_group::Model, RepositoryError> {
        if group.consolidation_number.trim().is_empty() {
            group.consolidation_number = self
                .next_consolidation_number(&tenant.org_id, &tenant.bu_id)
                .await
                .with_op("consolidation.create")?;
        }

        let txn = self.db.begin_write().await.with_op("consolidation.create")?;
        let group = insert_new(&txn, group, tenant)
            .await
            .map_err(|err| {
                RepositoryError::from_db_with_field(err, "consolidationNumber", DUPLICATE_NUMBER)
            })
            .with_op("consolidation.create")?;
        txn.commit().await.with_op("consolidation.create")?;

        tracing::info!(
            id = %group.id,
            consolidation_number = %group.consolidation_number,
            "Created consolidation group"
        );
        Ok(group)
    }

    /// Writes only the populated fields of `group`, guarded by its version.
    pub async fn update(
        &self,
        tenant: &TenantInfo,
        mut group: consolidation_group::Model,
    ) -> Result<consolidation_group::Model, RepositoryError> {
        group.set_tenant(&tenant.org_id, &tenant.bu_id);

        let txn = self.db.begin_write().await.with_op("consolidation.update")?;
        update_with_version(&txn, &mut group, UpdateMode::OmitZero)
            .await
            .map_err(unique_on("consolidationNumber", DUPLICATE_NUMBER))
            .with_op("consolidation.update")?;
        txn.commit().await.with_op("consolidation.update")?;
        Ok(group)
    }

    /// Puts a shipment that is not in any group into `group_id`.
    pub async fn add_shipment(
        &self,
        group_id: &Pulid,
        shipment_id: &Pulid,
        tenant: &TenantInfo,
    ) -> Result<(), RepositoryError> {
        let txn = self.db.begin_write().await.with_op("consolidation.add_shipment")?;
        find_in_tenant::<consolidation_group::Model, _>(&txn, group_id, tenant)
            .await
            .map_err(RepositoryError::from)
            .and_then(|found| {
                found.ok_or_else(|| {
                    RepositoryError::not_found(consolidation_group::Model::RESOURCE, group_id)
                })
            })
            .with_op("consolidation.add_shipment")?;

        let rows = set_group(
            &txn,
            shipment_id,
            tenant,
            Some(group_id),
            shipment::Column::ConsolidationGroupId.is_null(),
        )
        .await
        .with_op("consolidation.add_shipment")?;
        if rows == 0 {
            return Err(RepositoryError::validation(
                "shipmentId",
                "invalid",
                "Shipment not found or already assigned to a consolidation group",
            ))
            .with_op("consolidation.add_shipment");
        }
        txn.commit().await.with_op("consolidation.add_shipment")?;

        tracing::debug!(group_id = %group_id, shipment_id = %shipment_id, "Added shipment to group");
        Ok(())
    }

    pub async fn remove_shipment(
        &self,
        group_id: &Pulid,
        shipment_id: &Pulid,
        tenant: &TenantInfo,
    ) -> Result<(), RepositoryError> {
        let txn = self
            .db
            .begin_write()
            .await
            .with_op("consolidation.remove_shipment")?;
        let rows = set_group(
            &txn,
            shipment_id,
            tenant,
            None,
            shipment::Column::ConsolidationGroupId.eq(group_id.clone()),
        )
        .await
        .with_op("consolidation.remove_shipment")?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                resource: shipment::Model::RESOURCE,
                message: "Shipment not found in the specified consolidation group".to_string(),
            })
            .with_op("consolidation.remove_shipment");
        }
        txn.commit().await.with_op("consolidation.remove_shipment")?;
        Ok(())
    }

    /// Member shipments with their moves and stops.
    pub async fn group_shipments(
        &self,
        group_id: &Pulid,
        tenant: &TenantInfo,
    ) -> Result<Vec<ShipmentDetails>, RepositoryError> {
        self.db
            .with_read(|conn| {
                let (group_id, tenant) = (group_id.clone(), tenant.clone());
                async move {
                    let shipments = members_by_group(&conn, vec![group_id.clone()], &tenant)
                        .await?
                        .remove(&group_id)
                        .unwrap_or_default();
                    let ids = shipments.iter().map(|s| s.id.clone()).collect();
                    let mut moves = load_moves(&conn, ids, &tenant, true).await?;

                    Ok::<_, DbErr>(
                        shipments
                            .into_iter()
                            .map(|shipment| {
                                let mut details = ShipmentDetails::new(shipment);
                                details.moves =
                                    moves.remove(&details.shipment.id).unwrap_or_default();
                                details
                            })
                            .collect(),
                    )
                }
            })
            .await
            .with_op("consolidation.group_shipments")
    }

    /// Cancels the group and every member shipment, move and stop.
    pub async fn cancel(&self, group_id: &Pulid, tenant: &TenantInfo) -> Result<(), RepositoryError> {
        let txn = self.db.begin_write().await.with_op("consolidation.cancel")?;

        let canceled = set_status::<consolidation_group::Model, _>(
            &txn,
            consolidation_group::Column::Status,
            GroupStatus::Canceled,
            tenant,
            Condition::all()
                .add(consolidation_group::Column::Id.eq(group_id.clone()))
                .add(consolidation_group::Column::Status.ne(GroupStatus::Canceled)),
        )
        .await
        .with_op("consolidation.cancel")?;
        if canceled == 0 {
            return Err(RepositoryError::NotFound {
                resource: consolidation_group::Model::RESOURCE,
                message: "Consolidation group not found or already canceled".to_string(),
            })
            .with_op("consolidation.cancel");
        }

        let shipments = cancel_members(&txn, group_id, tenant)
            .await
            .with_op("consolidation.cancel")?;
        txn.commit().await.with_op("consolidation.cancel")?;

        tracing::info!(
            group_id = %group_id,
            org_id = %tenant.org_id,
            shipments,
            "Canceled consolidation group"
        );
        Ok(())
    }
}

async fn with_members<C: ConnectionTrait>(
    conn: &C,
    group: consolidation_group::Model,
    tenant: &TenantInfo,
) -> Result<ConsolidationDetails, DbErr> {
    let shipments = members_by_group(conn, vec![group.id.clone()], tenant)
        .await?
        .remove(&group.id)
        .unwrap_or_default();
    Ok(ConsolidationDetails { group, shipments })
}

/// Member shipments grouped by consolidation group id.
async fn members_by_group<C: ConnectionTrait>(
    conn: &C,
    group_ids: Vec<Pulid>,
    tenant: &TenantInfo,
) -> Result<HashMap<Pulid, Vec<shipment::Model>>, DbErr> {
    let mut grouped: HashMap<Pulid, Vec<shipment::Model>> = HashMap::new();
    if group_ids.is_empty() {
        return Ok(grouped);
    }

    let shipments = Shipment::find()
        .filter(shipment::Column::ConsolidationGroupId.is_in(group_ids))
        .filter(tenant_condition::<shipment::Model>(tenant))
        .order_by_asc(shipment::Column::CreatedAt)
        .order_by_asc(shipment::Column::Id)
        .all(conn)
        .await?;
    for shipment in shipments {
        if let Some(group_id) = shipment.consolidation_group_id.clone() {
            grouped.entry(group_id).or_default().push(shipment);
        }
    }
    Ok(grouped)
}

/// Points one shipment of the tenant at `group_id` when `guard` holds.
async fn set_group<C: ConnectionTrait>(
    conn: &C,
    shipment_id: &Pulid,
    tenant: &TenantInfo,
    group_id: Option<&Pulid>,
    guard: impl sea_orm::sea_query::IntoCondition,
) -> Result<u64, DbErr> {
    let result = Shipment::update_many()
        .col_expr(
            shipment::Column::ConsolidationGroupId,
            Expr::value(group_id.cloned()),
        )
        .col_expr(
            shipment::Column::Version,
            Expr::col(shipment::Column::Version).add(1),
        )
        .col_expr(shipment::Column::UpdatedAt, Expr::value(now_unix()))
        .filter(shipment::Column::Id.eq(shipment_id.clone()))
        .filter(tenant_condition::<shipment::Model>(tenant))
        .filter(guard)
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

/// Cancels the member shipments of a group with their moves and stops.
/// Returns the number of shipments canceled.
async fn cancel_members<C: ConnectionTrait>(
    conn: &C,
    group_id: &Pulid,
    tenant: &TenantInfo,
) -> Result<u64, DbErr> {
    let shipment_ids: Vec<Pulid> = Shipment::find()
        .select_only()
        .column(shipment::Column::Id)
        .filter(shipment::Column::ConsolidationGroupId.eq(group_id.clone()))
        .filter(tenant_condition::<shipment::Model>(tenant))
        .into_tuple()
        .all(conn)
        .await?;
    if shipment_ids.is_empty() {
        return Ok(0);
    }

    let shipments = set_status::<shipment::Model, _>(
        conn,
        shipment::Column::Status,
        ShipmentStatus::Canceled,
        tenant,
        Condition::all().add(shipment::Column::Id.is_in(shipment_ids.clone())),
    )
    .await?;

    let move_ids: Vec<Pulid> = shipment_move::Entity::find()
        .select_only()
        .column(shipment_move::Column::Id)
        .filter(shipment_move::Column::ShipmentId.is_in(shipment_ids))
        .filter(tenant_condition::<shipment_move::Model>(tenant))
        .into_tuple()
        .all(conn)
        .await?;
    if move_ids.is_empty() {
        return Ok(shipments);
    }

    set_status::<shipment_move::Model, _>(
        conn,
        shipment_move::Column::Status,
        MoveStatus::Canceled,
        tenant,
        Condition::all().add(shipment_move::Column::Id.is_in(move_ids.clone())),
    )
    .await?;
    set_status::<stop::Model, _>(
        conn,
        stop::Column::Status,
        StopStatus::Canceled,
        tenant,
        Condition::all().add(stop::Column::ShipmentMoveId.is_in(move_ids)),
    )
    .await?;

    Ok(shipments)
}

/// Sets `status` on the tenant's rows of `M` matching `filter`, bumping
/// their versions.
async fn set_status<M, C>(
    conn: &C,
    status_column: ColumnOf<M>,
    status: impl Into<Value>,
    tenant: &TenantInfo,
    filter: Condition,
) -> Result<u64, DbErr>
where
    M: Record,
    M::Entity: EntityTrait<Model = M>,
    C: ConnectionTrait,
{
    let version = M::column(EnvelopeColumn::Version);
    let result = M::Entity::update_many()
        .col_expr(status_column, Expr::value(status.into()))
        .col_expr(version, Expr::col(version).add(1))
        .col_expr(
            M::column(EnvelopeColumn::UpdatedAt),
            Expr::value(now_unix()),
        )
        .filter(tenant_condition::<M>(tenant))
        .filter(filter)
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}
