//! # Shipment Move Repository
//!
//! Moves are the legs of a shipment. Besides reads and status changes this
//! module implements the move split: one move is cut in two at a location,
//! the original ending in a split delivery and the new move starting with the
//! matching split pickup.

use std::collections::HashMap;
use std::sync::Arc;

use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::db::DbConnections;
use crate::error::{OperationExt, RepositoryError};
use crate::models::shipment_move::{self, Entity as ShipmentMove, MoveStatus};
use crate::models::stop::{self, Entity as Stop, StopStatus, StopType};
use crate::optimistic::{UpdateMode, update_with_version};
use crate::pulid::Pulid;
use crate::query::TenantInfo;
use crate::record::{Record, insert_record, now_unix, stamp_new};

use super::{children_by_parent, find_in_tenant, tenant_condition};

/// A move with its stops in sequence order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveDetails {
    #[serde(flatten)]
    pub shipment_move: shipment_move::Model,
    #[serde(default)]
    pub stops: Vec<stop::Model>,
}

/// Planned arrival and departure, Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTimes {
    pub planned_arrival: i64,
    pub planned_departure: i64,
}

/// Freight carried by the first half of a split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitQuantities {
    pub pieces: Option<i64>,
    pub weight: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitMoveRequest {
    pub move_id: Pulid,
    pub tenant: TenantInfo,
    pub split_location_id: Pulid,
    pub split_pickup_times: StopTimes,
    pub split_delivery_times: StopTimes,
    pub split_quantities: SplitQuantities,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitMoveResponse {
    pub original_move: MoveDetails,
    pub new_move: MoveDetails,
}

/// Repository for shipment move database operations
#[derive(Debug, Clone)]
pub struct ShipmentMoveRepository {
    db: Arc<DbConnections>,
}

impl ShipmentMoveRepository {
    pub fn new(db: Arc<DbConnections>) -> Self {
        Self { db }
    }

    pub async fn get_by_id(
        &self,
        id: &Pulid,
        tenant: &TenantInfo,
        expand_stop_details: bool,
    ) -> Result<MoveDetails, RepositoryError> {
        self.db
            .with_read(|conn| {
                let (id, tenant) = (id.clone(), tenant.clone());
                async move {
                    let Some(found) =
                        find_in_tenant::<shipment_move::Model, _>(&conn, &id, &tenant).await?
                    else {
                        return Ok(None);
                    };
                    let stops = if expand_stop_details {
                        stops_of(&conn, &found.id, &tenant).await?
                    } else {
                        Vec::new()
                    };
                    Ok(Some(MoveDetails {
                        shipment_move: found,
                        stops,
                    }))
                }
            })
            .await
            .map_err(RepositoryError::from)
            .and_then(|found| {
                found.ok_or_else(|| RepositoryError::not_found(shipment_move::Model::RESOURCE, id))
            })
            .with_op("shipment_move.get_by_id")
    }

    /// Every move of a shipment in sequence order, each with its stops.
    pub async fn get_moves_by_shipment_id(
        &self,
        shipment_id: &Pulid,
        tenant: &TenantInfo,
    ) -> Result<Vec<MoveDetails>, RepositoryError> {
        self.db
            .with_read(|conn| {
                let (shipment_id, tenant) = (shipment_id.clone(), tenant.clone());
                async move {
                    let mut grouped =
                        load_moves(&conn, vec![shipment_id.clone()], &tenant, true).await?;
                    Ok(grouped.remove(&shipment_id).unwrap_or_default())
                }
            })
            .await
            .with_op("shipment_move.get_moves_by_shipment_id")
    }

    /// Sets the status of a move, guarded by the caller's `version`.
    pub async fn update_status(
        &self,
        id: &Pulid,
        tenant: &TenantInfo,
        version: i64,
        status: MoveStatus,
    ) -> Result<shipment_move::Model, RepositoryError> {
        let txn = self
            .db
            .write()
            .begin()
            .await
            .with_op("shipment_move.update_status")?;
        let mut found = find_in_tenant::<shipment_move::Model, _>(&txn, id, tenant)
            .await
            .map_err(RepositoryError::from)
            .and_then(|found| {
                found.ok_or_else(|| RepositoryError::not_found(shipment_move::Model::RESOURCE, id))
            })
            .with_op("shipment_move.update_status")?;

        found.version = version;
        found.status = status;
        update_with_version(&txn, &mut found, UpdateMode::Full)
            .await
            .with_op("shipment_move.update_status")?;
        txn.commit().await.with_op("shipment_move.update_status")?;

        tracing::debug!(id = %id, status = ?status, "Updated move status");
        Ok(found)
    }

    /// Splits a move at `split_location_id`.
    ///
    /// The original move's final delivery is replaced by a split delivery at
    /// the split location carrying the split quantities. A new move inserted
    /// right after the original picks up there and delivers to the replaced
    /// stop's location with the remaining quantities. Later moves of the
    /// shipment shift back by one.
    pub async fn split_move(
        &self,
        req: &SplitMoveRequest,
    ) -> Result<SplitMoveResponse, RepositoryError> {
        let txn = self.db.write().begin().await.with_op("shipment_move.split_move")?;
        let response = split_in(&txn, req).await.with_op("shipment_move.split_move")?;
        txn.commit().await.with_op("shipment_move.split_move")?;

        tracing::info!(
            original_move_id = %response.original_move.shipment_move.id,
            new_move_id = %response.new_move.shipment_move.id,
            shipment_id = %response.original_move.shipment_move.shipment_id,
            "Split shipment move"
        );
        Ok(response)
    }
}

async fn split_in<C: ConnectionTrait>(
    conn: &C,
    req: &SplitMoveRequest,
) -> Result<SplitMoveResponse, RepositoryError> {
    let tenant = &req.tenant;
    let mut original = find_in_tenant::<shipment_move::Model, _>(conn, &req.move_id, tenant)
        .await?
        .ok_or_else(|| RepositoryError::not_found(shipment_move::Model::RESOURCE, &req.move_id))?;

    let mut stops = stops_of(conn, &original.id, tenant).await?;
    if stops.len() < 2 {
        return Err(RepositoryError::validation(
            "stops",
            "invalid",
            "A move needs at least two stops to be split",
        ));
    }
    let Some(tail_index) = stops
        .iter()
        .rposition(|s| matches!(s.stop_type, StopType::Delivery | StopType::SplitDelivery))
    else {
        return Err(RepositoryError::validation(
            "stops",
            "invalid",
            "Move has no delivery stop to split",
        ));
    };
    let tail = stops.remove(tail_index);

    // Moves after the original make room for the new one.
    ShipmentMove::update_many()
        .col_expr(
            shipment_move::Column::Sequence,
            Expr::col(shipment_move::Column::Sequence).add(1),
        )
        .col_expr(
            shipment_move::Column::Version,
            Expr::col(shipment_move::Column::Version).add(1),
        )
        .col_expr(shipment_move::Column::UpdatedAt, Expr::value(now_unix()))
        .filter(shipment_move::Column::ShipmentId.eq(original.shipment_id.clone()))
        .filter(tenant_condition::<shipment_move::Model>(tenant))
        .filter(shipment_move::Column::Sequence.gt(original.sequence))
        .exec(conn)
        .await?;

    let now = now_unix();
    let quantities = req.split_quantities;

    Stop::delete_many()
        .filter(stop::Column::Id.eq(tail.id.clone()))
        .filter(tenant_condition::<stop::Model>(tenant))
        .exec(conn)
        .await?;

    let mut split_delivery = stop::Model {
        id: Pulid::nil(),
        shipment_move_id: original.id.clone(),
        location_id: req.split_location_id.clone(),
        stop_type: StopType::SplitDelivery,
        status: StopStatus::New,
        sequence: tail.sequence,
        pieces: quantities.pieces,
        weight: quantities.weight,
        planned_arrival: req.split_delivery_times.planned_arrival,
        planned_departure: req.split_delivery_times.planned_departure,
        actual_arrival: None,
        actual_departure: None,
        address_line: None,
        ..blank_stop()
    };
    stamp_new(&mut split_delivery, &tenant.org_id, &tenant.bu_id, now);
    insert_record(conn, &split_delivery).await?;
    stops.insert(tail_index, split_delivery);

    let mut new_move = shipment_move::Model {
        id: Pulid::nil(),
        sequence: original.sequence + 1,
        status: MoveStatus::New,
        ..original.clone()
    };
    stamp_new(&mut new_move, &tenant.org_id, &tenant.bu_id, now);
    insert_record(conn, &new_move).await?;

    let mut split_pickup = stop::Model {
        id: Pulid::nil(),
        shipment_move_id: new_move.id.clone(),
        location_id: req.split_location_id.clone(),
        stop_type: StopType::SplitPickup,
        status: StopStatus::New,
        sequence: 1,
        pieces: quantities.pieces,
        weight: quantities.weight,
        planned_arrival: req.split_pickup_times.planned_arrival,
        planned_departure: req.split_pickup_times.planned_departure,
        actual_arrival: None,
        actual_departure: None,
        address_line: None,
        ..blank_stop()
    };
    let mut delivery = stop::Model {
        id: Pulid::nil(),
        shipment_move_id: new_move.id.clone(),
        stop_type: StopType::Delivery,
        status: StopStatus::New,
        sequence: 2,
        pieces: remainder(tail.pieces, quantities.pieces),
        weight: remainder(tail.weight, quantities.weight),
        actual_arrival: None,
        actual_departure: None,
        ..tail
    };
    stamp_new(&mut split_pickup, &tenant.org_id, &tenant.bu_id, now);
    stamp_new(&mut delivery, &tenant.org_id, &tenant.bu_id, now);
    insert_record(conn, &split_pickup).await?;
    insert_record(conn, &delivery).await?;

    update_with_version(conn, &mut original, UpdateMode::Full).await?;

    Ok(SplitMoveResponse {
        original_move: MoveDetails {
            shipment_move: original,
            stops,
        },
        new_move: MoveDetails {
            shipment_move: new_move,
            stops: vec![split_pickup, delivery],
        },
    })
}

/// What is left of `total` after `split` moved to the first half.
fn remainder(total: Option<i64>, split: Option<i64>) -> Option<i64> {
    match (total, split) {
        (Some(total), Some(split)) => Some((total - split).max(0)),
        (total, _) => total,
    }
}

fn blank_stop() -> stop::Model {
    stop::Model {
        id: Pulid::nil(),
        organization_id: Pulid::nil(),
        business_unit_id: Pulid::nil(),
        shipment_move_id: Pulid::nil(),
        location_id: Pulid::nil(),
        stop_type: StopType::default(),
        status: StopStatus::default(),
        sequence: 0,
        pieces: None,
        weight: None,
        planned_arrival: 0,
        planned_departure: 0,
        actual_arrival: None,
        actual_departure: None,
        address_line: None,
        version: 0,
        created_at: 0,
        updated_at: 0,
    }
}

async fn stops_of<C: ConnectionTrait>(
    conn: &C,
    move_id: &Pulid,
    tenant: &TenantInfo,
) -> Result<Vec<stop::Model>, DbErr> {
    Stop::find()
        .filter(stop::Column::ShipmentMoveId.eq(move_id.clone()))
        .filter(tenant_condition::<stop::Model>(tenant))
        .order_by_asc(stop::Column::Sequence)
        .order_by_asc(stop::Column::Id)
        .all(conn)
        .await
}

/// Moves of each shipment in `shipment_ids`, grouped by shipment id.
pub(crate) async fn load_moves<C: ConnectionTrait>(
    conn: &C,
    shipment_ids: Vec<Pulid>,
    tenant: &TenantInfo,
    with_stops: bool,
) -> Result<HashMap<Pulid, Vec<MoveDetails>>, DbErr> {
    let moves = children_by_parent::<shipment_move::Model, _>(
        conn,
        shipment_ids,
        tenant,
        shipment_move::Column::Sequence,
    )
    .await?;

    let mut stops = if with_stops {
        let move_ids = moves.values().flatten().map(|m| m.id.clone()).collect();
        children_by_parent::<stop::Model, _>(conn, move_ids, tenant, stop::Column::Sequence)
            .await?
    } else {
        HashMap::new()
    };

    Ok(moves
        .into_iter()
        .map(|(shipment_id, moves)| {
            let details = moves
                .into_iter()
                .map(|m| MoveDetails {
                    stops: stops.remove(&m.id).unwrap_or_default(),
                    shipment_move: m,
                })
                .collect();
            (shipment_id, details)
        })
        .collect())
}
