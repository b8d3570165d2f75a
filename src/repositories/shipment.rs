//! # Shipment Repository
//!
//! Shipments are aggregates: the shipment row owns its moves (which own
//! stops), additional charges and commodities. Creating a shipment writes the
//! whole aggregate in one transaction; updates reconcile charges and
//! commodities against the submitted sets.

use std::sync::Arc;

use sea_orm::{ConnectionTrait, DbErr, TransactionTrait};
use serde::{Deserialize, Serialize};

use crate::db::DbConnections;
use crate::error::{OperationExt, RepositoryError};
use crate::models::additional_charge;
use crate::models::shipment::{self, Entity as Shipment};
use crate::models::shipment_commodity;
use crate::models::stop;
use crate::optimistic::{UpdateMode, update_with_version};
use crate::pulid::Pulid;
use crate::query::{
    ENUM_OPS, FieldConfig, FieldKind, FieldSpec, ID_OPS, ListRequest, ListResult, NUMBER_OPS,
    SearchConfig, TEXT_OPS, TIMESTAMP_OPS, TenantInfo,
};
use crate::reconcile::{ParentRef, reconcile};
use crate::record::Record;
use crate::sequence::SequenceGenerator;

use super::shipment_move::{MoveDetails, load_moves};
use super::{children_by_parent, find_in_tenant, insert_new, list_with_config};

const DUPLICATE_PRO_NUMBER: &str = "Shipment with this pro number already exists";

pub static SHIPMENT_FIELDS: FieldConfig = FieldConfig {
    fields: &[
        FieldSpec {
            api_name: "status",
            column: "status",
            kind: FieldKind::Enum,
            ops: ENUM_OPS,
            sortable: true,
        },
        FieldSpec {
            api_name: "proNumber",
            column: "pro_number",
            kind: FieldKind::Text,
            ops: TEXT_OPS,
            sortable: true,
        },
        FieldSpec {
            api_name: "bol",
            column: "bol",
            kind: FieldKind::Text,
            ops: TEXT_OPS,
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
            api_name: "consolidationGroupId",
            column: "consolidation_group_id",
            kind: FieldKind::Text,
            ops: ID_OPS,
            sortable: false,
        },
        FieldSpec {
            api_name: "pieces",
            column: "pieces",
            kind: FieldKind::Integer,
            ops: NUMBER_OPS,
            sortable: true,
        },
        FieldSpec {
            api_name: "weight",
            column: "weight",
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
        vector_column: Some("search_vector"),
        columns: &["pro_number", "bol"],
    },
};

/// Related rows loaded by [`ShipmentRepository::get_by_id`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShipmentOptions {
    pub expand_move_details: bool,
    /// Only meaningful together with `expand_move_details`.
    pub expand_stop_details: bool,
    pub expand_commodity_details: bool,
    pub include_additional_charges: bool,
}

impl ShipmentOptions {
    /// Everything.
    pub fn full() -> Self {
        Self {
            expand_move_details: true,
            expand_stop_details: true,
            expand_commodity_details: true,
            include_additional_charges: true,
        }
    }
}

/// A shipment with whichever related rows were requested.
///
/// Also the input of create and update: moves and stops are written on
/// create, charges and commodities are the desired sets on both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentDetails {
    #[serde(flatten)]
    pub shipment: shipment::Model,
    #[serde(default)]
    pub moves: Vec<MoveDetails>,
    #[serde(default)]
    pub commodities: Vec<shipment_commodity::Model>,
    #[serde(default)]
    pub additional_charges: Vec<additional_charge::Model>,
}

impl ShipmentDetails {
    pub fn new(shipment: shipment::Model) -> Self {
        Self {
            shipment,
            moves: Vec::new(),
            commodities: Vec::new(),
            additional_charges: Vec::new(),
        }
    }
}

/// Repository for shipment database operations
#[derive(Clone)]
pub struct ShipmentRepository {
    db: Arc<DbConnections>,
    sequences: Arc<SequenceGenerator>,
}

impl ShipmentRepository {
    pub fn new(db: Arc<DbConnections>, sequences: Arc<SequenceGenerator>) -> Self {
        Self { db, sequences }
    }

    pub async fn list(
        &self,
        req: &ListRequest,
    ) -> Result<ListResult<shipment::Model>, RepositoryError> {
        list_with_config::<Shipment>(&self.db, &SHIPMENT_FIELDS, req)
            .await
            .with_op("shipment.list")
    }

    pub async fn get_by_id(
        &self,
        id: &Pulid,
        tenant: &TenantInfo,
        options: ShipmentOptions,
    ) -> Result<ShipmentDetails, RepositoryError> {
        self.db
            .with_read(|conn| {
                let (id, tenant) = (id.clone(), tenant.clone());
                async move {
                    match find_in_tenant::<shipment::Model, _>(&conn, &id, &tenant).await? {
                        Some(found) => load_details(&conn, found, &tenant, options).await.map(Some),
                        None => Ok(None),
                    }
                }
            })
            .await
            .map_err(RepositoryError::from)
            .and_then(|found| {
                found.ok_or_else(|| RepositoryError::not_found(shipment::Model::RESOURCE, id))
            })
            .with_op("shipment.get_by_id")
    }

    /// Creates the shipment with its moves, stops, charges and commodities.
    ///
    /// A blank pro number is allocated from the sequence generator before
    /// the aggregate transaction opens.
    pub async fn create(
        &self,
        tenant: &TenantInfo,
        mut details: ShipmentDetails,
    ) -> Result<ShipmentDetails, RepositoryError> {
        if details.shipment.pro_number.trim().is_empty() {
            details.shipment.pro_number = self
                .sequences
                .generate_pro_number(&tenant.org_id, &tenant.bu_id)
                .await
                .with_op("shipment.create")?;
        }

        let txn = self.db.write().begin().await.with_op("shipment.create")?;
        let created = create_in(&txn, tenant, details)
            .await
            .with_op("shipment.create")?;
        txn.commit().await.with_op("shipment.create")?;

        tracing::info!(
            id = %created.shipment.id,
            pro_number = %created.shipment.pro_number,
            moves = created.moves.len(),
            "Created shipment"
        );
        Ok(created)
    }

    /// Updates the shipment row and reconciles charges and commodities.
    /// Moves are managed through the move repository and returned as stored.
    pub async fn update(
        &self,
        tenant: &TenantInfo,
        details: ShipmentDetails,
    ) -> Result<ShipmentDetails, RepositoryError> {
        let ShipmentDetails {
            mut shipment,
            commodities,
            additional_charges,
            ..
        } = details;
        shipment.set_tenant(&tenant.org_id, &tenant.bu_id);

        let txn = self.db.write().begin().await.with_op("shipment.update")?;
        update_with_version(&txn, &mut shipment, UpdateMode::Full)
            .await
            .map_err(super::unique_on("proNumber", DUPLICATE_PRO_NUMBER))
            .with_op("shipment.update")?;

        let parent = parent_of(&shipment);
        let charges = reconcile(&txn, &parent, additional_charges, false)
            .await
            .with_op("shipment.update")?;
        let commodities = reconcile(&txn, &parent, commodities, false)
            .await
            .with_op("shipment.update")?;
        let moves = load_moves(&txn, vec![shipment.id.clone()], tenant, true)
            .await
            .with_op("shipment.update")?
            .remove(&shipment.id)
            .unwrap_or_default();
        txn.commit().await.with_op("shipment.update")?;

        tracing::debug!(
            id = %shipment.id,
            version = shipment.version,
            charges_changed = !charges.is_noop(),
            commodities_changed = !commodities.is_noop(),
            "Updated shipment"
        );

        Ok(ShipmentDetails {
            shipment,
            moves,
            commodities: commodities.children,
            additional_charges: charges.children,
        })
    }
}

async fn create_in<C: ConnectionTrait>(
    conn: &C,
    tenant: &TenantInfo,
    details: ShipmentDetails,
) -> Result<ShipmentDetails, RepositoryError> {
    let ShipmentDetails {
        shipment,
        moves,
        commodities,
        additional_charges,
    } = details;

    let shipment = insert_new(conn, shipment, tenant)
        .await
        .map_err(|err| RepositoryError::from_db_with_field(err, "proNumber", DUPLICATE_PRO_NUMBER))?;
    let parent = parent_of(&shipment);

    let mut move_rows = Vec::with_capacity(moves.len());
    let mut move_stops = Vec::with_capacity(moves.len());
    for (index, details) in moves.into_iter().enumerate() {
        let mut row = details.shipment_move;
        if row.sequence == 0 {
            row.sequence = index as i32 + 1;
        }
        move_rows.push(row);
        move_stops.push(details.stops);
    }

    let stored_moves = reconcile(conn, &parent, move_rows, true).await?.children;
    let mut created_moves = Vec::with_capacity(stored_moves.len());
    for (stored, mut stops) in stored_moves.into_iter().zip(move_stops) {
        for (index, stop) in stops.iter_mut().enumerate() {
            if stop.sequence == 0 {
                stop.sequence = index as i32 + 1;
            }
        }
        let move_parent = ParentRef::new(
            stored.id.clone(),
            tenant.org_id.clone(),
            tenant.bu_id.clone(),
        );
        let stops = reconcile::<stop::Model, _>(conn, &move_parent, stops, true)
            .await?
            .children;
        created_moves.push(MoveDetails {
            shipment_move: stored,
            stops,
        });
    }

    let additional_charges = reconcile(conn, &parent, additional_charges, true)
        .await?
        .children;
    let commodities = reconcile(conn, &parent, commodities, true).await?.children;

    Ok(ShipmentDetails {
        shipment,
        moves: created_moves,
        commodities,
        additional_charges,
    })
}

async fn load_details<C: ConnectionTrait>(
    conn: &C,
    shipment: shipment::Model,
    tenant: &TenantInfo,
    options: ShipmentOptions,
) -> Result<ShipmentDetails, DbErr> {
    let ids = vec![shipment.id.clone()];
    let mut details = ShipmentDetails::new(shipment);

    if options.expand_move_details {
        details.moves = load_moves(conn, ids.clone(), tenant, options.expand_stop_details)
            .await?
            .remove(&details.shipment.id)
            .unwrap_or_default();
    }
    if options.expand_commodity_details {
        details.commodities = children_by_parent::<shipment_commodity::Model, _>(
            conn,
            ids.clone(),
            tenant,
            shipment_commodity::Column::CreatedAt,
        )
        .await?
        .remove(&details.shipment.id)
        .unwrap_or_default();
    }
    if options.include_additional_charges {
        details.additional_charges = children_by_parent::<additional_charge::Model, _>(
            conn,
            ids,
            tenant,
            additional_charge::Column::CreatedAt,
        )
        .await?
        .remove(&details.shipment.id)
        .unwrap_or_default();
    }
    Ok(details)
}

fn parent_of(shipment: &shipment::Model) -> ParentRef {
    ParentRef::new(
        shipment.id.clone(),
        shipment.organization_id.clone(),
        shipment.business_unit_id.clone(),
    )
}
