//! Shipment entity model
//!
//! Shipments own moves (which own stops), additional charges and
//! commodities. On Postgres the table also carries a generated
//! `search_vector` column used by full-text search; it is never selected.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::pulid::Pulid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "shipments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Pulid,
    pub organization_id: Pulid,
    pub business_unit_id: Pulid,

    pub status: ShipmentStatus,
    /// Allocated by the sequence generator on create
    pub pro_number: String,
    /// Bill of lading number
    pub bol: String,
    pub customer_id: Pulid,
    pub tractor_type_id: Option<Pulid>,
    pub trailer_type_id: Option<Pulid>,
    pub pieces: Option<i64>,
    pub weight: Option<i64>,
    pub freight_charge_cents: i64,
    pub total_charge_cents: i64,
    /// Set while the shipment is a member of a consolidation group
    pub consolidation_group_id: Option<Pulid>,

    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum ShipmentStatus {
    #[sea_orm(string_value = "New")]
    #[default]
    New,
    #[sea_orm(string_value = "PartiallyAssigned")]
    PartiallyAssigned,
    #[sea_orm(string_value = "Assigned")]
    Assigned,
    #[sea_orm(string_value = "InTransit")]
    InTransit,
    #[sea_orm(string_value = "Delayed")]
    Delayed,
    #[sea_orm(string_value = "PartiallyCompleted")]
    PartiallyCompleted,
    #[sea_orm(string_value = "Completed")]
    Completed,
    #[sea_orm(string_value = "Billed")]
    Billed,
    #[sea_orm(string_value = "Canceled")]
    Canceled,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::shipment_move::Entity")]
    ShipmentMove,
    #[sea_orm(
        belongs_to = "super::consolidation_group::Entity",
        from = "Column::ConsolidationGroupId",
        to = "super::consolidation_group::Column::Id"
    )]
    ConsolidationGroup,
}

impl Related<super::shipment_move::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ShipmentMove.def()
    }
}

impl Related<super::consolidation_group::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ConsolidationGroup.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

crate::impl_record!("Shipment", "shp_");
