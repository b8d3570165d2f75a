//! Additional charge entity model
//!
//! Accessorial charges attached to a shipment. Reconciled as a child
//! collection of the shipment on create and update.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::pulid::Pulid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "additional_charges")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Pulid,
    pub organization_id: Pulid,
    pub business_unit_id: Pulid,

    pub shipment_id: Pulid,
    pub accessorial_charge_id: Pulid,
    pub method: ChargeMethod,
    pub unit: i64,
    pub amount_cents: i64,
    pub is_system_generated: bool,

    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum ChargeMethod {
    #[sea_orm(string_value = "Flat")]
    #[default]
    Flat,
    #[sea_orm(string_value = "Distance")]
    Distance,
    #[sea_orm(string_value = "Percentage")]
    Percentage,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

crate::impl_record!("AdditionalCharge", "ac_");
crate::impl_child_record!(shipment_id, ShipmentId, Insert);
