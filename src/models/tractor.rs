//! Tractor entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::pulid::Pulid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tractors")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Pulid,
    pub organization_id: Pulid,
    pub business_unit_id: Pulid,

    pub status: EquipmentStatus,
    /// Fleet code, unique per tenant
    pub code: String,
    pub equipment_type_id: Pulid,
    pub primary_worker_id: Pulid,
    pub secondary_worker_id: Option<Pulid>,
    pub make: Option<String>,
    pub year: Option<i32>,

    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum EquipmentStatus {
    #[sea_orm(string_value = "Available")]
    #[default]
    Available,
    #[sea_orm(string_value = "OutOfService")]
    OutOfService,
    #[sea_orm(string_value = "AtMaintenance")]
    AtMaintenance,
    #[sea_orm(string_value = "Sold")]
    Sold,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

crate::impl_record!("Tractor", "tr_");
