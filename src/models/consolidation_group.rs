//! Consolidation group entity model
//!
//! Groups shipments that travel together. Membership lives on the shipment
//! row (`consolidation_group_id`), not in a join table.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::pulid::Pulid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "consolidation_groups")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Pulid,
    pub organization_id: Pulid,
    pub business_unit_id: Pulid,

    /// Allocated by the sequence generator on create
    pub consolidation_number: String,
    pub status: GroupStatus,
    pub description: Option<String>,

    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum GroupStatus {
    #[sea_orm(string_value = "New")]
    #[default]
    New,
    #[sea_orm(string_value = "InProgress")]
    InProgress,
    #[sea_orm(string_value = "Completed")]
    Completed,
    #[sea_orm(string_value = "Canceled")]
    Canceled,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::shipment::Entity")]
    Shipment,
}

impl Related<super::shipment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Shipment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

crate::impl_record!("ConsolidationGroup", "cg_");
