//! Dedicated lane entity model
//!
//! A lane pins a customer, origin, destination and equipment combination
//! to a preferred set of workers.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::pulid::Pulid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "dedicated_lanes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Pulid,
    pub organization_id: Pulid,
    pub business_unit_id: Pulid,

    pub name: String,
    pub status: LaneStatus,
    pub customer_id: Pulid,
    pub origin_location_id: Pulid,
    pub destination_location_id: Pulid,
    pub tractor_type_id: Option<Pulid>,
    pub trailer_type_id: Option<Pulid>,
    pub primary_worker_id: Option<Pulid>,
    pub secondary_worker_id: Option<Pulid>,
    pub auto_assign: bool,

    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum LaneStatus {
    #[sea_orm(string_value = "Active")]
    #[default]
    Active,
    #[sea_orm(string_value = "Inactive")]
    Inactive,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

crate::impl_record!("DedicatedLane", "dl_");
