//! Stop entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::pulid::Pulid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stops")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Pulid,
    pub organization_id: Pulid,
    pub business_unit_id: Pulid,

    pub shipment_move_id: Pulid,
    pub location_id: Pulid,
    #[sea_orm(column_name = "type")]
    pub stop_type: StopType,
    pub status: StopStatus,
    /// 1-based position within the move
    pub sequence: i32,
    pub pieces: Option<i64>,
    pub weight: Option<i64>,
    pub planned_arrival: i64,
    pub planned_departure: i64,
    pub actual_arrival: Option<i64>,
    pub actual_departure: Option<i64>,
    pub address_line: Option<String>,

    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum StopType {
    #[sea_orm(string_value = "Pickup")]
    #[default]
    Pickup,
    #[sea_orm(string_value = "Delivery")]
    Delivery,
    #[sea_orm(string_value = "SplitPickup")]
    SplitPickup,
    #[sea_orm(string_value = "SplitDelivery")]
    SplitDelivery,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum StopStatus {
    #[sea_orm(string_value = "New")]
    #[default]
    New,
    #[sea_orm(string_value = "InTransit")]
    InTransit,
    #[sea_orm(string_value = "Completed")]
    Completed,
    #[sea_orm(string_value = "Canceled")]
    Canceled,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::shipment_move::Entity",
        from = "Column::ShipmentMoveId",
        to = "super::shipment_move::Column::Id"
    )]
    ShipmentMove,
}

impl Related<super::shipment_move::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ShipmentMove.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

crate::impl_record!("Stop", "stp_");
crate::impl_child_record!(shipment_move_id, ShipmentMoveId, Insert);
