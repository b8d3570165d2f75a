//! Sequence counter entity
//!
//! One row per `(organization_id, type, year, month)` partition. The
//! `current_sequence` column holds the last value handed out.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::pulid::Pulid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sequences")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Pulid,
    pub organization_id: Pulid,
    pub business_unit_id: Pulid,

    /// Sequence type name, e.g. `pro_number`
    #[sea_orm(column_name = "type")]
    pub sequence_type: String,
    pub year: i16,
    pub month: i16,
    pub current_sequence: i64,

    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

crate::impl_record!("Sequence", "seq_");
