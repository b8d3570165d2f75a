//! Customer entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::pulid::Pulid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "customers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Pulid,
    pub organization_id: Pulid,
    pub business_unit_id: Pulid,

    pub status: CustomerStatus,
    /// Human identifier, unique per tenant
    pub code: String,
    pub name: String,
    pub address_line: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,

    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum CustomerStatus {
    #[sea_orm(string_value = "Active")]
    #[default]
    Active,
    #[sea_orm(string_value = "Inactive")]
    Inactive,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

crate::impl_record!("Customer", "cus_");
