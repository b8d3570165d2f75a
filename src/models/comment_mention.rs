//! Users mentioned in a shipment comment
//!
//! Reconciled as a child collection of the comment.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::pulid::Pulid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "shipment_comment_mentions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Pulid,
    pub organization_id: Pulid,
    pub business_unit_id: Pulid,

    pub comment_id: Pulid,
    pub shipment_id: Pulid,
    pub mentioned_user_id: Pulid,

    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

crate::impl_record!("CommentMention", "scm_");
crate::impl_child_record!(comment_id, CommentId, Insert);
