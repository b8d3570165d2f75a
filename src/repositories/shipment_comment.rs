//! # Shipment Comment Repository
//!
//! Comments on a shipment and the users they mention. Mentions are a child
//! collection of the comment and are reconciled with it.

use std::sync::Arc;

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, TransactionTrait};
use serde::{Deserialize, Serialize};

use crate::db::DbConnections;
use crate::error::{OperationExt, RepositoryError};
use crate::models::comment_mention;
use crate::models::shipment_comment::{self, Entity as ShipmentComment};
use crate::optimistic::{UpdateMode, update_with_version};
use crate::pulid::Pulid;
use crate::query::TenantInfo;
use crate::reconcile::{ParentRef, reconcile};
use crate::record::Record;

use super::{children_by_parent, insert_new, tenant_condition};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDetails {
    #[serde(flatten)]
    pub comment: shipment_comment::Model,
    #[serde(default)]
    pub mentioned_users: Vec<comment_mention::Model>,
}

/// Repository for shipment comment database operations
#[derive(Debug, Clone)]
pub struct ShipmentCommentRepository {
    db: Arc<DbConnections>,
}

impl ShipmentCommentRepository {
    pub fn new(db: Arc<DbConnections>) -> Self {
        Self { db }
    }

    /// Comments on a shipment, newest first, with their mentions.
    pub async fn list_by_shipment(
        &self,
        shipment_id: &Pulid,
        tenant: &TenantInfo,
    ) -> Result<Vec<CommentDetails>, RepositoryError> {
        self.db
            .with_read(|conn| {
                let (shipment_id, tenant) = (shipment_id.clone(), tenant.clone());
                async move {
                    let comments = ShipmentComment::find()
                        .filter(shipment_comment::Column::ShipmentId.eq(shipment_id))
                        .filter(tenant_condition::<shipment_comment::Model>(&tenant))
                        .order_by_desc(shipment_comment::Column::CreatedAt)
                        .order_by_desc(shipment_comment::Column::Id)
                        .all(&conn)
                        .await?;

                    let ids = comments.iter().map(|c| c.id.clone()).collect();
                    let mut mentions = children_by_parent::<comment_mention::Model, _>(
                        &conn,
                        ids,
                        &tenant,
                        comment_mention::Column::CreatedAt,
                    )
                    .await?;

                    Ok(comments
                        .into_iter()
                        .map(|comment| CommentDetails {
                            mentioned_users: mentions.remove(&comment.id).unwrap_or_default(),
                            comment,
                        })
                        .collect())
                }
            })
            .await
            .with_op("shipment_comment.list_by_shipment")
    }

    pub async fn create(
        &self,
        tenant: &TenantInfo,
        details: CommentDetails,
    ) -> Result<CommentDetails, RepositoryError> {
        let txn = self.db.write().begin().await.with_op("shipment_comment.create")?;
        let comment = insert_new(&txn, details.comment, tenant)
            .await
            .with_op("shipment_comment.create")?;
        let mentioned_users = save_mentions(&txn, &comment, details.mentioned_users, true)
            .await
            .with_op("shipment_comment.create")?;
        txn.commit().await.with_op("shipment_comment.create")?;

        tracing::debug!(
            id = %comment.id,
            shipment_id = %comment.shipment_id,
            mentions = mentioned_users.len(),
            "Created shipment comment"
        );
        Ok(CommentDetails {
            comment,
            mentioned_users,
        })
    }

    pub async fn update(
        &self,
        tenant: &TenantInfo,
        details: CommentDetails,
    ) -> Result<CommentDetails, RepositoryError> {
        let CommentDetails {
            mut comment,
            mentioned_users,
        } = details;
        comment.set_tenant(&tenant.org_id, &tenant.bu_id);

        let txn = self.db.write().begin().await.with_op("shipment_comment.update")?;
        update_with_version(&txn, &mut comment, UpdateMode::Full)
            .await
            .with_op("shipment_comment.update")?;
        let mentioned_users = save_mentions(&txn, &comment, mentioned_users, false)
            .await
            .with_op("shipment_comment.update")?;
        txn.commit().await.with_op("shipment_comment.update")?;

        Ok(CommentDetails {
            comment,
            mentioned_users,
        })
    }
}

async fn save_mentions<C: ConnectionTrait>(
    conn: &C,
    comment: &shipment_comment::Model,
    mut mentions: Vec<comment_mention::Model>,
    is_create: bool,
) -> Result<Vec<comment_mention::Model>, RepositoryError> {
    for mention in &mut mentions {
        mention.shipment_id = comment.shipment_id.clone();
    }
    let parent = ParentRef::new(
        comment.id.clone(),
        comment.organization_id.clone(),
        comment.business_unit_id.clone(),
    );
    Ok(reconcile(conn, &parent, mentions, is_create).await?.children)
}
