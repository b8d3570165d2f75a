//! # Repository Layer
//!
//! Per-entity repositories over [`DbConnections`]. Reads go through the
//! replica selector, writes run in a transaction on the primary, updates use
//! the versioned update protocol and owned child collections are reconciled
//! in the parent's transaction.

pub mod consolidation;
pub mod customer;
pub mod dedicated_lane;
pub mod document;
pub mod email_profile;
pub mod email_queue;
pub mod notification;
pub mod shipment;
pub mod shipment_comment;
pub mod shipment_move;
pub mod tractor;
pub mod worker;

pub use consolidation::ConsolidationRepository;
pub use customer::CustomerRepository;
pub use dedicated_lane::DedicatedLaneRepository;
pub use document::DocumentRepository;
pub use email_profile::EmailProfileRepository;
pub use email_queue::EmailQueueRepository;
pub use notification::NotificationRepository;
pub use shipment::ShipmentRepository;
pub use shipment_comment::ShipmentCommentRepository;
pub use shipment_move::ShipmentMoveRepository;
pub use tractor::TractorRepository;
pub use worker::WorkerRepository;

use std::collections::HashMap;

use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, FromQueryResult, QueryFilter,
};

use crate::db::DbConnections;
use crate::error::RepositoryError;
use crate::pulid::Pulid;
use crate::query::{FieldConfig, ListRequest, ListResult, QueryBuilder, TenantInfo};
use crate::record::{
    ChildRecord, ColumnOf, EnvelopeColumn, Record, now_unix, stamp_new, to_active_model,
};

/// Tenant predicate on the envelope columns of `M`.
pub(crate) fn tenant_condition<M: Record>(tenant: &TenantInfo) -> Condition {
    Condition::all()
        .add(M::column(EnvelopeColumn::OrganizationId).eq(tenant.org_id.clone()))
        .add(M::column(EnvelopeColumn::BusinessUnitId).eq(tenant.bu_id.clone()))
}

/// Row `id` of `M` if it belongs to `tenant`.
pub(crate) async fn find_in_tenant<M, C>(
    conn: &C,
    id: &Pulid,
    tenant: &TenantInfo,
) -> Result<Option<M>, DbErr>
where
    M: Record,
    M::Entity: EntityTrait<Model = M>,
    C: ConnectionTrait,
{
    M::Entity::find()
        .filter(M::column(EnvelopeColumn::Id).eq(id.clone()))
        .filter(tenant_condition::<M>(tenant))
        .one(conn)
        .await
}

/// Stamps `model` as a new row of `tenant` and inserts it.
pub(crate) async fn insert_new<M, C>(
    conn: &C,
    mut model: M,
    tenant: &TenantInfo,
) -> Result<M, DbErr>
where
    M: Record,
    M::Entity: EntityTrait<Model = M>,
    M: sea_orm::IntoActiveModel<M::ActiveModel>,
    C: ConnectionTrait,
{
    stamp_new(&mut model, &tenant.org_id, &tenant.bu_id, now_unix());
    M::Entity::insert(to_active_model(&model, |_| true))
        .exec_without_returning(conn)
        .await?;
    Ok(model)
}

/// Children of several parents grouped by parent id, in `order` column order.
pub(crate) async fn children_by_parent<M, C>(
    conn: &C,
    parent_ids: Vec<Pulid>,
    tenant: &TenantInfo,
    order: ColumnOf<M>,
) -> Result<HashMap<Pulid, Vec<M>>, DbErr>
where
    M: ChildRecord,
    M::Entity: EntityTrait<Model = M>,
    C: ConnectionTrait,
{
    use sea_orm::QueryOrder;

    let mut grouped: HashMap<Pulid, Vec<M>> = HashMap::new();
    if parent_ids.is_empty() {
        return Ok(grouped);
    }

    let children = M::Entity::find()
        .filter(M::parent_column().is_in(parent_ids))
        .filter(tenant_condition::<M>(tenant))
        .order_by_asc(order)
        .order_by_asc(M::column(EnvelopeColumn::Id))
        .all(conn)
        .await?;
    for child in children {
        grouped
            .entry(child.parent_id().clone())
            .or_default()
            .push(child);
    }
    Ok(grouped)
}

/// Reports a unique violation against `field` rather than the id.
pub(crate) fn unique_on(
    field: &'static str,
    message: &'static str,
) -> impl Fn(RepositoryError) -> RepositoryError {
    move |err| match err {
        RepositoryError::Validation {
            code: "already_exists",
            ..
        } => RepositoryError::validation(field, "already_exists", message),
        other => other,
    }
}

/// Runs a list request against `E` on a read connection.
pub(crate) async fn list_with_config<E>(
    db: &DbConnections,
    config: &'static FieldConfig,
    req: &ListRequest,
) -> Result<ListResult<E::Model>, RepositoryError>
where
    E: EntityTrait,
    E::Model: FromQueryResult + Send + Sync,
{
    let paged = QueryBuilder::from_request(E::find(), config, db.backend(), req)?
        .finish(req.pagination);

    let result = db
        .with_read(|conn| {
            let paged = paged.clone();
            async move { paged.scan_and_count(&conn).await }
        })
        .await?;
    Ok(result)
}
