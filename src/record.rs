//! Traits shared by every persisted entity.
//!
//! Each table carries the same envelope: `id`, `organization_id`,
//! `business_unit_id`, `version`, `created_at` and `updated_at`. [`Record`]
//! exposes that envelope to the generic update, reconciliation and query code,
//! and [`ChildRecord`] adds the parent link used by reconciliation.

use sea_orm::sea_query::ColumnType;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait,
    FromQueryResult, IdenStatic, Iterable, ModelTrait,
};

use crate::error::RepositoryError;
use crate::pulid::Pulid;

/// Columns every entity carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeColumn {
    Id,
    OrganizationId,
    BusinessUnitId,
    Version,
    CreatedAt,
    UpdatedAt,
}

impl EnvelopeColumn {
    pub const ALL: [EnvelopeColumn; 6] = [
        EnvelopeColumn::Id,
        EnvelopeColumn::OrganizationId,
        EnvelopeColumn::BusinessUnitId,
        EnvelopeColumn::Version,
        EnvelopeColumn::CreatedAt,
        EnvelopeColumn::UpdatedAt,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EnvelopeColumn::Id => "id",
            EnvelopeColumn::OrganizationId => "organization_id",
            EnvelopeColumn::BusinessUnitId => "business_unit_id",
            EnvelopeColumn::Version => "version",
            EnvelopeColumn::CreatedAt => "created_at",
            EnvelopeColumn::UpdatedAt => "updated_at",
        }
    }
}

pub type ColumnOf<M> = <<M as ModelTrait>::Entity as EntityTrait>::Column;

/// A tenant-scoped, versioned row.
///
/// Generic code over `M: Record` also needs
/// `M::Entity: EntityTrait<Model = M>`; the bound cannot live on the trait
/// itself because it would not be implied at use sites.
pub trait Record: ModelTrait + FromQueryResult + Clone + Send + Sync + 'static {
    type ActiveModel: ActiveModelTrait<Entity = Self::Entity>
        + ActiveModelBehavior
        + From<Self>
        + Send
        + Sync
        + 'static;

    /// Display name used in errors and logs, e.g. `Shipment`.
    const RESOURCE: &'static str;
    /// Id prefix including the underscore, e.g. `shp_`.
    const ID_PREFIX: &'static str;

    fn column(envelope: EnvelopeColumn) -> ColumnOf<Self>;

    fn id(&self) -> &Pulid;
    fn set_id(&mut self, id: Pulid);
    fn organization_id(&self) -> &Pulid;
    fn business_unit_id(&self) -> &Pulid;
    fn set_tenant(&mut self, org_id: &Pulid, bu_id: &Pulid);
    fn version(&self) -> i64;
    fn set_version(&mut self, version: i64);
    fn created_at(&self) -> i64;
    fn set_created_at(&mut self, at: i64);
    fn updated_at(&self) -> i64;
    fn set_updated_at(&mut self, at: i64);

    /// Whether `column` belongs to the envelope.
    fn is_envelope(column: &ColumnOf<Self>) -> bool {
        let name = column.as_str();
        EnvelopeColumn::ALL.iter().any(|env| env.name() == name)
    }
}

/// What reconciliation does with a desired child whose id is not stored
/// under the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownIdPolicy {
    /// Insert the child keeping the caller's id.
    Insert,
    /// Fail with a validation error.
    Reject,
}

/// A record owned by a parent row.
pub trait ChildRecord: Record {
    const UNKNOWN_ID_POLICY: UnknownIdPolicy;

    fn parent_column() -> ColumnOf<Self>;
    fn parent_id(&self) -> &Pulid;
    fn set_parent_id(&mut self, parent_id: &Pulid);

    /// Columns rewritten by a bulk update: everything outside the envelope
    /// and the parent link.
    fn mutable_columns() -> Vec<ColumnOf<Self>> {
        let parent = Self::parent_column();
        <ColumnOf<Self> as Iterable>::iter()
            .filter(|col| !Self::is_envelope(col) && col.as_str() != parent.as_str())
            .collect()
    }
}

/// Postgres type used to cast untyped VALUES placeholders for `column`.
pub fn pg_cast_type<C: ColumnTrait>(column: &C) -> &'static str {
    match column.def().get_column_type() {
        ColumnType::TinyInteger | ColumnType::SmallInteger => "smallint",
        ColumnType::Integer => "integer",
        ColumnType::BigInteger => "bigint",
        ColumnType::Float => "real",
        ColumnType::Double => "double precision",
        ColumnType::Boolean => "boolean",
        ColumnType::Json | ColumnType::JsonBinary => "jsonb",
        ColumnType::Binary(_) | ColumnType::VarBinary(_) | ColumnType::Blob => "bytea",
        _ => "text",
    }
}

/// Implements [`Record`] for an entity module whose model carries the
/// standard envelope columns.
#[macro_export]
macro_rules! impl_record {
    ($resource:literal, $prefix:literal) => {
        impl $crate::record::Record for Model {
            type ActiveModel = ActiveModel;

            const RESOURCE: &'static str = $resource;
            const ID_PREFIX: &'static str = $prefix;

            fn column(envelope: $crate::record::EnvelopeColumn) -> Column {
                use $crate::record::EnvelopeColumn as Env;
                match envelope {
                    Env::Id => Column::Id,
                    Env::OrganizationId => Column::OrganizationId,
                    Env::BusinessUnitId => Column::BusinessUnitId,
                    Env::Version => Column::Version,
                    Env::CreatedAt => Column::CreatedAt,
                    Env::UpdatedAt => Column::UpdatedAt,
                }
            }

            fn id(&self) -> &$crate::pulid::Pulid {
                &self.id
            }

            fn set_id(&mut self, id: $crate::pulid::Pulid) {
                self.id = id;
            }

            fn organization_id(&self) -> &$crate::pulid::Pulid {
                &self.organization_id
            }

            fn business_unit_id(&self) -> &$crate::pulid::Pulid {
                &self.business_unit_id
            }

            fn set_tenant(&mut self, org_id: &$crate::pulid::Pulid, bu_id: &$crate::pulid::Pulid) {
                self.organization_id = org_id.clone();
                self.business_unit_id = bu_id.clone();
            }

            fn version(&self) -> i64 {
                self.version
            }

            fn set_version(&mut self, version: i64) {
                self.version = version;
            }

            fn created_at(&self) -> i64 {
                self.created_at
            }

            fn set_created_at(&mut self, at: i64) {
                self.created_at = at;
            }

            fn updated_at(&self) -> i64 {
                self.updated_at
            }

            fn set_updated_at(&mut self, at: i64) {
                self.updated_at = at;
            }
        }
    };
}

/// Implements [`ChildRecord`] on top of [`impl_record!`].
#[macro_export]
macro_rules! impl_child_record {
    ($parent_field:ident, $parent_column:ident, $policy:ident) => {
        impl $crate::record::ChildRecord for Model {
            const UNKNOWN_ID_POLICY: $crate::record::UnknownIdPolicy =
                $crate::record::UnknownIdPolicy::$policy;

            fn parent_column() -> Column {
                Column::$parent_column
            }

            fn parent_id(&self) -> &$crate::pulid::Pulid {
                &self.$parent_field
            }

            fn set_parent_id(&mut self, parent_id: &$crate::pulid::Pulid) {
                self.$parent_field = parent_id.clone();
            }
        }
    };
}

/// Current Unix time in seconds.
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Active model with every column accepted by `include` marked as set.
pub fn to_active_model<M>(model: &M, include: impl Fn(&ColumnOf<M>) -> bool) -> M::ActiveModel
where
    M: Record,
{
    let mut active = <M::ActiveModel as ActiveModelTrait>::default();
    for column in <ColumnOf<M> as Iterable>::iter() {
        if include(&column) {
            active.set(column, model.get(column));
        }
    }
    active
}

/// Prepares a new row: fresh id when nil, tenant stamped, version 1 and
/// both timestamps set to `now`.
pub fn stamp_new<M: Record>(model: &mut M, org_id: &Pulid, bu_id: &Pulid, now: i64) {
    if model.id().is_nil() {
        model.set_id(Pulid::new(M::ID_PREFIX));
    }
    model.set_tenant(org_id, bu_id);
    model.set_version(1);
    model.set_created_at(now);
    model.set_updated_at(now);
}

/// Inserts one already stamped row.
pub async fn insert_record<M, C>(conn: &C, model: &M) -> Result<(), RepositoryError>
where
    M: Record,
    M::Entity: EntityTrait<Model = M>,
    M: sea_orm::IntoActiveModel<M::ActiveModel>,
    C: ConnectionTrait,
{
    let active = to_active_model(model, |_| true);
    M::Entity::insert(active).exec_without_returning(conn).await?;
    Ok(())
}

/// Inserts stamped rows in a single statement.
pub async fn insert_records<M, C>(conn: &C, models: &[M]) -> Result<u64, RepositoryError>
where
    M: Record,
    M::Entity: EntityTrait<Model = M>,
    M: sea_orm::IntoActiveModel<M::ActiveModel>,
    C: ConnectionTrait,
{
    if models.is_empty() {
        return Ok(0);
    }
    let rows = models.iter().map(|model| to_active_model(model, |_| true));
    let inserted = M::Entity::insert_many(rows)
        .exec_without_returning(conn)
        .await?;
    Ok(inserted)
}
