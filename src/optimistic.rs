//! Versioned update protocol.
//!
//! An update succeeds only when the stored `version` still equals the one the
//! caller read. The row comes back with `version + 1` and the caller's model
//! is replaced with the canonical post-update state.

use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter,
    Value,
};

use crate::error::RepositoryError;
use crate::record::{ColumnOf, EnvelopeColumn, Record, now_unix, to_active_model};

/// Which columns an update writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpdateMode {
    /// Every mutable column.
    #[default]
    Full,
    /// Skips columns whose value is null, empty, zero or false, so a
    /// partially populated model does not clobber stored values.
    OmitZero,
}

/// Updates `model` guarded by its current version.
///
/// On success `model` holds the stored row. On failure its `version` and
/// `updated_at` are restored to what the caller passed in.
pub async fn update_with_version<M, C>(
    conn: &C,
    model: &mut M,
    mode: UpdateMode,
) -> Result<(), RepositoryError>
where
    M: Record,
    M::Entity: EntityTrait<Model = M>,
    C: ConnectionTrait,
{
    let old_version = model.version();
    let old_updated_at = model.updated_at();
    model.set_version(old_version + 1);
    model.set_updated_at(now_unix());

    match apply_update(conn, model, old_version, mode).await {
        Ok(stored) => {
            *model = stored;
            Ok(())
        }
        Err(err) => {
            model.set_version(old_version);
            model.set_updated_at(old_updated_at);
            Err(err)
        }
    }
}

/// Predicate on `(id, organization_id, business_unit_id)` of `model`.
pub fn identity_condition<M: Record>(model: &M) -> Condition {
    Condition::all()
        .add(M::column(EnvelopeColumn::Id).eq(model.id().clone()))
        .add(M::column(EnvelopeColumn::OrganizationId).eq(model.organization_id().clone()))
        .add(M::column(EnvelopeColumn::BusinessUnitId).eq(model.business_unit_id().clone()))
}

async fn apply_update<M, C>(
    conn: &C,
    model: &M,
    old_version: i64,
    mode: UpdateMode,
) -> Result<M, RepositoryError>
where
    M: Record,
    M::Entity: EntityTrait<Model = M>,
    C: ConnectionTrait,
{
    let active = to_active_model(model, |column| {
        if is_immutable::<M>(column) {
            return false;
        }
        match mode {
            UpdateMode::Full => true,
            UpdateMode::OmitZero => !is_zero(&model.get(*column)),
        }
    });

    let guard = identity_condition(model).add(M::column(EnvelopeColumn::Version).eq(old_version));
    let update = M::Entity::update_many().set(active).filter(guard);

    let stored = if conn.support_returning() {
        update.exec_with_returning(conn).await?.into_iter().next()
    } else if update.exec(conn).await?.rows_affected == 0 {
        None
    } else {
        M::Entity::find()
            .filter(identity_condition(model))
            .one(conn)
            .await?
    };

    match stored {
        Some(stored) => Ok(stored),
        None => Err(zero_row_error(conn, model).await),
    }
}

/// Distinguishes a missing row from a lost race after an update hit no rows.
async fn zero_row_error<M, C>(conn: &C, model: &M) -> RepositoryError
where
    M: Record,
    M::Entity: EntityTrait<Model = M>,
    C: ConnectionTrait,
{
    let exists = M::Entity::find()
        .filter(identity_condition(model))
        .count(conn)
        .await;

    match exists {
        Ok(0) => RepositoryError::not_found(M::RESOURCE, model.id()),
        Ok(_) => {
            metrics::counter!("tms_version_mismatch_total", "resource" => M::RESOURCE)
                .increment(1);
            tracing::debug!(
                resource = M::RESOURCE,
                id = %model.id(),
                "Optimistic update lost a race"
            );
            RepositoryError::version_mismatch(M::RESOURCE, model.id())
        }
        Err(err) => RepositoryError::from(err),
    }
}

fn is_immutable<M: Record>(column: &ColumnOf<M>) -> bool {
    use sea_orm::IdenStatic;

    [
        EnvelopeColumn::Id,
        EnvelopeColumn::OrganizationId,
        EnvelopeColumn::BusinessUnitId,
        EnvelopeColumn::CreatedAt,
    ]
    .iter()
    .any(|env| env.name() == column.as_str())
}

/// Zero value of a column for [`UpdateMode::OmitZero`].
pub(crate) fn is_zero(value: &Value) -> bool {
    if *value == value.as_null() {
        return true;
    }
    match value {
        Value::String(Some(s)) => s.is_empty(),
        Value::TinyInt(Some(n)) => *n == 0,
        Value::SmallInt(Some(n)) => *n == 0,
        Value::Int(Some(n)) => *n == 0,
        Value::BigInt(Some(n)) => *n == 0,
        Value::Float(Some(n)) => *n == 0.0,
        Value::Double(Some(n)) => *n == 0.0,
        Value::Bool(Some(b)) => !b,
        Value::Bytes(Some(bytes)) => bytes.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values_are_detected() {
        assert!(is_zero(&Value::from(0i64)));
        assert!(is_zero(&Value::from(String::new())));
        assert!(is_zero(&Value::from(false)));
        assert!(is_zero(&Value::String(None)));
        assert!(!is_zero(&Value::from(3i32)));
        assert!(!is_zero(&Value::from("x")));
        assert!(!is_zero(&Value::from(true)));
    }
}
