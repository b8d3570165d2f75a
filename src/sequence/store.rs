//! Counter allocation inside a serializable transaction.

use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr,
    EntityTrait, QueryFilter, QuerySelect, TransactionTrait,
};

use super::SequenceType;
use crate::error::{is_serialization_failure, is_unique_violation};
use crate::models::sequence;
use crate::pulid::Pulid;
use crate::record::{Record, now_unix};

/// Monthly partition a counter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub year: i16,
    pub month: i16,
}

/// Why one allocation attempt failed.
#[derive(Debug)]
pub(crate) enum AttemptError {
    /// Another writer got there first; the attempt may be retried.
    Conflict(String),
    Fatal(DbErr),
}

impl From<DbErr> for AttemptError {
    fn from(err: DbErr) -> Self {
        if is_serialization_failure(&err) || is_unique_violation(&err) {
            AttemptError::Conflict(err.to_string())
        } else {
            AttemptError::Fatal(err)
        }
    }
}

/// Reserves `count` consecutive values and returns the first.
///
/// The counter row is created at zero on first use. Both the row lock and
/// the version guard on the update make a concurrent writer abort this
/// attempt rather than hand out an overlapping range.
pub(crate) async fn allocate(
    db: &DatabaseConnection,
    sequence_type: SequenceType,
    org_id: &Pulid,
    bu_id: &Pulid,
    period: Period,
    count: i64,
) -> Result<i64, AttemptError> {
    let is_postgres = db.get_database_backend() == DbBackend::Postgres;
    let isolation = is_postgres.then_some(sea_orm::IsolationLevel::Serializable);
    let txn = db.begin_with_config(isolation, None).await?;

    let mut select = sequence::Entity::find()
        .filter(sequence::Column::OrganizationId.eq(org_id.clone()))
        .filter(sequence::Column::SequenceType.eq(sequence_type.as_str()))
        .filter(sequence::Column::Year.eq(period.year))
        .filter(sequence::Column::Month.eq(period.month));
    if is_postgres {
        select = select.lock_exclusive();
    }

    let counter = match select.one(&txn).await? {
        Some(counter) => counter,
        None => {
            let now = now_unix();
            let counter = sequence::Model {
                id: Pulid::new(<sequence::Model as Record>::ID_PREFIX),
                organization_id: org_id.clone(),
                business_unit_id: bu_id.clone(),
                sequence_type: sequence_type.as_str().to_string(),
                year: period.year,
                month: period.month,
                current_sequence: 0,
                version: 1,
                created_at: now,
                updated_at: now,
            };
            sequence::Entity::insert(sequence::ActiveModel::from(counter.clone()))
                .exec_without_returning(&txn)
                .await?;
            tracing::debug!(
                sequence_type = %sequence_type,
                org_id = %org_id,
                year = period.year,
                month = period.month,
                "Created sequence counter"
            );
            counter
        }
    };

    let start = counter.current_sequence + 1;
    let updated = sequence::Entity::update_many()
        .set(sequence::ActiveModel {
            current_sequence: Set(counter.current_sequence + count),
            version: Set(counter.version + 1),
            updated_at: Set(now_unix()),
            ..Default::default()
        })
        .filter(sequence::Column::Id.eq(counter.id.clone()))
        .filter(sequence::Column::Version.eq(counter.version))
        .filter(sequence::Column::CurrentSequence.eq(counter.current_sequence))
        .exec(&txn)
        .await?;

    if updated.rows_affected == 0 {
        // Dropping the transaction rolls it back.
        return Err(AttemptError::Conflict(format!(
            "sequence counter {} changed during allocation",
            counter.id
        )));
    }

    txn.commit().await?;
    Ok(start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_errors_are_fatal() {
        let err = AttemptError::from(DbErr::Custom("boom".into()));
        assert!(matches!(err, AttemptError::Fatal(_)));
    }
}
