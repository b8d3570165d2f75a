//! Child collection reconciliation.
//!
//! Given a parent and the full desired set of one kind of child, makes the
//! stored set match: new children are bulk inserted, changed children are
//! bulk updated behind per-row version guards, and stored children missing
//! from the desired set are deleted. Statements run in that order on the
//! caller's connection, which is expected to be the parent's transaction.

use std::collections::{HashMap, HashSet};

use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DbBackend, EntityName, EntityTrait, IdenStatic,
    ModelTrait, QueryFilter, Statement, Value,
};

use crate::error::RepositoryError;
use crate::pulid::Pulid;
use crate::record::{
    ChildRecord, ColumnOf, EnvelopeColumn, UnknownIdPolicy, insert_records, now_unix, pg_cast_type,
    stamp_new,
};

/// Bound parameters per bulk update statement, below the Postgres and SQLite
/// limits.
const MAX_BIND_PARAMS: usize = 30_000;

/// Identity of the parent row that owns the collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRef {
    pub id: Pulid,
    pub org_id: Pulid,
    pub bu_id: Pulid,
}

impl ParentRef {
    pub fn new(id: Pulid, org_id: Pulid, bu_id: Pulid) -> Self {
        Self { id, org_id, bu_id }
    }
}

/// What a reconciliation changed, plus the canonical child set in the order
/// the caller supplied it.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome<M> {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: u64,
    pub children: Vec<M>,
}

impl<M> ReconcileOutcome<M> {
    fn empty() -> Self {
        Self {
            inserted: 0,
            updated: 0,
            unchanged: 0,
            deleted: 0,
            children: Vec::new(),
        }
    }

    /// Whether any row was written.
    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.deleted == 0
    }
}

/// Makes the stored children of `parent` match `desired`.
///
/// With `is_create` the stored set is known to be empty: nothing is read or
/// deleted and every child is inserted.
pub async fn reconcile<M, C>(
    conn: &C,
    parent: &ParentRef,
    desired: Vec<M>,
    is_create: bool,
) -> Result<ReconcileOutcome<M>, RepositoryError>
where
    M: ChildRecord + sea_orm::IntoActiveModel<<M as crate::record::Record>::ActiveModel>,
    M::Entity: EntityTrait<Model = M>,
    C: ConnectionTrait,
{
    if is_create && desired.is_empty() {
        return Ok(ReconcileOutcome::empty());
    }

    reject_duplicate_ids(&desired)?;

    let existing: HashMap<Pulid, M> = if is_create {
        HashMap::new()
    } else {
        M::Entity::find()
            .filter(scope_condition::<M>(parent))
            .all(conn)
            .await?
            .into_iter()
            .map(|child| (child.id().clone(), child))
            .collect()
    };

    let now = now_unix();
    let mut outcome = ReconcileOutcome::empty();
    let mut to_insert = Vec::new();
    let mut to_update = Vec::new();
    let mut kept = HashSet::new();

    for mut child in desired {
        child.set_tenant(&parent.org_id, &parent.bu_id);
        child.set_parent_id(&parent.id);

        if is_create || child.id().is_nil() {
            stamp_new(&mut child, &parent.org_id, &parent.bu_id, now);
            outcome.children.push(child.clone());
            to_insert.push(child);
            continue;
        }

        if let Some(stored) = existing.get(child.id()) {
            kept.insert(child.id().clone());
            if same_mutable_values(&child, stored) {
                outcome.unchanged += 1;
                outcome.children.push(stored.clone());
                continue;
            }
            child.set_version(stored.version() + 1);
            child.set_created_at(stored.created_at());
            child.set_updated_at(now);
            outcome.children.push(child.clone());
            to_update.push(child);
            continue;
        }

        match M::UNKNOWN_ID_POLICY {
            UnknownIdPolicy::Insert => {
                stamp_new(&mut child, &parent.org_id, &parent.bu_id, now);
                outcome.children.push(child.clone());
                to_insert.push(child);
            }
            UnknownIdPolicy::Reject => {
                return Err(RepositoryError::validation(
                    "id",
                    "invalid",
                    format!(
                        "{} {} does not belong to parent {}",
                        M::RESOURCE,
                        child.id(),
                        parent.id
                    ),
                ));
            }
        }
    }

    if !to_insert.is_empty() {
        insert_records(conn, &to_insert).await?;
        outcome.inserted = to_insert.len();
    }

    if !to_update.is_empty() {
        let affected = bulk_update(conn, parent, &to_update).await?;
        if affected != to_update.len() as u64 {
            metrics::counter!("tms_version_mismatch_total", "resource" => M::RESOURCE)
                .increment(1);
            tracing::debug!(
                resource = M::RESOURCE,
                parent_id = %parent.id,
                expected = to_update.len(),
                affected,
                "Child collection changed concurrently"
            );
            return Err(RepositoryError::version_mismatch(M::RESOURCE, &parent.id));
        }
        outcome.updated = to_update.len();
    }

    if !is_create {
        let orphans: Vec<Pulid> = existing
            .keys()
            .filter(|id| !kept.contains(*id))
            .cloned()
            .collect();
        if !orphans.is_empty() {
            let result = M::Entity::delete_many()
                .filter(scope_condition::<M>(parent))
                .filter(M::column(EnvelopeColumn::Id).is_in(orphans))
                .exec(conn)
                .await?;
            outcome.deleted = result.rows_affected;
        }
    }

    tracing::debug!(
        resource = M::RESOURCE,
        parent_id = %parent.id,
        inserted = outcome.inserted,
        updated = outcome.updated,
        unchanged = outcome.unchanged,
        deleted = outcome.deleted,
        "Reconciled child collection"
    );

    Ok(outcome)
}

/// Stored children of `parent`, ordered by id.
pub async fn load_children<M, C>(conn: &C, parent: &ParentRef) -> Result<Vec<M>, RepositoryError>
where
    M: ChildRecord,
    M::Entity: EntityTrait<Model = M>,
    C: ConnectionTrait,
{
    use sea_orm::QueryOrder;

    Ok(M::Entity::find()
        .filter(scope_condition::<M>(parent))
        .order_by_asc(M::column(EnvelopeColumn::Id))
        .all(conn)
        .await?)
}

fn scope_condition<M: ChildRecord>(parent: &ParentRef) -> Condition {
    Condition::all()
        .add(M::parent_column().eq(parent.id.clone()))
        .add(M::column(EnvelopeColumn::OrganizationId).eq(parent.org_id.clone()))
        .add(M::column(EnvelopeColumn::BusinessUnitId).eq(parent.bu_id.clone()))
}

fn reject_duplicate_ids<M: ChildRecord>(desired: &[M]) -> Result<(), RepositoryError> {
    let mut seen = HashSet::new();
    for child in desired {
        if !child.id().is_nil() && !seen.insert(child.id()) {
            return Err(RepositoryError::validation(
                "id",
                "duplicate",
                format!("{} {} appears more than once", M::RESOURCE, child.id()),
            ));
        }
    }
    Ok(())
}

fn same_mutable_values<M: ChildRecord>(desired: &M, stored: &M) -> bool {
    M::mutable_columns()
        .into_iter()
        .all(|column| desired.get(column) == stored.get(column))
}

async fn bulk_update<M, C>(
    conn: &C,
    parent: &ParentRef,
    rows: &[M],
) -> Result<u64, RepositoryError>
where
    M: ChildRecord,
    C: ConnectionTrait,
{
    let backend = conn.get_database_backend();
    let columns = M::mutable_columns();
    let per_row = columns.len() + 3;
    let chunk_size = (MAX_BIND_PARAMS / per_row).max(1);

    let mut affected = 0;
    for chunk in rows.chunks(chunk_size) {
        let statement = bulk_update_statement(backend, parent, chunk, &columns);
        affected += conn.execute(statement).await?.rows_affected();
    }
    Ok(affected)
}

/// `WITH _data (...) AS (VALUES ...) UPDATE ... FROM _data` joined on id,
/// previous version, parent and tenant.
pub(crate) fn bulk_update_statement<M: ChildRecord>(
    backend: DbBackend,
    parent: &ParentRef,
    rows: &[M],
    columns: &[ColumnOf<M>],
) -> Statement {
    let table = M::Entity::default().table_name().to_string();
    let mut values: Vec<Value> = Vec::with_capacity(rows.len() * (columns.len() + 3) + 3);
    let mut next = {
        let mut n = 0usize;
        move |cast: &str| {
            n += 1;
            match backend {
                DbBackend::Postgres => format!("CAST(${n} AS {cast})"),
                _ => "?".to_string(),
            }
        }
    };

    let mut names = vec!["\"id\"".to_string(), "\"version\"".to_string(), "\"updated_at\"".to_string()];
    names.extend(columns.iter().map(|col| format!("\"{}\"", col.as_str())));

    let mut tuples = Vec::with_capacity(rows.len());
    for row in rows {
        let mut slots = Vec::with_capacity(columns.len() + 3);
        slots.push(next("text"));
        values.push(row.id().clone().into());
        slots.push(next("bigint"));
        values.push(row.version().into());
        slots.push(next("bigint"));
        values.push(row.updated_at().into());
        for col in columns {
            slots.push(next(pg_cast_type(col)));
            values.push(row.get(*col));
        }
        tuples.push(format!("({})", slots.join(", ")));
    }

    let mut assignments = vec![
        "\"version\" = \"_data\".\"version\"".to_string(),
        "\"updated_at\" = \"_data\".\"updated_at\"".to_string(),
    ];
    assignments.extend(columns.iter().map(|col| {
        let name = col.as_str();
        format!("\"{name}\" = \"_data\".\"{name}\"")
    }));

    let parent_slot = next("text");
    values.push(parent.id.clone().into());
    let org_slot = next("text");
    values.push(parent.org_id.clone().into());
    let bu_slot = next("text");
    values.push(parent.bu_id.clone().into());

    let parent_column = M::parent_column();
    let sql = format!(
        "WITH \"_data\" ({names}) AS (VALUES {tuples}) \
         UPDATE \"{table}\" SET {assignments} FROM \"_data\" \
         WHERE \"{table}\".\"id\" = \"_data\".\"id\" \
         AND \"{table}\".\"version\" = \"_data\".\"version\" - 1 \
         AND \"{table}\".\"{parent}\" = {parent_slot} \
         AND \"{table}\".\"organization_id\" = {org_slot} \
         AND \"{table}\".\"business_unit_id\" = {bu_slot}",
        names = names.join(", "),
        tuples = tuples.join(", "),
        assignments = assignments.join(", "),
        parent = parent_column.as_str(),
    );

    Statement::from_sql_and_values(backend, sql, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::additional_charge::{ChargeMethod, Model as Charge};

    fn charge(parent: &ParentRef, amount: i64) -> Charge {
        Charge {
            id: Pulid::new("ac_"),
            organization_id: parent.org_id.clone(),
            business_unit_id: parent.bu_id.clone(),
            shipment_id: parent.id.clone(),
            accessorial_charge_id: Pulid::new("acc_"),
            method: ChargeMethod::Flat,
            unit: 1,
            amount_cents: amount,
            is_system_generated: false,
            version: 2,
            created_at: 1,
            updated_at: 2,
        }
    }

    fn parent() -> ParentRef {
        ParentRef::new(Pulid::new("shp_"), Pulid::new("org_"), Pulid::new("bu_"))
    }

    #[test]
    fn mutable_columns_exclude_envelope_and_parent() {
        let columns = <Charge as ChildRecord>::mutable_columns();
        let names: Vec<&str> = columns
            .iter()
            .map(|col| col.as_str())
            .collect();
        assert_eq!(
            names,
            [
                "accessorial_charge_id",
                "method",
                "unit",
                "amount_cents",
                "is_system_generated"
            ]
        );
    }

    #[test]
    fn postgres_bulk_update_casts_every_slot() {
        let parent = parent();
        let rows = [charge(&parent, 100), charge(&parent, 250)];
        let columns = <Charge as ChildRecord>::mutable_columns();
        let stmt = bulk_update_statement(DbBackend::Postgres, &parent, &rows, &columns);

        assert!(stmt.sql.starts_with(
            "WITH \"_data\" (\"id\", \"version\", \"updated_at\", \"accessorial_charge_id\""
        ));
        assert!(stmt.sql.contains("CAST($1 AS text), CAST($2 AS bigint), CAST($3 AS bigint)"));
        assert!(stmt.sql.contains("CAST($8 AS boolean)"));
        assert!(stmt.sql.contains("\"additional_charges\".\"version\" = \"_data\".\"version\" - 1"));
        assert!(stmt.sql.contains("\"additional_charges\".\"shipment_id\" = CAST($17 AS text)"));
        assert_eq!(stmt.values.map(|v| v.0.len()), Some(19));
    }

    #[test]
    fn sqlite_bulk_update_uses_plain_placeholders() {
        let parent = parent();
        let rows = [charge(&parent, 100)];
        let columns = <Charge as ChildRecord>::mutable_columns();
        let stmt = bulk_update_statement(DbBackend::Sqlite, &parent, &rows, &columns);
        assert!(stmt.sql.contains("(VALUES (?, ?, ?, ?, ?, ?, ?, ?))"));
        assert!(!stmt.sql.contains("CAST"));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let parent = parent();
        let a = charge(&parent, 1);
        let err = reject_duplicate_ids(&[a.clone(), a]).unwrap_err();
        assert_eq!(err.field(), Some("id"));
    }

    #[test]
    fn unchanged_children_compare_equal() {
        let parent = parent();
        let stored = charge(&parent, 100);
        let mut desired = stored.clone();
        desired.version = 1;
        assert!(same_mutable_values(&desired, &stored));
        desired.amount_cents = 101;
        assert!(!same_mutable_values(&desired, &stored));
    }
}
