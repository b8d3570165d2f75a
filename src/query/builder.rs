use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::sea_query::{Alias, Expr, IntoCondition, LikeExpr, SimpleExpr};
use sea_orm::{
    Condition, ConnectionTrait, DbBackend, DbErr, EntityName, EntityTrait, FromQueryResult, Order,
    PaginatorTrait, QueryFilter, QueryOrder, QueryResult, QuerySelect, Select, Value,
};
use serde_json::Value as JsonValue;

use super::fields::{FieldConfig, FieldKind, FieldSpec, FilterOperator};
use super::{FieldFilter, ListRequest, ListResult, Pagination, SortDirection, SortField, TenantInfo};
use crate::error::RepositoryError;

const TOTAL_ALIAS: &str = "__total";
const MAX_SEARCH_TERMS: usize = 10;
const SECONDS_PER_DAY: i64 = 86_400;

/// A row plus the window count of all matching rows.
#[derive(Debug, Clone)]
pub struct Counted<M> {
    pub model: M,
    pub total: i64,
}

impl<M: FromQueryResult> FromQueryResult for Counted<M> {
    fn from_query_result(res: &QueryResult, pre: &str) -> Result<Self, DbErr> {
        Ok(Self {
            model: M::from_query_result(res, pre)?,
            total: res.try_get(pre, TOTAL_ALIAS)?,
        })
    }
}

/// Fluent builder over a `Select<E>`.
///
/// Predicates are accumulated into one [`Condition`] so the same filter can
/// drive both the page query and a fallback count.
#[derive(Debug, Clone)]
pub struct QueryBuilder<E: EntityTrait> {
    select: Select<E>,
    config: &'static FieldConfig,
    backend: DbBackend,
    table: String,
    condition: Condition,
    rank: Option<SimpleExpr>,
    orders: Vec<(SimpleExpr, Order)>,
    tenant_applied: bool,
}

impl<E: EntityTrait> QueryBuilder<E> {
    pub fn new(select: Select<E>, config: &'static FieldConfig, backend: DbBackend) -> Self {
        Self {
            select,
            config,
            backend,
            table: E::default().table_name().to_string(),
            condition: Condition::all(),
            rank: None,
            orders: Vec::new(),
            tenant_applied: false,
        }
    }

    /// Applies tenant, filters, search and sort from a list request.
    pub fn from_request(
        select: Select<E>,
        config: &'static FieldConfig,
        backend: DbBackend,
        req: &ListRequest,
    ) -> Result<Self, RepositoryError> {
        Self::new(select, config, backend)
            .apply_tenant_filters(&req.tenant)
            .apply_filters(&req.filters)?
            .apply_text_search(req.query.as_deref())
            .apply_sort(&req.sort)
    }

    fn column(&self, column: &str) -> Expr {
        Expr::col((Alias::new(self.table.as_str()), Alias::new(column)))
    }

    fn quoted(&self, column: &str) -> String {
        format!("\"{}\".\"{}\"", self.table, column)
    }

    /// Placeholder for the `n`th (1-based) value of a custom expression.
    fn placeholder(&self, n: usize) -> String {
        match self.backend {
            DbBackend::Postgres => format!("${n}"),
            _ => "?".to_string(),
        }
    }

    pub fn apply_tenant_filters(mut self, tenant: &TenantInfo) -> Self {
        let org_column = self.column("organization_id");
        let bu_column = self.column("business_unit_id");
        self.condition = self
            .condition
            .add(org_column.eq(tenant.org_id.as_str()))
            .add(bu_column.eq(tenant.bu_id.as_str()));
        self.tenant_applied = true;
        self
    }

    /// Adds an extra predicate that is not driven by caller field names.
    pub fn and_where(mut self, predicate: impl IntoCondition) -> Self {
        self.condition = self.condition.add(predicate.into_condition());
        self
    }

    pub fn apply_filters(mut self, filters: &[FieldFilter]) -> Result<Self, RepositoryError> {
        for filter in filters {
            let spec = self.config.resolve_filter(&filter.field, filter.operator)?;
            if let Some(expr) = self.filter_expr(spec, filter.operator, &filter.value)? {
                self.condition = self.condition.add(expr);
            }
        }
        Ok(self)
    }

    fn filter_expr(
        &self,
        spec: &FieldSpec,
        operator: FilterOperator,
        value: &JsonValue,
    ) -> Result<Option<SimpleExpr>, RepositoryError> {
        let col = || self.column(spec.column);

        let expr = match operator {
            FilterOperator::Eq => col().eq(spec.coerce(value)?),
            FilterOperator::Ne => {
                if spec.kind == FieldKind::Enum && is_blank(value) {
                    return Ok(None);
                }
                col().ne(spec.coerce(value)?)
            }
            FilterOperator::Gt => col().gt(spec.coerce(value)?),
            FilterOperator::Gte => col().gte(spec.coerce(value)?),
            FilterOperator::Lt => col().lt(spec.coerce(value)?),
            FilterOperator::Lte => col().lte(spec.coerce(value)?),
            FilterOperator::Contains => {
                let pattern = format!("%{}%", escape_like(&spec.text(value)?));
                self.case_insensitive_like(col(), pattern)
            }
            FilterOperator::StartsWith => {
                let pattern = format!("{}%", escape_like(&spec.text(value)?));
                self.case_insensitive_like(col(), pattern)
            }
            FilterOperator::EndsWith => {
                let pattern = format!("%{}", escape_like(&spec.text(value)?));
                self.case_insensitive_like(col(), pattern)
            }
            FilterOperator::Like => col().like(spec.text(value)?.as_str()),
            FilterOperator::ILike => match self.backend {
                DbBackend::Postgres => col().ilike(spec.text(value)?.as_str()),
                _ => col().like(spec.text(value)?.as_str()),
            },
            FilterOperator::In => {
                let values = spec.coerce_list(value)?;
                if values.is_empty() {
                    Expr::cust("1 = 0")
                } else {
                    col().is_in(values)
                }
            }
            FilterOperator::NotIn => {
                let values = spec.coerce_list(value)?;
                if values.is_empty() {
                    return Ok(None);
                }
                col().is_not_in(values)
            }
            FilterOperator::IsNull => col().is_null(),
            FilterOperator::IsNotNull => col().is_not_null(),
            FilterOperator::DateRange => {
                let (start, end) = date_range(spec, value)?;
                col()
                    .gte(start)
                    .and(self.column(spec.column).lte(end_of_day(end)))
            }
            FilterOperator::Overlaps => {
                let values = spec.coerce_list(value)?;
                if values.is_empty() {
                    Expr::cust("1 = 0")
                } else {
                    self.overlaps(spec.column, values)
                }
            }
        };

        Ok(Some(expr))
    }

    fn case_insensitive_like(&self, col: Expr, pattern: String) -> SimpleExpr {
        let like = LikeExpr::new(pattern).escape('\\');
        match self.backend {
            DbBackend::Postgres => col.ilike(like),
            // LIKE is already case-insensitive for ASCII on SQLite
            _ => col.like(like),
        }
    }

    fn overlaps(&self, column: &str, values: Vec<Value>) -> SimpleExpr {
        let placeholders = (1..=values.len())
            .map(|n| self.placeholder(n))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = match self.backend {
            DbBackend::Postgres => format!(
                "EXISTS (SELECT 1 FROM jsonb_array_elements_text({}) AS \"elem\"(\"value\") WHERE \"elem\".\"value\" IN ({placeholders}))",
                self.quoted(column)
            ),
            _ => format!(
                "EXISTS (SELECT 1 FROM json_each({}) WHERE json_each.value IN ({placeholders}))",
                self.quoted(column)
            ),
        };
        Expr::cust_with_values(sql, values)
    }

    /// Full-text search on Postgres when the entity has a vector column,
    /// otherwise OR-ed case-insensitive LIKE over the configured columns.
    pub fn apply_text_search(mut self, query: Option<&str>) -> Self {
        let Some(query) = query.map(str::trim).filter(|q| !q.is_empty()) else {
            return self;
        };
        let search = self.config.search;

        if let (Some(vector), DbBackend::Postgres) = (search.vector_column, self.backend)
            && let Some(ts_query) = to_ts_query(query)
        {
            let vector = self.quoted(vector);
            let p = self.placeholder(1);
            self.condition = self.condition.add(Expr::cust_with_values(
                format!("{vector} @@ to_tsquery('simple', {p})"),
                [ts_query.clone()],
            ));
            self.rank = Some(Expr::cust_with_values(
                format!("ts_rank({vector}, to_tsquery('simple', {p}))"),
                [ts_query],
            ));
            return self;
        }

        if search.columns.is_empty() {
            return self;
        }

        let pattern = format!("%{}%", escape_like(query));
        let mut any = Condition::any();
        for column in search.columns {
            any = any.add(self.case_insensitive_like(self.column(column), pattern.clone()));
        }
        self.condition = self.condition.add(any);
        self
    }

    pub fn apply_sort(mut self, sort: &[SortField]) -> Result<Self, RepositoryError> {
        for field in sort {
            let spec = self.config.resolve_sort(&field.field)?;
            let order = match field.direction {
                SortDirection::Asc => Order::Asc,
                SortDirection::Desc => Order::Desc,
            };
            self.orders.push((self.column(spec.column).into(), order));
        }
        Ok(self)
    }

    /// Orders by a physical column without going through the field config.
    pub fn order_by_column(mut self, column: &str, order: Order) -> Self {
        self.orders.push((self.column(column).into(), order));
        self
    }

    /// Closes the builder into a bounded, deterministically ordered query.
    pub fn finish(self, pagination: Pagination) -> PagedSelect<E> {
        if !self.tenant_applied {
            tracing::warn!(table = %self.table, "Query built without tenant filters");
        }

        let filtered = self.select.filter(self.condition);
        let mut ordered = filtered.clone();
        if let Some(rank) = self.rank {
            ordered = ordered.order_by(rank, Order::Desc);
        }
        for (expr, order) in self.orders {
            ordered = ordered.order_by(expr, order);
        }
        let tie_break: SimpleExpr =
            Expr::col((Alias::new(self.table.as_str()), Alias::new("id"))).into();
        ordered = ordered.order_by(tie_break, Order::Asc);

        PagedSelect {
            select: ordered,
            counter: filtered,
            limit: pagination.effective_limit(),
            offset: pagination.offset,
        }
    }
}

/// A filtered, ordered query with its page bounds.
#[derive(Debug, Clone)]
pub struct PagedSelect<E: EntityTrait> {
    select: Select<E>,
    counter: Select<E>,
    limit: u64,
    offset: u64,
}

impl<E> PagedSelect<E>
where
    E: EntityTrait,
    E::Model: FromQueryResult + Send + Sync,
{
    /// The page query without the window count.
    pub fn into_select(self) -> Select<E> {
        self.select.limit(self.limit).offset(self.offset)
    }

    /// First matching row.
    pub async fn scan<C: ConnectionTrait>(self, conn: &C) -> Result<Option<E::Model>, DbErr> {
        self.select.one(conn).await
    }

    /// Page rows and total count from one statement. An empty page past the
    /// end falls back to a count query.
    pub async fn scan_and_count<C: ConnectionTrait>(
        self,
        conn: &C,
    ) -> Result<ListResult<E::Model>, DbErr> {
        let rows = self
            .select
            .expr_as(Expr::cust("COUNT(*) OVER ()"), TOTAL_ALIAS)
            .limit(self.limit)
            .offset(self.offset)
            .into_model::<Counted<E::Model>>()
            .all(conn)
            .await?;

        let total = match rows.first() {
            Some(first) => u64::try_from(first.total).unwrap_or_default(),
            None if self.offset > 0 => self.counter.count(conn).await?,
            None => 0,
        };

        Ok(ListResult {
            items: rows.into_iter().map(|row| row.model).collect(),
            total,
        })
    }
}

fn is_blank(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn date_range(spec: &FieldSpec, value: &JsonValue) -> Result<(i64, i64), RepositoryError> {
    let invalid = || {
        RepositoryError::validation(
            spec.api_name,
            "invalid",
            format!("Invalid date range for {}", spec.api_name),
        )
    };
    let start = value.get("start").and_then(JsonValue::as_i64).ok_or_else(invalid)?;
    let end = value.get("end").and_then(JsonValue::as_i64).ok_or_else(invalid)?;
    if end < start {
        return Err(invalid());
    }
    Ok((start, end))
}

/// Last second of the UTC day containing `ts`.
fn end_of_day(ts: i64) -> i64 {
    ts - ts.rem_euclid(SECONDS_PER_DAY) + SECONDS_PER_DAY - 1
}

/// Prefix-matching OR query for `to_tsquery`, or `None` when nothing
/// searchable remains after sanitising.
pub(crate) fn to_ts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|term| term.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|term| !term.is_empty())
        .take(MAX_SEARCH_TERMS)
        .map(|term| format!("{term}:*"))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" | "))
    }
}
