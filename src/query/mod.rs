//! # Tenant-scoped query composition
//!
//! Every list query goes through [`QueryBuilder`]: tenant predicates first,
//! then typed field filters, full-text or LIKE search, sort, and a bounded
//! page. Field names from callers are resolved through a per-entity
//! [`FieldConfig`] and never reach SQL as text.

mod builder;
mod fields;

use serde::{Deserialize, Serialize};

use crate::pulid::Pulid;

pub use builder::{Counted, PagedSelect, QueryBuilder};
pub use fields::{
    ARRAY_OPS, BOOL_OPS, ENUM_OPS, FieldConfig, FieldKind, FieldSpec, FilterOperator, ID_OPS,
    NUMBER_OPS, SearchConfig, TEXT_OPS, TIMESTAMP_OPS,
};

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

/// Tenant coordinates carried by every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantInfo {
    pub org_id: Pulid,
    pub bu_id: Pulid,
    pub user_id: Option<Pulid>,
}

impl TenantInfo {
    pub fn new(org_id: Pulid, bu_id: Pulid) -> Self {
        Self {
            org_id,
            bu_id,
            user_id: None,
        }
    }

    pub fn with_user(mut self, user_id: Pulid) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

/// One `{field, operator, value}` filter from the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl FieldFilter {
    pub fn new(
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortField {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Offset pagination. A zero limit means the default page size; larger
/// limits are clamped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

impl Pagination {
    pub fn new(limit: u64, offset: u64) -> Self {
        Self { limit, offset }
    }

    pub fn effective_limit(&self) -> u64 {
        match self.limit {
            0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        }
    }
}

/// Generic list request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRequest {
    pub tenant: TenantInfo,
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub filters: Vec<FieldFilter>,
    #[serde(default)]
    pub sort: Vec<SortField>,
}

impl ListRequest {
    pub fn new(tenant: TenantInfo) -> Self {
        Self {
            tenant,
            pagination: Pagination::default(),
            query: None,
            filters: Vec::new(),
            sort: Vec::new(),
        }
    }

    pub fn page(mut self, limit: u64, offset: u64) -> Self {
        self.pagination = Pagination::new(limit, offset);
        self
    }

    pub fn search(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn filter(mut self, filter: FieldFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn sort_by(mut self, sort: SortField) -> Self {
        self.sort.push(sort);
        self
    }
}

/// A page of rows plus the number of rows matching before pagination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResult<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> ListResult<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> ListResult<U> {
        ListResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_defaults_and_clamps() {
        assert_eq!(Pagination::new(0, 0).effective_limit(), DEFAULT_PAGE_SIZE);
        assert_eq!(Pagination::new(7, 0).effective_limit(), 7);
        assert_eq!(Pagination::new(5_000, 0).effective_limit(), MAX_PAGE_SIZE);
    }

    #[test]
    fn filters_deserialize_from_wire_names() {
        let filter: FieldFilter = serde_json::from_str(
            r#"{"field":"status","operator":"in","value":["New","Assigned"]}"#,
        )
        .unwrap();
        assert_eq!(filter.operator, FilterOperator::In);

        let sort: SortField = serde_json::from_str(r#"{"field":"proNumber"}"#).unwrap();
        assert_eq!(sort.direction, SortDirection::Asc);
    }
}
