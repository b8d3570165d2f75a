//! Declarative filter and sort metadata per entity.

use sea_orm::Value;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::RepositoryError;

/// Filter operators accepted from callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    StartsWith,
    EndsWith,
    Like,
    ILike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    DateRange,
    Overlaps,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Ne => "ne",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Contains => "contains",
            FilterOperator::StartsWith => "startswith",
            FilterOperator::EndsWith => "endswith",
            FilterOperator::Like => "like",
            FilterOperator::ILike => "ilike",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "notin",
            FilterOperator::IsNull => "isnull",
            FilterOperator::IsNotNull => "isnotnull",
            FilterOperator::DateRange => "daterange",
            FilterOperator::Overlaps => "overlaps",
        }
    }

    /// Operators that take no value.
    pub fn is_unary(&self) -> bool {
        matches!(self, FilterOperator::IsNull | FilterOperator::IsNotNull)
    }
}

/// Storage type of a filterable field, used to coerce caller values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Enum,
    Integer,
    Float,
    Boolean,
    /// Unix seconds
    Timestamp,
    /// JSON array of strings
    JsonArray,
}

/// One caller-visible field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub api_name: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
    pub ops: &'static [FilterOperator],
    pub sortable: bool,
}

/// Search behaviour for an entity.
#[derive(Debug, Clone, Copy)]
pub struct SearchConfig {
    /// Precomputed `tsvector` column; only used on Postgres.
    pub vector_column: Option<&'static str>,
    /// Columns matched with case-insensitive LIKE otherwise.
    pub columns: &'static [&'static str],
}

impl SearchConfig {
    pub const NONE: SearchConfig = SearchConfig {
        vector_column: None,
        columns: &[],
    };
}

/// Field metadata for one entity.
#[derive(Debug, Clone, Copy)]
pub struct FieldConfig {
    pub fields: &'static [FieldSpec],
    pub search: SearchConfig,
}

pub const TEXT_OPS: &[FilterOperator] = &[
    FilterOperator::Eq,
    FilterOperator::Ne,
    FilterOperator::Contains,
    FilterOperator::StartsWith,
    FilterOperator::EndsWith,
    FilterOperator::Like,
    FilterOperator::ILike,
    FilterOperator::In,
    FilterOperator::NotIn,
    FilterOperator::IsNull,
    FilterOperator::IsNotNull,
];

pub const ENUM_OPS: &[FilterOperator] = &[
    FilterOperator::Eq,
    FilterOperator::Ne,
    FilterOperator::In,
    FilterOperator::NotIn,
];

pub const NUMBER_OPS: &[FilterOperator] = &[
    FilterOperator::Eq,
    FilterOperator::Ne,
    FilterOperator::Gt,
    FilterOperator::Gte,
    FilterOperator::Lt,
    FilterOperator::Lte,
    FilterOperator::In,
    FilterOperator::NotIn,
    FilterOperator::IsNull,
    FilterOperator::IsNotNull,
];

pub const TIMESTAMP_OPS: &[FilterOperator] = &[
    FilterOperator::Eq,
    FilterOperator::Gt,
    FilterOperator::Gte,
    FilterOperator::Lt,
    FilterOperator::Lte,
    FilterOperator::DateRange,
    FilterOperator::IsNull,
    FilterOperator::IsNotNull,
];

pub const ID_OPS: &[FilterOperator] = &[
    FilterOperator::Eq,
    FilterOperator::Ne,
    FilterOperator::In,
    FilterOperator::NotIn,
    FilterOperator::IsNull,
    FilterOperator::IsNotNull,
];

pub const BOOL_OPS: &[FilterOperator] = &[FilterOperator::Eq, FilterOperator::Ne];

pub const ARRAY_OPS: &[FilterOperator] = &[
    FilterOperator::Overlaps,
    FilterOperator::IsNull,
    FilterOperator::IsNotNull,
];

impl FieldConfig {
    /// Resolves a caller field name, rejecting unknown fields.
    pub fn resolve(&self, api_name: &str) -> Result<&FieldSpec, RepositoryError> {
        self.fields
            .iter()
            .find(|spec| spec.api_name == api_name)
            .ok_or_else(|| RepositoryError::internal(format!("unknown field `{api_name}`")))
    }

    /// Resolves a field and checks `operator` is allowed on it.
    pub fn resolve_filter(
        &self,
        api_name: &str,
        operator: FilterOperator,
    ) -> Result<&FieldSpec, RepositoryError> {
        let spec = self.resolve(api_name)?;
        if !spec.ops.contains(&operator) {
            return Err(RepositoryError::internal(format!(
                "operator `{}` is not allowed on field `{api_name}`",
                operator.as_str()
            )));
        }
        Ok(spec)
    }

    pub fn resolve_sort(&self, api_name: &str) -> Result<&FieldSpec, RepositoryError> {
        let spec = self.resolve(api_name)?;
        if !spec.sortable {
            return Err(RepositoryError::internal(format!(
                "field `{api_name}` is not sortable"
            )));
        }
        Ok(spec)
    }
}

impl FieldSpec {
    /// Coerces one JSON value to the field's storage type.
    pub fn coerce(&self, value: &JsonValue) -> Result<Value, RepositoryError> {
        let invalid = || {
            RepositoryError::validation(
                self.api_name,
                "invalid",
                format!("Invalid value for {}", self.api_name),
            )
        };

        match self.kind {
            FieldKind::Text | FieldKind::Enum | FieldKind::JsonArray => match value {
                JsonValue::String(s) => Ok(Value::from(s.clone())),
                JsonValue::Number(n) => Ok(Value::from(n.to_string())),
                _ => Err(invalid()),
            },
            FieldKind::Integer | FieldKind::Timestamp => match value {
                JsonValue::Number(n) => n.as_i64().map(Value::from).ok_or_else(invalid),
                JsonValue::String(s) => s.trim().parse::<i64>().map(Value::from).map_err(|_| invalid()),
                _ => Err(invalid()),
            },
            FieldKind::Float => match value {
                JsonValue::Number(n) => n.as_f64().map(Value::from).ok_or_else(invalid),
                JsonValue::String(s) => s.trim().parse::<f64>().map(Value::from).map_err(|_| invalid()),
                _ => Err(invalid()),
            },
            FieldKind::Boolean => match value {
                JsonValue::Bool(b) => Ok(Value::from(*b)),
                JsonValue::String(s) => match s.to_ascii_lowercase().as_str() {
                    "true" | "1" => Ok(Value::from(true)),
                    "false" | "0" => Ok(Value::from(false)),
                    _ => Err(invalid()),
                },
                _ => Err(invalid()),
            },
        }
    }

    /// Coerces a JSON array (or a comma separated string) element by element.
    pub fn coerce_list(&self, value: &JsonValue) -> Result<Vec<Value>, RepositoryError> {
        match value {
            JsonValue::Array(items) => items.iter().map(|item| self.coerce(item)).collect(),
            JsonValue::String(s) => s
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| self.coerce(&JsonValue::String(part.to_string())))
                .collect(),
            other => Ok(vec![self.coerce(other)?]),
        }
    }

    /// Text of a string value, for LIKE patterns.
    pub fn text(&self, value: &JsonValue) -> Result<String, RepositoryError> {
        match value {
            JsonValue::String(s) => Ok(s.clone()),
            JsonValue::Number(n) => Ok(n.to_string()),
            _ => Err(RepositoryError::validation(
                self.api_name,
                "invalid",
                format!("Invalid value for {}", self.api_name),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    const FIELDS: FieldConfig = FieldConfig {
        fields: &[
            FieldSpec {
                api_name: "status",
                column: "status",
                kind: FieldKind::Enum,
                ops: ENUM_OPS,
                sortable: true,
            },
            FieldSpec {
                api_name: "pieces",
                column: "pieces",
                kind: FieldKind::Integer,
                ops: NUMBER_OPS,
                sortable: false,
            },
        ],
        search: SearchConfig::NONE,
    };

    #[test]
    fn unknown_fields_are_internal_errors() {
        let err = FIELDS.resolve("organization_id").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn disallowed_operator_is_rejected() {
        let err = FIELDS
            .resolve_filter("status", FilterOperator::Contains)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(FIELDS.resolve_filter("status", FilterOperator::In).is_ok());
    }

    #[test]
    fn unsortable_field_is_rejected() {
        assert!(FIELDS.resolve_sort("pieces").is_err());
        assert!(FIELDS.resolve_sort("status").is_ok());
    }

    #[test]
    fn coerces_values_by_kind() {
        let pieces = FIELDS.resolve("pieces").unwrap();
        assert_eq!(pieces.coerce(&json!(40)).unwrap(), Value::from(40i64));
        assert_eq!(pieces.coerce(&json!("12")).unwrap(), Value::from(12i64));

        let err = pieces.coerce(&json!("many")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.field(), Some("pieces"));

        let list = pieces.coerce_list(&json!("1, 2,3")).unwrap();
        assert_eq!(list.len(), 3);
    }
}
