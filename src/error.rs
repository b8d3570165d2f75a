//! # Error Handling
//!
//! Error taxonomy shared by every repository. Callers match on
//! [`RepositoryError::kind`], which sees through operation context tags, and
//! surface [`RepositoryError::user_message`] to end users.

use sea_orm::{DbErr, RuntimeErr};
use thiserror::Error;

use crate::telemetry;

/// Leaf classification of a repository failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    VersionMismatch,
    Validation,
    SerializationConflict,
    Infrastructure,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::VersionMismatch => "version_mismatch",
            ErrorKind::Validation => "validation",
            ErrorKind::SerializationConflict => "serialization_conflict",
            ErrorKind::Infrastructure => "infrastructure",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Errors returned by the persistence kernel.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// No row matched the tenant-scoped predicate
    #[error("{resource} not found: {message}")]
    NotFound {
        resource: &'static str,
        message: String,
    },

    /// Optimistic update lost a race, or a child collection changed underneath us
    #[error("version mismatch on {resource} {id}")]
    VersionMismatch { resource: &'static str, id: String },

    /// Business rule violated at persistence time
    #[error("validation failed on `{field}` ({code}): {message}")]
    Validation {
        field: String,
        code: &'static str,
        message: String,
    },

    /// Serializable transaction aborted after the retry budget was spent
    #[error("serialization conflict: {0}")]
    SerializationConflict(String),

    /// Connection loss, driver failure or cancellation
    #[error("database error: {0}")]
    Infrastructure(#[source] DbErr),

    /// Programmer error; never shown to end users verbatim
    #[error("internal error: {0}")]
    Internal(String),

    /// Context tag naming the repository operation that failed
    #[error("{operation}: {source}")]
    Operation {
        operation: &'static str,
        #[source]
        source: Box<RepositoryError>,
    },
}

impl RepositoryError {
    pub fn not_found(resource: &'static str, id: impl std::fmt::Display) -> Self {
        RepositoryError::NotFound {
            resource,
            message: format!("{resource} with ID {id} was not found"),
        }
    }

    pub fn version_mismatch(resource: &'static str, id: impl std::fmt::Display) -> Self {
        RepositoryError::VersionMismatch {
            resource,
            id: id.to_string(),
        }
    }

    pub fn validation(
        field: impl Into<String>,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        RepositoryError::Validation {
            field: field.into(),
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        RepositoryError::Internal(message.into())
    }

    /// Classifies a database error, reporting unique violations against `field`.
    pub fn from_db_with_field(error: DbErr, field: &str, message: &str) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, field, "Unique constraint violation detected");
            return RepositoryError::validation(field, "already_exists", message);
        }
        RepositoryError::from(error)
    }

    /// Leaf kind, looking through any operation tags.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepositoryError::NotFound { .. } => ErrorKind::NotFound,
            RepositoryError::VersionMismatch { .. } => ErrorKind::VersionMismatch,
            RepositoryError::Validation { .. } => ErrorKind::Validation,
            RepositoryError::SerializationConflict(_) => ErrorKind::SerializationConflict,
            RepositoryError::Infrastructure(_) => ErrorKind::Infrastructure,
            RepositoryError::Internal(_) => ErrorKind::Internal,
            RepositoryError::Operation { source, .. } => source.kind(),
        }
    }

    /// Innermost error, without operation tags.
    pub fn leaf(&self) -> &RepositoryError {
        match self {
            RepositoryError::Operation { source, .. } => source.leaf(),
            other => other,
        }
    }

    /// Field name carried by validation and version mismatch errors.
    pub fn field(&self) -> Option<&str> {
        match self.leaf() {
            RepositoryError::Validation { field, .. } => Some(field.as_str()),
            RepositoryError::VersionMismatch { .. } => Some("version"),
            _ => None,
        }
    }

    /// Message that is safe to return to an end user.
    pub fn user_message(&self) -> String {
        match self.leaf() {
            RepositoryError::NotFound { message, .. } => message.clone(),
            RepositoryError::VersionMismatch { resource, id } => format!(
                "Version mismatch. The {resource} ({id}) has either been updated or deleted since the last request."
            ),
            RepositoryError::Validation { message, .. } => message.clone(),
            RepositoryError::SerializationConflict(_) => {
                "The operation could not be completed because of concurrent activity. Please try again."
                    .to_string()
            }
            RepositoryError::Infrastructure(_) => "A database error occurred".to_string(),
            RepositoryError::Internal(_) | RepositoryError::Operation { .. } => {
                "An internal error occurred".to_string()
            }
        }
    }

    fn log(&self, operation: &'static str) {
        let trace_id = telemetry::current_trace_id().unwrap_or_default();
        match self.kind() {
            ErrorKind::Infrastructure | ErrorKind::Internal | ErrorKind::SerializationConflict => {
                tracing::error!(
                    operation,
                    kind = self.kind().as_str(),
                    trace_id = %trace_id,
                    error = %self,
                    "Repository operation failed"
                );
            }
            _ => {
                tracing::debug!(
                    operation,
                    kind = self.kind().as_str(),
                    trace_id = %trace_id,
                    error = %self,
                    "Repository operation rejected"
                );
            }
        }
    }
}

impl From<DbErr> for RepositoryError {
    fn from(error: DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return RepositoryError::validation("id", "already_exists", "Resource already exists");
        }

        if is_serialization_failure(&error) {
            return RepositoryError::SerializationConflict(error.to_string());
        }

        match error {
            DbErr::RecordNotFound(record) => RepositoryError::NotFound {
                resource: "record",
                message: format!("Record not found: {record}"),
            },
            other => RepositoryError::Infrastructure(other),
        }
    }
}

/// Attaches an operation tag to repository results and logs the failure once.
pub trait OperationExt<T> {
    fn with_op(self, operation: &'static str) -> Result<T, RepositoryError>;
}

impl<T, E> OperationExt<T> for Result<T, E>
where
    E: Into<RepositoryError>,
{
    fn with_op(self, operation: &'static str) -> Result<T, RepositoryError> {
        self.map_err(|err| {
            let err = err.into();
            // Only the innermost tag logs; outer layers just add context.
            if !matches!(err, RepositoryError::Operation { .. }) {
                err.log(operation);
            }
            RepositoryError::Operation {
                operation,
                source: Box::new(err),
            }
        })
    }
}

fn sqlx_database_code(error: &DbErr) -> Option<String> {
    let runtime_err = match error {
        DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return None,
    };

    runtime_err
        .as_database_error()
        .and_then(|db_error| db_error.code().map(|code| code.to_string()))
}

pub(crate) fn is_unique_violation(error: &DbErr) -> bool {
    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    db_error.code().is_some_and(|code| {
        let code_str = code.as_ref();
        code_str == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code_str)
    })
}

/// Postgres serialization failure or deadlock, or SQLite busy/locked.
pub(crate) fn is_serialization_failure(error: &DbErr) -> bool {
    const RETRYABLE_CODES: &[&str] = &["40001", "40P01", "5", "6", "517"];

    sqlx_database_code(error).is_some_and(|code| RETRYABLE_CODES.contains(&code.as_str()))
}

/// Errors that mean the connection itself failed rather than the statement.
pub(crate) fn is_transport_error(error: &DbErr) -> bool {
    use sea_orm::sqlx::Error as SqlxError;

    match error {
        DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => true,
        DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => matches!(
            sqlx_err,
            SqlxError::Io(_)
                | SqlxError::Tls(_)
                | SqlxError::PoolTimedOut
                | SqlxError::PoolClosed
                | SqlxError::WorkerCrashed
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_survives_operation_tags() {
        let err: Result<(), RepositoryError> =
            Err(RepositoryError::version_mismatch("Shipment", "shp_01"));
        let tagged = err.with_op("shipment.update").with_op("service.update");

        let err = tagged.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::VersionMismatch);
        assert_eq!(err.field(), Some("version"));
        assert!(err.to_string().starts_with("service.update: shipment.update:"));
        assert!(err.user_message().contains("Shipment (shp_01)"));
    }

    #[test]
    fn nested_operation_tags_log_once() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        use tracing_subscriber::layer::{Context, SubscriberExt};
        use tracing_subscriber::Layer;

        struct CountEvents(Arc<AtomicUsize>);

        impl<S: tracing::Subscriber> Layer<S> for CountEvents {
            fn on_event(&self, _event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let events = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(CountEvents(events.clone()));

        let err = tracing::subscriber::with_default(subscriber, || {
            let err: Result<(), RepositoryError> =
                Err(RepositoryError::internal("unknown sort field `password`"));
            err.with_op("customer.list")
                .with_op("customer_service.list")
                .with_op("api.customers")
                .unwrap_err()
        });

        assert_eq!(events.load(Ordering::SeqCst), 1);
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn record_not_found_maps_to_not_found() {
        let err = RepositoryError::from(DbErr::RecordNotFound("shipments".to_string()));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn connection_errors_are_infrastructure() {
        let err = RepositoryError::from(DbErr::Conn(RuntimeErr::Internal("reset".to_string())));
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        assert_eq!(err.user_message(), "A database error occurred");
        assert!(is_transport_error(&DbErr::Conn(RuntimeErr::Internal(
            "reset".to_string()
        ))));
    }

    #[test]
    fn internal_errors_hide_details_from_users() {
        let err = RepositoryError::internal("unknown filter field `secret_column`");
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(!err.user_message().contains("secret_column"));
    }

    #[test]
    fn validation_carries_field_and_code() {
        let err = RepositoryError::validation("code", "already_exists", "Code already in use");
        match err {
            RepositoryError::Validation { ref field, code, .. } => {
                assert_eq!(field, "code");
                assert_eq!(code, "already_exists");
            }
            _ => panic!("expected validation error"),
        }
        assert_eq!(err.user_message(), "Code already in use");
    }
}
