//! # TMS Persistence Library
//!
//! Multi-tenant persistence kernel for the transportation-management
//! platform: read/write connection selection, tenant-scoped list queries,
//! optimistic-concurrency updates, child collection reconciliation, the
//! sequence generator and the per-entity repositories built on them.

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod models;
pub mod optimistic;
pub mod pulid;
pub mod query;
pub mod reconcile;
pub mod record;
pub mod repositories;
pub mod sequence;
pub mod telemetry;
pub use migration;

pub use error::{ErrorKind, OperationExt, RepositoryError};
pub use pulid::Pulid;
pub use query::{ListRequest, ListResult, TenantInfo};
