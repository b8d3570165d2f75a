//! Database pools and the read/write connection selector.
//!
//! [`DbConnections`] owns the primary pool and any number of read replica
//! pools. Writes always go to the primary. Reads rotate over the healthy
//! replicas and fall back to the primary when none is available.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use sea_orm::{
    AccessMode, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    DatabaseTransaction, DbBackend, DbErr, IsolationLevel, Statement, TransactionTrait,
};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, ReplicaConfig};
use crate::error::is_transport_error;

/// Errors that can occur while building pools.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database {name}: {source}")]
    ConnectionFailed {
        name: String,
        #[source]
        source: DbErr,
    },
    #[error("Invalid database configuration: {message}")]
    InvalidConfiguration { message: String },
}

/// Whether an operation only reads or also writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Read,
    Write,
}

const READ_PREFIXES: &[&str] = &[
    "Get", "List", "Find", "Search", "Query", "Select", "Count", "Exists", "Has", "Is", "Check",
    "Fetch",
];

/// Classifies an operation by its method name.
///
/// Both `GetByID` and `get_by_id` style names are recognised; matching is on
/// the leading word only, so `Listen` is not a read but `ListAll` is.
pub fn infer_operation_type(method_name: &str) -> OperationType {
    let is_read = READ_PREFIXES.iter().any(|prefix| {
        let Some(rest) = strip_prefix_ignore_case(method_name, prefix) else {
            return false;
        };
        rest.is_empty() || rest.starts_with('_') || rest.starts_with(|c: char| c.is_uppercase())
    });

    if is_read {
        OperationType::Read
    } else {
        OperationType::Write
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    if value.len() < prefix.len() || !value.is_char_boundary(prefix.len()) {
        return None;
    }
    let (head, rest) = value.split_at(prefix.len());
    head.eq_ignore_ascii_case(prefix).then_some(rest)
}

struct Replica {
    name: String,
    conn: DatabaseConnection,
    healthy: AtomicBool,
}

/// A connection chosen by the selector.
pub enum Handle<'a> {
    Primary(&'a DatabaseConnection),
    Replica {
        name: &'a str,
        conn: &'a DatabaseConnection,
        healthy: &'a AtomicBool,
    },
}

impl Handle<'_> {
    pub fn connection(&self) -> &DatabaseConnection {
        match self {
            Handle::Primary(conn) => conn,
            Handle::Replica { conn, .. } => conn,
        }
    }

    pub fn is_replica(&self) -> bool {
        matches!(self, Handle::Replica { .. })
    }

    pub fn name(&self) -> &str {
        match self {
            Handle::Primary(_) => "primary",
            Handle::Replica { name, .. } => name,
        }
    }

    fn mark_unhealthy(&self) {
        if let Handle::Replica { healthy, .. } = self {
            healthy.store(false, Ordering::Release);
        }
    }
}

/// Primary plus replica pools shared by every repository.
pub struct DbConnections {
    primary: DatabaseConnection,
    replicas: Vec<Replica>,
    cursor: AtomicUsize,
}

impl std::fmt::Debug for DbConnections {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConnections")
            .field(
                "replicas",
                &self.replicas.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            )
            .field("healthy_replicas", &self.healthy_replica_count())
            .finish()
    }
}

impl DbConnections {
    /// Connects the primary and every configured replica.
    pub async fn connect(cfg: &AppConfig) -> Result<Self> {
        let primary = init_pool(
            "primary",
            &cfg.database_url,
            cfg.db_max_connections,
            cfg,
        )
        .await?;

        let mut replicas = Vec::with_capacity(cfg.replicas.len());
        for ReplicaConfig { name, url } in &cfg.replicas {
            let conn = init_pool(name, url, cfg.db_replica_max_connections, cfg).await?;
            replicas.push((name.clone(), conn));
        }

        Ok(Self::from_parts(primary, replicas))
    }

    /// Builds a selector over pools the caller already owns.
    pub fn from_parts(
        primary: DatabaseConnection,
        replicas: Vec<(String, DatabaseConnection)>,
    ) -> Self {
        Self {
            primary,
            replicas: replicas
                .into_iter()
                .map(|(name, conn)| Replica {
                    name,
                    conn,
                    healthy: AtomicBool::new(true),
                })
                .collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Primary pool handle.
    pub fn write(&self) -> &DatabaseConnection {
        &self.primary
    }

    /// Alias of [`write`](Self::write) for operations mixing reads and writes.
    pub fn db(&self) -> &DatabaseConnection {
        &self.primary
    }

    /// SQL dialect of the pools; replicas always share the primary's.
    pub fn backend(&self) -> DbBackend {
        self.primary.get_database_backend()
    }

    /// Next healthy replica in round-robin order, or the primary.
    pub fn read(&self) -> Handle<'_> {
        let count = self.replicas.len();
        if count == 0 {
            return Handle::Primary(&self.primary);
        }

        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        for offset in 0..count {
            let replica = &self.replicas[(start + offset) % count];
            if replica.healthy.load(Ordering::Acquire) {
                return Handle::Replica {
                    name: &replica.name,
                    conn: &replica.conn,
                    healthy: &replica.healthy,
                };
            }
        }

        tracing::debug!("No healthy replicas, reading from primary");
        Handle::Primary(&self.primary)
    }

    /// Handle for `method_name`, classified by [`infer_operation_type`].
    pub fn for_operation(&self, method_name: &str) -> Handle<'_> {
        match infer_operation_type(method_name) {
            OperationType::Read => self.read(),
            OperationType::Write => Handle::Primary(&self.primary),
        }
    }

    /// Runs a read on the selected handle. A transport failure on a replica
    /// marks it unhealthy and the same read is re-run once on the primary.
    pub async fn with_read<T, F, Fut>(&self, op: F) -> Result<T, DbErr>
    where
        F: Fn(DatabaseConnection) -> Fut,
        Fut: Future<Output = Result<T, DbErr>>,
    {
        let handle = self.read();
        match op(handle.connection().clone()).await {
            Err(err) if handle.is_replica() && is_transport_error(&err) => {
                handle.mark_unhealthy();
                metrics::counter!("tms_replica_fallback_total", "replica" => handle.name().to_string())
                    .increment(1);
                tracing::warn!(
                    replica = handle.name(),
                    error = %err,
                    "Replica read failed, marking unhealthy and retrying on primary"
                );
                op(self.primary.clone()).await
            }
            other => other,
        }
    }

    /// Read-committed transaction on the primary.
    pub async fn begin_write(&self) -> Result<DatabaseTransaction, DbErr> {
        self.primary.begin().await
    }

    pub async fn begin_serializable(&self) -> Result<DatabaseTransaction, DbErr> {
        self.primary
            .begin_with_config(Some(IsolationLevel::Serializable), None)
            .await
    }

    /// Transaction on the pool chosen for `method_name`; reads get a
    /// read-only transaction.
    pub async fn begin_for(&self, method_name: &str) -> Result<DatabaseTransaction, DbErr> {
        match infer_operation_type(method_name) {
            OperationType::Read => {
                let handle = self.read();
                let access = if handle.connection().get_database_backend() == DbBackend::Postgres
                {
                    Some(AccessMode::ReadOnly)
                } else {
                    None
                };
                handle.connection().begin_with_config(None, access).await
            }
            OperationType::Write => self.primary.begin().await,
        }
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    pub fn healthy_replica_count(&self) -> usize {
        self.replicas
            .iter()
            .filter(|r| r.healthy.load(Ordering::Acquire))
            .count()
    }

    /// Pings every replica and records the result.
    pub async fn check_replicas(&self) {
        for replica in &self.replicas {
            let was_healthy = replica.healthy.load(Ordering::Acquire);
            let healthy = health_check(&replica.conn).await.is_ok();
            replica.healthy.store(healthy, Ordering::Release);

            if healthy && !was_healthy {
                tracing::info!(replica = %replica.name, "Replica recovered");
            } else if !healthy && was_healthy {
                tracing::warn!(replica = %replica.name, "Replica failed health check");
            }
        }
    }

    /// Runs [`check_replicas`](Self::check_replicas) every `interval` until
    /// `shutdown` is cancelled.
    pub fn spawn_health_monitor(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => self.check_replicas().await,
                }
            }
            tracing::debug!("Replica health monitor stopped");
        })
    }
}

/// Connects one pool, retrying with exponential backoff.
pub async fn init_pool(
    name: &str,
    url: &str,
    max_connections: u32,
    cfg: &AppConfig,
) -> Result<DatabaseConnection> {
    if url.is_empty() {
        return Err(DatabaseError::InvalidConfiguration {
            message: format!("Database URL for {name} cannot be empty"),
        }
        .into());
    }

    let mut opt = ConnectOptions::new(url);
    opt.max_connections(max_connections)
        .acquire_timeout(cfg.acquire_timeout())
        .idle_timeout(Duration::from_secs(cfg.db_idle_timeout_secs))
        .max_lifetime(Duration::from_secs(cfg.db_max_lifetime_secs))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let max_retries = 5;
    let mut retry_delay = Duration::from_millis(100);

    for attempt in 1..=max_retries {
        match Database::connect(opt.clone()).await {
            Ok(conn) => {
                log::info!("Connected to database {} (attempt {})", name, attempt);
                return Ok(conn);
            }
            Err(e) if attempt == max_retries => {
                log::error!(
                    "Failed to connect to database {} after {} attempts: {}",
                    name,
                    max_retries,
                    e
                );
                return Err(DatabaseError::ConnectionFailed {
                    name: name.to_string(),
                    source: e,
                }
                .into());
            }
            Err(e) => {
                log::warn!(
                    "Database {} connection attempt {} failed: {}, retrying in {:?}",
                    name,
                    attempt,
                    e,
                    retry_delay
                );
                sleep(retry_delay).await;
                retry_delay *= 2;
            }
        }
    }

    Err(DatabaseError::InvalidConfiguration {
        message: format!("no connection attempts made for {name}"),
    }
    .into())
}

/// Verifies a pool can still run a trivial query.
pub async fn health_check(db: &DatabaseConnection) -> Result<()> {
    let stmt = Statement::from_string(db.get_database_backend(), "SELECT 1".to_string());
    db.query_one(stmt)
        .await
        .context("Database health check failed")?;
    Ok(())
}
