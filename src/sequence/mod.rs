//! # Sequence Generator
//!
//! Per-tenant counters partitioned by type, year and month. Values are
//! allocated in a serializable transaction and rendered through the
//! tenant's [`SequenceFormat`]. A conflicting allocation is retried with
//! exponential backoff; the caller only sees a failure once the attempt
//! budget is spent.

mod format;
mod provider;
mod store;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::SequenceConfig;
use crate::db::DbConnections;
use crate::error::{OperationExt, RepositoryError};
use crate::pulid::Pulid;

pub use format::{SequenceFormat, luhn_check_digit, luhn_valid};
pub use provider::{CachedFormatProvider, DefaultFormats, FormatProvider};
pub use store::Period;

use store::AttemptError;

/// Upper bound on values reserved by one call.
pub const MAX_BATCH: u32 = 10_000;

/// Kind of identifier a counter produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceType {
    ProNumber,
    Consolidation,
    Invoice,
    WorkOrder,
}

impl SequenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SequenceType::ProNumber => "pro_number",
            SequenceType::Consolidation => "consolidation",
            SequenceType::Invoice => "invoice",
            SequenceType::WorkOrder => "work_order",
        }
    }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A batch generation request.
#[derive(Debug, Clone)]
pub struct SequenceRequest {
    pub sequence_type: SequenceType,
    pub org_id: Pulid,
    pub bu_id: Pulid,
    pub count: u32,
    /// Clock used for the partition and the date parts; defaults to now.
    pub at: Option<DateTime<Utc>>,
}

impl SequenceRequest {
    pub fn new(sequence_type: SequenceType, org_id: Pulid, bu_id: Pulid) -> Self {
        Self {
            sequence_type,
            org_id,
            bu_id,
            count: 1,
            at: None,
        }
    }

    pub fn count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = Some(at);
        self
    }
}

/// Hands out formatted identifiers.
#[derive(Clone)]
pub struct SequenceGenerator {
    db: Arc<DbConnections>,
    formats: Arc<dyn FormatProvider>,
    config: SequenceConfig,
}

impl SequenceGenerator {
    pub fn new(
        db: Arc<DbConnections>,
        formats: Arc<dyn FormatProvider>,
        config: SequenceConfig,
    ) -> Self {
        Self {
            db,
            formats,
            config,
        }
    }

    /// Generator with the built-in formats behind the configured cache.
    pub fn with_default_formats(db: Arc<DbConnections>, config: SequenceConfig) -> Self {
        let formats = CachedFormatProvider::new(
            DefaultFormats::new(),
            config.format_cache_capacity,
            Duration::from_secs(config.format_cache_ttl_secs),
        );
        Self::new(db, Arc::new(formats), config)
    }

    /// Allocates `request.count` consecutive values and renders each.
    pub async fn generate(&self, request: SequenceRequest) -> Result<Vec<String>, RepositoryError> {
        self.generate_inner(request).await.with_op("sequence.generate")
    }

    pub async fn generate_one(
        &self,
        sequence_type: SequenceType,
        org_id: &Pulid,
        bu_id: &Pulid,
    ) -> Result<String, RepositoryError> {
        let request = SequenceRequest::new(sequence_type, org_id.clone(), bu_id.clone());
        self.generate(request)
            .await?
            .pop()
            .ok_or_else(|| RepositoryError::internal("sequence generation returned no value"))
    }

    pub async fn generate_pro_number(
        &self,
        org_id: &Pulid,
        bu_id: &Pulid,
    ) -> Result<String, RepositoryError> {
        self.generate_one(SequenceType::ProNumber, org_id, bu_id)
            .await
    }

    async fn generate_inner(&self, request: SequenceRequest) -> Result<Vec<String>, RepositoryError> {
        if request.count == 0 || request.count > MAX_BATCH {
            return Err(RepositoryError::validation(
                "count",
                "invalid",
                format!("Count must be between 1 and {MAX_BATCH}"),
            ));
        }

        let at = request.at.unwrap_or_else(Utc::now);
        let format = self
            .formats
            .format_for(&request.org_id, &request.bu_id, request.sequence_type)
            .await?;
        format.validate()?;

        let period = Period {
            year: at.year() as i16,
            month: at.month() as i16,
        };
        let start = self.allocate_with_retry(&request, period).await?;

        let mut rng = rand::thread_rng();
        let ids = (start..start + i64::from(request.count))
            .map(|value| {
                let rendered = format.render(value, &at, &mut rng);
                format.verify(&rendered)?;
                Ok(rendered)
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        tracing::debug!(
            sequence_type = %request.sequence_type,
            org_id = %request.org_id,
            start,
            count = request.count,
            "Allocated sequence values"
        );
        Ok(ids)
    }

    async fn allocate_with_retry(
        &self,
        request: &SequenceRequest,
        period: Period,
    ) -> Result<i64, RepositoryError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_conflict = String::new();

        for attempt in 0..max_attempts {
            let result = store::allocate(
                self.db.write(),
                request.sequence_type,
                &request.org_id,
                &request.bu_id,
                period,
                i64::from(request.count),
            )
            .await;

            match result {
                Ok(start) => return Ok(start),
                Err(AttemptError::Fatal(err)) => return Err(err.into()),
                Err(AttemptError::Conflict(reason)) => {
                    metrics::counter!(
                        "tms_sequence_retry_total",
                        "sequence_type" => request.sequence_type.as_str()
                    )
                    .increment(1);
                    tracing::debug!(
                        sequence_type = %request.sequence_type,
                        org_id = %request.org_id,
                        attempt = attempt + 1,
                        reason = %reason,
                        "Sequence allocation conflicted, retrying"
                    );
                    last_conflict = reason;
                    if attempt + 1 < max_attempts {
                        tokio::time::sleep(self.backoff(attempt)).await;
                    }
                }
            }
        }

        Err(RepositoryError::SerializationConflict(format!(
            "{} allocation failed after {max_attempts} attempts: {last_conflict}",
            request.sequence_type
        )))
    }

    /// `base * 2^attempt`, capped, plus up to half of that as jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.config.base_backoff_ms.max(1);
        let delay = base
            .saturating_mul(1u64 << attempt.min(20))
            .min(self.config.max_backoff_ms.max(base));
        let jitter = rand::thread_rng().gen_range(0..=delay / 2);
        Duration::from_millis(delay + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_type_names() {
        assert_eq!(SequenceType::ProNumber.to_string(), "pro_number");
        assert_eq!(
            serde_json::to_string(&SequenceType::WorkOrder).unwrap(),
            "\"work_order\""
        );
    }

    #[test]
    fn request_builder_defaults_to_one() {
        let request = SequenceRequest::new(
            SequenceType::Invoice,
            Pulid::new("org_"),
            Pulid::new("bu_"),
        );
        assert_eq!(request.count, 1);
        assert!(request.at.is_none());
        assert_eq!(request.count(5).count, 5);
    }
}
