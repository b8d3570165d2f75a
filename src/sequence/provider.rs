//! Per-tenant format lookup.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;

use super::SequenceType;
use super::format::SequenceFormat;
use crate::error::RepositoryError;
use crate::pulid::Pulid;

/// Source of the format a tenant uses for a sequence type.
#[async_trait]
pub trait FormatProvider: Send + Sync {
    async fn format_for(
        &self,
        org_id: &Pulid,
        bu_id: &Pulid,
        sequence_type: SequenceType,
    ) -> Result<SequenceFormat, RepositoryError>;
}

/// Built-in formats, optionally overridden per organization.
#[derive(Debug, Clone, Default)]
pub struct DefaultFormats {
    overrides: HashMap<(Option<Pulid>, SequenceType), SequenceFormat>,
}

impl DefaultFormats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the built-in format for every tenant.
    pub fn with_format(mut self, sequence_type: SequenceType, format: SequenceFormat) -> Self {
        self.overrides.insert((None, sequence_type), format);
        self
    }

    /// Replaces the format for one organization.
    pub fn with_org_format(
        mut self,
        org_id: Pulid,
        sequence_type: SequenceType,
        format: SequenceFormat,
    ) -> Self {
        self.overrides.insert((Some(org_id), sequence_type), format);
        self
    }

    fn lookup(&self, org_id: &Pulid, sequence_type: SequenceType) -> SequenceFormat {
        self.overrides
            .get(&(Some(org_id.clone()), sequence_type))
            .or_else(|| self.overrides.get(&(None, sequence_type)))
            .cloned()
            .unwrap_or_else(|| SequenceFormat::default_for(sequence_type))
    }
}

#[async_trait]
impl FormatProvider for DefaultFormats {
    async fn format_for(
        &self,
        org_id: &Pulid,
        _bu_id: &Pulid,
        sequence_type: SequenceType,
    ) -> Result<SequenceFormat, RepositoryError> {
        Ok(self.lookup(org_id, sequence_type))
    }
}

type CacheKey = (Pulid, Pulid, SequenceType);

/// Bounded, time-limited cache in front of another provider.
pub struct CachedFormatProvider<P> {
    inner: P,
    ttl: Duration,
    entries: Mutex<LruCache<CacheKey, (Instant, SequenceFormat)>>,
}

impl<P: FormatProvider> CachedFormatProvider<P> {
    pub fn new(inner: P, capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Drops every cached format.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Drops the cached format of one tenant and type.
    pub fn invalidate(&self, org_id: &Pulid, bu_id: &Pulid, sequence_type: SequenceType) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop(&(org_id.clone(), bu_id.clone(), sequence_type));
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cached(&self, key: &CacheKey) -> Option<SequenceFormat> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match entries.get(key) {
            Some((stored_at, format)) if stored_at.elapsed() < self.ttl => Some(format.clone()),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl<P: FormatProvider> FormatProvider for CachedFormatProvider<P> {
    async fn format_for(
        &self,
        org_id: &Pulid,
        bu_id: &Pulid,
        sequence_type: SequenceType,
    ) -> Result<SequenceFormat, RepositoryError> {
        let key = (org_id.clone(), bu_id.clone(), sequence_type);
        if let Some(format) = self.cached(&key) {
            return Ok(format);
        }

        let format = self.inner.format_for(org_id, bu_id, sequence_type).await?;
        format.validate()?;
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .put(key, (Instant::now(), format.clone()));
        tracing::debug!(
            org_id = %org_id,
            sequence_type = %sequence_type,
            "Cached sequence format"
        );
        Ok(format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FormatProvider for Counting {
        async fn format_for(
            &self,
            _org_id: &Pulid,
            _bu_id: &Pulid,
            sequence_type: SequenceType,
        ) -> Result<SequenceFormat, RepositoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SequenceFormat::default_for(sequence_type))
        }
    }

    #[tokio::test]
    async fn cache_hits_skip_the_inner_provider() {
        let provider = CachedFormatProvider::new(
            Counting {
                calls: AtomicUsize::new(0),
            },
            8,
            Duration::from_secs(60),
        );
        let org = Pulid::new("org_");
        let bu = Pulid::new("bu_");

        provider
            .format_for(&org, &bu, SequenceType::ProNumber)
            .await
            .unwrap();
        provider
            .format_for(&org, &bu, SequenceType::ProNumber)
            .await
            .unwrap();
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 1);

        provider.clear();
        assert!(provider.is_empty());
        provider
            .format_for(&org, &bu, SequenceType::ProNumber)
            .await
            .unwrap();
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_entries_are_refetched() {
        let provider = CachedFormatProvider::new(
            Counting {
                calls: AtomicUsize::new(0),
            },
            8,
            Duration::ZERO,
        );
        let org = Pulid::new("org_");
        let bu = Pulid::new("bu_");

        for _ in 0..3 {
            provider
                .format_for(&org, &bu, SequenceType::Invoice)
                .await
                .unwrap();
        }
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn org_override_wins_over_global() {
        let org = Pulid::new("org_");
        let other = Pulid::new("org_");
        let bu = Pulid::new("bu_");
        let custom = SequenceFormat {
            prefix: "ACME".into(),
            ..SequenceFormat::default()
        };
        let provider = DefaultFormats::new().with_org_format(
            org.clone(),
            SequenceType::WorkOrder,
            custom.clone(),
        );

        let ours = provider
            .format_for(&org, &bu, SequenceType::WorkOrder)
            .await
            .unwrap();
        assert_eq!(ours, custom);

        let theirs = provider
            .format_for(&other, &bu, SequenceType::WorkOrder)
            .await
            .unwrap();
        assert_eq!(theirs, SequenceFormat::default_for(SequenceType::WorkOrder));
    }
}
