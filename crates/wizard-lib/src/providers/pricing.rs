use super::PricingProvider;
use crate::error::{WizardError, WizardResult};
use crate::pricing::PricingSnapshot;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Built-in pricing table
#[derive(Debug, Clone)]
pub struct StaticPricingProvider {
    snapshot: PricingSnapshot,
}

impl StaticPricingProvider {
    pub fn new(snapshot: PricingSnapshot) -> Self {
        Self { snapshot }
    }
}

impl Default for StaticPricingProvider {
    fn default() -> Self {
        Self::new(PricingSnapshot::builtin())
    }
}

#[async_trait]
impl PricingProvider for StaticPricingProvider {
    fn name(&self) -> &'static str {
        "static-pricing"
    }

    async fn fetch(&self) -> WizardResult<PricingSnapshot> {
        Ok(self.snapshot.clone())
    }
}

/// Pricing document read from disk on each fetch
#[derive(Debug, Clone)]
pub struct FilePricingProvider {
    path: PathBuf,
}

impl FilePricingProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PricingProvider for FilePricingProvider {
    fn name(&self) -> &'static str {
        "file-pricing"
    }

    async fn fetch(&self) -> WizardResult<PricingSnapshot> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            WizardError::upstream(self.name(), format!("{}: {}", self.path.display(), e))
        })?;
        PricingSnapshot::from_json(&raw)
            .map_err(|e| WizardError::upstream(self.name(), e.to_string()))
    }
}

/// How often cached pricing is considered stale
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshCadence {
    Hourly,
    #[default]
    Daily,
    Weekly,
    /// Only refreshed on explicit request
    Manual,
}

impl RefreshCadence {
    pub fn max_age(&self) -> Option<Duration> {
        match self {
            RefreshCadence::Hourly => Some(Duration::hours(1)),
            RefreshCadence::Daily => Some(Duration::days(1)),
            RefreshCadence::Weekly => Some(Duration::weeks(1)),
            RefreshCadence::Manual => None,
        }
    }
}

/// Result of a cache read
#[derive(Debug)]
pub struct PricingRead {
    pub snapshot: Arc<PricingSnapshot>,
    /// Set when a due refresh failed and `snapshot` is the previous one
    pub refresh_error: Option<WizardError>,
}

impl PricingRead {
    fn fresh(snapshot: Arc<PricingSnapshot>) -> Self {
        Self {
            snapshot,
            refresh_error: None,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.refresh_error.is_some()
    }
}

#[derive(Debug, Clone)]
struct CachedEntry {
    snapshot: Arc<PricingSnapshot>,
    fetched_at: DateTime<Utc>,
}

/// Caches a pricing provider's snapshot and refreshes it on a cadence.
///
/// A failed refresh keeps serving the previous snapshot with the error
/// attached; only a cache that has never been filled fails outright.
#[derive(Clone)]
pub struct CachedPricing {
    provider: Arc<dyn PricingProvider>,
    cadence: RefreshCadence,
    entry: Arc<RwLock<Option<CachedEntry>>>,
}

impl CachedPricing {
    pub fn new(provider: Arc<dyn PricingProvider>, cadence: RefreshCadence) -> Self {
        Self {
            provider,
            cadence,
            entry: Arc::new(RwLock::new(None)),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn cadence(&self) -> RefreshCadence {
        self.cadence
    }

    pub async fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.entry.read().await.as_ref().map(|e| e.fetched_at)
    }

    fn is_fresh(&self, entry: &CachedEntry, now: DateTime<Utc>) -> bool {
        match self.cadence.max_age() {
            Some(max_age) => now - entry.fetched_at < max_age,
            None => true,
        }
    }

    /// Current snapshot, refreshing first if it is stale or missing
    pub async fn get(&self) -> WizardResult<PricingRead> {
        self.get_at(Utc::now()).await
    }

    async fn get_at(&self, now: DateTime<Utc>) -> WizardResult<PricingRead> {
        let stale = {
            let guard = self.entry.read().await;
            match guard.as_ref() {
                Some(entry) if self.is_fresh(entry, now) => {
                    return Ok(PricingRead::fresh(entry.snapshot.clone()))
                }
                Some(entry) => Some(entry.snapshot.clone()),
                None => None,
            }
        };

        match self.refresh_at(now).await {
            Ok(snapshot) => Ok(PricingRead::fresh(snapshot)),
            Err(e) => match stale {
                Some(snapshot) => {
                    warn!(
                        provider = self.provider.name(),
                        error = %e,
                        "Pricing refresh failed, serving cached snapshot"
                    );
                    Ok(PricingRead {
                        snapshot,
                        refresh_error: Some(e),
                    })
                }
                None => Err(e),
            },
        }
    }

    /// Fetch from the provider now, regardless of cadence
    pub async fn refresh(&self) -> WizardResult<Arc<PricingSnapshot>> {
        self.refresh_at(Utc::now()).await
    }

    async fn refresh_at(&self, now: DateTime<Utc>) -> WizardResult<Arc<PricingSnapshot>> {
        let snapshot = Arc::new(self.provider.fetch().await?);
        let regions = snapshot.prices.len();
        *self.entry.write().await = Some(CachedEntry {
            snapshot: snapshot.clone(),
            fetched_at: now,
        });
        info!(
            provider = self.provider.name(),
            regions = regions,
            "Pricing snapshot refreshed"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::InstancePrice;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts fetches and fails once `fail_after` have succeeded
    struct CountingProvider {
        calls: AtomicUsize,
        fail_after: usize,
    }

    #[async_trait]
    impl PricingProvider for CountingProvider {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn fetch(&self) -> WizardResult<PricingSnapshot> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n >= self.fail_after {
                return Err(WizardError::upstream("counting", "feed down"));
            }
            Ok(PricingSnapshot::new().with_price(
                "us-east-1",
                "m5.large",
                InstancePrice::new(0.096 + n as f64, None),
            ))
        }
    }

    fn counting(fail_after: usize) -> Arc<CountingProvider> {
        Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail_after,
        })
    }

    #[tokio::test]
    async fn test_fresh_entry_is_reused() {
        let provider = counting(10);
        let cache = CachedPricing::new(provider.clone(), RefreshCadence::Hourly);
        let now = Utc::now();

        cache.get_at(now).await.unwrap();
        cache.get_at(now + Duration::minutes(30)).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        cache.get_at(now + Duration::minutes(61)).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_manual_cadence_only_refreshes_on_request() {
        let provider = counting(10);
        let cache = CachedPricing::new(provider.clone(), RefreshCadence::Manual);
        let now = Utc::now();

        cache.get_at(now).await.unwrap();
        cache.get_at(now + Duration::weeks(10)).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let refreshed = cache.refresh().await.unwrap();
        assert_eq!(refreshed.get("us-east-1", "m5.large").unwrap().on_demand, 1.096);
    }

    #[tokio::test]
    async fn test_stale_snapshot_served_when_refresh_fails() {
        let provider = counting(1);
        let cache = CachedPricing::new(provider.clone(), RefreshCadence::Hourly);
        let now = Utc::now();

        let first = cache.get_at(now).await.unwrap();
        assert!(!first.is_stale());

        let later = cache.get_at(now + Duration::hours(3)).await.unwrap();
        assert_eq!(first.snapshot, later.snapshot);
        assert!(later.is_stale());
        assert!(later.refresh_error.unwrap().is_retryable());
        assert_eq!(cache.last_refreshed().await, Some(now));

        assert!(cache.refresh().await.is_err());
    }

    #[tokio::test]
    async fn test_empty_cache_surfaces_error() {
        let cache = CachedPricing::new(counting(0), RefreshCadence::Daily);
        let err = cache.get().await.unwrap_err();
        assert!(err.is_retryable());
        assert!(cache.last_refreshed().await.is_none());
    }

    #[tokio::test]
    async fn test_file_provider_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pricing.json");
        std::fs::write(
            &path,
            r#"{"prices":{"eu-west-1":{"m5.large":{"onDemand":0.107,"spot":0.032}}}}"#,
        )
        .unwrap();

        let snapshot = FilePricingProvider::new(&path).fetch().await.unwrap();
        assert_eq!(snapshot.get("eu-west-1", "m5.large").unwrap().spot, Some(0.032));

        std::fs::write(&path, "not json").unwrap();
        let err = FilePricingProvider::new(&path).fetch().await.unwrap_err();
        assert!(err.is_retryable());
    }
}
