use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info};

use orcabot_core::CatalogEntry;

use crate::source::{CatalogError, PriceSource};

/// Upper bound on search hits returned to the reasoning model. Keeps tool
/// results small enough that the model summarizes instead of dumping lists.
pub const SEARCH_LIMIT: usize = 15;

struct CacheState {
    entries: Vec<CatalogEntry>,
    fetched_at: Option<Instant>,
}

/// Read-through cache over a [`PriceSource`]. The sales sheet changes a few
/// times a day at most, so a short TTL spares the upstream on busy hours.
pub struct Catalog {
    source: Arc<dyn PriceSource>,
    ttl: Duration,
    cache: RwLock<CacheState>,
}

impl Catalog {
    pub fn new(source: Arc<dyn PriceSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cache: RwLock::new(CacheState { entries: Vec::new(), fetched_at: None }),
        }
    }

    pub async fn all_entries(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        {
            let cache = self.cache.read().await;
            if let Some(fetched_at) = cache.fetched_at {
                if !cache.entries.is_empty() && fetched_at.elapsed() < self.ttl {
                    debug!(event_name = "catalog.cache_hit", entries = cache.entries.len());
                    return Ok(cache.entries.clone());
                }
            }
        }

        let entries = self.source.fetch().await?;
        info!(event_name = "catalog.refreshed", entries = entries.len());

        let mut cache = self.cache.write().await;
        cache.entries = entries.clone();
        cache.fetched_at = Some(Instant::now());
        Ok(entries)
    }

    /// Case-insensitive substring search. Prefix matches rank above interior
    /// matches; ties keep the sheet's own ordering.
    pub async fn search(&self, query: &str) -> Result<Vec<CatalogEntry>, CatalogError> {
        let entries = self.all_entries().await?;
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(u8, CatalogEntry)> = entries
            .into_iter()
            .filter_map(|entry| {
                let name = entry.product.to_lowercase();
                if name.contains(&query) {
                    let score = if name.starts_with(&query) { 2 } else { 1 };
                    Some((score, entry))
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by_key(|(score, _)| std::cmp::Reverse(*score));
        Ok(scored.into_iter().take(SEARCH_LIMIT).map(|(_, entry)| entry).collect())
    }

    /// Forces a refresh on the next read.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        cache.fetched_at = None;
        info!(event_name = "catalog.cache_invalidated");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use orcabot_core::CatalogEntry;

    use super::{Catalog, SEARCH_LIMIT};
    use crate::source::{CatalogError, PriceSource};

    struct FakeSource {
        entries: Vec<CatalogEntry>,
        fetches: AtomicUsize,
    }

    impl FakeSource {
        fn new(entries: Vec<CatalogEntry>) -> Self {
            Self { entries, fetches: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl PriceSource for FakeSource {
        async fn fetch(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.entries.clone())
        }
    }

    fn entry(product: &str) -> CatalogEntry {
        CatalogEntry {
            product: product.to_string(),
            unit: "UNIDADE".to_string(),
            unit_price: Decimal::new(1000, 2),
        }
    }

    #[tokio::test]
    async fn repeated_reads_within_ttl_hit_the_cache() {
        let source = Arc::new(FakeSource::new(vec![entry("Telha Sanduíche 30mm")]));
        let catalog = Catalog::new(source.clone(), Duration::from_secs(600));

        catalog.all_entries().await.expect("first read");
        catalog.all_entries().await.expect("second read");
        catalog.search("telha").await.expect("search");

        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_a_refetch() {
        let source = Arc::new(FakeSource::new(vec![entry("Telha Sanduíche 30mm")]));
        let catalog = Catalog::new(source.clone(), Duration::from_secs(600));

        catalog.all_entries().await.expect("first read");
        catalog.invalidate().await;
        catalog.all_entries().await.expect("read after invalidate");

        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn prefix_matches_rank_above_interior_matches() {
        let source = Arc::new(FakeSource::new(vec![
            entry("Parafuso para Telha"),
            entry("Telha Sanduíche 30mm"),
            entry("Telha Galvanizada 0,43"),
            entry("Porta de Aço"),
        ]));
        let catalog = Catalog::new(source, Duration::from_secs(600));

        let hits = catalog.search("telha").await.expect("search");
        let names: Vec<&str> = hits.iter().map(|hit| hit.product.as_str()).collect();
        assert_eq!(
            names,
            vec!["Telha Sanduíche 30mm", "Telha Galvanizada 0,43", "Parafuso para Telha"],
        );
    }

    #[tokio::test]
    async fn search_is_capped_and_blank_queries_return_nothing() {
        let entries: Vec<CatalogEntry> =
            (0..30).map(|index| entry(&format!("Telha modelo {index}"))).collect();
        let catalog = Catalog::new(Arc::new(FakeSource::new(entries)), Duration::from_secs(600));

        let hits = catalog.search("telha").await.expect("search");
        assert_eq!(hits.len(), SEARCH_LIMIT);

        let blank = catalog.search("   ").await.expect("blank search");
        assert!(blank.is_empty());
    }
}
