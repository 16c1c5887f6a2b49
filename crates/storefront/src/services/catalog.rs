//! Cached catalog reads.
//!
//! Listings and product pages are cached for 5 minutes. Cart and checkout
//! lookups go straight to the database (in batches) so prices are never
//! older than the request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use rand::seq::SliceRandom;
use sqlx::PgPool;
use tracing::{debug, instrument};

use ballerz_core::{CatalogItem, CatalogQuery, ItemId, related_candidates};

use crate::db::{CatalogRepository, RepositoryError};

/// Number of related items shown on a product page.
pub const RELATED_LIMIT: usize = 4;

/// Number of suggestions shown under the cart.
pub const SUGGESTION_LIMIT: usize = 6;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    Listing(CatalogQuery),
    Product(String),
}

#[derive(Debug, Clone)]
enum CacheValue {
    Listing(Arc<Vec<CatalogItem>>),
    Product(Option<Box<CatalogItem>>),
}

/// Catalog reads with an in-memory cache.
#[derive(Clone)]
pub struct CatalogService {
    inner: Arc<CatalogServiceInner>,
}

struct CatalogServiceInner {
    pool: PgPool,
    cache: Cache<CacheKey, CacheValue>,
}

impl CatalogService {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Self {
            inner: Arc::new(CatalogServiceInner { pool, cache }),
        }
    }

    /// Every item in merchant order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the catalog cannot be loaded.
    pub async fn all(&self) -> Result<Arc<Vec<CatalogItem>>, RepositoryError> {
        let cache_key = CacheKey::Listing(CatalogQuery::default());
        if let Some(CacheValue::Listing(items)) = self.inner.cache.get(&cache_key).await {
            return Ok(items);
        }

        let items = Arc::new(CatalogRepository::new(&self.inner.pool).list().await?);
        debug!(count = items.len(), "Loaded catalog");

        self.inner
            .cache
            .insert(cache_key, CacheValue::Listing(Arc::clone(&items)))
            .await;
        Ok(items)
    }

    /// Items matching a shop query.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the catalog cannot be loaded.
    #[instrument(skip(self))]
    pub async fn list(&self, query: &CatalogQuery) -> Result<Arc<Vec<CatalogItem>>, RepositoryError> {
        if *query == CatalogQuery::default() {
            return self.all().await;
        }

        let cache_key = CacheKey::Listing(query.clone());
        if let Some(CacheValue::Listing(items)) = self.inner.cache.get(&cache_key).await {
            debug!("Catalog listing cache hit");
            return Ok(items);
        }

        let all = self.all().await?;
        let items: Arc<Vec<CatalogItem>> = Arc::new(query.apply(&all).into_iter().cloned().collect());

        self.inner
            .cache
            .insert(cache_key, CacheValue::Listing(Arc::clone(&items)))
            .await;
        Ok(items)
    }

    /// Find an item by its description, which doubles as its page slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the catalog cannot be loaded.
    #[instrument(skip(self))]
    pub async fn by_description(&self, description: &str) -> Result<Option<CatalogItem>, RepositoryError> {
        let cache_key = CacheKey::Product(description.to_owned());
        if let Some(CacheValue::Product(item)) = self.inner.cache.get(&cache_key).await {
            return Ok(item.map(|boxed| *boxed));
        }

        let item = self
            .all()
            .await?
            .iter()
            .find(|item| item.description == description)
            .cloned();

        self.inner
            .cache
            .insert(cache_key, CacheValue::Product(item.clone().map(Box::new)))
            .await;
        Ok(item)
    }

    /// Up to [`RELATED_LIMIT`] other items from the same category, in
    /// random order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the catalog cannot be loaded.
    pub async fn related(&self, item: &CatalogItem) -> Result<Vec<CatalogItem>, RepositoryError> {
        let all = self.all().await?;
        let mut related: Vec<CatalogItem> = related_candidates(item, &all)
            .into_iter()
            .cloned()
            .collect();
        related.shuffle(&mut rand::rng());
        related.truncate(RELATED_LIMIT);
        Ok(related)
    }

    /// Items suggested under the cart, skipping what is already in it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the catalog cannot be loaded.
    pub async fn suggestions(&self, exclude: &[ItemId]) -> Result<Vec<CatalogItem>, RepositoryError> {
        let all = self.all().await?;
        Ok(all
            .iter()
            .filter(|item| !exclude.contains(&item.id))
            .take(SUGGESTION_LIMIT)
            .cloned()
            .collect())
    }

    /// Resolve cart item ids against the live catalog (uncached).
    ///
    /// Unknown ids are absent from the map.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if a batch query fails.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn lookup(&self, ids: &[ItemId]) -> Result<HashMap<ItemId, CatalogItem>, RepositoryError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let items = CatalogRepository::new(&self.inner.pool).get_many(ids).await?;
        Ok(items
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect())
    }

    /// Drop every cached entry.
    pub fn invalidate_all(&self) {
        self.inner.cache.invalidate_all();
    }
}
