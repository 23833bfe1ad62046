//! Product catalog with a short-lived cache.
//!
//! Unfiltered listings and product details are cached with `moka` for the
//! configured TTL. Filtered listings (category or search) always go to the
//! server.

use std::sync::Arc;
use std::time::Duration;

use baby_guard_core::ProductId;
use moka::future::Cache;
use tracing::{debug, instrument};

use crate::api::ApiClient;
use crate::api::types::{Product, ProductQuery};
use crate::error::{ClientError, Result, report};
use crate::notify::Notifier;

/// Cache key for catalog entries.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    Listing,
    Product(ProductId),
}

/// Cached value types.
#[derive(Debug, Clone)]
enum CacheValue {
    Listing(Arc<Vec<Product>>),
    Product(Box<Product>),
}

/// Read access to the product catalog.
#[derive(Clone)]
pub struct CatalogService {
    inner: Arc<CatalogInner>,
}

struct CatalogInner {
    api: ApiClient,
    notifier: Arc<dyn Notifier>,
    cache: Cache<CacheKey, CacheValue>,
}

impl CatalogService {
    #[must_use]
    pub fn new(api: ApiClient, notifier: Arc<dyn Notifier>, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(ttl)
            .build();

        Self {
            inner: Arc::new(CatalogInner {
                api,
                notifier,
                cache,
            }),
        }
    }

    /// List products matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn products(&self, query: &ProductQuery) -> Result<Vec<Product>> {
        if query.is_unfiltered()
            && let Some(CacheValue::Listing(products)) =
                self.inner.cache.get(&CacheKey::Listing).await
        {
            debug!("Cache hit for product listing");
            return Ok(products.as_ref().clone());
        }

        let products = self
            .inner
            .api
            .products(query)
            .await
            .map_err(|e| self.fail("catalog.products", e.into()))?;

        if query.is_unfiltered() {
            self.inner
                .cache
                .insert(CacheKey::Listing, CacheValue::Listing(Arc::new(products.clone())))
                .await;
        }

        Ok(products)
    }

    /// Fetch one product.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if no product has this id, or any
    /// error from the API request.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn product(&self, product_id: &ProductId) -> Result<Product> {
        let cache_key = CacheKey::Product(product_id.clone());
        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let product = self
            .inner
            .api
            .product(product_id)
            .await
            .map_err(ClientError::from)
            .and_then(|product| {
                product.ok_or_else(|| ClientError::NotFound("Product not found.".to_string()))
            })
            .map_err(|e| self.fail("catalog.product", e))?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
            .await;

        Ok(product)
    }

    /// Invalidate all cached data.
    pub async fn invalidate_all(&self) {
        self.inner.cache.invalidate_all();
        self.inner.cache.run_pending_tasks().await;
    }

    fn fail(&self, context: &str, err: ClientError) -> ClientError {
        report(self.inner.notifier.as_ref(), context, &err, None);
        err
    }
}
