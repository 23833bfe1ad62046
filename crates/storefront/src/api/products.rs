//! Product catalog endpoints.

use baby_guard_core::ProductId;
use reqwest::Method;
use tracing::instrument;

use super::types::{Product, ProductQuery};
use super::{ApiClient, ApiError, DataEnvelope};

impl ApiClient {
    /// `GET /api/products` with optional filters.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn products(&self, query: &ProductQuery) -> Result<Vec<Product>, ApiError> {
        let builder = self
            .request(Method::GET, &["api", "products"])
            .await?
            .query(&query.pairs());
        let envelope: DataEnvelope<Vec<Product>> = self.send_json(builder).await?;
        Ok(envelope.data)
    }

    /// Product detail. The API has no detail route; the list endpoint is
    /// filtered by id instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails. A missing product is
    /// `Ok(None)`.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn product(&self, product_id: &ProductId) -> Result<Option<Product>, ApiError> {
        let builder = self
            .request(Method::GET, &["api", "products"])
            .await?
            .query(&[("id", product_id.as_str())]);
        let envelope: DataEnvelope<Vec<Product>> = self.send_json(builder).await?;
        Ok(envelope
            .data
            .into_iter()
            .find(|product| &product.id == product_id))
    }
}
