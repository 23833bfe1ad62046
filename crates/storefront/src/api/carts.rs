//! Cart endpoints (not cached - mutable state).

use baby_guard_core::{Address, CartId, CartSnapshot, ProductId};
use reqwest::Method;
use tracing::instrument;

use super::types::{AddLineRequest, CreateCartRequest, OrderStatusUpdate, UpdateLineRequest};
use super::{ApiClient, ApiError, DataEnvelope};

impl ApiClient {
    /// `GET /api/carts/pending`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails; `404` means the user has no
    /// pending cart and surfaces as `ApiError::Status`.
    #[instrument(skip(self))]
    pub async fn pending_cart(&self) -> Result<CartSnapshot, ApiError> {
        let builder = self.request(Method::GET, &["api", "carts", "pending"]).await?;
        let envelope: DataEnvelope<CartSnapshot> = self.send_json(builder).await?;
        Ok(envelope.data)
    }

    /// `POST /api/carts`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart cannot be created.
    #[instrument(skip(self, address))]
    pub async fn create_cart(&self, address: &Address) -> Result<CartSnapshot, ApiError> {
        let builder = self
            .request(Method::POST, &["api", "carts"])
            .await?
            .json(&CreateCartRequest { address });
        let envelope: DataEnvelope<CartSnapshot> = self.send_json(builder).await?;
        Ok(envelope.data)
    }

    /// `PATCH /api/carts/status/:id` - place the order.
    ///
    /// # Errors
    ///
    /// Returns an error if the status change is rejected.
    #[instrument(skip(self, update), fields(cart_id = %cart_id, status = %update.status))]
    pub async fn update_cart_status(
        &self,
        cart_id: &CartId,
        update: &OrderStatusUpdate,
    ) -> Result<(), ApiError> {
        let builder = self
            .request(Method::PATCH, &["api", "carts", "status", cart_id.as_str()])
            .await?
            .json(update);
        self.send_empty(builder).await
    }

    /// `DELETE /api/carts/:id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart cannot be deleted.
    #[instrument(skip(self), fields(cart_id = %cart_id))]
    pub async fn delete_cart(&self, cart_id: &CartId) -> Result<(), ApiError> {
        let builder = self
            .request(Method::DELETE, &["api", "carts", cart_id.as_str()])
            .await?;
        self.send_empty(builder).await
    }

    /// `POST /api/carts/:id/products`.
    ///
    /// # Errors
    ///
    /// Returns an error if the line cannot be created (e.g. out of stock).
    #[instrument(skip(self), fields(cart_id = %cart_id, product_id = %product_id))]
    pub async fn add_cart_line(
        &self,
        cart_id: &CartId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), ApiError> {
        let builder = self
            .request(Method::POST, &["api", "carts", cart_id.as_str(), "products"])
            .await?
            .json(&AddLineRequest {
                product_id,
                quantity,
            });
        self.send_empty(builder).await
    }

    /// `PATCH /api/carts/:id/products/:productId`.
    ///
    /// # Errors
    ///
    /// Returns an error if the quantity update is rejected.
    #[instrument(skip(self), fields(cart_id = %cart_id, product_id = %product_id))]
    pub async fn update_cart_line(
        &self,
        cart_id: &CartId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), ApiError> {
        let builder = self
            .request(
                Method::PATCH,
                &["api", "carts", cart_id.as_str(), "products", product_id.as_str()],
            )
            .await?
            .json(&UpdateLineRequest { quantity });
        self.send_empty(builder).await
    }

    /// `DELETE /api/carts/:id/products/:productId`.
    ///
    /// # Errors
    ///
    /// Returns an error if the line cannot be removed.
    #[instrument(skip(self), fields(cart_id = %cart_id, product_id = %product_id))]
    pub async fn remove_cart_line(
        &self,
        cart_id: &CartId,
        product_id: &ProductId,
    ) -> Result<(), ApiError> {
        let builder = self
            .request(
                Method::DELETE,
                &["api", "carts", cart_id.as_str(), "products", product_id.as_str()],
            )
            .await?;
        self.send_empty(builder).await
    }
}
