//! Cart synchronizer.
//!
//! Keeps the local quantity cache close to the server's pending cart while
//! giving immediate feedback:
//!
//! 1. The optimistic quantity is written to the cache before the request.
//! 2. The mutating request is sent (create, update or delete line).
//! 3. The pending cart is re-fetched and overwrites both maps.
//!
//! # Ordering
//!
//! - One mutation per product at a time; later calls on the same product
//!   wait for the earlier one to settle. Different products run concurrently.
//! - Every re-fetch takes a sequence number when issued. A snapshot is only
//!   applied when its number is newer than the last applied one, so a slow
//!   early re-fetch never overwrites a later one.
//! - Lazy cart creation is single-flight: concurrent first adds share one
//!   `POST /api/carts`.
//!
//! # Failures
//!
//! Nothing is retried. A failed mutation restores the product's pre-call
//! optimistic quantity, emits a notice and returns the error.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};

use baby_guard_core::{Address, CartId, CartSnapshot, ProductId};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::instrument;

use crate::api::{ApiClient, ApiError};
use crate::error::{ClientError, Result, add_breadcrumb, report};
use crate::notify::{Notice, Notifier};
use crate::storage::{LocalStore, Quantities};

/// Remote cart operations used by the synchronizer.
pub trait CartApi: Send + Sync + 'static {
    /// The user's pending cart, `None` if there is none.
    fn pending_cart(&self) -> impl Future<Output = Result<Option<CartSnapshot>>> + Send;

    fn create_cart(&self, address: &Address) -> impl Future<Output = Result<CartSnapshot>> + Send;

    fn delete_cart(&self, cart_id: &CartId) -> impl Future<Output = Result<()>> + Send;

    fn add_line(
        &self,
        cart_id: &CartId,
        product_id: &ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<()>> + Send;

    fn update_line(
        &self,
        cart_id: &CartId,
        product_id: &ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<()>> + Send;

    fn remove_line(
        &self,
        cart_id: &CartId,
        product_id: &ProductId,
    ) -> impl Future<Output = Result<()>> + Send;
}

impl CartApi for ApiClient {
    async fn pending_cart(&self) -> Result<Option<CartSnapshot>> {
        match Self::pending_cart(self).await {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(ApiError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_cart(&self, address: &Address) -> Result<CartSnapshot> {
        Ok(Self::create_cart(self, address).await?)
    }

    async fn delete_cart(&self, cart_id: &CartId) -> Result<()> {
        Ok(Self::delete_cart(self, cart_id).await?)
    }

    async fn add_line(&self, cart_id: &CartId, product_id: &ProductId, quantity: u32) -> Result<()> {
        Ok(self.add_cart_line(cart_id, product_id, quantity).await?)
    }

    async fn update_line(
        &self,
        cart_id: &CartId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<()> {
        Ok(self.update_cart_line(cart_id, product_id, quantity).await?)
    }

    async fn remove_line(&self, cart_id: &CartId, product_id: &ProductId) -> Result<()> {
        Ok(self.remove_cart_line(cart_id, product_id).await?)
    }
}

// =============================================================================
// Quantity cache
// =============================================================================

/// Local product quantities.
///
/// `optimistic` is what the user sees; `confirmed` is what the server last
/// reported. A product with quantity 0 is absent from both maps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuantityCache {
    optimistic: Quantities,
    confirmed: Quantities,
}

impl QuantityCache {
    /// Build from stored maps, dropping zero entries.
    #[must_use]
    pub fn from_maps(mut optimistic: Quantities, mut confirmed: Quantities) -> Self {
        optimistic.retain(|_, quantity| *quantity > 0);
        confirmed.retain(|_, quantity| *quantity > 0);
        Self {
            optimistic,
            confirmed,
        }
    }

    /// Displayed quantity (0 if absent).
    #[must_use]
    pub fn quantity(&self, product_id: &ProductId) -> u32 {
        self.optimistic.get(product_id).copied().unwrap_or(0)
    }

    /// Whether the server has a line for the product.
    #[must_use]
    pub fn has_line(&self, product_id: &ProductId) -> bool {
        self.confirmed.contains_key(product_id)
    }

    /// Set the displayed quantity and return the previous one.
    pub fn set(&mut self, product_id: &ProductId, quantity: u32) -> u32 {
        let previous = if quantity == 0 {
            self.optimistic.remove(product_id)
        } else {
            self.optimistic.insert(product_id.clone(), quantity)
        };
        previous.unwrap_or(0)
    }

    /// Overwrite both maps with the server snapshot, keeping the displayed
    /// value of products listed in `keep`.
    pub fn apply(&mut self, snapshot: &CartSnapshot, keep: &HashSet<ProductId>) {
        let server = snapshot.quantities();
        let mut optimistic = server.clone();
        for product_id in keep {
            match self.optimistic.get(product_id) {
                Some(quantity) => {
                    optimistic.insert(product_id.clone(), *quantity);
                }
                None => {
                    optimistic.remove(product_id);
                }
            }
        }
        self.optimistic = optimistic;
        self.confirmed = server;
    }

    pub fn clear(&mut self) {
        self.optimistic.clear();
        self.confirmed.clear();
    }

    /// Sum of confirmed quantities.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.confirmed.values().sum()
    }

    #[must_use]
    pub const fn optimistic(&self) -> &Quantities {
        &self.optimistic
    }

    #[must_use]
    pub const fn confirmed(&self) -> &Quantities {
        &self.confirmed
    }
}

// =============================================================================
// Synchronizer
// =============================================================================

/// Keeps the local cart cache in step with the server's pending cart.
///
/// Cheap to clone; clones share state.
pub struct CartSynchronizer<A = ApiClient> {
    inner: Arc<CartInner<A>>,
}

impl<A> Clone for CartSynchronizer<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct CartInner<A> {
    api: A,
    store: LocalStore,
    notifier: Arc<dyn Notifier>,
    state: Mutex<CartState>,
    /// One lock per product serializes mutations of that product.
    product_locks: std::sync::Mutex<HashMap<ProductId, Arc<Mutex<()>>>>,
    /// Held while a lazily created cart is in flight.
    creation: Mutex<()>,
    /// Last issued re-fetch sequence number.
    issued: AtomicU64,
}

#[derive(Debug, Default)]
struct CartState {
    cart_id: Option<CartId>,
    cache: QuantityCache,
    snapshot: Option<CartSnapshot>,
    /// Sequence number of the last applied re-fetch.
    applied: u64,
    pending: HashSet<ProductId>,
}

impl<A: CartApi> CartSynchronizer<A> {
    /// Build a synchronizer seeded from the local store.
    pub async fn new(api: A, store: LocalStore, notifier: Arc<dyn Notifier>) -> Self {
        let (optimistic, confirmed) = store.quantities().await;
        let state = CartState {
            cart_id: store.cart_id().await,
            cache: QuantityCache::from_maps(optimistic, confirmed),
            snapshot: store.cart_details().await,
            ..CartState::default()
        };

        Self {
            inner: Arc::new(CartInner {
                api,
                store,
                notifier,
                state: Mutex::new(state),
                product_locks: std::sync::Mutex::new(HashMap::new()),
                creation: Mutex::new(()),
                issued: AtomicU64::new(0),
            }),
        }
    }

    // =========================================================================
    // Read accessors
    // =========================================================================

    /// Displayed quantity of a product.
    pub async fn quantity(&self, product_id: &ProductId) -> u32 {
        self.inner.state.lock().await.cache.quantity(product_id)
    }

    /// All displayed quantities.
    pub async fn quantities(&self) -> Quantities {
        self.inner.state.lock().await.cache.optimistic().clone()
    }

    /// Number of items in the server's cart.
    pub async fn item_count(&self) -> u32 {
        self.inner.state.lock().await.cache.item_count()
    }

    /// Last snapshot received from the server.
    pub async fn snapshot(&self) -> Option<CartSnapshot> {
        self.inner.state.lock().await.snapshot.clone()
    }

    /// Whether a mutation of this product is in flight.
    pub async fn is_pending(&self, product_id: &ProductId) -> bool {
        self.inner.state.lock().await.pending.contains(product_id)
    }

    pub async fn cart_id(&self) -> Option<CartId> {
        self.inner.state.lock().await.cart_id.clone()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add one unit of a product, creating the cart first if needed.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::OutOfStock` when the server refuses the line for
    /// lack of stock, or any error from the cart or line requests.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add(&self, product_id: &ProductId) -> Result<()> {
        add_breadcrumb("cart", "Add product", Some(&[("product_id", product_id.as_str())]));
        let _guard = self.lock_product(product_id).await;

        let result = async {
            let cart_id = self.ensure_cart().await?;
            let current = self.quantity(product_id).await;
            let target = current.saturating_add(1);
            let api = &self.inner.api;
            self.mutate(product_id, target, api.add_line(&cart_id, product_id, 1))
                .await
        }
        .await;

        match result {
            Ok(()) => {
                self.inner.notifier.notify(Notice::success("Added to cart"));
                Ok(())
            }
            Err(e) => {
                let message = match e {
                    ClientError::OutOfStock(_)
                    | ClientError::Unauthorized(_)
                    | ClientError::Cancelled => None,
                    _ => Some("Failed to add the product to your cart.".to_string()),
                };
                Err(self.fail("cart.add", e, message))
            }
        }
    }

    /// Change a product's quantity by `delta`.
    ///
    /// A resulting quantity of zero or less removes the line. A zero or
    /// negative quantity is never sent to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the line request or the re-fetch fails.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn change_quantity(&self, product_id: &ProductId, delta: i64) -> Result<()> {
        if delta == 0 {
            return Ok(());
        }
        let _guard = self.lock_product(product_id).await;

        let current = self.quantity(product_id).await;
        let target = i64::from(current).saturating_add(delta);
        if target <= 0 {
            let has_line = self.inner.state.lock().await.cache.has_line(product_id);
            if current == 0 && !has_line {
                return Ok(());
            }
            return self
                .remove_locked(product_id)
                .await
                .map_err(|e| self.fail("cart.change_quantity", e, None));
        }

        let result = async {
            let target = u32::try_from(target)
                .map_err(|_| ClientError::InvalidState("Quantity is too large.".to_string()))?;
            let cart_id = self.ensure_cart().await?;
            let has_line = self.inner.state.lock().await.cache.has_line(product_id);
            let api = &self.inner.api;
            if has_line {
                self.mutate(product_id, target, api.update_line(&cart_id, product_id, target))
                    .await
            } else {
                self.mutate(product_id, target, api.add_line(&cart_id, product_id, target))
                    .await
            }
        }
        .await;

        result.map_err(|e| self.fail("cart.change_quantity", e, None))
    }

    /// Remove a product's line from the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete request or the re-fetch fails.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove(&self, product_id: &ProductId) -> Result<()> {
        let _guard = self.lock_product(product_id).await;
        match self.remove_locked(product_id).await {
            Ok(()) => {
                self.inner
                    .notifier
                    .notify(Notice::info("Removed from cart"));
                Ok(())
            }
            Err(e) => Err(self.fail("cart.remove", e, None)),
        }
    }

    /// Delete the line on the server even when the local cache has no
    /// trace of it, then re-fetch.
    async fn remove_locked(&self, product_id: &ProductId) -> Result<()> {
        let cart_id = self.cart_id().await.ok_or(ClientError::MissingCartId)?;

        let api = &self.inner.api;
        self.mutate(product_id, 0, api.remove_line(&cart_id, product_id))
            .await
    }

    /// Clear every piece of local cart state. No server call.
    ///
    /// Re-fetches still in flight are discarded when they complete.
    ///
    /// # Errors
    ///
    /// Returns an error if the state file cannot be written.
    #[instrument(skip(self))]
    pub async fn reset(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        state.cart_id = None;
        state.cache.clear();
        state.snapshot = None;
        state.applied = self.inner.issued.load(Ordering::SeqCst);
        self.inner.store.clear_cart().await?;
        tracing::debug!("Local cart state reset");
        Ok(())
    }

    /// Re-read the pending cart from the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn refresh(&self) -> Result<()> {
        self.refetch()
            .await
            .map_err(|e| self.fail("cart.refresh", e, None))
    }

    /// Create a fresh empty cart with the placeholder address.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart cannot be created.
    #[instrument(skip(self))]
    pub async fn provision_cart(&self) -> Result<CartId> {
        let _creating = self.inner.creation.lock().await;
        self.create_locked()
            .await
            .map_err(|e| self.fail("cart.provision", e, None))
    }

    /// Delete the pending cart on the server, then reset local state.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::MissingCartId` when no cart is stored, or any
    /// error from the delete request.
    #[instrument(skip(self))]
    pub async fn discard(&self) -> Result<()> {
        let result = async {
            let cart_id = self.cart_id().await.ok_or(ClientError::MissingCartId)?;
            self.inner.api.delete_cart(&cart_id).await?;
            self.reset().await
        }
        .await;

        match result {
            Ok(()) => {
                self.inner.notifier.notify(Notice::info("Cart discarded"));
                Ok(())
            }
            Err(e) => Err(self.fail("cart.discard", e, None)),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn lock_product(&self, product_id: &ProductId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .inner
                .product_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(product_id.clone()).or_default())
        };
        lock.lock_owned().await
    }

    /// The stored cart id, or a newly created cart's id.
    async fn ensure_cart(&self) -> Result<CartId> {
        if let Some(cart_id) = self.cart_id().await {
            return Ok(cart_id);
        }

        let _creating = self.inner.creation.lock().await;
        // Another caller may have finished creating while we waited.
        if let Some(cart_id) = self.cart_id().await {
            return Ok(cart_id);
        }
        self.create_locked().await
    }

    /// Create a cart and adopt it. Caller holds the creation lock.
    async fn create_locked(&self) -> Result<CartId> {
        let snapshot = self.inner.api.create_cart(&Address::placeholder()).await?;
        let cart_id = snapshot.id.clone();
        tracing::info!(cart_id = %cart_id, "Created cart");

        let mut state = self.inner.state.lock().await;
        state.cart_id = Some(cart_id.clone());
        state.snapshot = Some(snapshot);
        self.persist(&state).await?;
        Ok(cart_id)
    }

    /// Write `target` optimistically, run `request`, then re-fetch.
    ///
    /// The pending flag is cleared once the request settles, so the product's
    /// own re-fetch overwrites the optimistic value with the server quantity.
    /// On failure the product's previous quantity is restored.
    async fn mutate<F>(&self, product_id: &ProductId, target: u32, request: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        let previous = {
            let mut state = self.inner.state.lock().await;
            state.pending.insert(product_id.clone());
            let previous = state.cache.set(product_id, target);
            if let Err(e) = self.persist(&state).await {
                tracing::warn!(error = %e, "Failed to persist optimistic quantity");
            }
            previous
        };

        match request.await {
            Ok(()) => {
                self.inner.state.lock().await.pending.remove(product_id);
                self.refetch().await
            }
            Err(e) => {
                let mut state = self.inner.state.lock().await;
                state.pending.remove(product_id);
                state.cache.set(product_id, previous);
                if let Err(persist_err) = self.persist(&state).await {
                    tracing::warn!(error = %persist_err, "Failed to persist cart rollback");
                }
                Err(e)
            }
        }
    }

    fn next_seq(&self) -> u64 {
        self.inner.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn refetch(&self) -> Result<()> {
        let seq = self.next_seq();
        let snapshot = self.inner.api.pending_cart().await?;
        self.apply_fetch(seq, snapshot).await?;
        Ok(())
    }

    /// Apply a re-fetch result unless a newer one was applied already.
    ///
    /// Returns whether the snapshot was applied.
    async fn apply_fetch(&self, seq: u64, snapshot: Option<CartSnapshot>) -> Result<bool> {
        let mut state = self.inner.state.lock().await;
        if seq <= state.applied {
            tracing::debug!(seq, applied = state.applied, "Dropping stale cart snapshot");
            return Ok(false);
        }
        state.applied = seq;

        match snapshot {
            Some(snapshot) => {
                if state.cart_id.as_ref() != Some(&snapshot.id) {
                    tracing::info!(cart_id = %snapshot.id, "Adopting server cart id");
                    state.cart_id = Some(snapshot.id.clone());
                }
                let CartState {
                    cache, pending, ..
                } = &mut *state;
                cache.apply(&snapshot, pending);
                state.snapshot = Some(snapshot);
            }
            None => {
                tracing::debug!("No pending cart on the server");
                state.cart_id = None;
                state.cache.clear();
                state.snapshot = None;
            }
        }

        self.persist(&state).await?;
        Ok(true)
    }

    async fn persist(&self, state: &CartState) -> Result<()> {
        self.inner
            .store
            .set_cart_state(
                state.cart_id.clone(),
                state.snapshot.as_ref(),
                state.cache.optimistic(),
                state.cache.confirmed(),
            )
            .await?;
        Ok(())
    }

    fn fail(&self, context: &str, err: ClientError, message: Option<String>) -> ClientError {
        report(self.inner.notifier.as_ref(), context, &err, message);
        err
    }
}
