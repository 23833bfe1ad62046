//! Application state: the dependency root.
//!
//! Every service is built exactly once here and handed out by reference.
//! Front ends hold an `AppState` and never construct services themselves.

use std::sync::Arc;

use crate::api::{ApiClient, ApiError};
use crate::cart::CartSynchronizer;
use crate::catalog::CatalogService;
use crate::checkout::Checkout;
use crate::config::StorefrontConfig;
use crate::content::ContentService;
use crate::notify::Notifier;
use crate::session::SessionService;
use crate::storage::{LocalStore, StorageError};

/// Error building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to build API client: {0}")]
    Api(#[from] ApiError),
    #[error("failed to open local store: {0}")]
    Storage(#[from] StorageError),
}

/// Shared services of a running client.
///
/// This struct is cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    api: ApiClient,
    store: LocalStore,
    notifier: Arc<dyn Notifier>,
    session: SessionService,
    cart: CartSynchronizer,
    checkout: Checkout,
    catalog: CatalogService,
    content: ContentService,
}

impl AppState {
    /// Build every service, opening the state file at `config.state_path`.
    ///
    /// The persisted session is not restored here; call
    /// [`SessionService::restore`] once the front end is ready.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the state file
    /// cannot be read.
    pub async fn new(
        config: StorefrontConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, StateError> {
        let store = LocalStore::open(&config.state_path).await?;
        Self::with_store(config, store, notifier).await
    }

    /// Build every service on top of an already opened store.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub async fn with_store(
        config: StorefrontConfig,
        store: LocalStore,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, StateError> {
        let api = ApiClient::new(&config)?;
        let cart = CartSynchronizer::new(api.clone(), store.clone(), Arc::clone(&notifier)).await;
        let session = SessionService::new(
            api.clone(),
            store.clone(),
            cart.clone(),
            Arc::clone(&notifier),
        );
        let checkout = Checkout::new(
            api.clone(),
            cart.clone(),
            store.clone(),
            Arc::clone(&notifier),
            config.otp_cooldown,
        );
        let catalog = CatalogService::new(api.clone(), Arc::clone(&notifier), config.catalog_ttl);
        let content = ContentService::new(api.clone(), session.clone(), Arc::clone(&notifier));

        tracing::debug!(api_url = %config.api_url, "Application state built");

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                api,
                store,
                notifier,
                session,
                cart,
                checkout,
                catalog,
                content,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    #[must_use]
    pub fn store(&self) -> &LocalStore {
        &self.inner.store
    }

    #[must_use]
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.inner.notifier
    }

    #[must_use]
    pub fn session(&self) -> &SessionService {
        &self.inner.session
    }

    #[must_use]
    pub fn cart(&self) -> &CartSynchronizer {
        &self.inner.cart
    }

    #[must_use]
    pub fn checkout(&self) -> &Checkout {
        &self.inner.checkout
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    #[must_use]
    pub fn content(&self) -> &ContentService {
        &self.inner.content
    }
}
