//! Persisted client state.
//!
//! One JSON document on disk holds everything the client keeps between runs:
//! the session credential, the cart id, both quantity maps and a few cached
//! server responses. Each key has exactly one owning writer:
//!
//! | Key                                   | Owner                 |
//! |---------------------------------------|-----------------------|
//! | `token`, `role`, `user_data`          | `SessionService`      |
//! | `cart_id`, `product_quantities`, ...  | `CartSynchronizer`    |
//! | `cart_data`                           | `Checkout`            |
//!
//! Writes go to a sibling temp file which is then renamed over the state
//! file, so a crash never leaves a half-written document behind.
//!
//! # Legacy layout
//!
//! Older clients stored a flat map of camelCase keys (`cartId`,
//! `productQuantities`, ...) where most values were JSON encoded a second
//! time as strings. Such a file has no `version` field and is migrated to
//! version 1 on load.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use baby_guard_core::{Address, CartId, CartSnapshot, ProductId, Role};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::api::types::UserProfile;

/// Current layout version of the state file.
pub const STATE_VERSION: u32 = 1;

/// Errors raised by the local store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed state file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("State file version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u64, supported: u32 },
}

/// Product id to quantity. Every stored quantity is at least 1.
pub type Quantities = BTreeMap<ProductId, u32>;

/// Version 1 of the state document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    pub version: u32,
    pub token: Option<String>,
    pub role: Option<Role>,
    pub cart_id: Option<CartId>,
    pub product_quantities: Quantities,
    pub product_quantities_of_pending_cart: Quantities,
    pub user_data: Option<UserProfile>,
    pub cart_details: Option<CartSnapshot>,
    pub cart_data: Option<Address>,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            token: None,
            role: None,
            cart_id: None,
            product_quantities: Quantities::new(),
            product_quantities_of_pending_cart: Quantities::new(),
            user_data: None,
            cart_details: None,
            cart_data: None,
        }
    }
}

impl PersistedState {
    /// Parse a state document, migrating the legacy layout if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not JSON, does not match the schema,
    /// or was written by a newer client.
    pub fn from_json(text: &str) -> Result<Self, StorageError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(map) = value else {
            return Err(StorageError::Json(serde::de::Error::custom(
                "state file must be a JSON object",
            )));
        };

        match map.get("version").and_then(Value::as_u64) {
            Some(found) if found > u64::from(STATE_VERSION) => {
                Err(StorageError::UnsupportedVersion {
                    found,
                    supported: STATE_VERSION,
                })
            }
            Some(_) => Ok(serde_json::from_value(Value::Object(map))?),
            None => Ok(Self::from_legacy(&map)),
        }
    }

    /// Build a version 1 document from the flat legacy key layout.
    ///
    /// Values that fail to decode are dropped rather than failing the load.
    fn from_legacy(map: &Map<String, Value>) -> Self {
        tracing::info!(keys = map.len(), "Migrating legacy state file");

        let quantities = |key: &str| -> Quantities {
            let mut quantities: Quantities = legacy_json(map, key).unwrap_or_default();
            quantities.retain(|_, quantity| *quantity > 0);
            quantities
        };

        Self {
            version: STATE_VERSION,
            token: legacy_text(map, "token"),
            role: legacy_text(map, "role").and_then(|role| role.parse().ok()),
            cart_id: legacy_text(map, "cartId").map(CartId::new),
            product_quantities: quantities("productQuantities"),
            product_quantities_of_pending_cart: quantities("productQuantitiesOfPendingCart"),
            user_data: legacy_json(map, "userData"),
            cart_details: legacy_json(map, "cartDetails"),
            cart_data: legacy_json(map, "cartData"),
        }
    }
}

/// A legacy value that was stored as plain text.
fn legacy_text(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(text) => {
            let text = text.trim().trim_matches('"');
            (!text.is_empty() && text != "null" && text != "undefined").then(|| text.to_string())
        }
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// A legacy value that holds JSON, possibly encoded again as a string.
fn legacy_json<T: DeserializeOwned>(map: &Map<String, Value>, key: &str) -> Option<T> {
    let value = match map.get(key)? {
        Value::String(text) => serde_json::from_str(text).ok()?,
        other => other.clone(),
    };
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            tracing::warn!(key, error = %e, "Dropping undecodable legacy value");
            None
        }
    }
}

/// Typed access to the persisted state.
///
/// Cheap to clone; clones share the same document. Every mutation is written
/// through before the call returns.
#[derive(Clone)]
pub struct LocalStore {
    inner: Arc<LocalStoreInner>,
}

struct LocalStoreInner {
    /// `None` keeps everything in memory.
    path: Option<PathBuf>,
    state: RwLock<PersistedState>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("path", &self.inner.path)
            .finish_non_exhaustive()
    }
}

impl LocalStore {
    /// Open the state file at `path`, creating an empty state if it is absent.
    ///
    /// A legacy file is migrated and written back in the current layout.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let (state, needs_rewrite) = match tokio::fs::read_to_string(&path).await {
            Ok(text) if text.trim().is_empty() => (PersistedState::default(), false),
            Ok(text) => {
                let state = PersistedState::from_json(&text)?;
                let migrated = !text.contains("\"version\"");
                (state, migrated)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                (PersistedState::default(), false)
            }
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), "Opened local store");
        let store = Self::with_state(Some(path), state);
        if needs_rewrite {
            let state = store.inner.state.read().await;
            store.persist(&state).await?;
        }
        Ok(store)
    }

    /// A store that never touches the filesystem.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_state(None, PersistedState::default())
    }

    fn with_state(path: Option<PathBuf>, state: PersistedState) -> Self {
        Self {
            inner: Arc::new(LocalStoreInner {
                path,
                state: RwLock::new(state),
            }),
        }
    }

    /// Location of the state file, if file backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Copy of the whole document.
    pub async fn snapshot(&self) -> PersistedState {
        self.inner.state.read().await.clone()
    }

    /// Apply `change` and write the result through.
    async fn update<F>(&self, change: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut PersistedState),
    {
        let mut state = self.inner.state.write().await;
        change(&mut state);
        self.persist(&state).await
    }

    async fn persist(&self, state: &PersistedState) -> Result<(), StorageError> {
        let Some(path) = self.inner.path.as_deref() else {
            return Ok(());
        };

        let json = serde_json::to_vec_pretty(state)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = temp_path(path);
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    // =========================================================================
    // Session keys
    // =========================================================================

    /// Stored credential and role.
    pub async fn session(&self) -> (Option<String>, Option<Role>) {
        let state = self.inner.state.read().await;
        (state.token.clone(), state.role)
    }

    /// # Errors
    ///
    /// Returns an error if the state file cannot be written.
    pub async fn set_session(&self, token: &str, role: Role) -> Result<(), StorageError> {
        self.update(|state| {
            state.token = Some(token.to_string());
            state.role = Some(role);
        })
        .await
    }

    /// Remove the credential, role and cached profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the state file cannot be written.
    pub async fn clear_session(&self) -> Result<(), StorageError> {
        self.update(|state| {
            state.token = None;
            state.role = None;
            state.user_data = None;
        })
        .await
    }

    pub async fn user_data(&self) -> Option<UserProfile> {
        self.inner.state.read().await.user_data.clone()
    }

    /// # Errors
    ///
    /// Returns an error if the state file cannot be written.
    pub async fn set_user_data(&self, profile: &UserProfile) -> Result<(), StorageError> {
        self.update(|state| state.user_data = Some(profile.clone()))
            .await
    }

    // =========================================================================
    // Cart keys
    // =========================================================================

    pub async fn cart_id(&self) -> Option<CartId> {
        self.inner.state.read().await.cart_id.clone()
    }

    /// # Errors
    ///
    /// Returns an error if the state file cannot be written.
    pub async fn set_cart_id(&self, cart_id: Option<CartId>) -> Result<(), StorageError> {
        self.update(|state| state.cart_id = cart_id).await
    }

    /// Stored `(optimistic, confirmed)` quantity maps.
    pub async fn quantities(&self) -> (Quantities, Quantities) {
        let state = self.inner.state.read().await;
        (
            state.product_quantities.clone(),
            state.product_quantities_of_pending_cart.clone(),
        )
    }

    /// # Errors
    ///
    /// Returns an error if the state file cannot be written.
    pub async fn set_quantities(
        &self,
        optimistic: &Quantities,
        confirmed: &Quantities,
    ) -> Result<(), StorageError> {
        self.update(|state| {
            state.product_quantities = optimistic.clone();
            state.product_quantities_of_pending_cart = confirmed.clone();
        })
        .await
    }

    pub async fn cart_details(&self) -> Option<CartSnapshot> {
        self.inner.state.read().await.cart_details.clone()
    }

    /// Store the last server snapshot together with the quantity maps it
    /// produced, in a single write.
    ///
    /// # Errors
    ///
    /// Returns an error if the state file cannot be written.
    pub async fn set_cart_state(
        &self,
        cart_id: Option<CartId>,
        snapshot: Option<&CartSnapshot>,
        optimistic: &Quantities,
        confirmed: &Quantities,
    ) -> Result<(), StorageError> {
        self.update(|state| {
            state.cart_id = cart_id;
            state.cart_details = snapshot.cloned();
            state.product_quantities = optimistic.clone();
            state.product_quantities_of_pending_cart = confirmed.clone();
        })
        .await
    }

    pub async fn cart_data(&self) -> Option<Address> {
        self.inner.state.read().await.cart_data.clone()
    }

    /// # Errors
    ///
    /// Returns an error if the state file cannot be written.
    pub async fn set_cart_data(&self, address: &Address) -> Result<(), StorageError> {
        self.update(|state| state.cart_data = Some(address.clone()))
            .await
    }

    /// Remove every cart-related key.
    ///
    /// # Errors
    ///
    /// Returns an error if the state file cannot be written.
    pub async fn clear_cart(&self) -> Result<(), StorageError> {
        self.update(|state| {
            state.cart_id = None;
            state.product_quantities.clear();
            state.product_quantities_of_pending_cart.clear();
            state.cart_details = None;
            state.cart_data = None;
        })
        .await
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use baby_guard_core::LineItem;

    fn quantities(pairs: &[(&str, u32)]) -> Quantities {
        pairs
            .iter()
            .map(|(id, qty)| (ProductId::new(*id), *qty))
            .collect()
    }

    #[tokio::test]
    async fn test_open_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path().join("nested/state.json"))
            .await
            .unwrap();
        assert_eq!(store.snapshot().await, PersistedState::default());
    }

    #[tokio::test]
    async fn test_writes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = LocalStore::open(&path).await.unwrap();
        store.set_session("tok", Role::Admin).await.unwrap();
        store.set_cart_id(Some(CartId::new("c1"))).await.unwrap();
        store
            .set_quantities(&quantities(&[("p1", 2)]), &quantities(&[("p1", 1)]))
            .await
            .unwrap();

        let reopened = LocalStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.session().await,
            (Some("tok".to_string()), Some(Role::Admin))
        );
        assert_eq!(reopened.cart_id().await, Some(CartId::new("c1")));
        let (optimistic, confirmed) = reopened.quantities().await;
        assert_eq!(optimistic, quantities(&[("p1", 2)]));
        assert_eq!(confirmed, quantities(&[("p1", 1)]));
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_clear_cart_keeps_session() {
        let store = LocalStore::in_memory();
        store.set_session("tok", Role::Customer).await.unwrap();
        store
            .set_cart_state(
                Some(CartId::new("c1")),
                Some(&CartSnapshot {
                    id: CartId::new("c1"),
                    items: vec![LineItem {
                        product_id: ProductId::new("p1"),
                        quantity: 1,
                    }],
                    total_price: baby_guard_core::Price::from_minor(1000),
                    status: None,
                }),
                &quantities(&[("p1", 1)]),
                &quantities(&[("p1", 1)]),
            )
            .await
            .unwrap();
        store.set_cart_data(&Address::placeholder()).await.unwrap();

        store.clear_cart().await.unwrap();

        let state = store.snapshot().await;
        assert!(state.cart_id.is_none());
        assert!(state.product_quantities.is_empty());
        assert!(state.product_quantities_of_pending_cart.is_empty());
        assert!(state.cart_details.is_none());
        assert!(state.cart_data.is_none());
        assert_eq!(state.token.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_legacy_file_is_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let legacy = serde_json::json!({
            "token": "abc.def.ghi",
            "role": "admin",
            "cartId": "665f1c",
            "productQuantities": "{\"p1\":3,\"p2\":0}",
            "productQuantitiesOfPendingCart": { "p1": 2 },
            "cartData": "{\"city\":\"Cairo\",\"street\":\"Nile\",\"buildingNumber\":\"5\",\"phone\":\"0100\"}",
            "cartDetails": "not json"
        });
        tokio::fs::write(&path, legacy.to_string()).await.unwrap();

        let store = LocalStore::open(&path).await.unwrap();
        let state = store.snapshot().await;
        assert_eq!(state.version, STATE_VERSION);
        assert_eq!(state.token.as_deref(), Some("abc.def.ghi"));
        assert_eq!(state.role, Some(Role::Admin));
        assert_eq!(state.cart_id, Some(CartId::new("665f1c")));
        assert_eq!(state.product_quantities, quantities(&[("p1", 3)]));
        assert_eq!(state.product_quantities_of_pending_cart, quantities(&[("p1", 2)]));
        assert_eq!(state.cart_data.unwrap().building, "5");
        assert!(state.cart_details.is_none());

        let rewritten = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(rewritten.contains("\"version\": 1"));
    }

    #[test]
    fn test_newer_version_rejected() {
        let err = PersistedState::from_json(r#"{"version": 7}"#).unwrap_err();
        assert!(matches!(
            err,
            StorageError::UnsupportedVersion { found: 7, supported: 1 }
        ));
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(matches!(
            PersistedState::from_json("[1, 2]"),
            Err(StorageError::Json(_))
        ));
    }
}
