//! In-process fake of the Baby Guard API for end-to-end tests.
//!
//! [`FakeApi::start`] binds an axum server to `127.0.0.1:0` and returns its
//! base URL. The fake keeps just enough state to behave like the real API:
//! users and bearer tokens, products with stock, one pending cart per user,
//! order placement with a fixed OTP, and admin content.
//!
//! Tests inspect and steer the fake through [`FakeApi::state`].
//!
//! ```rust,ignore
//! let fake = FakeApi::start().await;
//! let app = fake.app(tempdir.path()).await;
//! app.session().login("mona@example.com", "password123").await?;
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use baby_guard_storefront::AppState;
use baby_guard_storefront::config::StorefrontConfig;
use baby_guard_storefront::notify::RecordingNotifier;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use url::Url;

/// The code every placed order is verified with.
pub const FAKE_OTP: &str = "424242";

/// Password of the seeded accounts.
pub const SEED_PASSWORD: &str = "password123";

/// Seeded customer account.
pub const CUSTOMER_EMAIL: &str = "mona@example.com";

/// Seeded admin account.
pub const ADMIN_EMAIL: &str = "admin@example.com";

#[derive(Debug, Clone)]
pub struct FakeUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct FakeProduct {
    pub id: String,
    pub name: String,
    pub price: u32,
    pub category: String,
    pub stock: u32,
}

#[derive(Debug, Clone)]
pub struct FakeCart {
    pub id: String,
    pub owner: String,
    pub lines: Vec<(String, u32)>,
    pub status: String,
    pub address: Value,
    pub otp: Option<String>,
}

impl FakeCart {
    pub fn quantity_of(&self, product_id: &str) -> u32 {
        self.lines
            .iter()
            .filter(|(id, _)| id == product_id)
            .map(|(_, quantity)| quantity)
            .sum()
    }
}

/// Mutable state behind the fake server.
#[derive(Debug, Default)]
pub struct FakeState {
    pub users: Vec<FakeUser>,
    pub tokens: HashMap<String, String>,
    pub products: Vec<FakeProduct>,
    pub carts: Vec<FakeCart>,
    pub questions: Vec<Value>,
    pub milestones: Vec<Value>,
    pub tips: Vec<Value>,
    /// `"METHOD /path"` of every request, in arrival order.
    pub requests: Vec<String>,
    /// When set, resend-otp answers with this status instead of succeeding.
    pub resend_status: Option<u16>,
    next_id: u64,
}

impl FakeState {
    fn seeded() -> Self {
        let mut state = Self::default();
        for (name, email, role) in [
            ("Mona", CUSTOMER_EMAIL, "user"),
            ("Admin", ADMIN_EMAIL, "admin"),
        ] {
            let id = state.next_id("u");
            state.users.push(FakeUser {
                id,
                name: name.to_string(),
                email: email.to_string(),
                password: SEED_PASSWORD.to_string(),
                phone: "01000000000".to_string(),
                role: role.to_string(),
            });
        }
        for (id, name, price, category, stock) in [
            ("p-monitor", "Baby Monitor", 1200, "electronics", 5),
            ("p-bottle", "Feeding Bottle", 150, "feeding", 20),
            ("p-rattle", "Rattle", 80, "toys", 1),
            ("p-crib", "Crib", 4000, "furniture", 0),
        ] {
            state.products.push(FakeProduct {
                id: id.to_string(),
                name: name.to_string(),
                price,
                category: category.to_string(),
                stock,
            });
        }
        state
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn issue_token(&mut self, email: &str) -> String {
        let token = self.next_id("tok");
        self.tokens.insert(token.clone(), email.to_string());
        token
    }

    fn user(&self, email: &str) -> Option<&FakeUser> {
        self.users.iter().find(|user| user.email == email)
    }

    /// The pending cart of `owner`.
    pub fn pending_cart(&self, owner: &str) -> Option<&FakeCart> {
        self.carts
            .iter()
            .find(|cart| cart.owner == owner && cart.status == "pending")
    }

    pub fn cart(&self, id: &str) -> Option<&FakeCart> {
        self.carts.iter().find(|cart| cart.id == id)
    }

    fn cart_mut(&mut self, id: &str, owner: &str) -> Result<&mut FakeCart, Reply> {
        self.carts
            .iter_mut()
            .find(|cart| cart.id == id && cart.owner == owner)
            .ok_or_else(|| Reply::error(StatusCode::NOT_FOUND, "Cart not found"))
    }

    fn price_of(&self, product_id: &str) -> u32 {
        self.products
            .iter()
            .find(|product| product.id == product_id)
            .map_or(0, |product| product.price)
    }

    fn cart_json(&self, cart: &FakeCart) -> Value {
        let total: u32 = cart
            .lines
            .iter()
            .map(|(id, quantity)| self.price_of(id) * quantity)
            .sum();
        json!({
            "_id": cart.id,
            "products": cart
                .lines
                .iter()
                .map(|(id, quantity)| json!({
                    "productId": { "_id": id },
                    "quantity": quantity
                }))
                .collect::<Vec<_>>(),
            "totalPrice": total,
            "status": cart.status,
            "address": cart.address,
        })
    }

    /// Count of recorded requests whose line starts with `prefix`.
    pub fn count_requests(&self, prefix: &str) -> usize {
        self.requests
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }
}

fn product_json(product: &FakeProduct) -> Value {
    json!({
        "_id": product.id,
        "name": product.name,
        "description": format!("{} for your little one", product.name),
        "price": product.price,
        "category": product.category,
        "quantity": product.stock,
    })
}

/// Error reply in the API's `{ message, code?, errors? }` shape.
#[derive(Debug)]
pub struct Reply {
    status: StatusCode,
    body: Value,
}

impl Reply {
    fn error(status: StatusCode, message: &str) -> Self {
        Self {
            status,
            body: json!({ "message": message }),
        }
    }

    fn with_code(status: StatusCode, message: &str, code: &str) -> Self {
        Self {
            status,
            body: json!({ "message": message, "code": code }),
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

type Shared = Arc<Mutex<FakeState>>;
type Handler = Result<Json<Value>, Reply>;

fn lock(shared: &Shared) -> MutexGuard<'_, FakeState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Email of the bearer, or 401.
fn bearer(state: &FakeState, headers: &HeaderMap) -> Result<String, Reply> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .and_then(|token| state.tokens.get(token))
        .cloned()
        .ok_or_else(|| Reply::error(StatusCode::UNAUTHORIZED, "Not authorized, token failed"))
}

fn admin(state: &FakeState, headers: &HeaderMap) -> Result<String, Reply> {
    let email = bearer(state, headers)?;
    match state.user(&email) {
        Some(user) if user.role == "admin" => Ok(email),
        _ => Err(Reply::error(StatusCode::FORBIDDEN, "Admin access required")),
    }
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Deserialize)]
struct SignupBody {
    name: String,
    email: String,
    password: String,
    phone: String,
}

async fn signup(State(shared): State<Shared>, Json(body): Json<SignupBody>) -> Handler {
    let mut state = lock(&shared);
    if state.user(&body.email).is_some() {
        return Err(Reply {
            status: StatusCode::BAD_REQUEST,
            body: json!({
                "message": "Validation failed",
                "errors": [{ "path": "email", "msg": "Email already registered" }]
            }),
        });
    }
    let id = state.next_id("u");
    state.users.push(FakeUser {
        id,
        name: body.name,
        email: body.email.clone(),
        password: body.password,
        phone: body.phone,
        role: "user".to_string(),
    });
    let token = state.issue_token(&body.email);
    Ok(Json(json!({ "token": token, "role": "user" })))
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

async fn login(State(shared): State<Shared>, Json(body): Json<LoginBody>) -> Handler {
    let mut state = lock(&shared);
    let role = match state.user(&body.email) {
        Some(user) if user.password == body.password => user.role.clone(),
        _ => return Err(Reply::error(StatusCode::UNAUTHORIZED, "Invalid credentials")),
    };
    let token = state.issue_token(&body.email);
    Ok(Json(json!({ "token": token, "role": role })))
}

async fn me(State(shared): State<Shared>, headers: HeaderMap) -> Handler {
    let state = lock(&shared);
    let email = bearer(&state, &headers)?;
    let user = state
        .user(&email)
        .ok_or_else(|| Reply::error(StatusCode::NOT_FOUND, "User not found"))?;
    Ok(Json(json!({
        "user": {
            "_id": user.id,
            "name": user.name,
            "email": user.email,
            "phone": user.phone,
            "role": user.role,
        }
    })))
}

#[derive(Deserialize)]
struct ProductFilter {
    id: Option<String>,
    category: Option<String>,
    search: Option<String>,
}

async fn products(State(shared): State<Shared>, Query(filter): Query<ProductFilter>) -> Handler {
    let state = lock(&shared);
    let data: Vec<Value> = state
        .products
        .iter()
        .filter(|p| filter.id.as_deref().is_none_or(|id| p.id == id))
        .filter(|p| filter.category.as_deref().is_none_or(|c| p.category == c))
        .filter(|p| {
            filter
                .search
                .as_deref()
                .is_none_or(|s| p.name.to_lowercase().contains(&s.to_lowercase()))
        })
        .map(product_json)
        .collect();
    Ok(Json(json!({ "data": data })))
}

async fn pending_cart(State(shared): State<Shared>, headers: HeaderMap) -> Handler {
    let state = lock(&shared);
    let owner = bearer(&state, &headers)?;
    let cart = state
        .pending_cart(&owner)
        .ok_or_else(|| Reply::error(StatusCode::NOT_FOUND, "No pending cart found"))?;
    Ok(Json(json!({ "data": state.cart_json(cart) })))
}

#[derive(Deserialize)]
struct CreateCartBody {
    address: Value,
}

async fn create_cart(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<CreateCartBody>,
) -> Handler {
    let mut state = lock(&shared);
    let owner = bearer(&state, &headers)?;
    let id = state.next_id("cart");
    let cart = FakeCart {
        id,
        owner,
        lines: Vec::new(),
        status: "pending".to_string(),
        address: body.address,
        otp: None,
    };
    let json = state.cart_json(&cart);
    state.carts.push(cart);
    Ok(Json(json!({ "data": json })))
}

#[derive(Deserialize)]
struct StatusBody {
    status: String,
    address: Value,
}

async fn update_cart_status(
    State(shared): State<Shared>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<String>,
    Json(body): Json<StatusBody>,
) -> Handler {
    let mut state = lock(&shared);
    let owner = bearer(&state, &headers)?;
    let cart = state.cart_mut(&id, &owner)?;
    if cart.status != "pending" {
        return Err(Reply::error(StatusCode::BAD_REQUEST, "Order already placed"));
    }
    if cart.lines.is_empty() {
        return Err(Reply::error(StatusCode::BAD_REQUEST, "Cart is empty"));
    }
    cart.status = body.status;
    cart.address = body.address;
    cart.otp = Some(FAKE_OTP.to_string());
    Ok(Json(json!({ "message": "OTP sent" })))
}

async fn delete_cart(
    State(shared): State<Shared>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<String>,
) -> Handler {
    let mut state = lock(&shared);
    let owner = bearer(&state, &headers)?;
    state.cart_mut(&id, &owner)?;
    state.carts.retain(|cart| cart.id != id);
    Ok(Json(json!({ "message": "Cart deleted" })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddLineBody {
    product_id: String,
    quantity: u32,
}

async fn add_line(
    State(shared): State<Shared>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<String>,
    Json(body): Json<AddLineBody>,
) -> Handler {
    let mut state = lock(&shared);
    let owner = bearer(&state, &headers)?;
    let stock = state
        .products
        .iter()
        .find(|p| p.id == body.product_id)
        .map(|p| p.stock)
        .ok_or_else(|| Reply::error(StatusCode::NOT_FOUND, "Product not found"))?;

    let cart = state.cart_mut(&id, &owner)?;
    let wanted = cart.quantity_of(&body.product_id) + body.quantity;
    if wanted > stock {
        return Err(Reply::with_code(
            StatusCode::BAD_REQUEST,
            &format!("Only {stock} left in stock"),
            "OUT_OF_STOCK",
        ));
    }
    match cart.lines.iter_mut().find(|(pid, _)| *pid == body.product_id) {
        Some((_, quantity)) => *quantity = wanted,
        None => cart.lines.push((body.product_id, body.quantity)),
    }
    Ok(Json(json!({ "message": "Product added" })))
}

#[derive(Deserialize)]
struct UpdateLineBody {
    quantity: u32,
}

async fn update_line(
    State(shared): State<Shared>,
    headers: HeaderMap,
    UrlPath((id, product_id)): UrlPath<(String, String)>,
    Json(body): Json<UpdateLineBody>,
) -> Handler {
    let mut state = lock(&shared);
    let owner = bearer(&state, &headers)?;
    if body.quantity == 0 {
        return Err(Reply::error(StatusCode::BAD_REQUEST, "Quantity must be positive"));
    }
    let cart = state.cart_mut(&id, &owner)?;
    let (_, quantity) = cart
        .lines
        .iter_mut()
        .find(|(pid, _)| *pid == product_id)
        .ok_or_else(|| Reply::error(StatusCode::NOT_FOUND, "Product not in cart"))?;
    *quantity = body.quantity;
    Ok(Json(json!({ "message": "Quantity updated" })))
}

async fn remove_line(
    State(shared): State<Shared>,
    headers: HeaderMap,
    UrlPath((id, product_id)): UrlPath<(String, String)>,
) -> Handler {
    let mut state = lock(&shared);
    let owner = bearer(&state, &headers)?;
    let cart = state.cart_mut(&id, &owner)?;
    cart.lines.retain(|(pid, _)| *pid != product_id);
    Ok(Json(json!({ "message": "Product removed" })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyBody {
    cart_id: String,
    code: String,
}

async fn verify_otp(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<VerifyBody>,
) -> Handler {
    let mut state = lock(&shared);
    let owner = bearer(&state, &headers)?;
    let cart = state.cart_mut(&body.cart_id, &owner)?;
    if cart.status != "processing" || cart.otp.as_deref() != Some(body.code.as_str()) {
        return Err(Reply::error(StatusCode::BAD_REQUEST, "Invalid or expired OTP"));
    }
    cart.status = "paid".to_string();
    cart.otp = None;
    Ok(Json(json!({ "message": "Payment verified" })))
}

async fn resend_otp(
    State(shared): State<Shared>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<String>,
) -> Handler {
    let mut state = lock(&shared);
    let owner = bearer(&state, &headers)?;
    if let Some(status) = state.resend_status {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST);
        return Err(Reply::error(status, "Resend refused"));
    }
    let cart = state.cart_mut(&id, &owner)?;
    if cart.status != "processing" {
        return Err(Reply::error(StatusCode::BAD_REQUEST, "No payment in progress"));
    }
    cart.otp = Some(FAKE_OTP.to_string());
    Ok(Json(json!({ "message": "OTP resent" })))
}

async fn cancel_payment(
    State(shared): State<Shared>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<String>,
) -> Handler {
    let mut state = lock(&shared);
    let owner = bearer(&state, &headers)?;
    let cart = state.cart_mut(&id, &owner)?;
    if cart.status != "processing" {
        return Err(Reply::error(
            StatusCode::BAD_REQUEST,
            "Order can no longer be cancelled",
        ));
    }
    cart.status = "cancelled".to_string();
    cart.otp = None;
    Ok(Json(json!({ "message": "Payment cancelled" })))
}

async fn create_milestone(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(mut body): Json<Value>,
) -> Handler {
    let mut state = lock(&shared);
    admin(&state, &headers)?;
    body["_id"] = json!(state.next_id("m"));
    state.milestones.push(body.clone());
    Ok(Json(json!({ "data": body })))
}

async fn create_tip(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(mut body): Json<Value>,
) -> Handler {
    let mut state = lock(&shared);
    admin(&state, &headers)?;
    body["_id"] = json!(state.next_id("t"));
    state.tips.push(body.clone());
    Ok(Json(json!({ "data": body })))
}

async fn questions(State(shared): State<Shared>) -> Handler {
    let state = lock(&shared);
    Ok(Json(json!({ "data": state.questions })))
}

async fn create_question(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(mut body): Json<Value>,
) -> Handler {
    let mut state = lock(&shared);
    admin(&state, &headers)?;
    body["_id"] = json!(state.next_id("q"));
    state.questions.push(body.clone());
    Ok(Json(json!({ "data": body })))
}

fn router(shared: Shared) -> Router {
    let log = Arc::clone(&shared);
    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/api/user/me", get(me))
        .route("/api/products", get(products))
        .route("/api/carts", post(create_cart))
        .route("/api/carts/pending", get(pending_cart))
        .route("/api/carts/status/{id}", patch(update_cart_status))
        .route("/api/carts/{id}", delete(delete_cart))
        .route("/api/carts/{id}/products", post(add_line))
        .route(
            "/api/carts/{id}/products/{product_id}",
            patch(update_line).delete(remove_line),
        )
        .route("/api/payment/verify-otp", post(verify_otp))
        .route("/api/payment/resend-otp/{id}", patch(resend_otp))
        .route("/api/payment/cancel/{id}", delete(cancel_payment))
        .route("/api/tips/milestone", post(create_milestone))
        .route("/api/tips/pregnancy-tip", post(create_tip))
        .route("/api/questions", get(questions).post(create_question))
        .layer(axum::middleware::from_fn(
            move |request: axum::extract::Request, next: axum::middleware::Next| {
                let log = Arc::clone(&log);
                async move {
                    let line = format!("{} {}", request.method(), request.uri().path());
                    lock(&log).requests.push(line);
                    next.run(request).await
                }
            },
        ))
        .with_state(shared)
}

// =============================================================================
// Server handle
// =============================================================================

/// A running fake API. The server stops when this is dropped.
pub struct FakeApi {
    base_url: Url,
    state: Shared,
    shutdown: Option<oneshot::Sender<()>>,
}

impl FakeApi {
    /// Start the fake on an ephemeral port with seeded users and products.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    #[allow(clippy::unwrap_used)]
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(FakeState::seeded()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, rx) = oneshot::channel::<()>();

        let app = router(Arc::clone(&state));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await;
        });

        Self {
            base_url: Url::parse(&format!("http://{addr}")).unwrap(),
            state,
            shutdown: Some(shutdown),
        }
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Lock the fake's state for inspection or steering.
    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        lock(&self.state)
    }

    /// Client configuration pointing at this fake.
    #[must_use]
    pub fn config(&self, state_path: &Path) -> StorefrontConfig {
        StorefrontConfig::for_api(self.base_url.clone(), state_path)
    }

    /// A fully wired client state whose notices are recorded.
    ///
    /// # Panics
    ///
    /// Panics if the application state cannot be built.
    pub async fn app(&self, state_path: &Path) -> (AppState, RecordingNotifier) {
        self.app_with(self.config(state_path)).await
    }

    /// Like [`app`](Self::app) with a caller-tuned configuration.
    ///
    /// # Panics
    ///
    /// Panics if the application state cannot be built.
    #[allow(clippy::unwrap_used)]
    pub async fn app_with(&self, config: StorefrontConfig) -> (AppState, RecordingNotifier) {
        let notifier = RecordingNotifier::new();
        let app = AppState::new(config, Arc::new(notifier.clone()))
            .await
            .unwrap();
        (app, notifier)
    }
}

impl Drop for FakeApi {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
