//! Wire types for the Baby Guard API.
//!
//! Ids may arrive as `id` or `_id`; both are accepted.

use baby_guard_core::{Address, CartId, Email, MilestoneId, Price, ProductId, QuestionId, Role, TipId, UserId};
use serde::{Deserialize, Serialize};

// =============================================================================
// Auth
// =============================================================================

/// Body of `POST /api/auth/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: Email,
    pub password: String,
}

/// Body of `POST /api/auth/signup`.
#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
}

/// Response of the signup and login endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    #[serde(default)]
    pub role: Role,
}

/// Profile returned by `GET /api/user/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(alias = "_id")]
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Role,
}

/// `{ user }` envelope of the profile endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct UserEnvelope {
    pub user: UserProfile,
}

// =============================================================================
// Products
// =============================================================================

/// A product listed in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(alias = "_id")]
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Price,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, alias = "quantity")]
    pub stock: Option<u32>,
    #[serde(default, alias = "image")]
    pub image_url: Option<String>,
}

impl Product {
    /// Whether the listing reports no units left. Unknown stock counts as available.
    #[must_use]
    pub fn is_sold_out(&self) -> bool {
        self.stock == Some(0)
    }
}

/// Filters for `GET /api/products`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProductQuery {
    pub category: Option<String>,
    pub search: Option<String>,
}

impl ProductQuery {
    /// Whether no filter is set (cacheable listing).
    #[must_use]
    pub fn is_unfiltered(&self) -> bool {
        self.category.is_none() && self.search.is_none()
    }

    pub(crate) fn pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = Vec::new();
        if let Some(category) = self.category.as_deref() {
            pairs.push(("category", category));
        }
        if let Some(search) = self.search.as_deref() {
            pairs.push(("search", search));
        }
        pairs
    }
}

// =============================================================================
// Carts
// =============================================================================

/// Body of `POST /api/carts`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateCartRequest<'a> {
    pub address: &'a Address,
}

/// Body of `POST /api/carts/:id/products`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AddLineRequest<'a> {
    pub product_id: &'a ProductId,
    pub quantity: u32,
}

/// Body of `PATCH /api/carts/:id/products/:productId`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct UpdateLineRequest {
    pub quantity: u32,
}

/// Status a cart moves to when the order is placed.
pub const ORDER_PLACED_STATUS: &str = "processing";

/// Body of `PATCH /api/carts/status/:id`.
#[derive(Debug, Clone, Serialize)]
pub struct OrderStatusUpdate {
    pub status: String,
    pub address: Address,
}

// =============================================================================
// Payment
// =============================================================================

/// Body of `POST /api/payment/verify-otp`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VerifyOtpRequest<'a> {
    pub cart_id: &'a CartId,
    pub code: String,
}

// =============================================================================
// Content
// =============================================================================

/// Body of `POST /api/tips/milestone`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MilestoneInput {
    pub title: String,
    pub description: String,
    /// Baby's age in months the milestone applies to.
    pub month: u8,
}

/// A developmental milestone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    #[serde(alias = "_id")]
    pub id: MilestoneId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub month: u8,
}

/// Body of `POST /api/tips/pregnancy-tip`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PregnancyTipInput {
    pub title: String,
    pub description: String,
    /// Pregnancy week the tip applies to.
    pub week: u8,
}

/// A weekly pregnancy tip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PregnancyTip {
    #[serde(alias = "_id")]
    pub id: TipId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub week: u8,
}

/// Body of `POST /api/questions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionInput {
    pub text: String,
    pub options: Vec<String>,
    /// Index into `options` of the correct answer.
    pub answer: usize,
}

/// A quiz question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    #[serde(alias = "_id")]
    pub id: QuestionId,
    #[serde(alias = "question")]
    pub text: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub answer: Option<usize>,
}
