//! Baby Guard storefront client library.
//!
//! Talks to the Baby Guard REST API and keeps a small amount of local state
//! in step with it: the session credential and the user's pending cart.
//!
//! # Services
//!
//! - [`session::SessionService`] - signup, login, logout, session restore
//! - [`cart::CartSynchronizer`] - optimistic cart edits reconciled with the server
//! - [`checkout::Checkout`] - order placement and the OTP payment flow
//! - [`catalog::CatalogService`] - cached product listings
//! - [`content::ContentService`] - admin milestones, tips and quiz questions
//!
//! All services are built once by [`state::AppState`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod content;
pub mod error;
pub mod notify;
pub mod session;
pub mod state;
pub mod storage;
pub mod telemetry;
pub mod view;

pub use error::{ClientError, Result};
pub use state::AppState;
