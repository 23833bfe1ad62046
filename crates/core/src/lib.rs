//! Baby Guard Core - Shared domain types.
//!
//! This crate provides the types shared by the Baby Guard client components:
//! - `storefront` - Client library (API client, cart synchronizer, checkout)
//! - `cli` - Command-line front end
//! - `integration-tests` - Fake API server and end-to-end tests
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no storage.
//! The remote Baby Guard API owns every resource described here; these types
//! are the client's view of them.
//!
//! # Modules
//!
//! - [`types`] - Newtype ids, email, role, price, OTP code, cart and address

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
