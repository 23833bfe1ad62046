//! Core types for Baby Guard.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod address;
pub mod cart;
pub mod email;
pub mod id;
pub mod otp;
pub mod price;
pub mod role;

pub use address::Address;
pub use cart::{CartSnapshot, LineItem};
pub use email::{Email, EmailError};
pub use id::*;
pub use otp::{OTP_LENGTH, OtpCode, OtpError, digit_value};
pub use price::Price;
pub use role::{Role, RoleError};
