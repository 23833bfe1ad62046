//! View lifetimes and navigation targets.
//!
//! A [`ViewScope`] lives as long as the screen that started some async work.
//! Work run through [`ViewScope::run`] is abandoned once the scope ends, so a
//! response arriving after the user navigated away is never applied.

use std::fmt;
use std::future::Future;

use baby_guard_core::CartId;
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, Result};

/// Where a flow sends the user next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Cart,
    Login,
    Checkout,
    /// OTP entry for the order placed from this cart.
    Otp(CartId),
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Home => f.write_str("/"),
            Self::Cart => f.write_str("/cart"),
            Self::Login => f.write_str("/login"),
            Self::Checkout => f.write_str("/checkout"),
            Self::Otp(cart_id) => write!(f, "/otp/{cart_id}"),
        }
    }
}

/// Cancellation scope tied to a view. Dropping the scope cancels it.
#[derive(Debug, Default)]
pub struct ViewScope {
    token: CancellationToken,
}

impl ViewScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope that ends when this one ends (or earlier, on its own).
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// End the scope. In-flight work resolves to [`ClientError::Cancelled`].
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token for tasks spawned on behalf of this scope.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Run `fut` unless the scope ends first.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Cancelled` if the scope ended before `fut`
    /// completed, otherwise whatever `fut` returns.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(ClientError::Cancelled),
            result = fut => result,
        }
    }
}

impl Drop for ViewScope {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
