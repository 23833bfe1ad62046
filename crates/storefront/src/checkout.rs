//! Order placement and OTP payment verification.
//!
//! Placing an order moves the pending cart to `processing`; the server then
//! texts a six-digit code which the user enters in an [`OtpFlow`]:
//!
//! ```text
//! Entering --submit--> Submitting --ok--> Verified
//!    ^                     |
//!    +---- next edit ---- Failed
//!
//! any non-terminal state --cancel--> Cancelled
//! ```
//!
//! A resend cooldown runs alongside the main state. It starts when the flow
//! is created because the server has just sent a code.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use baby_guard_core::{Address, CartId, OTP_LENGTH, OtpCode, OtpError, Price, digit_value};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::instrument;

use crate::api::ApiClient;
use crate::api::types::{ORDER_PLACED_STATUS, OrderStatusUpdate};
use crate::cart::{CartApi, CartSynchronizer};
use crate::error::{ClientError, FieldErrors, Result, add_breadcrumb, report};
use crate::notify::{Notice, Notifier};
use crate::storage::LocalStore;
use crate::view::{Route, ViewScope};

const VERIFY_FAILED: &str = "Failed to verify the code";
const RELOGIN: &str = "Your session has expired. Please log in again.";
const TOO_MANY_ATTEMPTS: &str = "Too many attempts. Please try again later.";

/// Remote payment operations used by the checkout.
pub trait PaymentApi: Send + Sync + 'static {
    /// Move the cart to the placed status with the delivery address.
    fn place_order(
        &self,
        cart_id: &CartId,
        update: &OrderStatusUpdate,
    ) -> impl Future<Output = Result<()>> + Send;

    fn verify_otp(&self, cart_id: &CartId, code: &OtpCode)
    -> impl Future<Output = Result<()>> + Send;

    fn resend_otp(&self, cart_id: &CartId) -> impl Future<Output = Result<()>> + Send;

    fn cancel_payment(&self, cart_id: &CartId) -> impl Future<Output = Result<()>> + Send;
}

impl PaymentApi for ApiClient {
    async fn place_order(&self, cart_id: &CartId, update: &OrderStatusUpdate) -> Result<()> {
        Ok(self.update_cart_status(cart_id, update).await?)
    }

    async fn verify_otp(&self, cart_id: &CartId, code: &OtpCode) -> Result<()> {
        Ok(Self::verify_otp(self, cart_id, code).await?)
    }

    async fn resend_otp(&self, cart_id: &CartId) -> Result<()> {
        Ok(Self::resend_otp(self, cart_id).await?)
    }

    async fn cancel_payment(&self, cart_id: &CartId) -> Result<()> {
        Ok(Self::cancel_payment(self, cart_id).await?)
    }
}

/// What the user is paying for, as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSummary {
    pub cart_id: CartId,
    /// Server-computed total. Never recomputed locally.
    pub total_price: Price,
    pub item_count: u32,
}

/// Places orders and opens OTP flows.
pub struct Checkout<P = ApiClient, A = ApiClient> {
    payment: Arc<P>,
    cart: CartSynchronizer<A>,
    store: LocalStore,
    notifier: Arc<dyn Notifier>,
    otp_cooldown: Duration,
}

impl<P, A> Clone for Checkout<P, A> {
    fn clone(&self) -> Self {
        Self {
            payment: Arc::clone(&self.payment),
            cart: self.cart.clone(),
            store: self.store.clone(),
            notifier: Arc::clone(&self.notifier),
            otp_cooldown: self.otp_cooldown,
        }
    }
}

impl<P: PaymentApi, A: CartApi> Checkout<P, A> {
    pub fn new(
        payment: P,
        cart: CartSynchronizer<A>,
        store: LocalStore,
        notifier: Arc<dyn Notifier>,
        otp_cooldown: Duration,
    ) -> Self {
        Self {
            payment: Arc::new(payment),
            cart,
            store,
            notifier,
            otp_cooldown,
        }
    }

    /// Place the order for the stored cart and start OTP entry.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for a blank address field,
    /// `ClientError::MissingCartId` when no cart is stored, or any error from
    /// the status update.
    #[instrument(skip(self, address))]
    pub async fn place_order(&self, address: &Address) -> Result<OtpFlow<P, A>> {
        add_breadcrumb("checkout", "Place order", None);
        self.place_order_inner(address)
            .await
            .map_err(|e| {
                report(self.notifier.as_ref(), "checkout.place_order", &e, None);
                e
            })
    }

    async fn place_order_inner(&self, address: &Address) -> Result<OtpFlow<P, A>> {
        let mut fields = FieldErrors::default();
        for field in address.missing_fields() {
            fields.add(field, "This field is required");
        }
        fields.into_result()?;

        let cart_id = self.cart.cart_id().await.ok_or(ClientError::MissingCartId)?;
        self.store.set_cart_data(address).await?;

        let summary = OrderSummary {
            cart_id: cart_id.clone(),
            total_price: self
                .cart
                .snapshot()
                .await
                .map(|snapshot| snapshot.total_price)
                .unwrap_or_default(),
            item_count: self.cart.item_count().await,
        };

        let update = OrderStatusUpdate {
            status: ORDER_PLACED_STATUS.to_string(),
            address: address.clone(),
        };
        self.payment.place_order(&cart_id, &update).await?;
        tracing::info!(cart_id = %cart_id, total = %summary.total_price, "Order placed");

        if let Err(e) = self.cart.reset().await {
            tracing::warn!(error = %e, "Failed to reset local cart after placing order");
        }
        self.notifier.notify(Notice::success(
            "Order placed. Enter the code we sent to your phone.",
        ));

        Ok(self.otp_flow(cart_id).with_summary(summary))
    }

    /// Open an OTP flow for an order that was already placed.
    #[must_use]
    pub fn otp_flow(&self, cart_id: CartId) -> OtpFlow<P, A> {
        OtpFlow {
            payment: Arc::clone(&self.payment),
            cart: self.cart.clone(),
            notifier: Arc::clone(&self.notifier),
            cart_id,
            summary: None,
            digits: [None; OTP_LENGTH],
            state: OtpState::Entering,
            cooldown: Arc::new(Mutex::new(ResendCooldown::started(self.otp_cooldown))),
        }
    }
}

// =============================================================================
// Cooldown
// =============================================================================

/// Fixed-window resend cooldown.
#[derive(Debug, Clone, Copy)]
pub struct ResendCooldown {
    window: Duration,
    deadline: Instant,
}

impl ResendCooldown {
    /// A cooldown that is active from now.
    #[must_use]
    pub fn started(window: Duration) -> Self {
        Self {
            window,
            deadline: Instant::now() + window,
        }
    }

    pub fn restart(&mut self) {
        self.deadline = Instant::now() + self.window;
    }

    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Remaining whole seconds, rounded up.
    #[must_use]
    pub fn remaining_secs(&self) -> u64 {
        let remaining = self.remaining();
        remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.remaining().is_zero()
    }

    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }
}

// =============================================================================
// OTP flow
// =============================================================================

/// Where an OTP flow stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpState {
    Entering,
    Submitting,
    Verified,
    Failed,
    Cancelled,
}

impl OtpState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Verified | Self::Cancelled)
    }
}

/// A single OTP attempt bound to one placed order.
///
/// Digits live only in memory and are dropped with the flow.
pub struct OtpFlow<P = ApiClient, A = ApiClient> {
    payment: Arc<P>,
    cart: CartSynchronizer<A>,
    notifier: Arc<dyn Notifier>,
    cart_id: CartId,
    summary: Option<OrderSummary>,
    digits: [Option<u8>; OTP_LENGTH],
    state: OtpState,
    cooldown: Arc<Mutex<ResendCooldown>>,
}

impl<P, A> OtpFlow<P, A> {
    /// Number of filled digit slots.
    pub fn entered(&self) -> usize {
        self.digits.iter().flatten().count()
    }
}

impl<P, A> std::fmt::Debug for OtpFlow<P, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpFlow")
            .field("cart_id", &self.cart_id)
            .field("state", &self.state)
            .field("entered", &self.entered())
            .finish_non_exhaustive()
    }
}

impl<P: PaymentApi, A: CartApi> OtpFlow<P, A> {
    fn with_summary(mut self, summary: OrderSummary) -> Self {
        self.summary = Some(summary);
        self
    }

    pub const fn cart_id(&self) -> &CartId {
        &self.cart_id
    }

    pub const fn state(&self) -> OtpState {
        self.state
    }

    /// Order summary, when the flow was opened by placing the order.
    pub const fn summary(&self) -> Option<&OrderSummary> {
        self.summary.as_ref()
    }

    // =========================================================================
    // Digit entry
    // =========================================================================

    /// The code, once every slot is filled.
    pub fn code(&self) -> Option<OtpCode> {
        let mut digits = [0u8; OTP_LENGTH];
        for (slot, digit) in digits.iter_mut().zip(self.digits) {
            *slot = digit?;
        }
        OtpCode::from_digits(digits).ok()
    }

    /// Slots rendered for display, `_` for empty ones.
    pub fn display(&self) -> String {
        self.digits
            .iter()
            .map(|digit| digit.map_or('_', |d| char::from(b'0' + d)))
            .collect()
    }

    /// Put a digit into slot `index`.
    ///
    /// # Errors
    ///
    /// Returns an error for a slot outside the code or a non-digit character.
    pub fn set_digit(&mut self, index: usize, ch: char) -> std::result::Result<(), OtpError> {
        let slot = self.digits.get_mut(index).ok_or(OtpError::Position(index))?;
        *slot = Some(digit_value(ch)?);
        self.edited();
        Ok(())
    }

    /// Empty slot `index`.
    ///
    /// # Errors
    ///
    /// Returns an error for a slot outside the code.
    pub fn clear_digit(&mut self, index: usize) -> std::result::Result<(), OtpError> {
        let slot = self.digits.get_mut(index).ok_or(OtpError::Position(index))?;
        *slot = None;
        self.edited();
        Ok(())
    }

    /// Fill the slots from pasted text, using its first six ASCII digits.
    ///
    /// Other characters are skipped. Returns how many slots were filled.
    ///
    /// # Errors
    ///
    /// Returns `OtpError::Length(0)` when the text holds no digit at all.
    pub fn paste(&mut self, text: &str) -> std::result::Result<usize, OtpError> {
        let pasted: Vec<u8> = text
            .chars()
            .filter(char::is_ascii_digit)
            .take(OTP_LENGTH)
            .map(digit_value)
            .collect::<std::result::Result<_, _>>()?;
        if pasted.is_empty() {
            return Err(OtpError::Length(0));
        }

        self.digits = [None; OTP_LENGTH];
        for (slot, digit) in self.digits.iter_mut().zip(&pasted) {
            *slot = Some(*digit);
        }
        self.edited();
        Ok(pasted.len())
    }

    /// Empty every slot.
    pub fn clear(&mut self) {
        self.digits = [None; OTP_LENGTH];
        self.edited();
    }

    fn edited(&mut self) {
        if self.state == OtpState::Failed {
            self.state = OtpState::Entering;
        }
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Verify the entered code.
    ///
    /// Returns [`Route::Home`] once verified and [`Route::Login`] when the
    /// session was rejected.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::IncompleteOtp` without any request when fewer
    /// than six digits are entered, or the verification error.
    #[instrument(skip(self), fields(cart_id = %self.cart_id))]
    pub async fn submit(&mut self) -> Result<Route> {
        self.ensure_open()?;
        let Some(code) = self.code() else {
            let err = ClientError::IncompleteOtp {
                entered: self.entered(),
            };
            return Err(self.fail("otp.submit", err, None));
        };

        add_breadcrumb("checkout", "Submit OTP", Some(&[("cart_id", self.cart_id.as_str())]));
        self.state = OtpState::Submitting;

        match self.payment.verify_otp(&self.cart_id, &code).await {
            Ok(()) => {
                self.state = OtpState::Verified;
                tracing::info!(cart_id = %self.cart_id, "Payment verified");
                self.replace_cart().await;
                self.notifier
                    .notify(Notice::success("Payment confirmed. Thank you for your order!"));
                Ok(Route::Home)
            }
            Err(e @ ClientError::Unauthorized(_)) => {
                self.state = OtpState::Failed;
                self.fail("otp.submit", e, Some(RELOGIN.to_string()));
                Ok(Route::Login)
            }
            Err(e) => {
                self.state = OtpState::Failed;
                let message = e.server_message().unwrap_or(VERIFY_FAILED).to_string();
                Err(self.fail("otp.submit", e, Some(message)))
            }
        }
    }

    /// Ask the server for a new code.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::CooldownActive` without any request while the
    /// cooldown runs, or the resend error. A failed request leaves the
    /// cooldown unchanged.
    #[instrument(skip(self), fields(cart_id = %self.cart_id))]
    pub async fn resend(&mut self) -> Result<()> {
        self.ensure_open()?;
        let cooldown = *self.cooldown.lock().unwrap_or_else(PoisonError::into_inner);
        if cooldown.is_active() {
            let err = ClientError::CooldownActive {
                remaining_secs: cooldown.remaining_secs(),
            };
            return Err(self.fail("otp.resend", err, None));
        }

        match self.payment.resend_otp(&self.cart_id).await {
            Ok(()) => {
                self.digits = [None; OTP_LENGTH];
                self.state = OtpState::Entering;
                self.cooldown
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .restart();
                self.notifier.notify(Notice::success("A new code has been sent."));
                Ok(())
            }
            Err(e) => {
                let message = match e.status() {
                    Some(429) => Some(TOO_MANY_ATTEMPTS.to_string()),
                    Some(400) => Some(format!(
                        "Please wait {} seconds before requesting a new code.",
                        cooldown.window().as_secs()
                    )),
                    _ => None,
                };
                Err(self.fail("otp.resend", e, message))
            }
        }
    }

    /// Cancel the pending payment and start over with an empty cart.
    ///
    /// Returns [`Route::Cart`] once cancelled and [`Route::Login`] when the
    /// session was rejected.
    ///
    /// # Errors
    ///
    /// Returns the cancellation error.
    #[instrument(skip(self), fields(cart_id = %self.cart_id))]
    pub async fn cancel(&mut self) -> Result<Route> {
        self.ensure_open()?;

        match self.payment.cancel_payment(&self.cart_id).await {
            Ok(()) => {
                self.state = OtpState::Cancelled;
                tracing::info!(cart_id = %self.cart_id, "Payment cancelled");
                self.replace_cart().await;
                self.notifier.notify(Notice::info("Order cancelled."));
                Ok(Route::Cart)
            }
            Err(e @ ClientError::Unauthorized(_)) => {
                self.fail("otp.cancel", e, Some(RELOGIN.to_string()));
                Ok(Route::Login)
            }
            Err(e) => {
                let message = match e.status() {
                    Some(404) => Some("Order not found.".to_string()),
                    Some(400) => Some("This order can no longer be cancelled.".to_string()),
                    _ => None,
                };
                Err(self.fail("otp.cancel", e, message))
            }
        }
    }

    /// Publish the remaining cooldown once per second until it reaches zero
    /// or `scope` ends.
    pub fn countdown(&self, scope: &ViewScope) -> watch::Receiver<u64> {
        let cooldown = Arc::clone(&self.cooldown);
        let remaining = move || {
            cooldown
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remaining_secs()
        };

        let (tx, rx) = watch::channel(remaining());
        let token = scope.token();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.tick().await;
            loop {
                let secs = remaining();
                if tx.send(secs).is_err() || secs == 0 {
                    break;
                }
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
            }
            tracing::debug!("Cooldown ticker stopped");
        });
        rx
    }

    /// Remaining cooldown in whole seconds.
    pub fn cooldown_secs(&self) -> u64 {
        self.cooldown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remaining_secs()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn ensure_open(&self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(ClientError::InvalidState(
                "This payment is already finished.".to_string(),
            ));
        }
        Ok(())
    }

    /// Clear the finished order locally and open a fresh empty cart.
    async fn replace_cart(&self) {
        if let Err(e) = self.cart.reset().await {
            tracing::warn!(error = %e, "Failed to reset local cart");
        }
        // provision_cart reports its own failure; the next add retries lazily
        if let Err(e) = self.cart.provision_cart().await {
            tracing::warn!(error = %e, "Failed to provision a new cart");
        }
    }

    fn fail(&self, context: &str, err: ClientError, message: Option<String>) -> ClientError {
        report(self.notifier.as_ref(), context, &err, message);
        err
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use baby_guard_core::ProductId;

    use super::*;
    use crate::cart::tests::{FakeCartApi, synchronizer};
    use crate::notify::RecordingNotifier;

    #[derive(Default)]
    struct FakePaymentApi {
        calls: AtomicUsize,
        fail_next: Mutex<Option<ClientError>>,
        last_update: Mutex<Option<OrderStatusUpdate>>,
    }

    impl FakePaymentApi {
        fn failing(err: ClientError) -> Self {
            let fake = Self::default();
            *fake.fail_next.lock().unwrap() = Some(err);
            fake
        }

        fn respond(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.fail_next.lock().unwrap().take().map_or(Ok(()), Err)
        }
    }

    impl PaymentApi for FakePaymentApi {
        async fn place_order(&self, _cart_id: &CartId, update: &OrderStatusUpdate) -> Result<()> {
            *self.last_update.lock().unwrap() = Some(update.clone());
            self.respond()
        }

        async fn verify_otp(&self, _cart_id: &CartId, _code: &OtpCode) -> Result<()> {
            self.respond()
        }

        async fn resend_otp(&self, _cart_id: &CartId) -> Result<()> {
            self.respond()
        }

        async fn cancel_payment(&self, _cart_id: &CartId) -> Result<()> {
            self.respond()
        }
    }

    struct Harness {
        checkout: Checkout<FakePaymentApi, FakeCartApi>,
        cart: CartSynchronizer<FakeCartApi>,
        store: LocalStore,
        notifier: RecordingNotifier,
    }

    async fn harness(payment: FakePaymentApi) -> Harness {
        let (cart, store, notifier) =
            synchronizer(FakeCartApi::with_cart("placed", &[("A", 2)])).await;
        cart.refresh().await.unwrap();
        let checkout = Checkout::new(
            payment,
            cart.clone(),
            store.clone(),
            Arc::new(notifier.clone()),
            Duration::from_secs(30),
        );
        Harness {
            checkout,
            cart,
            store,
            notifier,
        }
    }

    fn calls(h: &Harness) -> usize {
        h.checkout.payment.calls.load(Ordering::SeqCst)
    }

    fn address() -> Address {
        Address {
            city: "Cairo".to_string(),
            street: "Nile St".to_string(),
            building: "12".to_string(),
            phone: "01000000000".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_place_order_resets_cart_and_opens_flow() {
        let h = harness(FakePaymentApi::default()).await;

        let flow = h.checkout.place_order(&address()).await.unwrap();

        assert_eq!(flow.cart_id(), &CartId::new("placed"));
        assert_eq!(flow.state(), OtpState::Entering);
        assert_eq!(flow.summary().unwrap().item_count, 2);
        let update = h.checkout.payment.last_update.lock().unwrap().clone().unwrap();
        assert_eq!(update.status, "processing");
        assert_eq!(update.address, address());
        assert!(h.store.cart_id().await.is_none());
        assert_eq!(h.cart.quantity(&ProductId::new("A")).await, 0);
        assert!(flow.cooldown_secs() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_place_order_without_cart_makes_no_call() {
        let h = harness(FakePaymentApi::default()).await;
        h.cart.reset().await.unwrap();

        let err = h.checkout.place_order(&address()).await.unwrap_err();

        assert!(matches!(err, ClientError::MissingCartId));
        assert_eq!(calls(&h), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_place_order_validates_address() {
        let h = harness(FakePaymentApi::default()).await;
        let mut blank = address();
        blank.city = "  ".to_string();

        let err = h.checkout.place_order(&blank).await.unwrap_err();

        let ClientError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        assert!(fields.get("city").is_some());
        assert_eq!(calls(&h), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incomplete_code_never_calls_server() {
        let h = harness(FakePaymentApi::default()).await;
        let mut flow = h.checkout.otp_flow(CartId::new("placed"));
        flow.paste("123").unwrap();

        let err = flow.submit().await.unwrap_err();

        assert!(matches!(err, ClientError::IncompleteOtp { entered: 3 }));
        assert_eq!(calls(&h), 0);
        assert_eq!(
            h.notifier.last().unwrap().message,
            "Please enter all 6 digits of the code."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_success_provisions_new_cart() {
        let h = harness(FakePaymentApi::default()).await;
        let mut flow = h.checkout.otp_flow(CartId::new("placed"));
        flow.paste("12-34-56").unwrap();
        assert_eq!(flow.display(), "123456");

        let route = flow.submit().await.unwrap();

        assert_eq!(route, Route::Home);
        assert_eq!(flow.state(), OtpState::Verified);
        assert_eq!(h.store.cart_id().await, Some(CartId::new("cart-1")));
        assert_eq!(h.cart.item_count().await, 0);
        assert!(flow.submit().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_failure_then_edit_returns_to_entering() {
        let h = harness(FakePaymentApi::failing(ClientError::BadRequest(
            "Invalid OTP".to_string(),
        )))
        .await;
        let mut flow = h.checkout.otp_flow(CartId::new("placed"));
        flow.paste("000000").unwrap();

        assert!(flow.submit().await.is_err());
        assert_eq!(flow.state(), OtpState::Failed);
        assert_eq!(h.notifier.last().unwrap().message, "Invalid OTP");

        flow.set_digit(5, '1').unwrap();
        assert_eq!(flow.state(), OtpState::Entering);
        assert_eq!(flow.submit().await.unwrap(), Route::Home);
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_unauthorized_routes_to_login() {
        let h = harness(FakePaymentApi::failing(ClientError::Unauthorized(
            String::new(),
        )))
        .await;
        let mut flow = h.checkout.otp_flow(CartId::new("placed"));
        flow.paste("111111").unwrap();

        assert_eq!(flow.submit().await.unwrap(), Route::Login);
        assert_eq!(h.notifier.last().unwrap().message, RELOGIN);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resend_refused_during_cooldown() {
        let h = harness(FakePaymentApi::default()).await;
        let mut flow = h.checkout.otp_flow(CartId::new("placed"));

        let err = flow.resend().await.unwrap_err();

        assert!(matches!(err, ClientError::CooldownActive { remaining_secs: 30 }));
        assert_eq!(calls(&h), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resend_after_cooldown_restarts_it() {
        let h = harness(FakePaymentApi::default()).await;
        let mut flow = h.checkout.otp_flow(CartId::new("placed"));
        flow.paste("12").unwrap();

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(flow.cooldown_secs(), 0);
        flow.resend().await.unwrap();

        assert_eq!(calls(&h), 1);
        assert_eq!(flow.entered(), 0);
        assert_eq!(flow.cooldown_secs(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resend_400_keeps_cooldown_unchanged() {
        let h = harness(FakePaymentApi::failing(ClientError::BadRequest(String::new()))).await;
        let mut flow = h.checkout.otp_flow(CartId::new("placed"));
        tokio::time::advance(Duration::from_secs(30)).await;

        assert!(flow.resend().await.is_err());

        assert_eq!(
            h.notifier.last().unwrap().message,
            "Please wait 30 seconds before requesting a new code."
        );
        assert_eq!(flow.cooldown_secs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resend_429_message() {
        let h = harness(FakePaymentApi::failing(ClientError::RateLimited(
            "slow down".to_string(),
        )))
        .await;
        let mut flow = h.checkout.otp_flow(CartId::new("placed"));
        tokio::time::advance(Duration::from_secs(30)).await;

        assert!(flow.resend().await.is_err());
        assert_eq!(h.notifier.last().unwrap().message, TOO_MANY_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_to_cart_with_new_cart() {
        let h = harness(FakePaymentApi::default()).await;
        let mut flow = h.checkout.otp_flow(CartId::new("placed"));

        assert_eq!(flow.cancel().await.unwrap(), Route::Cart);
        assert_eq!(flow.state(), OtpState::Cancelled);
        assert_eq!(h.store.cart_id().await, Some(CartId::new("cart-1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_not_found_message() {
        let h = harness(FakePaymentApi::failing(ClientError::NotFound(String::new()))).await;
        let mut flow = h.checkout.otp_flow(CartId::new("placed"));

        assert!(flow.cancel().await.is_err());
        assert_eq!(h.notifier.last().unwrap().message, "Order not found.");
        assert_eq!(flow.state(), OtpState::Entering);
    }

    #[tokio::test(start_paused = true)]
    async fn test_digit_entry_rejects_bad_input() {
        let h = harness(FakePaymentApi::default()).await;
        let mut flow = h.checkout.otp_flow(CartId::new("placed"));

        assert_eq!(flow.set_digit(0, 'x'), Err(OtpError::NonDigit('x')));
        assert_eq!(flow.set_digit(6, '1'), Err(OtpError::Position(6)));
        assert_eq!(flow.paste("abc"), Err(OtpError::Length(0)));

        flow.set_digit(2, '7').unwrap();
        assert_eq!(flow.display(), "__7___");
        flow.clear_digit(2).unwrap();
        assert_eq!(flow.entered(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debug_shows_progress_not_digits() {
        let h = harness(FakePaymentApi::default()).await;
        let mut flow = h.checkout.otp_flow(CartId::new("placed"));
        flow.paste("987").unwrap();

        let debug = format!("{flow:?}");
        assert!(debug.contains("entered: 3"));
        assert!(!debug.contains("987"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_ticks_down_and_stops() {
        let h = harness(FakePaymentApi::default()).await;
        let flow = h.checkout.otp_flow(CartId::new("placed"));
        let scope = ViewScope::new();
        let mut rx = flow.countdown(&scope);
        assert_eq!(*rx.borrow(), 30);

        let mut last = 30;
        while rx.changed().await.is_ok() {
            last = *rx.borrow_and_update();
        }
        assert_eq!(last, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_stops_when_scope_ends() {
        let h = harness(FakePaymentApi::default()).await;
        let flow = h.checkout.otp_flow(CartId::new("placed"));
        let scope = ViewScope::new();
        let mut rx = flow.countdown(&scope);

        tokio::time::advance(Duration::from_secs(2)).await;
        drop(scope);

        while rx.changed().await.is_ok() {}
        assert!(*rx.borrow() > 0);
    }
}
