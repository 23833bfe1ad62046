//! Order placement and OTP verification against the fake API.

#![allow(clippy::unwrap_used)]

use std::path::Path;
use std::time::Duration;

use baby_guard_core::{Address, ProductId};
use baby_guard_integration_tests::{CUSTOMER_EMAIL, FAKE_OTP, FakeApi, SEED_PASSWORD};
use baby_guard_storefront::checkout::OtpState;
use baby_guard_storefront::notify::RecordingNotifier;
use baby_guard_storefront::view::Route;
use baby_guard_storefront::{AppState, ClientError};
use tempfile::TempDir;

fn address() -> Address {
    Address {
        city: "Cairo".to_string(),
        street: "Nile St".to_string(),
        building: "12".to_string(),
        phone: "01012345678".to_string(),
    }
}

/// Logged-in customer with two baby monitors in the cart.
async fn shopping(fake: &FakeApi, path: &Path, cooldown: Duration) -> (AppState, RecordingNotifier) {
    let mut config = fake.config(path);
    config.otp_cooldown = cooldown;
    let (app, notifier) = fake.app_with(config).await;
    app.session().login(CUSTOMER_EMAIL, SEED_PASSWORD).await.unwrap();
    let monitor = ProductId::new("p-monitor");
    app.cart().add(&monitor).await.unwrap();
    app.cart().add(&monitor).await.unwrap();
    notifier.drain();
    (app, notifier)
}

#[tokio::test]
async fn test_verified_order_provisions_new_cart() {
    let fake = FakeApi::start().await;
    let dir = TempDir::new().unwrap();
    let (app, notifier) =
        shopping(&fake, &dir.path().join("state.json"), Duration::from_secs(60)).await;
    let placed_id = app.cart().cart_id().await.unwrap();

    let mut flow = app.checkout().place_order(&address()).await.unwrap();

    let summary = flow.summary().unwrap();
    assert_eq!(summary.cart_id, placed_id);
    assert_eq!(summary.total_price.to_string(), "2400.00");
    assert_eq!(summary.item_count, 2);
    assert!(app.cart().cart_id().await.is_none());
    {
        let state = fake.state();
        let placed = state.cart(placed_id.as_str()).unwrap();
        assert_eq!(placed.status, "processing");
        assert_eq!(placed.address["city"], "Cairo");
    }

    flow.paste(FAKE_OTP).unwrap();
    let route = flow.submit().await.unwrap();

    assert_eq!(route, Route::Home);
    assert_eq!(flow.state(), OtpState::Verified);
    let fresh_id = app.cart().cart_id().await.unwrap();
    assert_ne!(fresh_id, placed_id);
    {
        let state = fake.state();
        assert_eq!(state.cart(placed_id.as_str()).unwrap().status, "paid");
        let fresh = state.pending_cart(CUSTOMER_EMAIL).unwrap();
        assert_eq!(fresh.id, fresh_id.as_str());
        assert!(fresh.lines.is_empty());
        assert_eq!(fresh.address["phone"], "00000000000");
    }
    assert_eq!(app.cart().item_count().await, 0);
    assert_eq!(
        notifier.last().unwrap().message,
        "Payment confirmed. Thank you for your order!"
    );

    let again = flow.submit().await.unwrap_err();
    assert!(matches!(again, ClientError::InvalidState(_)));
}

#[tokio::test]
async fn test_incomplete_code_sends_nothing() {
    let fake = FakeApi::start().await;
    let dir = TempDir::new().unwrap();
    let (app, notifier) =
        shopping(&fake, &dir.path().join("state.json"), Duration::from_secs(60)).await;
    let mut flow = app.checkout().place_order(&address()).await.unwrap();

    flow.paste("42").unwrap();
    let err = flow.submit().await.unwrap_err();

    assert!(matches!(err, ClientError::IncompleteOtp { entered: 2 }));
    assert_eq!(fake.state().count_requests("POST /api/payment/verify-otp"), 0);
    assert_eq!(
        notifier.last().unwrap().message,
        "Please enter all 6 digits of the code."
    );
}

#[tokio::test]
async fn test_wrong_code_shows_server_message() {
    let fake = FakeApi::start().await;
    let dir = TempDir::new().unwrap();
    let (app, notifier) =
        shopping(&fake, &dir.path().join("state.json"), Duration::from_secs(60)).await;
    let mut flow = app.checkout().place_order(&address()).await.unwrap();

    flow.paste("000000").unwrap();
    let err = flow.submit().await.unwrap_err();

    assert!(matches!(err, ClientError::BadRequest(_)));
    assert_eq!(flow.state(), OtpState::Failed);
    assert_eq!(notifier.last().unwrap().message, "Invalid or expired OTP");

    flow.paste(FAKE_OTP).unwrap();
    assert_eq!(flow.submit().await.unwrap(), Route::Home);
}

#[tokio::test]
async fn test_resend_blocked_during_cooldown() {
    let fake = FakeApi::start().await;
    let dir = TempDir::new().unwrap();
    let (app, _notifier) =
        shopping(&fake, &dir.path().join("state.json"), Duration::from_secs(60)).await;
    let mut flow = app.checkout().place_order(&address()).await.unwrap();

    let err = flow.resend().await.unwrap_err();

    assert!(matches!(err, ClientError::CooldownActive { remaining_secs } if remaining_secs > 0));
    assert!(flow.cooldown_secs() > 0);
    assert_eq!(fake.state().count_requests("PATCH /api/payment/resend-otp"), 0);
}

#[tokio::test]
async fn test_resend_failures_map_to_messages() {
    let fake = FakeApi::start().await;
    let dir = TempDir::new().unwrap();
    let (app, notifier) = shopping(&fake, &dir.path().join("state.json"), Duration::ZERO).await;
    let mut flow = app.checkout().place_order(&address()).await.unwrap();

    fake.state().resend_status = Some(429);
    let err = flow.resend().await.unwrap_err();
    assert!(matches!(err, ClientError::RateLimited(_)));
    assert_eq!(
        notifier.last().unwrap().message,
        "Too many attempts. Please try again later."
    );

    fake.state().resend_status = Some(400);
    let err = flow.resend().await.unwrap_err();
    assert!(matches!(err, ClientError::BadRequest(_)));
    assert_eq!(
        notifier.last().unwrap().message,
        "Please wait 0 seconds before requesting a new code."
    );

    fake.state().resend_status = None;
    flow.paste("12").unwrap();
    flow.resend().await.unwrap();
    assert_eq!(flow.entered(), 0);
    assert_eq!(flow.state(), OtpState::Entering);
    assert_eq!(notifier.last().unwrap().message, "A new code has been sent.");
    assert_eq!(fake.state().count_requests("PATCH /api/payment/resend-otp"), 3);
}

#[tokio::test]
async fn test_cancel_returns_to_cart() {
    let fake = FakeApi::start().await;
    let dir = TempDir::new().unwrap();
    let (app, notifier) =
        shopping(&fake, &dir.path().join("state.json"), Duration::from_secs(60)).await;
    let mut flow = app.checkout().place_order(&address()).await.unwrap();
    let placed_id = flow.cart_id().clone();

    let route = flow.cancel().await.unwrap();

    assert_eq!(route, Route::Cart);
    assert_eq!(flow.state(), OtpState::Cancelled);
    assert_eq!(notifier.last().unwrap().message, "Order cancelled.");
    let state = fake.state();
    assert_eq!(state.cart(placed_id.as_str()).unwrap().status, "cancelled");
    assert!(state.pending_cart(CUSTOMER_EMAIL).is_some());
}

#[tokio::test]
async fn test_cancel_after_verify_is_refused_locally() {
    let fake = FakeApi::start().await;
    let dir = TempDir::new().unwrap();
    let (app, _notifier) =
        shopping(&fake, &dir.path().join("state.json"), Duration::from_secs(60)).await;
    let mut flow = app.checkout().place_order(&address()).await.unwrap();
    flow.paste(FAKE_OTP).unwrap();
    flow.submit().await.unwrap();

    let err = flow.cancel().await.unwrap_err();

    assert!(matches!(err, ClientError::InvalidState(_)));
    assert_eq!(fake.state().count_requests("DELETE /api/payment/cancel"), 0);
}

#[tokio::test]
async fn test_resumed_flow_cancel_of_paid_order() {
    let fake = FakeApi::start().await;
    let dir = TempDir::new().unwrap();
    let (app, notifier) =
        shopping(&fake, &dir.path().join("state.json"), Duration::from_secs(60)).await;
    let mut flow = app.checkout().place_order(&address()).await.unwrap();
    flow.paste(FAKE_OTP).unwrap();
    flow.submit().await.unwrap();

    let mut resumed = app.checkout().otp_flow(flow.cart_id().clone());
    let err = resumed.cancel().await.unwrap_err();

    assert!(matches!(err, ClientError::BadRequest(_)));
    assert_eq!(
        notifier.last().unwrap().message,
        "This order can no longer be cancelled."
    );
}

#[tokio::test]
async fn test_blank_address_is_rejected_locally() {
    let fake = FakeApi::start().await;
    let dir = TempDir::new().unwrap();
    let (app, _notifier) =
        shopping(&fake, &dir.path().join("state.json"), Duration::from_secs(60)).await;

    let mut incomplete = address();
    incomplete.street = "  ".to_string();
    let Err(err) = app.checkout().place_order(&incomplete).await else {
        panic!("blank street accepted");
    };

    let ClientError::Validation(fields) = err else {
        panic!("expected validation error, got {err:?}");
    };
    assert_eq!(fields.get("street"), Some("This field is required"));
    assert_eq!(fake.state().count_requests("PATCH /api/carts/status"), 0);
    assert!(app.cart().cart_id().await.is_some());
}

#[tokio::test]
async fn test_place_order_needs_a_cart() {
    let fake = FakeApi::start().await;
    let dir = TempDir::new().unwrap();
    let (app, _notifier) = fake.app(&dir.path().join("state.json")).await;
    app.session().login(CUSTOMER_EMAIL, SEED_PASSWORD).await.unwrap();

    let Err(err) = app.checkout().place_order(&address()).await else {
        panic!("order placed without a cart");
    };

    assert!(matches!(err, ClientError::MissingCartId));
}
