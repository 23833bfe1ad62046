//! Signup, login, logout and session restore against the fake API.

#![allow(clippy::unwrap_used)]

use baby_guard_core::{ProductId, Role};
use baby_guard_integration_tests::{ADMIN_EMAIL, CUSTOMER_EMAIL, FakeApi, SEED_PASSWORD};
use baby_guard_storefront::ClientError;
use baby_guard_storefront::api::types::SignupRequest;
use tempfile::TempDir;

fn signup_form(email: &str, password: &str) -> SignupRequest {
    SignupRequest {
        name: "Layla".to_string(),
        email: email.to_string(),
        password: password.to_string(),
        phone: "01098765432".to_string(),
    }
}

#[tokio::test]
async fn test_signup_logs_in() {
    let fake = FakeApi::start().await;
    let dir = TempDir::new().unwrap();
    let (app, notifier) = fake.app(&dir.path().join("state.json")).await;

    let session = app
        .session()
        .signup(signup_form(" Layla@Example.com ", "longenough"))
        .await
        .unwrap();

    assert_eq!(session.role(), Role::Customer);
    assert!(app.session().is_logged_in().await);
    assert!(fake.state().users.iter().any(|u| u.email == "layla@example.com"));
    let (token, role) = app.store().session().await;
    assert!(token.is_some());
    assert_eq!(role, Some(Role::Customer));
    assert_eq!(
        notifier.last().unwrap().message,
        "Account created. Welcome to Baby Guard!"
    );
}

#[tokio::test]
async fn test_signup_short_password_never_reaches_server() {
    let fake = FakeApi::start().await;
    let dir = TempDir::new().unwrap();
    let (app, _notifier) = fake.app(&dir.path().join("state.json")).await;

    let Err(ClientError::Validation(fields)) = app
        .session()
        .signup(signup_form("layla@example.com", "short"))
        .await
    else {
        panic!("short password accepted");
    };

    assert!(fields.get("password").is_some());
    assert_eq!(fake.state().count_requests("POST /api/auth/signup"), 0);
    assert!(!app.session().is_logged_in().await);
}

#[tokio::test]
async fn test_signup_duplicate_email_reports_field() {
    let fake = FakeApi::start().await;
    let dir = TempDir::new().unwrap();
    let (app, notifier) = fake.app(&dir.path().join("state.json")).await;

    let Err(ClientError::Validation(fields)) = app
        .session()
        .signup(signup_form(CUSTOMER_EMAIL, "longenough"))
        .await
    else {
        panic!("duplicate email accepted");
    };

    assert_eq!(fields.get("email"), Some("Email already registered"));
    assert_eq!(
        notifier.last().unwrap().message,
        "Please check the form: email: Email already registered"
    );
}

#[tokio::test]
async fn test_login_with_wrong_password() {
    let fake = FakeApi::start().await;
    let dir = TempDir::new().unwrap();
    let (app, notifier) = fake.app(&dir.path().join("state.json")).await;

    let Err(err) = app.session().login(CUSTOMER_EMAIL, "nope-nope").await else {
        panic!("wrong password accepted");
    };

    assert!(matches!(err, ClientError::Unauthorized(_)));
    assert_eq!(notifier.last().unwrap().message, "Invalid email or password.");
    assert!(!app.session().is_logged_in().await);
}

#[tokio::test]
async fn test_me_caches_profile() {
    let fake = FakeApi::start().await;
    let dir = TempDir::new().unwrap();
    let (app, _notifier) = fake.app(&dir.path().join("state.json")).await;
    app.session().login(CUSTOMER_EMAIL, SEED_PASSWORD).await.unwrap();

    let profile = app.session().me().await.unwrap();

    assert_eq!(profile.email, CUSTOMER_EMAIL);
    assert_eq!(profile.name, "Mona");
    assert_eq!(profile.role, Role::Customer);
    assert_eq!(app.session().cached_profile().await, Some(profile));
}

#[tokio::test]
async fn test_me_without_session() {
    let fake = FakeApi::start().await;
    let dir = TempDir::new().unwrap();
    let (app, _notifier) = fake.app(&dir.path().join("state.json")).await;

    let err = app.session().me().await.unwrap_err();

    assert!(matches!(err, ClientError::NotLoggedIn));
    assert_eq!(fake.state().count_requests("GET /api/user/me"), 0);
}

#[tokio::test]
async fn test_logout_clears_local_state() {
    let fake = FakeApi::start().await;
    let dir = TempDir::new().unwrap();
    let (app, _notifier) = fake.app(&dir.path().join("state.json")).await;
    app.session().login(CUSTOMER_EMAIL, SEED_PASSWORD).await.unwrap();
    app.cart().add(&ProductId::new("p-bottle")).await.unwrap();

    app.session().logout().await.unwrap();

    assert!(!app.session().is_logged_in().await);
    assert_eq!(app.store().session().await, (None, None));
    assert!(app.cart().cart_id().await.is_none());
    assert_eq!(app.cart().item_count().await, 0);
    // the server cart is left alone
    assert!(fake.state().pending_cart(CUSTOMER_EMAIL).is_some());
}

#[tokio::test]
async fn test_restore_reuses_stored_token() {
    let fake = FakeApi::start().await;
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    {
        let (app, _notifier) = fake.app(&path).await;
        app.session().login(ADMIN_EMAIL, SEED_PASSWORD).await.unwrap();
    }

    let (app, _notifier) = fake.app(&path).await;
    let session = app.session().restore().await.unwrap().unwrap();

    assert_eq!(session.role(), Role::Admin);
    assert_eq!(app.session().me().await.unwrap().email, ADMIN_EMAIL);
}

#[tokio::test]
async fn test_restore_without_stored_token() {
    let fake = FakeApi::start().await;
    let dir = TempDir::new().unwrap();
    let (app, _notifier) = fake.app(&dir.path().join("state.json")).await;

    assert!(app.session().restore().await.unwrap().is_none());
    assert!(!app.session().is_logged_in().await);
}

#[tokio::test]
async fn test_require_admin_for_customer() {
    let fake = FakeApi::start().await;
    let dir = TempDir::new().unwrap();
    let (app, notifier) = fake.app(&dir.path().join("state.json")).await;
    app.session().login(CUSTOMER_EMAIL, SEED_PASSWORD).await.unwrap();

    let err = app.session().require_admin().await.unwrap_err();

    assert!(matches!(err, ClientError::Forbidden(_)));
    assert_eq!(
        notifier.last().unwrap().message,
        "You do not have permission to do that."
    );
}
