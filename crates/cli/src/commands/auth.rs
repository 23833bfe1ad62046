//! `bg auth` commands.

use baby_guard_storefront::AppState;
use baby_guard_storefront::api::types::SignupRequest;

use super::CommandError;

pub async fn signup(
    state: &AppState,
    name: String,
    email: String,
    phone: String,
    password: String,
) -> Result<(), CommandError> {
    let request = SignupRequest {
        name,
        email,
        password,
        phone,
    };
    let session = state.session().signup(request).await?;
    println!("Signed up as {}", session.role());
    Ok(())
}

pub async fn login(state: &AppState, email: &str, password: &str) -> Result<(), CommandError> {
    let session = state.session().login(email, password).await?;
    println!(
        "Logged in as {} ({} items in cart)",
        session.role(),
        state.cart().item_count().await
    );
    Ok(())
}

pub async fn logout(state: &AppState) -> Result<(), CommandError> {
    state.session().logout().await?;
    Ok(())
}

pub async fn me(state: &AppState) -> Result<(), CommandError> {
    let profile = state.session().me().await?;
    println!("{} <{}>", profile.name, profile.email);
    if let Some(phone) = profile.phone.as_deref() {
        println!("phone: {phone}");
    }
    println!("role:  {}", profile.role);
    Ok(())
}
