//! `bg cart` commands.

use baby_guard_core::ProductId;
use baby_guard_storefront::AppState;

use super::CommandError;

pub async fn show(state: &AppState) -> Result<(), CommandError> {
    let cart = state.cart();
    if state.session().is_logged_in().await {
        cart.refresh().await?;
    }

    let quantities = cart.quantities().await;
    if quantities.is_empty() {
        println!("Your cart is empty.");
        return Ok(());
    }

    if let Some(cart_id) = cart.cart_id().await {
        println!("Cart {cart_id}");
    }
    for (product_id, quantity) in &quantities {
        println!("  {:<26} x{quantity}", product_id.as_str());
    }
    println!("Items: {}", cart.item_count().await);
    if let Some(snapshot) = cart.snapshot().await {
        println!("Total: {}", snapshot.total_price);
    }
    Ok(())
}

pub async fn add(state: &AppState, id: &str) -> Result<(), CommandError> {
    state.session().require_login().await?;
    state.cart().add(&ProductId::new(id)).await?;
    Ok(())
}

pub async fn change(state: &AppState, id: &str, delta: i64) -> Result<(), CommandError> {
    state.session().require_login().await?;
    let product_id = ProductId::new(id);
    state.cart().change_quantity(&product_id, delta).await?;
    println!("{product_id}: {}", state.cart().quantity(&product_id).await);
    Ok(())
}

pub async fn remove(state: &AppState, id: &str) -> Result<(), CommandError> {
    state.session().require_login().await?;
    state.cart().remove(&ProductId::new(id)).await?;
    Ok(())
}

pub async fn reset(state: &AppState) -> Result<(), CommandError> {
    state.cart().reset().await?;
    println!("Local cart state cleared.");
    Ok(())
}

pub async fn discard(state: &AppState) -> Result<(), CommandError> {
    state.session().require_login().await?;
    state.cart().discard().await?;
    Ok(())
}
