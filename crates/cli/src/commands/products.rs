//! `bg products` commands.

use baby_guard_core::ProductId;
use baby_guard_storefront::AppState;
use baby_guard_storefront::api::types::{Product, ProductQuery};

use super::CommandError;

pub async fn list(
    state: &AppState,
    category: Option<String>,
    search: Option<String>,
) -> Result<(), CommandError> {
    let products = state
        .catalog()
        .products(&ProductQuery { category, search })
        .await?;

    if products.is_empty() {
        println!("No products found.");
        return Ok(());
    }
    for product in &products {
        print_row(state, product).await;
    }
    Ok(())
}

pub async fn show(state: &AppState, id: &str) -> Result<(), CommandError> {
    let product = state.catalog().product(&ProductId::new(id)).await?;

    println!("{}", product.name);
    println!("  id:       {}", product.id);
    println!("  price:    {}", product.price);
    if let Some(category) = product.category.as_deref() {
        println!("  category: {category}");
    }
    match product.stock {
        Some(0) => println!("  stock:    sold out"),
        Some(stock) => println!("  stock:    {stock}"),
        None => {}
    }
    if !product.description.is_empty() {
        println!();
        println!("{}", product.description);
    }
    let in_cart = state.cart().quantity(&product.id).await;
    if in_cart > 0 {
        println!();
        println!("In your cart: {in_cart}");
    }
    Ok(())
}

async fn print_row(state: &AppState, product: &Product) {
    let in_cart = state.cart().quantity(&product.id).await;
    let marker = if product.is_sold_out() { " (sold out)" } else { "" };
    let cart = if in_cart > 0 {
        format!("  [{in_cart} in cart]")
    } else {
        String::new()
    };
    println!(
        "{:<26} {:>10}  {}{marker}{cart}",
        product.id.as_str(),
        product.price.to_string(),
        product.name
    );
}
