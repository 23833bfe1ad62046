//! Server-owned cart snapshot.
//!
//! The server is the sole owner of a cart: it decides line quantities and
//! computes `total_price`. The client only reads snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use super::id::{CartId, ProductId};
use super::price::Price;

/// A `{ productId, quantity }` entry in a cart.
///
/// The API sometimes populates `productId` with the whole product document;
/// only its id is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(deserialize_with = "product_ref")]
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Raw line as it appears on the wire, before flattening a populated product.
#[derive(Deserialize)]
#[serde(untagged)]
enum ProductRef {
    Id(ProductId),
    Populated {
        #[serde(alias = "_id")]
        id: ProductId,
    },
}

fn product_ref<'de, D>(deserializer: D) -> Result<ProductId, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match ProductRef::deserialize(deserializer)? {
        ProductRef::Id(id) | ProductRef::Populated { id } => id,
    })
}

/// Snapshot of the user's pending cart as returned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    #[serde(alias = "_id")]
    pub id: CartId,
    #[serde(default, alias = "products")]
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub total_price: Price,
    #[serde(default)]
    pub status: Option<String>,
}

impl CartSnapshot {
    /// An empty cart with the given id.
    #[must_use]
    pub const fn empty(id: CartId) -> Self {
        Self {
            id,
            items: Vec::new(),
            total_price: Price::ZERO,
            status: None,
        }
    }

    /// Quantity of a product in this cart (0 if absent).
    #[must_use]
    pub fn quantity_of(&self, product_id: &ProductId) -> u32 {
        self.items
            .iter()
            .filter(|line| &line.product_id == product_id)
            .map(|line| line.quantity)
            .sum()
    }

    /// Whether the server has a line for this product.
    #[must_use]
    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.items.iter().any(|line| &line.product_id == product_id)
    }

    /// Per-product quantities, merging duplicate lines and dropping zeros.
    #[must_use]
    pub fn quantities(&self) -> BTreeMap<ProductId, u32> {
        let mut map = BTreeMap::new();
        for line in &self.items {
            *map.entry(line.product_id.clone()).or_insert(0) += line.quantity;
        }
        map.retain(|_, quantity| *quantity > 0);
        map
    }

    /// Sum of all line quantities.
    #[must_use]
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|line| line.quantity).sum()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_populated_products() {
        let json = r#"{
            "_id": "cart-1",
            "products": [
                { "productId": "p1", "quantity": 2 },
                { "productId": { "_id": "p2", "name": "Bottle" }, "quantity": 1 }
            ],
            "totalPrice": 310
        }"#;
        let cart: CartSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(cart.id.as_str(), "cart-1");
        assert_eq!(cart.quantity_of(&ProductId::new("p1")), 2);
        assert!(cart.contains(&ProductId::new("p2")));
        assert_eq!(cart.total_quantity(), 3);
        assert_eq!(cart.total_price.to_string(), "310.00");
    }

    #[test]
    fn test_quantities_merges_and_drops_zero() {
        let json = r#"{
            "id": "c",
            "items": [
                { "productId": "a", "quantity": 1 },
                { "productId": "a", "quantity": 2 },
                { "productId": "b", "quantity": 0 }
            ]
        }"#;
        let cart: CartSnapshot = serde_json::from_str(json).unwrap();
        let quantities = cart.quantities();
        assert_eq!(quantities.get(&ProductId::new("a")), Some(&3));
        assert!(!quantities.contains_key(&ProductId::new("b")));
    }
}
