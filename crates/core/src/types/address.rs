//! Delivery address attached to a cart.

use serde::{Deserialize, Serialize};

/// Text used for every field of an automatically provisioned cart.
pub const PLACEHOLDER_TEXT: &str = "N/A";

/// Phone number used for an automatically provisioned cart.
pub const PLACEHOLDER_PHONE: &str = "00000000000";

/// Delivery address sent when creating a cart or placing an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub city: String,
    pub street: String,
    #[serde(alias = "buildingNumber")]
    pub building: String,
    pub phone: String,
}

impl Address {
    /// The fixed address used when the client provisions an empty cart on
    /// the user's behalf. The real address is supplied at order placement.
    #[must_use]
    pub fn placeholder() -> Self {
        Self {
            city: PLACEHOLDER_TEXT.to_string(),
            street: PLACEHOLDER_TEXT.to_string(),
            building: PLACEHOLDER_TEXT.to_string(),
            phone: PLACEHOLDER_PHONE.to_string(),
        }
    }

    /// Whether this is the placeholder address.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        *self == Self::placeholder()
    }

    /// Names of fields that are blank, in declaration order.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("city", &self.city),
            ("street", &self.street),
            ("building", &self.building),
            ("phone", &self.phone),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}
