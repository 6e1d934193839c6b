//! Cart line items and currency amounts.

use crate::ids::ProductId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;

/// A currency amount in minor units (cents).
///
/// Arithmetic saturates instead of wrapping.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero.
    pub const ZERO: Money = Money(0);

    /// Creates an amount from minor units.
    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// Returns the amount in minor units.
    pub const fn minor(self) -> u64 {
        self.0
    }

    /// Multiplies a unit price by a quantity.
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(u64::from(quantity)))
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// One product line in a cart.
///
/// `unit_price`, `unit_in_stock` and `max_quantity` are the catalog snapshot
/// taken when the product was first added; they are not re-validated later.
///
/// # Invariant
///
/// `1 <= quantity <= max_quantity` whenever `max_quantity` is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Product key.
    pub product_id: ProductId,
    /// Display name.
    pub name: String,
    /// Price of one unit.
    pub unit_price: Money,
    /// Units in the cart.
    pub quantity: u32,
    /// Ceiling on `quantity`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_quantity: Option<u32>,
    /// Product image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Alt text for the image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    /// Stock hint at add time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_in_stock: Option<u32>,
    /// Size variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

impl CartItem {
    /// Creates an item with quantity 1 and no optional attributes.
    pub fn new(product_id: impl Into<ProductId>, name: impl Into<String>, unit_price: Money) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            unit_price,
            quantity: 1,
            max_quantity: None,
            image_url: None,
            alt_text: None,
            unit_in_stock: None,
            size: None,
        }
    }

    /// Sets the quantity ceiling.
    pub fn with_max_quantity(mut self, max: u32) -> Self {
        self.max_quantity = Some(max);
        self
    }

    /// Sets the quantity (not clamped).
    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    /// Sets the image and its alt text.
    pub fn with_image(mut self, url: impl Into<String>, alt: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self.alt_text = Some(alt.into());
        self
    }

    /// Sets the stock hint.
    pub fn with_stock(mut self, unit_in_stock: u32) -> Self {
        self.unit_in_stock = Some(unit_in_stock);
        self
    }

    /// Sets the size variant.
    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    /// Clips a requested quantity into `[1, max_quantity]`.
    ///
    /// A `max_quantity` of zero is treated as one.
    pub fn clamp_quantity(&self, requested: u32) -> u32 {
        let quantity = requested.max(1);
        match self.max_quantity {
            Some(max) => quantity.min(max.max(1)),
            None => quantity,
        }
    }

    /// Returns `unit_price * quantity`.
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }

    /// Returns true if the quantity invariant holds.
    pub fn is_valid(&self) -> bool {
        self.quantity >= 1 && self.max_quantity.map_or(true, |max| self.quantity <= max.max(1))
    }
}
