//! Cart line records and the draft used to add them.

use std::num::NonZeroU32;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::ProductId;

/// One product in a cart partition.
///
/// A partition holds at most one line per `product_id`; only `quantity`
/// changes after the line is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// Catalog product id.
    #[serde(alias = "id")]
    pub product_id: ProductId,
    /// Product title captured when the line was added.
    #[serde(default)]
    pub title: String,
    /// Unit price captured when the line was added. Never negative.
    #[serde(alias = "price")]
    pub unit_price: Decimal,
    /// Image URLs captured when the line was added.
    #[serde(default)]
    pub images: Vec<String>,
    /// Number of units, at least 1.
    pub quantity: u32,
}

impl CartLine {
    /// `unit_price * quantity`, saturating at [`Decimal::MAX`].
    pub fn line_total(&self) -> Decimal {
        self.checked_line_total().unwrap_or(Decimal::MAX)
    }

    /// `unit_price * quantity`, or `None` if it does not fit in a [`Decimal`].
    pub fn checked_line_total(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }
}

/// Add-to-cart payload.
///
/// `quantity` defaults to one unit when absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLineDraft {
    /// Catalog product id.
    pub product_id: ProductId,
    /// Product title.
    pub title: String,
    /// Unit price.
    pub unit_price: Decimal,
    /// Image URLs.
    pub images: Vec<String>,
    /// Units to add.
    pub quantity: Option<NonZeroU32>,
}

impl CartLineDraft {
    /// Draft for a single unit of a product without images.
    pub fn new(product_id: impl Into<ProductId>, title: impl Into<String>, unit_price: Decimal) -> Self {
        Self {
            product_id: product_id.into(),
            title: title.into(),
            unit_price,
            images: Vec::new(),
            quantity: None,
        }
    }

    /// Sets the number of units to add.
    pub fn with_quantity(mut self, quantity: NonZeroU32) -> Self {
        self.quantity = Some(quantity);
        self
    }

    /// Sets the image URLs.
    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    /// Units this draft contributes.
    pub fn units(&self) -> u32 {
        self.quantity.map_or(1, NonZeroU32::get)
    }

    pub(crate) fn into_line(self) -> CartLine {
        let quantity = self.units();
        CartLine {
            product_id: self.product_id,
            title: self.title,
            unit_price: self.unit_price,
            images: self.images,
            quantity,
        }
    }
}
