//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::{Money, Quantity, Sku};
use crate::error::{Result, StoreError};

/// Catalog product. Stock (`quantity`) and the cumulative `sold` counter
/// only move through confirmed order side effects.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    id: Uuid,
    sku: Sku,
    title: String,
    price: Money,
    quantity: Quantity,
    sold: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Product {
    pub fn create(sku: Sku, title: impl Into<String>, price: Money, quantity: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            sku,
            title: title.into(),
            price,
            quantity: Quantity::new(quantity),
            sold: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds a product from persisted state.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: Uuid,
        sku: Sku,
        title: String,
        price: Money,
        quantity: u32,
        sold: u64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            sku,
            title,
            price,
            quantity: Quantity::new(quantity),
            sold,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn sku(&self) -> &Sku {
        &self.sku
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn price(&self) -> &Money {
        &self.price
    }

    pub fn quantity(&self) -> u32 {
        self.quantity.value()
    }

    pub fn sold(&self) -> u64 {
        self.sold
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_in_stock(&self) -> bool {
        !self.quantity.is_zero()
    }

    /// Fails unless at least `requested` units are available.
    pub fn ensure_available(&self, requested: u32) -> Result<()> {
        if requested > self.quantity.value() {
            return Err(StoreError::InsufficientStock {
                product_id: self.id,
                requested,
                available: self.quantity.value(),
            });
        }
        Ok(())
    }

    pub fn update_price(&mut self, new_price: Money) {
        self.price = new_price;
        self.touch();
    }

    pub fn add_stock(&mut self, qty: u32) {
        self.quantity = self.quantity.add(qty);
        self.touch();
    }

    /// Consumes `qty` units: stock down, sold counter up.
    pub fn record_sale(&mut self, qty: u32) -> Result<()> {
        self.adjust_counters(qty, qty)
    }

    /// Independent counter movement, for per-product batch updates.
    pub fn adjust_counters(&mut self, sold_delta: u32, quantity_delta: u32) -> Result<()> {
        self.quantity =
            self.quantity
                .subtract(quantity_delta)
                .ok_or(StoreError::InsufficientStock {
                    product_id: self.id,
                    requested: quantity_delta,
                    available: self.quantity.value(),
                })?;
        self.sold += u64::from(sold_delta);
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
