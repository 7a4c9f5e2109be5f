//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::Money;
use crate::error::{Result, StoreError};

/// A user's single live pre-checkout cart.
///
/// `subtotal` is recomputed on every mutation. The discounted total is a
/// cache: any item mutation clears it (and the coupon name) so a stale
/// discount can never survive a cart change.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cart {
    id: Uuid,
    user_id: Uuid,
    items: Vec<CartItem>,
    subtotal: Money,
    coupon: Option<String>,
    total_after_discount: Option<Money>,
    currency: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CartItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub title: String,
    pub variant: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
}

impl CartItem {
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

impl Cart {
    pub fn for_user(user_id: Uuid, currency: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            items: vec![],
            subtotal: Money::zero(currency),
            coupon: None,
            total_after_discount: None,
            currency: currency.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds a cart from persisted state.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: Uuid,
        user_id: Uuid,
        items: Vec<CartItem>,
        subtotal: Money,
        coupon: Option<String>,
        total_after_discount: Option<Money>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let currency = subtotal.currency().to_string();
        Self {
            id,
            user_id,
            items,
            subtotal,
            coupon,
            total_after_discount,
            currency,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn subtotal(&self) -> &Money {
        &self.subtotal
    }

    pub fn coupon(&self) -> Option<&str> {
        self.coupon.as_deref()
    }

    pub fn total_after_discount(&self) -> Option<&Money> {
        self.total_after_discount.as_ref()
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Adds a line, replacing the quantity of an existing
    /// `(product, variant)` line instead of accumulating it.
    pub fn upsert_item(&mut self, item: CartItem) {
        if let Some(existing) = self
            .items
            .iter_mut()
            .find(|i| i.product_id == item.product_id && i.variant == item.variant)
        {
            existing.quantity = item.quantity;
            existing.unit_price = item.unit_price;
            existing.title = item.title;
        } else {
            self.items.push(item);
        }
        self.recalculate();
    }

    pub fn set_item_quantity(&mut self, item_id: Uuid, quantity: u32) -> Result<()> {
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or(StoreError::ItemNotFound(item_id))?;
        item.quantity = quantity;
        self.recalculate();
        Ok(())
    }

    pub fn find_item(&self, item_id: Uuid) -> Option<&CartItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn remove_item(&mut self, item_id: Uuid) -> Result<()> {
        let before = self.items.len();
        self.items.retain(|i| i.id != item_id);
        if self.items.len() == before {
            return Err(StoreError::ItemNotFound(item_id));
        }
        self.recalculate();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.recalculate();
    }

    /// Records a successfully priced coupon application.
    pub fn apply_discount(&mut self, coupon_name: &str, total_after_discount: Money) {
        self.coupon = Some(coupon_name.to_string());
        self.total_after_discount = Some(total_after_discount);
        self.touch();
    }

    fn recalculate(&mut self) {
        self.subtotal = self
            .items
            .iter()
            .fold(Money::zero(&self.currency), |acc, i| {
                acc.add(&i.line_total()).unwrap_or(acc)
            });
        // Items changed; any previously applied discount no longer holds.
        self.coupon = None;
        self.total_after_discount = None;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
