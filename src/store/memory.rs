//! In-memory store for tests and local development.
//!
//! Provides the same interface as the PostgreSQL implementation. Order-id
//! and correlation-id uniqueness are enforced under a single write lock,
//! which stands in for the unique indexes in Postgres.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::aggregates::{Cart, Coupon, Order, Product};
use crate::error::{Result, StoreError};

use super::{CartStore, CouponStore, OrderFilter, OrderStore, ProductStore, Visibility};

#[derive(Default)]
struct State {
    products: HashMap<Uuid, Product>,
    carts: HashMap<Uuid, Cart>,
    coupons: HashMap<String, Coupon>,
    orders: Vec<Order>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: total number of orders, soft-deleted included.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Test helper: drops a product to provoke counter-update failures.
    pub async fn remove_product(&self, id: Uuid) {
        self.state.write().await.products.remove(&id);
    }

    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.products.clear();
        state.carts.clear();
        state.coupons.clear();
        state.orders.clear();
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn find_product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn insert_product(&self, product: &Product) -> Result<()> {
        self.state
            .write()
            .await
            .products
            .insert(product.id(), product.clone());
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.products.contains_key(&product.id()) {
            return Err(StoreError::ProductNotFound(product.id()));
        }
        state.products.insert(product.id(), product.clone());
        Ok(())
    }

    async fn adjust_product_counters(
        &self,
        id: Uuid,
        sold_delta: u32,
        quantity_delta: u32,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let product = state
            .products
            .get_mut(&id)
            .ok_or(StoreError::ProductNotFound(id))?;
        product.adjust_counters(sold_delta, quantity_delta)
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn find_cart_by_user(&self, user_id: Uuid) -> Result<Option<Cart>> {
        Ok(self
            .state
            .read()
            .await
            .carts
            .values()
            .find(|c| c.user_id() == user_id)
            .cloned())
    }

    async fn find_cart(&self, cart_id: Uuid) -> Result<Option<Cart>> {
        Ok(self.state.read().await.carts.get(&cart_id).cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        self.state
            .write()
            .await
            .carts
            .insert(cart.id(), cart.clone());
        Ok(())
    }

    async fn delete_cart(&self, cart_id: Uuid) -> Result<()> {
        self.state.write().await.carts.remove(&cart_id);
        Ok(())
    }

    async fn delete_carts_idle_since(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.carts.len();
        state.carts.retain(|_, c| c.updated_at() >= cutoff);
        Ok((before - state.carts.len()) as u64)
    }
}

#[async_trait]
impl CouponStore for MemoryStore {
    async fn find_coupon(&self, name: &str) -> Result<Option<Coupon>> {
        let key = name.trim().to_uppercase();
        Ok(self.state.read().await.coupons.get(&key).cloned())
    }

    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()> {
        self.state
            .write()
            .await
            .coupons
            .insert(coupon.name().to_string(), coupon.clone());
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut state = self.state.write().await;
        // Uniqueness spans the full history, soft-deleted included.
        if state.orders.iter().any(|o| o.order_id() == order.order_id()) {
            return Err(StoreError::DuplicateOrderId(order.order_id().to_string()));
        }
        if let Some(correlation) = order.correlation_id() {
            if state
                .orders
                .iter()
                .any(|o| o.correlation_id() == Some(correlation))
            {
                return Err(StoreError::DuplicatePayment(correlation));
            }
        }
        state.orders.push(order.clone());
        Ok(())
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        let mut state = self.state.write().await;
        let slot = state
            .orders
            .iter_mut()
            .find(|o| o.id() == order.id())
            .ok_or(StoreError::OrderNotFound)?;
        *slot = order.clone();
        Ok(())
    }

    async fn find_order(&self, order_id: &str, visibility: Visibility) -> Result<Option<Order>> {
        Ok(self
            .state
            .read()
            .await
            .orders
            .iter()
            .find(|o| {
                o.order_id() == order_id
                    && (visibility == Visibility::IncludeDeleted || !o.is_deleted())
            })
            .cloned())
    }

    async fn find_order_by_correlation(&self, correlation_id: Uuid) -> Result<Option<Order>> {
        Ok(self
            .state
            .read()
            .await
            .orders
            .iter()
            .find(|o| o.correlation_id() == Some(correlation_id))
            .cloned())
    }

    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .iter()
            .filter(|o| filter.include_deleted || !o.is_deleted())
            .filter(|o| filter.user_id.is_none() || o.user_id() == filter.user_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| std::cmp::Reverse(o.created_at()));
        Ok(orders)
    }
}
