//! Persistence traits.
//!
//! The services only see these traits; `MemoryStore` backs every test and
//! `PgStore` backs the deployed service. Order reads always go through a
//! method that takes a [`Visibility`], so the soft-delete predicate is an
//! explicit argument rather than an implicit hook.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::aggregates::{Cart, Coupon, Order, Product};
use crate::error::Result;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Whether a read may see soft-deleted orders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    /// Default: soft-deleted orders are invisible, even by direct id.
    Active,
    /// Elevated override for the admin trash view and idempotency checks.
    IncludeDeleted,
}

/// Owner scoping for order listings.
#[derive(Clone, Copy, Debug, Default)]
pub struct OrderFilter {
    pub user_id: Option<Uuid>,
    pub include_deleted: bool,
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn find_product(&self, id: Uuid) -> Result<Option<Product>>;
    async fn insert_product(&self, product: &Product) -> Result<()>;
    async fn update_product(&self, product: &Product) -> Result<()>;
    /// One independent counter update: `sold += sold_delta`,
    /// `quantity -= quantity_delta`. Fails on unknown product or if the
    /// decrement would push stock below zero.
    async fn adjust_product_counters(
        &self,
        id: Uuid,
        sold_delta: u32,
        quantity_delta: u32,
    ) -> Result<()>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn find_cart_by_user(&self, user_id: Uuid) -> Result<Option<Cart>>;
    async fn find_cart(&self, cart_id: Uuid) -> Result<Option<Cart>>;
    /// Insert-or-replace; same-user races are last-write-wins.
    async fn save_cart(&self, cart: &Cart) -> Result<()>;
    async fn delete_cart(&self, cart_id: Uuid) -> Result<()>;
    /// Abandoned-cart reap; returns the number deleted.
    async fn delete_carts_idle_since(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Case-insensitive name lookup.
    async fn find_coupon(&self, name: &str) -> Result<Option<Coupon>>;
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Atomic insert enforcing uniqueness of `order_id` (against the whole
    /// history, soft-deleted included) and of `correlation_id`. Violations
    /// surface as `DuplicateOrderId` / `DuplicatePayment` and are the
    /// authoritative collision signals for the sequencer and the payment
    /// dedupe.
    async fn insert_order(&self, order: &Order) -> Result<()>;
    async fn update_order(&self, order: &Order) -> Result<()>;
    async fn find_order(&self, order_id: &str, visibility: Visibility) -> Result<Option<Order>>;
    /// Always spans soft-deleted orders: payment replays must be detected
    /// even if the resulting order was later trashed.
    async fn find_order_by_correlation(&self, correlation_id: Uuid) -> Result<Option<Order>>;
    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>>;
}

/// Everything the services need from one backend.
pub trait Store: ProductStore + CartStore + CouponStore + OrderStore {}

impl<T: ProductStore + CartStore + CouponStore + OrderStore> Store for T {}
