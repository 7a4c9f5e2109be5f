//! Error types shared across the storefront core.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Failures surfaced by the cart, pricing, and order workflows.
///
/// Validation and lookup variants are returned synchronously to the caller;
/// `DuplicateOrderId` and `DuplicatePayment` are storage-level uniqueness
/// signals consumed inside the workflows and normally never escape them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("cart not found")]
    CartNotFound,

    #[error("cart item not found: {0}")]
    ItemNotFound(Uuid),

    #[error("order not found")]
    OrderNotFound,

    #[error("no such coupon: {0}")]
    InvalidCoupon(String),

    #[error("coupon expired: {0}")]
    ExpiredCoupon(String),

    #[error("discount percentage out of range: {0}")]
    InvalidDiscount(Decimal),

    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: u32,
        available: u32,
    },

    #[error("invalid quantity: {0}")]
    InvalidQuantity(u32),

    #[error("duplicate order id: {0}")]
    DuplicateOrderId(String),

    #[error("payment already processed: {0}")]
    DuplicatePayment(Uuid),

    #[error("order id generation exhausted after {0} attempts")]
    IdGenerationExhausted(u32),

    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: String, right: String },

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
