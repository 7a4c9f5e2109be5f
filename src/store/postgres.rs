//! PostgreSQL store backed by sqlx.
//!
//! Cart items, order lines, and shipping addresses are stored as JSONB
//! alongside scalar columns. The `orders_order_id_key` and
//! `orders_correlation_id_key` unique indexes carry the uniqueness
//! guarantees the sequencer and the payment dedupe rely on; violations are
//! mapped back to typed errors by constraint name.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::aggregates::cart::CartItem;
use crate::domain::aggregates::order::OrderLine;
use crate::domain::aggregates::{Cart, Coupon, Order, Product};
use crate::domain::value_objects::{Money, PaymentMethod, ShippingAddress, Sku};
use crate::error::{Result, StoreError};

use super::{CartStore, CouponStore, OrderFilter, OrderStore, ProductStore, Visibility};

const UNIQUE_VIOLATION: &str = "23505";
const ORDER_ID_CONSTRAINT: &str = "orders_order_id_key";
const CORRELATION_CONSTRAINT: &str = "orders_correlation_id_key";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    sku: String,
    title: String,
    price: Decimal,
    currency: String,
    quantity: i32,
    sold: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_product(self) -> Result<Product> {
        Ok(Product::from_parts(
            self.id,
            Sku::new(self.sku)?,
            self.title,
            Money::new(self.price, &self.currency),
            self.quantity.max(0) as u32,
            self.sold.max(0) as u64,
            self.created_at,
            self.updated_at,
        ))
    }
}

#[derive(sqlx::FromRow)]
struct CartRow {
    id: Uuid,
    user_id: Uuid,
    items: serde_json::Value,
    subtotal: Decimal,
    currency: String,
    coupon: Option<String>,
    total_after_discount: Option<Decimal>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CartRow {
    fn into_cart(self) -> Result<Cart> {
        let items: Vec<CartItem> = serde_json::from_value(self.items)
            .map_err(|e| StoreError::Storage(format!("corrupt cart items: {e}")))?;
        Ok(Cart::from_parts(
            self.id,
            self.user_id,
            items,
            Money::new(self.subtotal, &self.currency),
            self.coupon,
            self.total_after_discount
                .map(|t| Money::new(t, &self.currency)),
            self.created_at,
            self.updated_at,
        ))
    }
}

#[derive(sqlx::FromRow)]
struct CouponRow {
    id: Uuid,
    name: String,
    percent_off: Decimal,
    expires_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_id: String,
    user_id: Option<Uuid>,
    email: String,
    lines: serde_json::Value,
    shipping_address: serde_json::Value,
    total_before_discount: Decimal,
    total_after_discount: Decimal,
    currency: String,
    coupon: Option<String>,
    payment_method: String,
    paid_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    correlation_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self) -> Result<Order> {
        let lines: Vec<OrderLine> = serde_json::from_value(self.lines)
            .map_err(|e| StoreError::Storage(format!("corrupt order lines: {e}")))?;
        let shipping_address: ShippingAddress = serde_json::from_value(self.shipping_address)
            .map_err(|e| StoreError::Storage(format!("corrupt shipping address: {e}")))?;
        let payment_method = match self.payment_method.as_str() {
            "cash" => PaymentMethod::Cash,
            "card" => PaymentMethod::Card,
            other => {
                return Err(StoreError::Storage(format!(
                    "unknown payment method: {other}"
                )))
            }
        };
        Ok(Order::from_parts(
            self.id,
            self.order_id,
            self.user_id,
            self.email,
            lines,
            shipping_address,
            Money::new(self.total_before_discount, &self.currency),
            Money::new(self.total_after_discount, &self.currency),
            self.coupon,
            payment_method,
            self.paid_at,
            self.delivered_at,
            self.deleted_at,
            self.correlation_id,
            self.created_at,
            self.updated_at,
        ))
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| StoreError::Storage(e.to_string()))
}

fn map_unique_violation(e: sqlx::Error, order: &Order) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return match db.constraint() {
                Some(ORDER_ID_CONSTRAINT) => {
                    StoreError::DuplicateOrderId(order.order_id().to_string())
                }
                Some(CORRELATION_CONSTRAINT) => StoreError::DuplicatePayment(
                    order.correlation_id().unwrap_or_default(),
                ),
                _ => StoreError::Storage(e.to_string()),
            };
        }
    }
    StoreError::Storage(e.to_string())
}

#[async_trait]
impl ProductStore for PgStore {
    async fn find_product(&self, id: Uuid) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ProductRow::into_product).transpose()
    }

    async fn insert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            "INSERT INTO products (id, sku, title, price, currency, quantity, sold, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(product.id())
        .bind(product.sku().as_str())
        .bind(product.title())
        .bind(product.price().amount())
        .bind(product.price().currency())
        .bind(product.quantity() as i32)
        .bind(product.sold() as i64)
        .bind(product.created_at())
        .bind(product.updated_at())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> Result<()> {
        let result = sqlx::query(
            "UPDATE products SET title = $2, price = $3, currency = $4, quantity = $5, sold = $6, updated_at = $7 \
             WHERE id = $1",
        )
        .bind(product.id())
        .bind(product.title())
        .bind(product.price().amount())
        .bind(product.price().currency())
        .bind(product.quantity() as i32)
        .bind(product.sold() as i64)
        .bind(product.updated_at())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ProductNotFound(product.id()));
        }
        Ok(())
    }

    async fn adjust_product_counters(
        &self,
        id: Uuid,
        sold_delta: u32,
        quantity_delta: u32,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE products SET sold = sold + $2, quantity = quantity - $3, updated_at = NOW() \
             WHERE id = $1 AND quantity >= $3",
        )
        .bind(id)
        .bind(i64::from(sold_delta))
        .bind(i64::from(quantity_delta))
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            let available: Option<(i32,)> =
                sqlx::query_as("SELECT quantity FROM products WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;
            return Err(match available {
                None => StoreError::ProductNotFound(id),
                Some((qty,)) => StoreError::InsufficientStock {
                    product_id: id,
                    requested: quantity_delta,
                    available: qty.max(0) as u32,
                },
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn find_cart_by_user(&self, user_id: Uuid) -> Result<Option<Cart>> {
        let row = sqlx::query_as::<_, CartRow>("SELECT * FROM carts WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(CartRow::into_cart).transpose()
    }

    async fn find_cart(&self, cart_id: Uuid) -> Result<Option<Cart>> {
        let row = sqlx::query_as::<_, CartRow>("SELECT * FROM carts WHERE id = $1")
            .bind(cart_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(CartRow::into_cart).transpose()
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        sqlx::query(
            "INSERT INTO carts (id, user_id, items, subtotal, currency, coupon, total_after_discount, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO UPDATE SET \
               items = EXCLUDED.items, subtotal = EXCLUDED.subtotal, coupon = EXCLUDED.coupon, \
               total_after_discount = EXCLUDED.total_after_discount, updated_at = EXCLUDED.updated_at",
        )
        .bind(cart.id())
        .bind(cart.user_id())
        .bind(to_json(&cart.items())?)
        .bind(cart.subtotal().amount())
        .bind(cart.currency())
        .bind(cart.coupon())
        .bind(cart.total_after_discount().map(Money::amount))
        .bind(cart.created_at())
        .bind(cart.updated_at())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_cart(&self, cart_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(cart_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_carts_idle_since(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM carts WHERE updated_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CouponStore for PgStore {
    async fn find_coupon(&self, name: &str) -> Result<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE name = $1")
            .bind(name.trim().to_uppercase())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Coupon::from_parts(r.id, r.name, r.percent_off, r.expires_at)))
    }

    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()> {
        sqlx::query(
            "INSERT INTO coupons (id, name, percent_off, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(coupon.id())
        .bind(coupon.name())
        .bind(coupon.percent_off())
        .bind(coupon.expires_at())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        sqlx::query(
            "INSERT INTO orders (id, order_id, user_id, email, lines, shipping_address, \
               total_before_discount, total_after_discount, currency, coupon, payment_method, \
               paid_at, delivered_at, deleted_at, correlation_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(order.id())
        .bind(order.order_id())
        .bind(order.user_id())
        .bind(order.email())
        .bind(to_json(&order.lines())?)
        .bind(to_json(order.shipping_address())?)
        .bind(order.total_before_discount().amount())
        .bind(order.total_after_discount().amount())
        .bind(order.total_before_discount().currency())
        .bind(order.coupon())
        .bind(order.payment_method().to_string())
        .bind(order.paid_at())
        .bind(order.delivered_at())
        .bind(order.deleted_at())
        .bind(order.correlation_id())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, order))?;
        Ok(())
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        let result = sqlx::query(
            "UPDATE orders SET paid_at = $2, delivered_at = $3, deleted_at = $4, updated_at = $5 \
             WHERE id = $1",
        )
        .bind(order.id())
        .bind(order.paid_at())
        .bind(order.delivered_at())
        .bind(order.deleted_at())
        .bind(order.updated_at())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound);
        }
        Ok(())
    }

    async fn find_order(&self, order_id: &str, visibility: Visibility) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE order_id = $1 AND ($2 OR deleted_at IS NULL)",
        )
        .bind(order_id)
        .bind(visibility == Visibility::IncludeDeleted)
        .fetch_optional(&self.pool)
        .await?;
        row.map(OrderRow::into_order).transpose()
    }

    async fn find_order_by_correlation(&self, correlation_id: Uuid) -> Result<Option<Order>> {
        let row =
            sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE correlation_id = $1")
                .bind(correlation_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(OrderRow::into_order).transpose()
    }

    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders \
             WHERE ($1::uuid IS NULL OR user_id = $1) AND ($2 OR deleted_at IS NULL) \
             ORDER BY created_at DESC",
        )
        .bind(filter.user_id)
        .bind(filter.include_deleted)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OrderRow::into_order).collect()
    }
}
