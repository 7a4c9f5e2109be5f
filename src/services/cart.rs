//! Cart service: per-user cart mutation and coupon application.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::domain::aggregates::cart::CartItem;
use crate::domain::aggregates::Cart;
use crate::error::{Result, StoreError};
use crate::pricing::{self, PricedLine};
use crate::store::Store;

pub struct CartService<S> {
    store: Arc<S>,
    currency: String,
}

impl<S: Store> CartService<S> {
    pub fn new(store: Arc<S>, currency: impl Into<String>) -> Self {
        Self {
            store,
            currency: currency.into(),
        }
    }

    pub async fn get_cart(&self, user_id: Uuid) -> Result<Cart> {
        self.store
            .find_cart_by_user(user_id)
            .await?
            .ok_or(StoreError::CartNotFound)
    }

    /// Adds a product to the user's cart, creating the cart on first add.
    ///
    /// An existing `(product, variant)` line has its quantity replaced, not
    /// accumulated. The price snapshot is taken from the catalog here.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        variant: Option<String>,
        quantity: u32,
    ) -> Result<Cart> {
        if quantity == 0 {
            return Err(StoreError::InvalidQuantity(quantity));
        }
        let product = self
            .store
            .find_product(product_id)
            .await?
            .ok_or(StoreError::ProductNotFound(product_id))?;
        product.ensure_available(quantity)?;

        let mut cart = match self.store.find_cart_by_user(user_id).await? {
            Some(cart) => cart,
            None => Cart::for_user(user_id, &self.currency),
        };
        cart.upsert_item(CartItem {
            id: Uuid::new_v4(),
            product_id,
            title: product.title().to_string(),
            variant,
            quantity,
            unit_price: product.price().clone(),
        });
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    /// Re-validates against current stock before changing the line.
    #[tracing::instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        quantity: u32,
    ) -> Result<Cart> {
        if quantity == 0 {
            return Err(StoreError::InvalidQuantity(quantity));
        }
        let mut cart = self.get_cart(user_id).await?;
        let item = cart
            .find_item(item_id)
            .ok_or(StoreError::ItemNotFound(item_id))?;
        let product = self
            .store
            .find_product(item.product_id)
            .await?
            .ok_or(StoreError::ProductNotFound(item.product_id))?;
        product.ensure_available(quantity)?;

        cart.set_item_quantity(item_id, quantity)?;
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, item_id: Uuid) -> Result<Cart> {
        let mut cart = self.get_cart(user_id).await?;
        cart.remove_item(item_id)?;
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    /// Deletes the cart wholesale.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, user_id: Uuid) -> Result<()> {
        let cart = self.get_cart(user_id).await?;
        self.store.delete_cart(cart.id()).await
    }

    /// Prices the cart under the named coupon and caches the discounted
    /// total on the cart. Any failure leaves the cart untouched.
    #[tracing::instrument(skip(self))]
    pub async fn apply_coupon(&self, user_id: Uuid, coupon_name: &str) -> Result<Cart> {
        let mut cart = self.get_cart(user_id).await?;
        let coupon = self
            .store
            .find_coupon(coupon_name)
            .await?
            .ok_or_else(|| StoreError::InvalidCoupon(coupon_name.to_string()))?;

        let lines: Vec<PricedLine> = cart
            .items()
            .iter()
            .map(|i| PricedLine {
                unit_price: i.unit_price.clone(),
                quantity: i.quantity,
            })
            .collect();
        let totals = pricing::price(&lines, Some(&coupon), cart.currency(), Utc::now())?;

        cart.apply_discount(coupon.name(), totals.total);
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    /// Abandoned-cart reap: drops carts idle for longer than `retention`.
    #[tracing::instrument(skip(self))]
    pub async fn reap_expired(&self, retention: Duration) -> Result<u64> {
        let cutoff = Utc::now() - retention;
        let reaped = self.store.delete_carts_idle_since(cutoff).await?;
        if reaped > 0 {
            tracing::info!(reaped, "expired carts removed");
        }
        Ok(reaped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Coupon, Product};
    use crate::domain::value_objects::{Money, Sku};
    use crate::store::{CouponStore, MemoryStore, ProductStore};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    async fn seeded() -> (CartService<MemoryStore>, Arc<MemoryStore>, Product) {
        let store = Arc::new(MemoryStore::new());
        let product = Product::create(
            Sku::new("WID-001").unwrap(),
            "Widget",
            Money::usd(dec!(10)),
            5,
        );
        store.insert_product(&product).await.unwrap();
        (CartService::new(store.clone(), "USD"), store, product)
    }

    #[tokio::test]
    async fn add_item_rejects_zero_quantity() {
        let (svc, _, product) = seeded().await;
        assert!(matches!(
            svc.add_item(Uuid::new_v4(), product.id(), None, 0).await,
            Err(StoreError::InvalidQuantity(0))
        ));
    }

    #[tokio::test]
    async fn add_item_rejects_unknown_product() {
        let (svc, _, _) = seeded().await;
        assert!(matches!(
            svc.add_item(Uuid::new_v4(), Uuid::new_v4(), None, 1).await,
            Err(StoreError::ProductNotFound(_))
        ));
    }

    #[tokio::test]
    async fn add_item_rejects_out_of_stock() {
        let store = Arc::new(MemoryStore::new());
        let sold_out = Product::create(
            Sku::new("GONE-1").unwrap(),
            "Gone",
            Money::usd(dec!(10)),
            0,
        );
        store.insert_product(&sold_out).await.unwrap();
        let svc = CartService::new(store, "USD");

        assert!(matches!(
            svc.add_item(Uuid::new_v4(), sold_out.id(), None, 1).await,
            Err(StoreError::InsufficientStock { .. })
        ));
    }

    #[tokio::test]
    async fn add_item_replaces_existing_line() {
        let (svc, _, product) = seeded().await;
        let user = Uuid::new_v4();
        svc.add_item(user, product.id(), Some("red".into()), 2)
            .await
            .unwrap();
        let cart = svc
            .add_item(user, product.id(), Some("red".into()), 3)
            .await
            .unwrap();
        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.items()[0].quantity, 3);
        assert_eq!(cart.subtotal().amount(), dec!(30));
    }

    #[tokio::test]
    async fn update_quantity_revalidates_stock() {
        let (svc, _, product) = seeded().await;
        let user = Uuid::new_v4();
        let cart = svc.add_item(user, product.id(), None, 2).await.unwrap();
        let item_id = cart.items()[0].id;

        assert!(matches!(
            svc.update_quantity(user, item_id, 6).await,
            Err(StoreError::InsufficientStock { .. })
        ));
        let cart = svc.update_quantity(user, item_id, 5).await.unwrap();
        assert_eq!(cart.items()[0].quantity, 5);
    }

    #[tokio::test]
    async fn operations_need_an_existing_cart() {
        let (svc, _, _) = seeded().await;
        let nobody = Uuid::new_v4();
        assert!(matches!(
            svc.get_cart(nobody).await,
            Err(StoreError::CartNotFound)
        ));
        assert!(matches!(
            svc.remove_item(nobody, Uuid::new_v4()).await,
            Err(StoreError::CartNotFound)
        ));
        assert!(matches!(
            svc.clear(nobody).await,
            Err(StoreError::CartNotFound)
        ));
    }

    #[tokio::test]
    async fn apply_coupon_caches_discounted_total() {
        let (svc, store, product) = seeded().await;
        let user = Uuid::new_v4();
        store
            .insert_coupon(&Coupon::create(
                "SPRING20",
                Decimal::from(20),
                Utc::now() + Duration::days(7),
            ))
            .await
            .unwrap();

        svc.add_item(user, product.id(), None, 2).await.unwrap();
        let cart = svc.apply_coupon(user, "spring20").await.unwrap();
        assert_eq!(cart.coupon(), Some("SPRING20"));
        assert_eq!(cart.total_after_discount().unwrap().amount(), dec!(16.00));

        // Mutating the cart invalidates the cached discount.
        let cart = svc.add_item(user, product.id(), None, 1).await.unwrap();
        assert!(cart.total_after_discount().is_none());
    }

    #[tokio::test]
    async fn expired_coupon_leaves_cart_untouched() {
        let (svc, store, product) = seeded().await;
        let user = Uuid::new_v4();
        store
            .insert_coupon(&Coupon::create(
                "OLD",
                Decimal::from(20),
                Utc::now() - Duration::days(1),
            ))
            .await
            .unwrap();

        svc.add_item(user, product.id(), None, 2).await.unwrap();
        assert!(matches!(
            svc.apply_coupon(user, "OLD").await,
            Err(StoreError::ExpiredCoupon(_))
        ));
        let cart = svc.get_cart(user).await.unwrap();
        assert!(cart.total_after_discount().is_none());
        assert_eq!(cart.subtotal().amount(), dec!(20));
    }

    #[tokio::test]
    async fn unknown_coupon_is_invalid() {
        let (svc, _, product) = seeded().await;
        let user = Uuid::new_v4();
        svc.add_item(user, product.id(), None, 1).await.unwrap();
        assert!(matches!(
            svc.apply_coupon(user, "NOPE").await,
            Err(StoreError::InvalidCoupon(_))
        ));
    }
}
