//! Order workflow: placement, payment confirmation, transitions, reads.
//!
//! Placement either fully succeeds (the order exists and is readable by
//! id) or fully fails before anything is persisted. Counter updates and
//! notifications run after persistence and are surfaced as warnings or
//! log lines, never as client-facing failures.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::order::OrderLine;
use crate::domain::aggregates::{Cart, NewOrder, Order};
use crate::domain::value_objects::{Caller, Money, PaymentMethod, ShippingAddress};
use crate::error::{Result, StoreError};
use crate::notify::{Notification, NotificationSender};
use crate::payment::{CheckoutSessionRequest, PaymentEvent};
use crate::pricing::{self, PricedLine};
use crate::sequencer;
use crate::store::{OrderFilter, Store, Visibility};

/// Where the order's lines come from.
#[derive(Clone, Debug)]
pub enum OrderSource {
    /// The caller's live cart (requires an authenticated caller).
    Cart,
    /// An ad-hoc product list, usable by guests.
    Lines(Vec<OrderLineRequest>),
}

#[derive(Clone, Debug)]
pub struct OrderLineRequest {
    pub product_id: Uuid,
    pub quantity: u32,
    pub variant: Option<String>,
}

#[derive(Clone, Debug)]
pub struct PlaceOrderRequest {
    pub source: OrderSource,
    pub shipping_address: ShippingAddress,
    pub coupon: Option<String>,
    pub caller: Option<Caller>,
    pub guest_email: Option<String>,
    pub payment_method: PaymentMethod,
}

/// A counter update that failed after the order was persisted.
#[derive(Clone, Debug, Serialize)]
pub struct StockWarning {
    pub product_id: Uuid,
    pub detail: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct PlacedOrder {
    pub order: Order,
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
    pub applied_coupon: Option<String>,
    pub warnings: Vec<StockWarning>,
}

impl PlacedOrder {
    fn from_existing(order: Order) -> Self {
        let before = order.total_before_discount().clone();
        let after = order.total_after_discount().clone();
        let discount = Money::new(before.amount() - after.amount(), before.currency());
        Self {
            subtotal: before,
            discount,
            total: after.clone(),
            applied_coupon: order.coupon().map(String::from),
            warnings: vec![],
            order,
        }
    }
}

pub struct OrderService<S> {
    store: Arc<S>,
    notifier: Arc<dyn NotificationSender>,
    currency: String,
    operator_email: String,
}

impl<S: Store> OrderService<S> {
    pub fn new(
        store: Arc<S>,
        notifier: Arc<dyn NotificationSender>,
        currency: impl Into<String>,
        operator_email: impl Into<String>,
    ) -> Self {
        Self {
            store,
            notifier,
            currency: currency.into(),
            operator_email: operator_email.into(),
        }
    }

    /// Places an order from a cart or an inline product list.
    #[tracing::instrument(skip(self, req))]
    pub async fn place_order(&self, req: PlaceOrderRequest) -> Result<PlacedOrder> {
        req.shipping_address
            .validate()
            .map_err(|e| StoreError::InvalidInput(e.to_string()))?;

        let email = match (&req.caller, &req.guest_email) {
            (Some(caller), _) => caller.email.clone(),
            (None, Some(guest)) if !guest.trim().is_empty() => guest.clone(),
            _ => {
                return Err(StoreError::InvalidInput(
                    "an authenticated user or a guest email is required".into(),
                ))
            }
        };

        let (lines, source_cart) = self.resolve_lines(&req).await?;

        let coupon_name = req
            .coupon
            .clone()
            .or_else(|| source_cart.as_ref().and_then(|c| c.coupon().map(String::from)));
        let coupon = match &coupon_name {
            Some(name) => Some(
                self.store
                    .find_coupon(name)
                    .await?
                    .ok_or_else(|| StoreError::InvalidCoupon(name.clone()))?,
            ),
            None => None,
        };

        let priced: Vec<PricedLine> = lines
            .iter()
            .map(|l| PricedLine {
                unit_price: l.unit_price.clone(),
                quantity: l.quantity,
            })
            .collect();
        let totals = pricing::price(&priced, coupon.as_ref(), &self.currency, Utc::now())?;

        let order = Order::place(NewOrder {
            user_id: req.caller.as_ref().map(|c| c.id),
            email,
            lines,
            shipping_address: req.shipping_address.clone(),
            total_before_discount: totals.subtotal.clone(),
            total_after_discount: totals.total.clone(),
            coupon: coupon.as_ref().map(|c| c.name().to_string()),
            payment_method: req.payment_method,
            correlation_id: None,
        })?;
        let mut order = sequencer::insert_with_fresh_id(self.store.as_ref(), order).await?;
        self.drain_events(&mut order);

        let warnings = self.apply_stock_effects(order.lines()).await;

        if let Some(cart) = source_cart {
            if let Err(e) = self.store.delete_cart(cart.id()).await {
                tracing::warn!(cart_id = %cart.id(), error = %e, "failed to delete consumed cart");
            }
        }

        self.notify_placed(&order).await;

        tracing::info!(order_id = %order.order_id(), total = %totals.total, "order placed");
        Ok(PlacedOrder {
            order,
            subtotal: totals.subtotal,
            discount: totals.discount,
            total: totals.total,
            applied_coupon: coupon.map(|c| c.name().to_string()),
            warnings,
        })
    }

    /// Creates an order from an external payment confirmation.
    ///
    /// Idempotent under at-least-once delivery: the correlation id is
    /// checked first, and the store's unique constraint catches the race
    /// two concurrent replays would otherwise win together.
    #[tracing::instrument(skip(self, event), fields(correlation_id = %event.correlation_id))]
    pub async fn confirm_paid_order(&self, event: PaymentEvent) -> Result<PlacedOrder> {
        if let Some(existing) = self
            .store
            .find_order_by_correlation(event.correlation_id)
            .await?
        {
            tracing::info!(order_id = %existing.order_id(), "payment event replayed, order already exists");
            return Ok(PlacedOrder::from_existing(existing));
        }

        let cart = match self.store.find_cart(event.correlation_id).await? {
            Some(cart) => cart,
            // The cart may already be consumed by a replay that won the
            // race between our dedupe check and this lookup.
            None => {
                if let Some(existing) = self
                    .store
                    .find_order_by_correlation(event.correlation_id)
                    .await?
                {
                    return Ok(PlacedOrder::from_existing(existing));
                }
                return Err(StoreError::CartNotFound);
            }
        };
        if cart.is_empty() {
            return Err(StoreError::InvalidInput("paid cart has no items".into()));
        }

        let shipping_address: ShippingAddress = event
            .metadata
            .get("shipping_address")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| StoreError::InvalidInput(format!("bad shipping address in payment event: {e}")))?
            .ok_or_else(|| {
                StoreError::InvalidInput("payment event missing shipping address".into())
            })?;

        // Lines come from the cart; the paid amount comes from the event.
        let lines: Vec<OrderLine> = cart
            .items()
            .iter()
            .map(|i| OrderLine {
                product_id: i.product_id,
                title: i.title.clone(),
                variant: i.variant.clone(),
                quantity: i.quantity,
                unit_price: i.unit_price.clone(),
            })
            .collect();
        let subtotal = cart.subtotal().clone();
        let paid = Money::new(event.amount_paid, cart.currency());

        let mut order = Order::place(NewOrder {
            user_id: Some(cart.user_id()),
            email: event.payer_email.clone(),
            lines,
            shipping_address,
            total_before_discount: subtotal.clone(),
            total_after_discount: paid.clone(),
            coupon: cart.coupon().map(String::from),
            payment_method: PaymentMethod::Card,
            correlation_id: Some(event.correlation_id),
        })?;
        order.mark_paid();

        let mut order = match sequencer::insert_with_fresh_id(self.store.as_ref(), order).await {
            Ok(order) => order,
            // Lost the race against a concurrent replay of the same event.
            Err(StoreError::DuplicatePayment(correlation)) => {
                let existing = self
                    .store
                    .find_order_by_correlation(correlation)
                    .await?
                    .ok_or(StoreError::OrderNotFound)?;
                tracing::info!(order_id = %existing.order_id(), "payment replay race, returning winner");
                return Ok(PlacedOrder::from_existing(existing));
            }
            Err(e) => return Err(e),
        };
        self.drain_events(&mut order);

        let warnings = self.apply_stock_effects(order.lines()).await;

        if let Err(e) = self.store.delete_cart(cart.id()).await {
            tracing::warn!(cart_id = %cart.id(), error = %e, "failed to delete consumed cart");
        }

        self.notify_placed(&order).await;

        let discount = Money::new(subtotal.amount() - paid.amount(), subtotal.currency());
        Ok(PlacedOrder {
            order,
            subtotal,
            discount,
            total: paid,
            applied_coupon: cart.coupon().map(String::from),
            warnings,
        })
    }

    /// Builds the outbound checkout-session request for the caller's cart.
    /// The cart id doubles as the correlation id the gateway echoes back.
    pub async fn checkout_session(
        &self,
        caller: &Caller,
        shipping_address: ShippingAddress,
        success_url: String,
        cancel_url: String,
    ) -> Result<CheckoutSessionRequest> {
        shipping_address
            .validate()
            .map_err(|e| StoreError::InvalidInput(e.to_string()))?;
        let cart = self
            .store
            .find_cart_by_user(caller.id)
            .await?
            .ok_or(StoreError::CartNotFound)?;
        if cart.is_empty() {
            return Err(StoreError::InvalidInput("cart is empty".into()));
        }
        let amount = cart
            .total_after_discount()
            .unwrap_or(cart.subtotal())
            .amount();
        Ok(CheckoutSessionRequest {
            correlation_id: cart.id(),
            amount,
            currency: cart.currency().to_string(),
            customer_email: caller.email.clone(),
            success_url,
            cancel_url,
            metadata: serde_json::json!({ "shipping_address": shipping_address }),
        })
    }

    /// Order lookup with the soft-delete filter applied. The override is
    /// honored only for admin callers and fails closed otherwise.
    pub async fn get_order(
        &self,
        order_id: &str,
        caller: Option<&Caller>,
        include_deleted: bool,
    ) -> Result<Order> {
        let visibility = if include_deleted && caller.is_some_and(Caller::is_admin) {
            Visibility::IncludeDeleted
        } else {
            Visibility::Active
        };
        self.store
            .find_order(order_id, visibility)
            .await?
            .ok_or(StoreError::OrderNotFound)
    }

    /// Admins see every order; everyone else sees only their own.
    pub async fn list_orders(&self, caller: &Caller, include_deleted: bool) -> Result<Vec<Order>> {
        let filter = if caller.is_admin() {
            OrderFilter {
                user_id: None,
                include_deleted,
            }
        } else {
            OrderFilter {
                user_id: Some(caller.id),
                include_deleted: false,
            }
        };
        self.store.list_orders(filter).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_paid(&self, order_id: &str) -> Result<Order> {
        let mut order = self
            .store
            .find_order(order_id, Visibility::Active)
            .await?
            .ok_or(StoreError::OrderNotFound)?;
        order.mark_paid();
        self.store.update_order(&order).await?;
        self.drain_events(&mut order);
        Ok(order)
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_delivered(&self, order_id: &str) -> Result<Order> {
        let mut order = self
            .store
            .find_order(order_id, Visibility::Active)
            .await?
            .ok_or(StoreError::OrderNotFound)?;
        order.mark_delivered();
        self.store.update_order(&order).await?;
        self.drain_events(&mut order);
        Ok(order)
    }

    /// Idempotent: soft-deleting an already-deleted order is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn soft_delete(&self, order_id: &str) -> Result<Order> {
        let mut order = self
            .store
            .find_order(order_id, Visibility::IncludeDeleted)
            .await?
            .ok_or(StoreError::OrderNotFound)?;
        if !order.is_deleted() {
            order.soft_delete();
            self.store.update_order(&order).await?;
            self.drain_events(&mut order);
        }
        Ok(order)
    }

    /// Administrative override lifting a soft delete. Fails closed for
    /// non-admin callers.
    #[tracing::instrument(skip(self, caller))]
    pub async fn restore(&self, order_id: &str, caller: &Caller) -> Result<Order> {
        if !caller.is_admin() {
            return Err(StoreError::OrderNotFound);
        }
        let mut order = self
            .store
            .find_order(order_id, Visibility::IncludeDeleted)
            .await?
            .ok_or(StoreError::OrderNotFound)?;
        order.restore();
        self.store.update_order(&order).await?;
        self.drain_events(&mut order);
        Ok(order)
    }

    /// Resolves and stock-checks the order lines concurrently. Cart-sourced
    /// lines keep the cart's price snapshots; inline lines snapshot the
    /// catalog price at this moment.
    async fn resolve_lines(
        &self,
        req: &PlaceOrderRequest,
    ) -> Result<(Vec<OrderLine>, Option<Cart>)> {
        match &req.source {
            OrderSource::Cart => {
                let caller = req.caller.as_ref().ok_or_else(|| {
                    StoreError::InvalidInput("cart checkout requires an authenticated user".into())
                })?;
                let cart = self
                    .store
                    .find_cart_by_user(caller.id)
                    .await?
                    .ok_or(StoreError::CartNotFound)?;
                if cart.is_empty() {
                    return Err(StoreError::InvalidInput("cart is empty".into()));
                }
                let lines =
                    futures::future::try_join_all(cart.items().iter().map(|item| async move {
                        let product = self
                            .store
                            .find_product(item.product_id)
                            .await?
                            .ok_or(StoreError::ProductNotFound(item.product_id))?;
                        product.ensure_available(item.quantity)?;
                        Ok::<_, StoreError>(OrderLine {
                            product_id: item.product_id,
                            title: item.title.clone(),
                            variant: item.variant.clone(),
                            quantity: item.quantity,
                            unit_price: item.unit_price.clone(),
                        })
                    }))
                    .await?;
                Ok((lines, Some(cart)))
            }
            OrderSource::Lines(requests) => {
                if requests.is_empty() {
                    return Err(StoreError::InvalidInput("order has no lines".into()));
                }
                let lines =
                    futures::future::try_join_all(requests.iter().map(|line| async move {
                        if line.quantity == 0 {
                            return Err(StoreError::InvalidQuantity(line.quantity));
                        }
                        let product = self
                            .store
                            .find_product(line.product_id)
                            .await?
                            .ok_or(StoreError::ProductNotFound(line.product_id))?;
                        product.ensure_available(line.quantity)?;
                        Ok(OrderLine {
                            product_id: line.product_id,
                            title: product.title().to_string(),
                            variant: line.variant.clone(),
                            quantity: line.quantity,
                            unit_price: product.price().clone(),
                        })
                    }))
                    .await?;
                Ok((lines, None))
            }
        }
    }

    /// Per-product counter batch after persistence. Failures are logged
    /// and reported, never rolled back and never retried here (a blind
    /// retry risks double-decrementing).
    async fn apply_stock_effects(&self, lines: &[OrderLine]) -> Vec<StockWarning> {
        let mut warnings = Vec::new();
        for line in lines {
            if let Err(e) = self
                .store
                .adjust_product_counters(line.product_id, line.quantity, line.quantity)
                .await
            {
                tracing::warn!(
                    product_id = %line.product_id,
                    error = %e,
                    "stock counter update failed after order persistence"
                );
                warnings.push(StockWarning {
                    product_id: line.product_id,
                    detail: e.to_string(),
                });
            }
        }
        warnings
    }

    async fn notify_placed(&self, order: &Order) {
        let customer = Notification {
            recipient: order.email().to_string(),
            subject: format!("Order {} confirmed", order.order_id()),
            body: format!(
                "Thanks for your order. Total: {}.",
                order.total_after_discount()
            ),
        };
        let operator = Notification {
            recipient: self.operator_email.clone(),
            subject: format!("New order {}", order.order_id()),
            body: format!(
                "{} line(s), total {}, payment {}.",
                order.lines().len(),
                order.total_after_discount(),
                order.payment_method()
            ),
        };
        for note in [customer, operator] {
            if let Err(e) = self.notifier.send(note).await {
                tracing::warn!(error = %e, "notification delivery failed");
            }
        }
    }

    fn drain_events(&self, order: &mut Order) {
        for event in order.take_events() {
            tracing::debug!(?event, "domain event");
        }
    }
}
