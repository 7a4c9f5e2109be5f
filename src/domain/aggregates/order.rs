//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{Money, PaymentMethod, ShippingAddress};
use crate::error::{Result, StoreError};

/// A placed order.
///
/// Lines are owned snapshots taken at placement; later catalog edits never
/// change a placed order. The human-facing `order_id` is assigned by the
/// sequencer right before the first insert. All state transitions are
/// one-way; soft deletion is reversible only through `restore`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    id: Uuid,
    order_id: String,
    user_id: Option<Uuid>,
    email: String,
    lines: Vec<OrderLine>,
    shipping_address: ShippingAddress,
    total_before_discount: Money,
    total_after_discount: Money,
    coupon: Option<String>,
    payment_method: PaymentMethod,
    is_paid: bool,
    paid_at: Option<DateTime<Utc>>,
    is_delivered: bool,
    delivered_at: Option<DateTime<Utc>>,
    is_deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
    correlation_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// Snapshot of one purchased line: title and unit price are copied from
/// the product at placement time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub title: String,
    pub variant: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderLine {
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

pub struct NewOrder {
    pub user_id: Option<Uuid>,
    pub email: String,
    pub lines: Vec<OrderLine>,
    pub shipping_address: ShippingAddress,
    pub total_before_discount: Money,
    pub total_after_discount: Money,
    pub coupon: Option<String>,
    pub payment_method: PaymentMethod,
    pub correlation_id: Option<Uuid>,
}

impl Order {
    pub fn place(new: NewOrder) -> Result<Self> {
        if new.lines.is_empty() {
            return Err(StoreError::InvalidInput("order has no lines".into()));
        }
        if new.total_after_discount.amount() > new.total_before_discount.amount()
            || new.total_after_discount.amount().is_sign_negative()
        {
            return Err(StoreError::InvalidInput(format!(
                "inconsistent totals: {} after vs {} before",
                new.total_after_discount, new.total_before_discount
            )));
        }
        let now = Utc::now();
        let mut order = Self {
            id: Uuid::new_v4(),
            order_id: String::new(),
            user_id: new.user_id,
            email: new.email,
            lines: new.lines,
            shipping_address: new.shipping_address,
            total_before_discount: new.total_before_discount,
            total_after_discount: new.total_after_discount,
            coupon: new.coupon,
            payment_method: new.payment_method,
            is_paid: false,
            paid_at: None,
            is_delivered: false,
            delivered_at: None,
            is_deleted: false,
            deleted_at: None,
            correlation_id: new.correlation_id,
            created_at: now,
            updated_at: now,
            events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed {
            order_uuid: order.id,
            total: order.total_after_discount.amount(),
        }));
        Ok(order)
    }

    /// Rebuilds an order from persisted state, bypassing placement checks.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: Uuid,
        order_id: String,
        user_id: Option<Uuid>,
        email: String,
        lines: Vec<OrderLine>,
        shipping_address: ShippingAddress,
        total_before_discount: Money,
        total_after_discount: Money,
        coupon: Option<String>,
        payment_method: PaymentMethod,
        paid_at: Option<DateTime<Utc>>,
        delivered_at: Option<DateTime<Utc>>,
        deleted_at: Option<DateTime<Utc>>,
        correlation_id: Option<Uuid>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            order_id,
            user_id,
            email,
            lines,
            shipping_address,
            total_before_discount,
            total_after_discount,
            coupon,
            payment_method,
            is_paid: paid_at.is_some(),
            paid_at,
            is_delivered: delivered_at.is_some(),
            delivered_at,
            is_deleted: deleted_at.is_some(),
            deleted_at,
            correlation_id,
            created_at,
            updated_at,
            events: vec![],
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    /// Called by the sequencer for each insert attempt.
    pub fn set_order_id(&mut self, order_id: String) {
        self.order_id = order_id;
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn shipping_address(&self) -> &ShippingAddress {
        &self.shipping_address
    }

    pub fn total_before_discount(&self) -> &Money {
        &self.total_before_discount
    }

    pub fn total_after_discount(&self) -> &Money {
        &self.total_after_discount
    }

    pub fn coupon(&self) -> Option<&str> {
        self.coupon.as_deref()
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn is_paid(&self) -> bool {
        self.is_paid
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn is_delivered(&self) -> bool {
        self.is_delivered
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    pub fn correlation_id(&self) -> Option<Uuid> {
        self.correlation_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// One-way. A second call keeps the original `paid_at`.
    pub fn mark_paid(&mut self) {
        if self.is_paid {
            return;
        }
        self.is_paid = true;
        self.paid_at = Some(Utc::now());
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Paid {
            order_uuid: self.id,
        }));
    }

    /// One-way. A second call keeps the original `delivered_at`.
    pub fn mark_delivered(&mut self) {
        if self.is_delivered {
            return;
        }
        self.is_delivered = true;
        self.delivered_at = Some(Utc::now());
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Delivered {
            order_uuid: self.id,
        }));
    }

    /// Idempotent logical removal. Only `restore` goes back.
    pub fn soft_delete(&mut self) {
        if self.is_deleted {
            return;
        }
        self.is_deleted = true;
        self.deleted_at = Some(Utc::now());
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::SoftDeleted {
            order_uuid: self.id,
        }));
    }

    /// Administrative override lifting a soft delete.
    pub fn restore(&mut self) {
        if !self.is_deleted {
            return;
        }
        self.is_deleted = false;
        self.deleted_at = None;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Restored {
            order_uuid: self.id,
        }));
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }

    fn raise_event(&mut self, e: DomainEvent) {
        self.events.push(e);
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
