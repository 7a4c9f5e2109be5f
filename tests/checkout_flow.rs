//! End-to-end workflow tests over the in-memory store.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use storefront::domain::aggregates::{Coupon, Product};
use storefront::domain::value_objects::{
    Caller, Money, PaymentMethod, Role, ShippingAddress, Sku,
};
use storefront::notify::LogNotifier;
use storefront::payment::PaymentEvent;
use storefront::services::{
    CartService, OrderLineRequest, OrderService, OrderSource, PlaceOrderRequest,
};
use storefront::store::{CouponStore, MemoryStore, ProductStore};
use storefront::StoreError;

struct Harness {
    store: Arc<MemoryStore>,
    carts: Arc<CartService<MemoryStore>>,
    orders: Arc<OrderService<MemoryStore>>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let carts = Arc::new(CartService::new(store.clone(), "USD"));
    let orders = Arc::new(OrderService::new(
        store.clone(),
        Arc::new(LogNotifier),
        "USD",
        "ops@example.com",
    ));
    Harness {
        store,
        carts,
        orders,
    }
}

fn address() -> ShippingAddress {
    ShippingAddress {
        details: "12 Harbor Lane".into(),
        phone: "+15550100".into(),
        city: "Lagos".into(),
        postal_code: Some("100001".into()),
    }
}

fn customer() -> Caller {
    Caller {
        id: Uuid::new_v4(),
        role: Role::Customer,
        email: "buyer@example.com".into(),
        name: Some("Buyer".into()),
    }
}

fn admin() -> Caller {
    Caller {
        id: Uuid::new_v4(),
        role: Role::Admin,
        email: "admin@example.com".into(),
        name: None,
    }
}

async fn seed_product(h: &Harness, sku: &str, price: Decimal, stock: u32) -> Product {
    let product = Product::create(Sku::new(sku).unwrap(), sku, Money::usd(price), stock);
    h.store.insert_product(&product).await.unwrap();
    product
}

async fn seed_coupon(h: &Harness, name: &str, pct: u32, days: i64) {
    let coupon = Coupon::create(name, Decimal::from(pct), Utc::now() + Duration::days(days));
    h.store.insert_coupon(&coupon).await.unwrap();
}

fn cart_request(caller: Caller) -> PlaceOrderRequest {
    PlaceOrderRequest {
        source: OrderSource::Cart,
        shipping_address: address(),
        coupon: None,
        caller: Some(caller),
        guest_email: None,
        payment_method: PaymentMethod::Cash,
    }
}

fn lines_request(lines: Vec<OrderLineRequest>, caller: Option<Caller>) -> PlaceOrderRequest {
    PlaceOrderRequest {
        source: OrderSource::Lines(lines),
        shipping_address: address(),
        coupon: None,
        caller,
        guest_email: None,
        payment_method: PaymentMethod::Cash,
    }
}

#[tokio::test]
async fn cart_checkout_with_coupon_prices_and_consumes() {
    let h = harness();
    let buyer = customer();
    let product = seed_product(&h, "WID-001", Decimal::from(10), 8).await;
    seed_coupon(&h, "SPRING20", 20, 7).await;

    h.carts
        .add_item(buyer.id, product.id(), None, 2)
        .await
        .unwrap();
    h.carts.apply_coupon(buyer.id, "SPRING20").await.unwrap();

    let placed = h.orders.place_order(cart_request(buyer.clone())).await.unwrap();
    assert_eq!(placed.subtotal.amount(), Decimal::from(20));
    assert_eq!(placed.discount.amount(), Decimal::new(400, 2));
    assert_eq!(placed.total.amount(), Decimal::new(1600, 2));
    assert_eq!(placed.applied_coupon.as_deref(), Some("SPRING20"));
    assert!(placed.warnings.is_empty());
    assert_eq!(placed.order.order_id().len(), 6);

    // Stock consumed, sold incremented.
    let after = h.store.find_product(product.id()).await.unwrap().unwrap();
    assert_eq!(after.quantity(), 6);
    assert_eq!(after.sold(), 2);

    // Cart consumed by checkout.
    assert!(matches!(
        h.carts.get_cart(buyer.id).await,
        Err(StoreError::CartNotFound)
    ));
}

#[tokio::test]
async fn no_coupon_total_equals_subtotal() {
    let h = harness();
    let product = seed_product(&h, "WID-002", Decimal::new(750, 2), 5).await;

    let placed = h
        .orders
        .place_order(lines_request(
            vec![OrderLineRequest {
                product_id: product.id(),
                quantity: 3,
                variant: None,
            }],
            Some(customer()),
        ))
        .await
        .unwrap();
    assert_eq!(placed.total, placed.subtotal);
    assert!(placed.discount.is_zero());
}

#[tokio::test]
async fn empty_product_list_is_rejected_and_nothing_persists() {
    let h = harness();
    let result = h
        .orders
        .place_order(lines_request(vec![], Some(customer())))
        .await;
    assert!(matches!(result, Err(StoreError::InvalidInput(_))));
    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test]
async fn guest_orders_need_an_email() {
    let h = harness();
    let product = seed_product(&h, "WID-003", Decimal::from(5), 5).await;
    let line = OrderLineRequest {
        product_id: product.id(),
        quantity: 1,
        variant: None,
    };

    // No caller and no guest email: rejected.
    let result = h
        .orders
        .place_order(lines_request(vec![line.clone()], None))
        .await;
    assert!(matches!(result, Err(StoreError::InvalidInput(_))));
    assert_eq!(h.store.order_count().await, 0);

    // Guest email provided: accepted, no owning user.
    let mut req = lines_request(vec![line], None);
    req.guest_email = Some("guest@example.com".into());
    let placed = h.orders.place_order(req).await.unwrap();
    assert!(placed.order.user_id().is_none());
    assert_eq!(placed.order.email(), "guest@example.com");
}

#[tokio::test]
async fn insufficient_stock_aborts_before_persistence() {
    let h = harness();
    let product = seed_product(&h, "LOW-001", Decimal::from(10), 1).await;

    let result = h
        .orders
        .place_order(lines_request(
            vec![OrderLineRequest {
                product_id: product.id(),
                quantity: 2,
                variant: None,
            }],
            Some(customer()),
        ))
        .await;
    assert!(matches!(result, Err(StoreError::InsufficientStock { .. })));
    assert_eq!(h.store.order_count().await, 0);

    // The pre-check never touched the counters.
    let after = h.store.find_product(product.id()).await.unwrap().unwrap();
    assert_eq!(after.quantity(), 1);
    assert_eq!(after.sold(), 0);
}

#[tokio::test]
async fn expired_coupon_aborts_the_whole_order() {
    let h = harness();
    let product = seed_product(&h, "WID-004", Decimal::from(10), 5).await;
    seed_coupon(&h, "BYGONE", 20, -1).await;

    let mut req = lines_request(
        vec![OrderLineRequest {
            product_id: product.id(),
            quantity: 1,
            variant: None,
        }],
        Some(customer()),
    );
    req.coupon = Some("BYGONE".into());
    let result = h.orders.place_order(req).await;
    assert!(matches!(result, Err(StoreError::ExpiredCoupon(_))));
    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test]
async fn order_lines_are_snapshots_immune_to_catalog_changes() {
    let h = harness();
    let buyer = customer();
    let mut product = seed_product(&h, "WID-005", Decimal::from(10), 5).await;

    h.carts
        .add_item(buyer.id, product.id(), None, 1)
        .await
        .unwrap();
    let placed = h.orders.place_order(cart_request(buyer.clone())).await.unwrap();

    // Catalog price doubles after placement.
    product.update_price(Money::usd(Decimal::from(20)));
    h.store.update_product(&product).await.unwrap();

    let reread = h
        .orders
        .get_order(placed.order.order_id(), Some(&buyer), false)
        .await
        .unwrap();
    assert_eq!(reread.lines()[0].unit_price.amount(), Decimal::from(10));
    assert_eq!(reread.lines()[0].title, "WID-005");
    assert_eq!(
        reread.total_before_discount().amount(),
        Decimal::from(10)
    );
}

#[tokio::test]
async fn soft_delete_hides_orders_and_fails_closed() {
    let h = harness();
    let buyer = customer();
    let product = seed_product(&h, "WID-006", Decimal::from(10), 5).await;

    let placed = h
        .orders
        .place_order(lines_request(
            vec![OrderLineRequest {
                product_id: product.id(),
                quantity: 1,
                variant: None,
            }],
            Some(buyer.clone()),
        ))
        .await
        .unwrap();
    let order_id = placed.order.order_id().to_string();

    h.orders.soft_delete(&order_id).await.unwrap();

    // Invisible without the override, even by direct id.
    assert!(matches!(
        h.orders.get_order(&order_id, Some(&buyer), false).await,
        Err(StoreError::OrderNotFound)
    ));
    // A non-admin asking for deleted rows is still refused.
    assert!(matches!(
        h.orders.get_order(&order_id, Some(&buyer), true).await,
        Err(StoreError::OrderNotFound)
    ));
    // A guest asking for deleted rows is refused too.
    assert!(matches!(
        h.orders.get_order(&order_id, None, true).await,
        Err(StoreError::OrderNotFound)
    ));

    // Admin override sees it, flagged deleted.
    let the_admin = admin();
    let trashed = h
        .orders
        .get_order(&order_id, Some(&the_admin), true)
        .await
        .unwrap();
    assert!(trashed.is_deleted());

    // Idempotent in effect.
    h.orders.soft_delete(&order_id).await.unwrap();
    assert!(matches!(
        h.orders.get_order(&order_id, Some(&buyer), false).await,
        Err(StoreError::OrderNotFound)
    ));

    // Restore is the admin-only way back.
    let restored = h.orders.restore(&order_id, &the_admin).await.unwrap();
    assert!(!restored.is_deleted());
    assert!(h
        .orders
        .get_order(&order_id, Some(&buyer), false)
        .await
        .is_ok());
}

#[tokio::test]
async fn listing_scopes_to_owner_unless_admin() {
    let h = harness();
    let alice = customer();
    let bob = customer();
    let product = seed_product(&h, "WID-007", Decimal::from(10), 10).await;
    let line = OrderLineRequest {
        product_id: product.id(),
        quantity: 1,
        variant: None,
    };

    h.orders
        .place_order(lines_request(vec![line.clone()], Some(alice.clone())))
        .await
        .unwrap();
    h.orders
        .place_order(lines_request(vec![line.clone()], Some(bob.clone())))
        .await
        .unwrap();

    let mine = h.orders.list_orders(&alice, false).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].user_id(), Some(alice.id));

    let all = h.orders.list_orders(&admin(), false).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn payment_and_delivery_transitions_are_one_way() {
    let h = harness();
    let product = seed_product(&h, "WID-008", Decimal::from(10), 5).await;
    let placed = h
        .orders
        .place_order(lines_request(
            vec![OrderLineRequest {
                product_id: product.id(),
                quantity: 1,
                variant: None,
            }],
            Some(customer()),
        ))
        .await
        .unwrap();
    let order_id = placed.order.order_id().to_string();
    assert!(!placed.order.is_paid());

    let paid = h.orders.mark_paid(&order_id).await.unwrap();
    assert!(paid.is_paid());
    let first_paid_at = paid.paid_at();

    let again = h.orders.mark_paid(&order_id).await.unwrap();
    assert_eq!(again.paid_at(), first_paid_at);

    let delivered = h.orders.mark_delivered(&order_id).await.unwrap();
    assert!(delivered.is_delivered());
    assert!(delivered.is_paid());
}

#[tokio::test]
async fn concurrent_placements_never_share_an_order_id() {
    let h = harness();
    let product = seed_product(&h, "HOT-001", Decimal::from(3), 1000).await;

    let mut handles = Vec::new();
    for _ in 0..24 {
        let orders = h.orders.clone();
        let line = OrderLineRequest {
            product_id: product.id(),
            quantity: 1,
            variant: None,
        };
        handles.push(tokio::spawn(async move {
            orders
                .place_order(lines_request(vec![line], Some(customer())))
                .await
                .unwrap()
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        let placed = handle.await.unwrap();
        assert!(ids.insert(placed.order.order_id().to_string()));
    }
    assert_eq!(ids.len(), 24);
    assert_eq!(h.store.order_count().await, 24);
}

fn payment_event(correlation_id: Uuid, amount: Decimal) -> PaymentEvent {
    PaymentEvent {
        correlation_id,
        amount_paid: amount,
        payer_email: "buyer@example.com".into(),
        metadata: serde_json::json!({ "shipping_address": address() }),
    }
}

#[tokio::test]
async fn payment_confirmation_creates_a_paid_order_once() {
    let h = harness();
    let buyer = customer();
    let product = seed_product(&h, "PAY-001", Decimal::from(10), 5).await;
    seed_coupon(&h, "SPRING20", 20, 7).await;

    h.carts
        .add_item(buyer.id, product.id(), None, 2)
        .await
        .unwrap();
    let cart = h.carts.apply_coupon(buyer.id, "SPRING20").await.unwrap();

    let event = payment_event(cart.id(), Decimal::new(1600, 2));
    let first = h.orders.confirm_paid_order(event.clone()).await.unwrap();
    assert!(first.order.is_paid());
    assert_eq!(first.order.payment_method(), PaymentMethod::Card);
    assert_eq!(first.total.amount(), Decimal::new(1600, 2));
    assert_eq!(first.applied_coupon.as_deref(), Some("SPRING20"));

    // Replay: same correlation id, no second order.
    let second = h.orders.confirm_paid_order(event).await.unwrap();
    assert_eq!(second.order.order_id(), first.order.order_id());
    assert_eq!(h.store.order_count().await, 1);

    // The consumed cart is gone.
    assert!(matches!(
        h.carts.get_cart(buyer.id).await,
        Err(StoreError::CartNotFound)
    ));
}

#[tokio::test]
async fn concurrent_payment_replays_create_one_order() {
    let h = harness();
    let buyer = customer();
    let product = seed_product(&h, "PAY-002", Decimal::from(10), 50).await;

    let cart = h
        .carts
        .add_item(buyer.id, product.id(), None, 1)
        .await
        .unwrap();
    let event = payment_event(cart.id(), Decimal::from(10));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let orders = h.orders.clone();
        let event = event.clone();
        handles.push(tokio::spawn(
            async move { orders.confirm_paid_order(event).await },
        ));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        // Every replay must resolve to the same order; a replay may land
        // after the cart was deleted, in which case the dedupe lookup
        // still answers.
        let placed = handle.await.unwrap().unwrap();
        ids.insert(placed.order.order_id().to_string());
    }
    assert_eq!(ids.len(), 1);
    assert_eq!(h.store.order_count().await, 1);
}

#[tokio::test]
async fn counter_failure_after_persistence_is_a_warning_not_an_error() {
    let h = harness();
    let buyer = customer();
    let kept = seed_product(&h, "KEEP-01", Decimal::from(10), 5).await;
    let dropped = seed_product(&h, "DROP-01", Decimal::from(5), 5).await;

    h.carts
        .add_item(buyer.id, kept.id(), None, 1)
        .await
        .unwrap();
    let cart = h
        .carts
        .add_item(buyer.id, dropped.id(), None, 1)
        .await
        .unwrap();

    // Product vanishes between checkout-session creation and the gateway
    // callback; the paid order must still be created.
    h.store.remove_product(dropped.id()).await;

    let placed = h
        .orders
        .confirm_paid_order(payment_event(cart.id(), Decimal::from(15)))
        .await
        .unwrap();
    assert_eq!(placed.warnings.len(), 1);
    assert_eq!(placed.warnings[0].product_id, dropped.id());

    // The surviving product's counters did move.
    let after = h.store.find_product(kept.id()).await.unwrap().unwrap();
    assert_eq!(after.quantity(), 4);
    assert_eq!(after.sold(), 1);

    // And the order is readable by id.
    assert!(h
        .orders
        .get_order(placed.order.order_id(), Some(&buyer), false)
        .await
        .is_ok());
}

#[tokio::test]
async fn payment_event_for_unknown_cart_is_rejected() {
    let h = harness();
    let result = h
        .orders
        .confirm_paid_order(payment_event(Uuid::new_v4(), Decimal::from(10)))
        .await;
    assert!(matches!(result, Err(StoreError::CartNotFound)));
    assert_eq!(h.store.order_count().await, 0);
}
