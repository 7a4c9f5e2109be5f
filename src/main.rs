//! Storefront - checkout and order service

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use storefront::config::Config;
use storefront::domain::value_objects::{Caller, PaymentMethod, Role, ShippingAddress};
use storefront::notify::{LogNotifier, NatsNotifier, NotificationSender};
use storefront::payment::PaymentEvent;
use storefront::services::{
    CartService, OrderLineRequest, OrderService, OrderSource, PlaceOrderRequest,
};
use storefront::store::PgStore;
use storefront::StoreError;

#[derive(Clone)]
struct AppState {
    carts: Arc<CartService<PgStore>>,
    orders: Arc<OrderService<PgStore>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Config::from_env()?;
    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&cfg.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let notifier: Arc<dyn NotificationSender> = match &cfg.nats_url {
        Some(url) => {
            let client = async_nats::connect(url).await?;
            Arc::new(NatsNotifier::new(client, "storefront.notifications"))
        }
        None => Arc::new(LogNotifier),
    };

    let store = Arc::new(PgStore::new(db));
    let carts = Arc::new(CartService::new(store.clone(), cfg.currency.clone()));
    let orders = Arc::new(OrderService::new(
        store,
        notifier,
        cfg.currency.clone(),
        cfg.operator_email.clone(),
    ));

    // Hourly abandoned-cart reap.
    let reaper = carts.clone();
    let retention = chrono::Duration::days(cfg.cart_retention_days);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            if let Err(e) = reaper.reap_expired(retention).await {
                tracing::warn!(error = %e, "cart reap failed");
            }
        }
    });

    let state = AppState { carts, orders };
    let app = Router::new()
        .route(
            "/health",
            get(|| async { Json(serde_json::json!({"status": "healthy", "service": "storefront"})) }),
        )
        .route("/api/v1/cart", get(get_cart).delete(clear_cart))
        .route("/api/v1/cart/items", post(add_item))
        .route(
            "/api/v1/cart/items/:item_id",
            put(update_quantity).delete(remove_item),
        )
        .route("/api/v1/cart/coupon", post(apply_coupon))
        .route("/api/v1/orders", get(list_orders).post(place_order))
        .route("/api/v1/orders/:order_id", get(get_order).delete(soft_delete))
        .route("/api/v1/orders/:order_id/pay", put(mark_paid))
        .route("/api/v1/orders/:order_id/deliver", put(mark_delivered))
        .route("/api/v1/orders/:order_id/restore", put(restore_order))
        .route("/api/v1/checkout", post(checkout))
        .route("/api/v1/payments/webhook", post(payment_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    tracing::info!("storefront listening on 0.0.0.0:{}", cfg.port);
    axum::serve(
        tokio::net::TcpListener::bind(format!("0.0.0.0:{}", cfg.port)).await?,
        app,
    )
    .await?;
    Ok(())
}

type ApiError = (StatusCode, String);
type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

fn error_response(e: StoreError) -> ApiError {
    let status = match &e {
        StoreError::InvalidInput(_)
        | StoreError::InvalidQuantity(_)
        | StoreError::InvalidCoupon(_)
        | StoreError::ExpiredCoupon(_)
        | StoreError::InvalidDiscount(_)
        | StoreError::InsufficientStock { .. } => StatusCode::BAD_REQUEST,
        StoreError::ProductNotFound(_)
        | StoreError::CartNotFound
        | StoreError::ItemNotFound(_)
        | StoreError::OrderNotFound => StatusCode::NOT_FOUND,
        StoreError::DuplicateOrderId(_) | StoreError::DuplicatePayment(_) => StatusCode::CONFLICT,
        StoreError::IdGenerationExhausted(_)
        | StoreError::CurrencyMismatch { .. }
        | StoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

/// Trusts the identity headers set by the auth proxy in front of this
/// service; token verification happens there, not here.
fn caller_from_headers(headers: &HeaderMap) -> Option<Caller> {
    let id = headers
        .get("x-user-id")?
        .to_str()
        .ok()
        .and_then(|v| Uuid::parse_str(v).ok())?;
    let email = headers.get("x-user-email")?.to_str().ok()?.to_string();
    let role = match headers.get("x-user-role").and_then(|v| v.to_str().ok()) {
        Some("admin") => Role::Admin,
        _ => Role::Customer,
    };
    let name = headers
        .get("x-user-name")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    Some(Caller {
        id,
        role,
        email,
        name,
    })
}

fn require_caller(headers: &HeaderMap) -> Result<Caller, ApiError> {
    caller_from_headers(headers)
        .ok_or((StatusCode::UNAUTHORIZED, "authentication required".into()))
}

fn require_admin(headers: &HeaderMap) -> Result<Caller, ApiError> {
    let caller = require_caller(headers)?;
    if !caller.is_admin() {
        return Err((StatusCode::FORBIDDEN, "admin access required".into()));
    }
    Ok(caller)
}

// ---- cart ----

async fn get_cart(
    State(s): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<storefront::domain::aggregates::Cart> {
    let caller = require_caller(&headers)?;
    s.carts
        .get_cart(caller.id)
        .await
        .map(Json)
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
struct AddItemRequest {
    product_id: Uuid,
    variant: Option<String>,
    quantity: u32,
}

async fn add_item(
    State(s): State<AppState>,
    headers: HeaderMap,
    Json(r): Json<AddItemRequest>,
) -> ApiResult<storefront::domain::aggregates::Cart> {
    let caller = require_caller(&headers)?;
    s.carts
        .add_item(caller.id, r.product_id, r.variant, r.quantity)
        .await
        .map(Json)
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
struct UpdateQuantityRequest {
    quantity: u32,
}

async fn update_quantity(
    State(s): State<AppState>,
    headers: HeaderMap,
    Path(item_id): Path<Uuid>,
    Json(r): Json<UpdateQuantityRequest>,
) -> ApiResult<storefront::domain::aggregates::Cart> {
    let caller = require_caller(&headers)?;
    s.carts
        .update_quantity(caller.id, item_id, r.quantity)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn remove_item(
    State(s): State<AppState>,
    headers: HeaderMap,
    Path(item_id): Path<Uuid>,
) -> ApiResult<storefront::domain::aggregates::Cart> {
    let caller = require_caller(&headers)?;
    s.carts
        .remove_item(caller.id, item_id)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn clear_cart(
    State(s): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let caller = require_caller(&headers)?;
    s.carts
        .clear(caller.id)
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
struct ApplyCouponRequest {
    coupon: String,
}

async fn apply_coupon(
    State(s): State<AppState>,
    headers: HeaderMap,
    Json(r): Json<ApplyCouponRequest>,
) -> ApiResult<storefront::domain::aggregates::Cart> {
    let caller = require_caller(&headers)?;
    s.carts
        .apply_coupon(caller.id, &r.coupon)
        .await
        .map(Json)
        .map_err(error_response)
}

// ---- orders ----

#[derive(Debug, Deserialize)]
struct PlaceOrderBody {
    /// Omitted or empty means "check out my cart".
    items: Option<Vec<LineBody>>,
    shipping_address: ShippingAddress,
    coupon: Option<String>,
    guest_email: Option<String>,
    payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
struct LineBody {
    product_id: Uuid,
    quantity: u32,
    variant: Option<String>,
}

async fn place_order(
    State(s): State<AppState>,
    headers: HeaderMap,
    Json(r): Json<PlaceOrderBody>,
) -> Result<(StatusCode, Json<storefront::services::PlacedOrder>), ApiError> {
    let source = match r.items {
        Some(items) => OrderSource::Lines(
            items
                .into_iter()
                .map(|l| OrderLineRequest {
                    product_id: l.product_id,
                    quantity: l.quantity,
                    variant: l.variant,
                })
                .collect(),
        ),
        None => OrderSource::Cart,
    };
    let placed = s
        .orders
        .place_order(PlaceOrderRequest {
            source,
            shipping_address: r.shipping_address,
            coupon: r.coupon,
            caller: caller_from_headers(&headers),
            guest_email: r.guest_email,
            payment_method: r.payment_method,
        })
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(placed)))
}

#[derive(Debug, Deserialize)]
struct OrderQuery {
    #[serde(default)]
    include_deleted: bool,
}

async fn get_order(
    State(s): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
    Query(q): Query<OrderQuery>,
) -> ApiResult<storefront::domain::aggregates::Order> {
    let caller = caller_from_headers(&headers);
    s.orders
        .get_order(&order_id, caller.as_ref(), q.include_deleted)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn list_orders(
    State(s): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<OrderQuery>,
) -> ApiResult<Vec<storefront::domain::aggregates::Order>> {
    let caller = require_caller(&headers)?;
    s.orders
        .list_orders(&caller, q.include_deleted)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn mark_paid(
    State(s): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> ApiResult<storefront::domain::aggregates::Order> {
    require_admin(&headers)?;
    s.orders
        .mark_paid(&order_id)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn mark_delivered(
    State(s): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> ApiResult<storefront::domain::aggregates::Order> {
    require_admin(&headers)?;
    s.orders
        .mark_delivered(&order_id)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn soft_delete(
    State(s): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> ApiResult<storefront::domain::aggregates::Order> {
    require_admin(&headers)?;
    s.orders
        .soft_delete(&order_id)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn restore_order(
    State(s): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> ApiResult<storefront::domain::aggregates::Order> {
    let caller = require_admin(&headers)?;
    s.orders
        .restore(&order_id, &caller)
        .await
        .map(Json)
        .map_err(error_response)
}

// ---- payments ----

#[derive(Debug, Deserialize)]
struct CheckoutBody {
    shipping_address: ShippingAddress,
    success_url: String,
    cancel_url: String,
}

async fn checkout(
    State(s): State<AppState>,
    headers: HeaderMap,
    Json(r): Json<CheckoutBody>,
) -> ApiResult<storefront::payment::CheckoutSessionRequest> {
    let caller = require_caller(&headers)?;
    s.orders
        .checkout_session(&caller, r.shipping_address, r.success_url, r.cancel_url)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Signature verification happens in the gateway adapter upstream; by the
/// time the event reaches this handler it is trusted.
async fn payment_webhook(
    State(s): State<AppState>,
    Json(event): Json<PaymentEvent>,
) -> Result<(StatusCode, Json<storefront::services::PlacedOrder>), ApiError> {
    let placed = s
        .orders
        .confirm_paid_order(event)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(placed)))
}
