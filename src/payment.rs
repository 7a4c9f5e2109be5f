//! Payment gateway boundary types.
//!
//! The gateway's wire format and signature verification live outside this
//! service; what arrives here is an already-verified confirmation event.
//! The correlation id is the cart id embedded when the checkout session
//! was created, and it links the event back to the cart being paid for.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound, verified payment confirmation. Delivered at-least-once.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub correlation_id: Uuid,
    pub amount_paid: Decimal,
    pub payer_email: String,
    /// Gateway passthrough; carries the shipping address captured at
    /// checkout-session creation under `shipping_address`.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Outbound request handed to the gateway client to open a checkout
/// session for a cart.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSessionRequest {
    pub correlation_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub customer_email: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: serde_json::Value,
}
