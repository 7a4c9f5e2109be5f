//! Domain events raised by aggregates and drained by the services.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_uuid: Uuid, total: Decimal },
    Paid { order_uuid: Uuid },
    Delivered { order_uuid: Uuid },
    SoftDeleted { order_uuid: Uuid },
    Restored { order_uuid: Uuid },
}
