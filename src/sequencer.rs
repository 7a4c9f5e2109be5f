//! Order id sequencer.
//!
//! Generates the short human-facing order id and persists the order in one
//! loop: each attempt assigns a fresh candidate and tries the insert, and
//! the store's `DuplicateOrderId` is the collision signal. A prior
//! existence check would leave a read-then-write window; inserting and
//! retrying on the uniqueness violation does not.

use rand::Rng;

use crate::domain::aggregates::Order;
use crate::error::{Result, StoreError};
use crate::store::OrderStore;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of the human-facing order id.
pub const ORDER_ID_LEN: usize = 6;

/// Collision retries before giving up with `IdGenerationExhausted`.
pub const MAX_ATTEMPTS: u32 = 5;

/// A fresh uniform candidate over `A-Z0-9`.
pub fn candidate() -> String {
    let mut rng = rand::thread_rng();
    (0..ORDER_ID_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Assigns candidates to `order` and inserts, retrying on id collisions.
///
/// Returns the persisted order with its final id. Non-collision insert
/// errors (including `DuplicatePayment`) propagate to the caller on the
/// first attempt.
pub async fn insert_with_fresh_id<S: OrderStore + ?Sized>(
    store: &S,
    mut order: Order,
) -> Result<Order> {
    for attempt in 1..=MAX_ATTEMPTS {
        order.set_order_id(candidate());
        match store.insert_order(&order).await {
            Ok(()) => return Ok(order),
            Err(StoreError::DuplicateOrderId(id)) => {
                tracing::warn!(order_id = %id, attempt, "order id collision, retrying");
            }
            Err(e) => return Err(e),
        }
    }
    Err(StoreError::IdGenerationExhausted(MAX_ATTEMPTS))
}
