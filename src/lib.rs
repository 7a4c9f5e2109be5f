//! Storefront checkout and order service.
//!
//! The core of this crate is the cart-pricing and order-placement
//! workflow: turning a user's cart (or an ad-hoc product list) into a
//! priced, stock-consistent order with a short unique human-facing id.
//!
//! ## Layout
//! - [`domain`] — aggregates (product, cart, coupon, order), value
//!   objects, and domain events
//! - [`pricing`] — the pure pricing engine
//! - [`sequencer`] — order-id generation with collision retry
//! - [`store`] — persistence traits plus in-memory and Postgres backends
//! - [`services`] — the cart service and the order workflow
//! - [`notify`] / [`payment`] — the external-collaborator seams

pub mod config;
pub mod domain;
pub mod error;
pub mod notify;
pub mod payment;
pub mod pricing;
pub mod sequencer;
pub mod services;
pub mod store;

pub use error::{Result, StoreError};
