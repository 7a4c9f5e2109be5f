//! Aggregates module
pub mod cart;
pub mod coupon;
pub mod order;
pub mod product;

pub use cart::{Cart, CartItem};
pub use coupon::Coupon;
pub use order::{NewOrder, Order, OrderLine};
pub use product::Product;
