//! Application services orchestrating the domain over the store traits.

pub mod cart;
pub mod orders;

pub use cart::CartService;
pub use orders::{
    OrderLineRequest, OrderService, OrderSource, PlaceOrderRequest, PlacedOrder, StockWarning,
};
