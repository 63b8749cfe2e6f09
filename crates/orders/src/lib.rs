//! Order lifecycle domain module.
//!
//! Orders accumulate lines while DRAFT; posting converts every line into a
//! ledger movement in one decision. Implemented purely as deterministic
//! domain logic (no IO, no storage).

pub mod order;
pub mod tracking;

pub use order::{
    AddLine, CancelOrder, CreateOrder, LineAdded, Order, OrderCancelled, OrderCommand,
    OrderCreated, OrderEvent, OrderLine, OrderPosted, OrderStatus, OrderType, PostOrder,
};
pub use tracking::ShipmentTracking;
