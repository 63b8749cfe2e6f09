//! Inventory domain module: catalog/topology entities and the stock ledger.
//!
//! This crate contains business rules for inventory, implemented purely as
//! deterministic domain logic (no IO, no storage).

pub mod catalog;
pub mod ledger;

pub use catalog::{Bin, BinRef, Item, ItemRef, Location, LocationRef, Zone};
pub use ledger::{
    Balances, MovementType, StockKey, StockMovement, balance_of, normalize_reference,
    order_reference,
};
