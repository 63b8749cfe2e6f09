//! `wms-core` — domain foundation building blocks for the warehouse system.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod event;
pub mod id;
pub mod value_object;

pub use aggregate::Aggregate;
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use event::Event;
pub use id::{
    AuditEntryId, BinId, ItemId, LocationId, MovementId, OrderId, OrderLineId, PickListId,
    PickTaskId, ZoneId,
};
pub use value_object::{Quantity, ValueObject};
