//! Picking workflow domain module.
//!
//! A picklist is generated from a posted order, with one pick task per order
//! line. Implemented purely as deterministic domain logic (no IO, no storage).

pub mod picklist;

pub use picklist::{
    CreatePickList, FinishPickList, MarkTaskPicked, PickList, PickListCommand, PickListCreated,
    PickListDone, PickListEvent, PickListStarted, PickListStatus, PickTask, PickTaskStatus,
    StartPickList, TaskPicked, TaskSource, resolve_bin,
};
