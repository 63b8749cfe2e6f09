//! Aggregate traits for the stateful parts of the warehouse model.
//!
//! Orders and picklists are persisted as relational rows, but every change to
//! them is still decided by a pure `handle` and evolved by `apply`. Services
//! translate the emitted events into row updates inside one store transaction.

use crate::entity::Entity;

/// Aggregate execution semantics (pure, deterministic).
///
/// An aggregate is the only entry point for mutating the entities it owns
/// (an order owns its lines, a picklist owns its tasks).
///
/// - **Decision logic**: `handle(&self, cmd)` returns events.
/// - **State mutation**: `apply(&mut self, event)` evolves state.
///
/// Aggregates must not perform IO. Facts that live in storage (stock
/// balances, candidate bins, the current time) are carried in the command.
pub trait Aggregate: Entity {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Evolve in-memory state from a single event.
    fn apply(&mut self, event: &Self::Event);

    /// Decide which events to emit given the current state and a command.
    ///
    /// This must not mutate state. State evolution is done through `apply`.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Handle a command and apply the resulting events in order.
    fn execute(&mut self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let events = self.handle(command)?;
        for event in &events {
            self.apply(event);
        }
        Ok(events)
    }
}
