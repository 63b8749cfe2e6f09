//! Append-only stock ledger model.
//!
//! Quantities are never stored; they are derived by summing movements:
//! `stock(item, location) = Σ IN − Σ OUT` over the movements of that pair.
//! A movement, once created, is never updated or deleted.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wms_core::{DomainError, DomainResult, Entity, Event, ItemId, LocationId, MovementId, Quantity};

use crate::catalog::{ItemRef, LocationRef};

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementType {
    In,
    Out,
}

impl MovementType {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::In => "IN",
            MovementType::Out => "OUT",
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IN" => Ok(MovementType::In),
            "OUT" => Ok(MovementType::Out),
            other => Err(DomainError::validation(format!(
                "unknown movement type: {other}"
            ))),
        }
    }
}

/// The unit a balance is tracked for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub item_id: ItemId,
    pub location_id: LocationId,
}

impl StockKey {
    pub fn new(item_id: ItemId, location_id: LocationId) -> Self {
        Self {
            item_id,
            location_id,
        }
    }
}

/// Immutable ledger fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub movement_type: MovementType,
    pub quantity: Quantity,
    pub created_at: DateTime<Utc>,
    pub reference: Option<String>,
}

impl StockMovement {
    pub fn new(
        movement_type: MovementType,
        item_id: ItemId,
        location_id: LocationId,
        quantity: Quantity,
        reference: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MovementId::new(),
            item_id,
            location_id,
            movement_type,
            quantity,
            created_at,
            reference: normalize_reference(reference),
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.item_id, self.location_id)
    }

    /// Contribution of this movement to the balance of its key.
    pub fn signed_quantity(&self) -> i64 {
        match self.movement_type {
            MovementType::In => self.quantity.get(),
            MovementType::Out => -self.quantity.get(),
        }
    }
}

impl Entity for StockMovement {
    type Id = MovementId;
    const KIND: &'static str = "stock movement";

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A movement is itself the ledger fact, so it doubles as its own event.
impl Event for StockMovement {
    fn event_type(&self) -> &'static str {
        match self.movement_type {
            MovementType::In => "inventory.stock.received",
            MovementType::Out => "inventory.stock.issued",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Trims a free-text reference; blank references are not stored.
pub fn normalize_reference(reference: Option<&str>) -> Option<String> {
    reference
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
}

/// Reference attached to every movement written by posting an order.
pub fn order_reference(order_number: &str) -> String {
    format!("ORDER-{order_number}")
}

/// Σ IN − Σ OUT over the given movements, or `None` when the sum leaves the
/// `i64` range.
pub fn balance_of<'a>(movements: impl IntoIterator<Item = &'a StockMovement>) -> Option<i64> {
    movements
        .into_iter()
        .try_fold(0i64, |acc, m| acc.checked_add(m.signed_quantity()))
}

/// Running balances for a set of stock keys.
///
/// Seeded with the stored balances of every key an operation touches, then
/// updated as movements are planned, so several withdrawals from the same
/// (item, location) inside one unit of work are checked cumulatively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Balances {
    balances: HashMap<StockKey, i64>,
}

impl Balances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: StockKey, balance: i64) {
        self.balances.insert(key, balance);
    }

    pub fn get(&self, key: &StockKey) -> i64 {
        self.balances.get(key).copied().unwrap_or(0)
    }

    /// Deposits `quantity`, failing with `Validation` when the running balance
    /// would exceed `i64::MAX`. On failure the balance is untouched.
    pub fn deposit(
        &mut self,
        item: &ItemRef,
        location: &LocationRef,
        quantity: Quantity,
    ) -> DomainResult<()> {
        let key = StockKey::new(item.id, location.id);
        let balance = self.get(&key).checked_add(quantity.get()).ok_or_else(|| {
            DomainError::validation(format!(
                "stock of item {} at location {} would exceed the maximum balance",
                item.sku, location.code
            ))
        })?;
        self.balances.insert(key, balance);
        Ok(())
    }

    /// Withdraws `quantity`, failing with `InsufficientStock` when the running
    /// balance is lower than requested. On failure the balance is untouched.
    pub fn withdraw(
        &mut self,
        item: &ItemRef,
        location: &LocationRef,
        quantity: Quantity,
    ) -> DomainResult<()> {
        let key = StockKey::new(item.id, location.id);
        let available = self.get(&key);
        if available < quantity.get() {
            return Err(DomainError::InsufficientStock {
                sku: item.sku.clone(),
                location: location.code.clone(),
                available,
                requested: quantity.get(),
            });
        }
        self.balances.insert(key, available - quantity.get());
        Ok(())
    }
}

impl FromIterator<(StockKey, i64)> for Balances {
    fn from_iter<T: IntoIterator<Item = (StockKey, i64)>>(iter: T) -> Self {
        Self {
            balances: iter.into_iter().collect(),
        }
    }
}
