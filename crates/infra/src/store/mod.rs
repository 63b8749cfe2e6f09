//! Persistence boundary for the warehouse.
//!
//! Every service operation runs inside exactly one [`StoreTx`]. A transaction
//! that is dropped without [`StoreTx::commit`] rolls back, so an early `?`
//! return discards all writes made so far.
//!
//! Uniqueness (SKU, location code, zone/bin code per location, order number,
//! one picklist per order, one task per order line) is enforced by the store
//! itself. Callers insert and interpret [`StoreError::UniqueViolation`]; they
//! never check-then-insert.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use thiserror::Error;

use wms_core::{BinId, ItemId, LocationId, OrderId, PickListId, PickTaskId, ZoneId};
use wms_inventory::{Bin, Item, Location, StockMovement, Zone};
use wms_orders::{Order, OrderLine, OrderStatus, ShipmentTracking};
use wms_picking::{PickList, PickTask};

use crate::audit::AuditEntry;

/// Constraint names shared by both stores, so services can map a violation
/// back to the identity that collided.
pub mod constraints {
    pub const ITEM_SKU: &str = "items_sku_key";
    pub const LOCATION_CODE: &str = "locations_code_key";
    pub const ZONE_CODE: &str = "zones_location_id_code_key";
    pub const BIN_CODE: &str = "bins_location_id_code_key";
    pub const BIN_ITEM: &str = "bin_items_pkey";
    pub const ORDER_NUMBER: &str = "orders_order_number_key";
    pub const ORDER_LINE_NO: &str = "order_lines_order_id_line_no_key";
    pub const PICKLIST_ORDER: &str = "picklists_order_id_key";
    pub const PICK_TASK_LINE: &str = "pick_tasks_order_line_id_key";
    pub const TRACKING_ORDER: &str = "shipment_tracking_order_id_key";
}

/// Storage failure.
///
/// These are infrastructure errors, as opposed to `DomainError`. Services map
/// the constraint variants onto domain conflicts where they carry meaning.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("foreign key constraint violated: {constraint}")]
    ForeignKeyViolation { constraint: String },

    /// A derived quantity does not fit in an `i64`.
    #[error("value out of range: {0}")]
    OutOfRange(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn unique(constraint: impl Into<String>) -> Self {
        Self::UniqueViolation {
            constraint: constraint.into(),
        }
    }

    pub fn foreign_key(constraint: impl Into<String>) -> Self {
        Self::ForeignKeyViolation {
            constraint: constraint.into(),
        }
    }

    pub fn is_unique_violation_of(&self, name: &str) -> bool {
        matches!(self, Self::UniqueViolation { constraint } if constraint == name)
    }
}

/// Handle to a warehouse database.
///
/// Implementations must be cheap to share (`Arc<dyn WarehouseStore>`).
#[async_trait]
pub trait WarehouseStore: Send + Sync {
    /// Open a new unit of work.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;
}

/// One unit of work. Reads observe the transaction's own writes.
#[async_trait]
pub trait StoreTx: Send {
    // --- catalog -----------------------------------------------------------

    async fn insert_item(&mut self, item: &Item) -> Result<(), StoreError>;
    async fn item_by_sku(&mut self, sku: &str) -> Result<Option<Item>, StoreError>;
    async fn item_by_id(&mut self, id: ItemId) -> Result<Option<Item>, StoreError>;
    async fn update_item_description(
        &mut self,
        id: ItemId,
        description: &str,
    ) -> Result<(), StoreError>;
    /// All items, ordered by SKU.
    async fn list_items(&mut self) -> Result<Vec<Item>, StoreError>;
    /// Fails with `ForeignKeyViolation` while movements, order lines or bin
    /// assignments reference the item.
    async fn delete_item(&mut self, id: ItemId) -> Result<bool, StoreError>;

    async fn insert_location(&mut self, location: &Location) -> Result<(), StoreError>;
    async fn location_by_code(&mut self, code: &str) -> Result<Option<Location>, StoreError>;
    /// All locations, ordered by code.
    async fn list_locations(&mut self) -> Result<Vec<Location>, StoreError>;
    async fn delete_location(&mut self, id: LocationId) -> Result<bool, StoreError>;

    async fn insert_zone(&mut self, zone: &Zone) -> Result<(), StoreError>;
    async fn zone_by_code(
        &mut self,
        location_id: LocationId,
        code: &str,
    ) -> Result<Option<Zone>, StoreError>;
    async fn list_zones(&mut self, location_id: LocationId) -> Result<Vec<Zone>, StoreError>;
    async fn delete_zone(&mut self, id: ZoneId) -> Result<bool, StoreError>;

    async fn insert_bin(&mut self, bin: &Bin) -> Result<(), StoreError>;
    async fn bin_by_code(
        &mut self,
        location_id: LocationId,
        code: &str,
    ) -> Result<Option<Bin>, StoreError>;
    async fn bin_by_id(&mut self, id: BinId) -> Result<Option<Bin>, StoreError>;
    async fn list_bins(&mut self, location_id: LocationId) -> Result<Vec<Bin>, StoreError>;
    async fn delete_bin(&mut self, id: BinId) -> Result<bool, StoreError>;

    /// Returns `false` when the item was already assigned.
    async fn assign_item_to_bin(&mut self, bin: BinId, item: ItemId) -> Result<bool, StoreError>;
    async fn unassign_item_from_bin(
        &mut self,
        bin: BinId,
        item: ItemId,
    ) -> Result<bool, StoreError>;
    async fn bin_items(&mut self, bin: BinId) -> Result<Vec<Item>, StoreError>;
    /// Bins at `location` that hold `item`, ordered by bin code.
    async fn bins_holding_item(
        &mut self,
        item: ItemId,
        location: LocationId,
    ) -> Result<Vec<BinId>, StoreError>;

    // --- ledger ------------------------------------------------------------

    /// Serializes concurrent stock movements of one item until this transaction ends.
    async fn lock_item_stock(&mut self, item: ItemId) -> Result<(), StoreError>;
    /// Σ IN − Σ OUT for the pair.
    async fn stock_at(&mut self, item: ItemId, location: LocationId) -> Result<i64, StoreError>;
    /// Σ IN − Σ OUT across all locations.
    async fn stock_total(&mut self, item: ItemId) -> Result<i64, StoreError>;
    async fn insert_movement(&mut self, movement: &StockMovement) -> Result<(), StoreError>;
    /// Movements of the item in the order they were recorded.
    async fn movements_for_item(&mut self, item: ItemId) -> Result<Vec<StockMovement>, StoreError>;
    /// The `limit` most recent movements of the item, newest first.
    async fn recent_movements_for_item(
        &mut self,
        item: ItemId,
        limit: usize,
    ) -> Result<Vec<StockMovement>, StoreError>;

    // --- orders ------------------------------------------------------------

    /// Inserts the order header. Lines are written with `insert_order_line`.
    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;
    async fn insert_order_line(
        &mut self,
        order: OrderId,
        line: &OrderLine,
    ) -> Result<(), StoreError>;
    async fn order_by_number(&mut self, number: &str) -> Result<Option<Order>, StoreError>;
    /// Like `order_by_number`, but holds a row lock on the order until the
    /// transaction ends.
    async fn order_by_number_for_update(
        &mut self,
        number: &str,
    ) -> Result<Option<Order>, StoreError>;
    async fn order_by_id(&mut self, id: OrderId) -> Result<Option<Order>, StoreError>;
    async fn update_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<(), StoreError>;
    /// Most recently created orders first.
    async fn list_orders(&mut self, limit: usize) -> Result<Vec<Order>, StoreError>;

    // --- tracking ----------------------------------------------------------

    /// Inserts the order's tracking record, or replaces it if one exists.
    async fn upsert_tracking(&mut self, tracking: &ShipmentTracking) -> Result<(), StoreError>;
    async fn tracking_for_order(
        &mut self,
        order: OrderId,
    ) -> Result<Option<ShipmentTracking>, StoreError>;
    /// Returns whether a record was removed.
    async fn delete_tracking(&mut self, order: OrderId) -> Result<bool, StoreError>;

    // --- picking -----------------------------------------------------------

    /// Inserts the picklist header and all of its tasks.
    async fn insert_picklist(&mut self, picklist: &PickList) -> Result<(), StoreError>;
    async fn picklist_by_id(&mut self, id: PickListId) -> Result<Option<PickList>, StoreError>;
    /// Like `picklist_by_id`, but holds a row lock on the picklist.
    async fn picklist_by_id_for_update(
        &mut self,
        id: PickListId,
    ) -> Result<Option<PickList>, StoreError>;
    async fn picklist_id_for_task(
        &mut self,
        task: PickTaskId,
    ) -> Result<Option<PickListId>, StoreError>;
    async fn picklist_id_for_order(
        &mut self,
        order: OrderId,
    ) -> Result<Option<PickListId>, StoreError>;
    /// Persists status and lifecycle timestamps of the header.
    async fn update_picklist(&mut self, picklist: &PickList) -> Result<(), StoreError>;
    async fn update_pick_task(&mut self, task: &PickTask) -> Result<(), StoreError>;

    // --- audit -------------------------------------------------------------

    async fn insert_audit_entry(&mut self, entry: &AuditEntry) -> Result<(), StoreError>;
    /// Newest first.
    async fn recent_audit_entries(&mut self, limit: usize) -> Result<Vec<AuditEntry>, StoreError>;

    /// Make every write of this transaction durable and visible.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
