use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use wms_core::{BinId, Entity, ItemId, LocationId, OrderId, PickListId, PickTaskId, ZoneId};
use wms_inventory::{Bin, Item, Location, StockMovement, Zone, balance_of};
use wms_orders::{Order, OrderLine, OrderStatus, OrderType, ShipmentTracking};
use wms_picking::{PickList, PickListStatus, PickTask};

use super::{StoreError, StoreTx, WarehouseStore, constraints};
use crate::audit::AuditEntry;

#[derive(Debug, Clone)]
struct OrderRow {
    order_number: String,
    order_type: OrderType,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    seq: u64,
}

#[derive(Debug, Clone)]
struct PickListRow {
    order_id: OrderId,
    status: PickListStatus,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    done_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
struct State {
    items: HashMap<ItemId, Item>,
    locations: HashMap<LocationId, Location>,
    zones: HashMap<ZoneId, Zone>,
    bins: HashMap<BinId, Bin>,
    bin_items: BTreeSet<(BinId, ItemId)>,
    /// Append-only, in recording order.
    movements: Vec<StockMovement>,
    orders: HashMap<OrderId, OrderRow>,
    order_lines: Vec<(OrderId, OrderLine)>,
    picklists: HashMap<PickListId, PickListRow>,
    pick_tasks: Vec<(PickListId, PickTask)>,
    /// At most one per order.
    tracking: HashMap<OrderId, ShipmentTracking>,
    audit: Vec<AuditEntry>,
    next_seq: u64,
}

/// In-memory warehouse store.
///
/// Intended for tests/dev. A transaction holds the store's single lock for
/// its whole lifetime and works on a private copy of the state, which is
/// swapped in on commit and discarded on drop. Transactions are therefore
/// fully serialized.
///
/// `begin` clones the entire state, so every transaction costs time and
/// memory proportional to the store size (the movement ledger and audit log
/// dominate). Keep data sets small; use [`PostgresStore`](super::PostgresStore)
/// for anything long-lived.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WarehouseStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        // Full copy; see the type-level note on cost.
        let working = guard.clone();
        Ok(Box::new(InMemoryTx { guard, working }))
    }
}

struct InMemoryTx {
    guard: OwnedMutexGuard<State>,
    working: State,
}

impl State {
    fn order(&self, id: OrderId) -> Option<Order> {
        let row = self.orders.get(&id)?;
        let lines = self
            .order_lines
            .iter()
            .filter(|(order_id, _)| *order_id == id)
            .map(|(_, line)| line.clone())
            .collect();
        Some(Order::restore(
            id,
            row.order_number.clone(),
            row.order_type,
            row.status,
            row.created_at,
            lines,
        ))
    }

    fn order_id_by_number(&self, number: &str) -> Option<OrderId> {
        self.orders
            .iter()
            .find(|(_, row)| row.order_number == number)
            .map(|(id, _)| *id)
    }

    fn picklist(&self, id: PickListId) -> Option<PickList> {
        let row = self.picklists.get(&id)?;
        let order_number = self
            .orders
            .get(&row.order_id)
            .map(|o| o.order_number.clone())
            .unwrap_or_default();
        let tasks = self
            .pick_tasks
            .iter()
            .filter(|(picklist_id, _)| *picklist_id == id)
            .map(|(_, task)| task.clone())
            .collect();
        Some(PickList::restore(
            id,
            row.order_id,
            order_number,
            row.status,
            row.created_at,
            row.started_at,
            row.done_at,
            tasks,
        ))
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn insert_item(&mut self, item: &Item) -> Result<(), StoreError> {
        let s = &mut self.working;
        if s.items.values().any(|i| i.sku == item.sku) {
            return Err(StoreError::unique(constraints::ITEM_SKU));
        }
        s.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn item_by_sku(&mut self, sku: &str) -> Result<Option<Item>, StoreError> {
        Ok(self.working.items.values().find(|i| i.sku == sku).cloned())
    }

    async fn item_by_id(&mut self, id: ItemId) -> Result<Option<Item>, StoreError> {
        Ok(self.working.items.get(&id).cloned())
    }

    async fn update_item_description(
        &mut self,
        id: ItemId,
        description: &str,
    ) -> Result<(), StoreError> {
        if let Some(item) = self.working.items.get_mut(&id) {
            item.description = description.to_string();
        }
        Ok(())
    }

    async fn list_items(&mut self) -> Result<Vec<Item>, StoreError> {
        let mut items: Vec<Item> = self.working.items.values().cloned().collect();
        items.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(items)
    }

    async fn delete_item(&mut self, id: ItemId) -> Result<bool, StoreError> {
        let s = &mut self.working;
        if s.movements.iter().any(|m| m.item_id == id) {
            return Err(StoreError::foreign_key("stock_movements_item_id_fkey"));
        }
        if s.order_lines.iter().any(|(_, l)| l.item.id == id) {
            return Err(StoreError::foreign_key("order_lines_item_id_fkey"));
        }
        if s.bin_items.iter().any(|(_, item)| *item == id) {
            return Err(StoreError::foreign_key("bin_items_item_id_fkey"));
        }
        Ok(s.items.remove(&id).is_some())
    }

    async fn insert_location(&mut self, location: &Location) -> Result<(), StoreError> {
        let s = &mut self.working;
        if s.locations.values().any(|l| l.code == location.code) {
            return Err(StoreError::unique(constraints::LOCATION_CODE));
        }
        s.locations.insert(location.id, location.clone());
        Ok(())
    }

    async fn location_by_code(&mut self, code: &str) -> Result<Option<Location>, StoreError> {
        Ok(self
            .working
            .locations
            .values()
            .find(|l| l.code == code)
            .cloned())
    }

    async fn list_locations(&mut self) -> Result<Vec<Location>, StoreError> {
        let mut locations: Vec<Location> = self.working.locations.values().cloned().collect();
        locations.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(locations)
    }

    async fn delete_location(&mut self, id: LocationId) -> Result<bool, StoreError> {
        let s = &mut self.working;
        if s.zones.values().any(|z| z.location_id == id) {
            return Err(StoreError::foreign_key("zones_location_id_fkey"));
        }
        if s.bins.values().any(|b| b.location_id == id) {
            return Err(StoreError::foreign_key("bins_location_id_fkey"));
        }
        if s.movements.iter().any(|m| m.location_id == id) {
            return Err(StoreError::foreign_key("stock_movements_location_id_fkey"));
        }
        if s.order_lines.iter().any(|(_, l)| l.location.id == id) {
            return Err(StoreError::foreign_key("order_lines_location_id_fkey"));
        }
        Ok(s.locations.remove(&id).is_some())
    }

    async fn insert_zone(&mut self, zone: &Zone) -> Result<(), StoreError> {
        let s = &mut self.working;
        if !s.locations.contains_key(&zone.location_id) {
            return Err(StoreError::foreign_key("zones_location_id_fkey"));
        }
        if s
            .zones
            .values()
            .any(|z| z.location_id == zone.location_id && z.code == zone.code)
        {
            return Err(StoreError::unique(constraints::ZONE_CODE));
        }
        s.zones.insert(zone.id, zone.clone());
        Ok(())
    }

    async fn zone_by_code(
        &mut self,
        location_id: LocationId,
        code: &str,
    ) -> Result<Option<Zone>, StoreError> {
        Ok(self
            .working
            .zones
            .values()
            .find(|z| z.location_id == location_id && z.code == code)
            .cloned())
    }

    async fn list_zones(&mut self, location_id: LocationId) -> Result<Vec<Zone>, StoreError> {
        let mut zones: Vec<Zone> = self
            .working
            .zones
            .values()
            .filter(|z| z.location_id == location_id)
            .cloned()
            .collect();
        zones.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(zones)
    }

    async fn delete_zone(&mut self, id: ZoneId) -> Result<bool, StoreError> {
        let s = &mut self.working;
        if s.bins.values().any(|b| b.zone_id == id) {
            return Err(StoreError::foreign_key("bins_zone_id_fkey"));
        }
        Ok(s.zones.remove(&id).is_some())
    }

    async fn insert_bin(&mut self, bin: &Bin) -> Result<(), StoreError> {
        let s = &mut self.working;
        if !s.locations.contains_key(&bin.location_id) {
            return Err(StoreError::foreign_key("bins_location_id_fkey"));
        }
        if !s.zones.contains_key(&bin.zone_id) {
            return Err(StoreError::foreign_key("bins_zone_id_fkey"));
        }
        if s
            .bins
            .values()
            .any(|b| b.location_id == bin.location_id && b.code == bin.code)
        {
            return Err(StoreError::unique(constraints::BIN_CODE));
        }
        s.bins.insert(bin.id, bin.clone());
        Ok(())
    }

    async fn bin_by_code(
        &mut self,
        location_id: LocationId,
        code: &str,
    ) -> Result<Option<Bin>, StoreError> {
        Ok(self
            .working
            .bins
            .values()
            .find(|b| b.location_id == location_id && b.code == code)
            .cloned())
    }

    async fn bin_by_id(&mut self, id: BinId) -> Result<Option<Bin>, StoreError> {
        Ok(self.working.bins.get(&id).cloned())
    }

    async fn list_bins(&mut self, location_id: LocationId) -> Result<Vec<Bin>, StoreError> {
        let mut bins: Vec<Bin> = self
            .working
            .bins
            .values()
            .filter(|b| b.location_id == location_id)
            .cloned()
            .collect();
        bins.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(bins)
    }

    async fn delete_bin(&mut self, id: BinId) -> Result<bool, StoreError> {
        let s = &mut self.working;
        if s.bin_items.iter().any(|(bin, _)| *bin == id) {
            return Err(StoreError::foreign_key("bin_items_bin_id_fkey"));
        }
        for (_, task) in s.pick_tasks.iter_mut() {
            if task.bin_id == Some(id) {
                task.bin_id = None;
            }
        }
        Ok(s.bins.remove(&id).is_some())
    }

    async fn assign_item_to_bin(&mut self, bin: BinId, item: ItemId) -> Result<bool, StoreError> {
        let s = &mut self.working;
        if !s.bins.contains_key(&bin) {
            return Err(StoreError::foreign_key("bin_items_bin_id_fkey"));
        }
        if !s.items.contains_key(&item) {
            return Err(StoreError::foreign_key("bin_items_item_id_fkey"));
        }
        Ok(s.bin_items.insert((bin, item)))
    }

    async fn unassign_item_from_bin(
        &mut self,
        bin: BinId,
        item: ItemId,
    ) -> Result<bool, StoreError> {
        Ok(self.working.bin_items.remove(&(bin, item)))
    }

    async fn bin_items(&mut self, bin: BinId) -> Result<Vec<Item>, StoreError> {
        let s = &self.working;
        let mut items: Vec<Item> = s
            .bin_items
            .iter()
            .filter(|(b, _)| *b == bin)
            .filter_map(|(_, item)| s.items.get(item).cloned())
            .collect();
        items.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(items)
    }

    async fn bins_holding_item(
        &mut self,
        item: ItemId,
        location: LocationId,
    ) -> Result<Vec<BinId>, StoreError> {
        let s = &self.working;
        let mut bins: Vec<&Bin> = s
            .bin_items
            .iter()
            .filter(|(_, i)| *i == item)
            .filter_map(|(bin, _)| s.bins.get(bin))
            .filter(|b| b.location_id == location)
            .collect();
        bins.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(bins.into_iter().map(|b| b.id).collect())
    }

    async fn lock_item_stock(&mut self, _item: ItemId) -> Result<(), StoreError> {
        // The transaction already holds the store lock.
        Ok(())
    }

    async fn stock_at(&mut self, item: ItemId, location: LocationId) -> Result<i64, StoreError> {
        balance_of(
            self.working
                .movements
                .iter()
                .filter(|m| m.item_id == item && m.location_id == location),
        )
        .ok_or_else(|| {
            StoreError::OutOfRange(format!("stock of item {item} at location {location}"))
        })
    }

    async fn stock_total(&mut self, item: ItemId) -> Result<i64, StoreError> {
        balance_of(self.working.movements.iter().filter(|m| m.item_id == item))
            .ok_or_else(|| StoreError::OutOfRange(format!("total stock of item {item}")))
    }

    async fn insert_movement(&mut self, movement: &StockMovement) -> Result<(), StoreError> {
        let s = &mut self.working;
        if !s.items.contains_key(&movement.item_id) {
            return Err(StoreError::foreign_key("stock_movements_item_id_fkey"));
        }
        if !s.locations.contains_key(&movement.location_id) {
            return Err(StoreError::foreign_key("stock_movements_location_id_fkey"));
        }
        s.movements.push(movement.clone());
        Ok(())
    }

    async fn movements_for_item(&mut self, item: ItemId) -> Result<Vec<StockMovement>, StoreError> {
        Ok(self
            .working
            .movements
            .iter()
            .filter(|m| m.item_id == item)
            .cloned()
            .collect())
    }

    async fn recent_movements_for_item(
        &mut self,
        item: ItemId,
        limit: usize,
    ) -> Result<Vec<StockMovement>, StoreError> {
        Ok(self
            .working
            .movements
            .iter()
            .rev()
            .filter(|m| m.item_id == item)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let s = &mut self.working;
        if s.order_id_by_number(order.order_number()).is_some() {
            return Err(StoreError::unique(constraints::ORDER_NUMBER));
        }
        let seq = s.next_seq();
        s.orders.insert(
            *order.id(),
            OrderRow {
                order_number: order.order_number().to_string(),
                order_type: order.order_type(),
                status: order.status(),
                created_at: order.created_at(),
                seq,
            },
        );
        Ok(())
    }

    async fn insert_order_line(
        &mut self,
        order: OrderId,
        line: &OrderLine,
    ) -> Result<(), StoreError> {
        let s = &mut self.working;
        if !s.orders.contains_key(&order) {
            return Err(StoreError::foreign_key("order_lines_order_id_fkey"));
        }
        if !s.items.contains_key(&line.item.id) {
            return Err(StoreError::foreign_key("order_lines_item_id_fkey"));
        }
        if !s.locations.contains_key(&line.location.id) {
            return Err(StoreError::foreign_key("order_lines_location_id_fkey"));
        }
        if s
            .order_lines
            .iter()
            .any(|(o, l)| *o == order && l.line_no == line.line_no)
        {
            return Err(StoreError::unique(constraints::ORDER_LINE_NO));
        }
        s.order_lines.push((order, line.clone()));
        Ok(())
    }

    async fn order_by_number(&mut self, number: &str) -> Result<Option<Order>, StoreError> {
        let s = &self.working;
        Ok(s.order_id_by_number(number).and_then(|id| s.order(id)))
    }

    async fn order_by_number_for_update(
        &mut self,
        number: &str,
    ) -> Result<Option<Order>, StoreError> {
        self.order_by_number(number).await
    }

    async fn order_by_id(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.working.order(id))
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        if let Some(row) = self.working.orders.get_mut(&id) {
            row.status = status;
        }
        Ok(())
    }

    async fn list_orders(&mut self, limit: usize) -> Result<Vec<Order>, StoreError> {
        let s = &self.working;
        let mut ids: Vec<(u64, OrderId)> = s.orders.iter().map(|(id, row)| (row.seq, *id)).collect();
        ids.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(ids
            .into_iter()
            .take(limit)
            .filter_map(|(_, id)| s.order(id))
            .collect())
    }

    async fn upsert_tracking(&mut self, tracking: &ShipmentTracking) -> Result<(), StoreError> {
        let s = &mut self.working;
        if !s.orders.contains_key(&tracking.order_id) {
            return Err(StoreError::foreign_key("shipment_tracking_order_id_fkey"));
        }
        s.tracking.insert(tracking.order_id, tracking.clone());
        Ok(())
    }

    async fn tracking_for_order(
        &mut self,
        order: OrderId,
    ) -> Result<Option<ShipmentTracking>, StoreError> {
        Ok(self.working.tracking.get(&order).cloned())
    }

    async fn delete_tracking(&mut self, order: OrderId) -> Result<bool, StoreError> {
        Ok(self.working.tracking.remove(&order).is_some())
    }

    async fn insert_picklist(&mut self, picklist: &PickList) -> Result<(), StoreError> {
        let s = &mut self.working;
        if !s.orders.contains_key(&picklist.order_id()) {
            return Err(StoreError::foreign_key("picklists_order_id_fkey"));
        }
        if s
            .picklists
            .values()
            .any(|p| p.order_id == picklist.order_id())
        {
            return Err(StoreError::unique(constraints::PICKLIST_ORDER));
        }
        for task in picklist.tasks() {
            if s
                .pick_tasks
                .iter()
                .any(|(_, t)| t.order_line_id == task.order_line_id)
            {
                return Err(StoreError::unique(constraints::PICK_TASK_LINE));
            }
        }

        let id = *picklist.id();
        s.picklists.insert(
            id,
            PickListRow {
                order_id: picklist.order_id(),
                status: picklist.status(),
                created_at: picklist.created_at(),
                started_at: picklist.started_at(),
                done_at: picklist.done_at(),
            },
        );
        s.pick_tasks
            .extend(picklist.tasks().iter().map(|t| (id, t.clone())));
        Ok(())
    }

    async fn picklist_by_id(&mut self, id: PickListId) -> Result<Option<PickList>, StoreError> {
        Ok(self.working.picklist(id))
    }

    async fn picklist_by_id_for_update(
        &mut self,
        id: PickListId,
    ) -> Result<Option<PickList>, StoreError> {
        Ok(self.working.picklist(id))
    }

    async fn picklist_id_for_task(
        &mut self,
        task: PickTaskId,
    ) -> Result<Option<PickListId>, StoreError> {
        Ok(self
            .working
            .pick_tasks
            .iter()
            .find(|(_, t)| t.id == task)
            .map(|(picklist_id, _)| *picklist_id))
    }

    async fn picklist_id_for_order(
        &mut self,
        order: OrderId,
    ) -> Result<Option<PickListId>, StoreError> {
        Ok(self
            .working
            .picklists
            .iter()
            .find(|(_, row)| row.order_id == order)
            .map(|(id, _)| *id))
    }

    async fn update_picklist(&mut self, picklist: &PickList) -> Result<(), StoreError> {
        if let Some(row) = self.working.picklists.get_mut(picklist.id()) {
            row.status = picklist.status();
            row.started_at = picklist.started_at();
            row.done_at = picklist.done_at();
        }
        Ok(())
    }

    async fn update_pick_task(&mut self, task: &PickTask) -> Result<(), StoreError> {
        if let Some((_, stored)) = self
            .working
            .pick_tasks
            .iter_mut()
            .find(|(_, t)| t.id == task.id)
        {
            stored.status = task.status;
            stored.picked_at = task.picked_at;
        }
        Ok(())
    }

    async fn insert_audit_entry(&mut self, entry: &AuditEntry) -> Result<(), StoreError> {
        self.working.audit.push(entry.clone());
        Ok(())
    }

    async fn recent_audit_entries(&mut self, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self.working.audit.iter().rev().take(limit).cloned().collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
