//! Postgres-backed warehouse store.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `UniqueViolation { constraint }` |
//! | Database (foreign key violation) | `23503` | `ForeignKeyViolation { constraint }` |
//! | Database (numeric value out of range) | `22003` | `OutOfRange` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed, RowNotFound, Other | N/A | `Backend` |
//!
//! ## Locking
//!
//! Row locks (`SELECT … FOR UPDATE`) are taken on the order row before
//! posting, on the picklist row before any picking transition, and on the
//! item row before any stock movement. Balances are computed after the lock
//! is held, so two concurrent movements of one item are serialized.
//!
//! Dropping a [`StoreTx`] without committing rolls the transaction back.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use wms_core::{
    BinId, DomainError, Entity, ItemId, LocationId, OrderId, OrderLineId, PickListId, PickTaskId,
    Quantity, ZoneId,
};
use wms_inventory::{Bin, Item, ItemRef, Location, LocationRef, StockMovement, Zone};
use wms_orders::{Order, OrderLine, OrderStatus, ShipmentTracking};
use wms_picking::{PickList, PickTask};

use super::{StoreError, StoreTx, WarehouseStore};
use crate::audit::AuditEntry;

/// Idempotent schema bootstrap. Constraint names match [`super::constraints`].
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    id          UUID PRIMARY KEY,
    sku         TEXT NOT NULL CONSTRAINT items_sku_key UNIQUE,
    name        TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS locations (
    id   UUID PRIMARY KEY,
    code TEXT NOT NULL CONSTRAINT locations_code_key UNIQUE,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS zones (
    id          UUID PRIMARY KEY,
    location_id UUID NOT NULL CONSTRAINT zones_location_id_fkey REFERENCES locations(id),
    code        TEXT NOT NULL,
    name        TEXT NOT NULL DEFAULT '',
    CONSTRAINT zones_location_id_code_key UNIQUE (location_id, code)
);

CREATE TABLE IF NOT EXISTS bins (
    id          UUID PRIMARY KEY,
    location_id UUID NOT NULL CONSTRAINT bins_location_id_fkey REFERENCES locations(id),
    zone_id     UUID NOT NULL CONSTRAINT bins_zone_id_fkey REFERENCES zones(id),
    code        TEXT NOT NULL,
    name        TEXT NOT NULL DEFAULT '',
    CONSTRAINT bins_location_id_code_key UNIQUE (location_id, code)
);

CREATE TABLE IF NOT EXISTS bin_items (
    bin_id  UUID NOT NULL CONSTRAINT bin_items_bin_id_fkey REFERENCES bins(id),
    item_id UUID NOT NULL CONSTRAINT bin_items_item_id_fkey REFERENCES items(id),
    CONSTRAINT bin_items_pkey PRIMARY KEY (bin_id, item_id)
);

CREATE TABLE IF NOT EXISTS stock_movements (
    seq           BIGSERIAL PRIMARY KEY,
    id            UUID NOT NULL UNIQUE,
    item_id       UUID NOT NULL CONSTRAINT stock_movements_item_id_fkey REFERENCES items(id),
    location_id   UUID NOT NULL CONSTRAINT stock_movements_location_id_fkey REFERENCES locations(id),
    movement_type TEXT NOT NULL CHECK (movement_type IN ('IN', 'OUT')),
    quantity      BIGINT NOT NULL CHECK (quantity > 0),
    created_at    TIMESTAMPTZ NOT NULL,
    reference     TEXT
);

CREATE INDEX IF NOT EXISTS stock_movements_item_location_idx
    ON stock_movements (item_id, location_id);

CREATE TABLE IF NOT EXISTS orders (
    seq          BIGSERIAL NOT NULL,
    id           UUID PRIMARY KEY,
    order_number TEXT NOT NULL CONSTRAINT orders_order_number_key UNIQUE,
    order_type   TEXT NOT NULL CHECK (order_type IN ('INBOUND', 'OUTBOUND')),
    status       TEXT NOT NULL CHECK (status IN ('DRAFT', 'POSTED', 'CANCELLED')),
    created_at   TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS order_lines (
    id          UUID PRIMARY KEY,
    order_id    UUID NOT NULL CONSTRAINT order_lines_order_id_fkey REFERENCES orders(id),
    line_no     INTEGER NOT NULL,
    item_id     UUID NOT NULL CONSTRAINT order_lines_item_id_fkey REFERENCES items(id),
    location_id UUID NOT NULL CONSTRAINT order_lines_location_id_fkey REFERENCES locations(id),
    quantity    BIGINT NOT NULL CHECK (quantity > 0),
    CONSTRAINT order_lines_order_id_line_no_key UNIQUE (order_id, line_no)
);

CREATE TABLE IF NOT EXISTS picklists (
    id         UUID PRIMARY KEY,
    order_id   UUID NOT NULL CONSTRAINT picklists_order_id_fkey REFERENCES orders(id)
                             CONSTRAINT picklists_order_id_key UNIQUE,
    status     TEXT NOT NULL CHECK (status IN ('CREATED', 'IN_PROGRESS', 'DONE')),
    created_at TIMESTAMPTZ NOT NULL,
    started_at TIMESTAMPTZ,
    done_at    TIMESTAMPTZ
);

CREATE TABLE IF NOT EXISTS pick_tasks (
    seq           BIGSERIAL NOT NULL,
    id            UUID PRIMARY KEY,
    picklist_id   UUID NOT NULL CONSTRAINT pick_tasks_picklist_id_fkey REFERENCES picklists(id),
    order_line_id UUID NOT NULL CONSTRAINT pick_tasks_order_line_id_fkey REFERENCES order_lines(id)
                                CONSTRAINT pick_tasks_order_line_id_key UNIQUE,
    quantity      BIGINT NOT NULL CHECK (quantity > 0),
    status        TEXT NOT NULL CHECK (status IN ('OPEN', 'PICKED')),
    picked_at     TIMESTAMPTZ,
    bin_id        UUID CONSTRAINT pick_tasks_bin_id_fkey REFERENCES bins(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS shipment_tracking (
    order_id     UUID NOT NULL CONSTRAINT shipment_tracking_order_id_fkey REFERENCES orders(id)
                               CONSTRAINT shipment_tracking_order_id_key UNIQUE,
    tracking_id  TEXT NOT NULL CHECK (tracking_id <> ''),
    tracking_url TEXT NOT NULL DEFAULT '',
    carrier      TEXT NOT NULL DEFAULT '',
    created_at   TIMESTAMPTZ NOT NULL,
    updated_at   TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_entries (
    seq         BIGSERIAL PRIMARY KEY,
    id          UUID NOT NULL UNIQUE,
    recorded_at TIMESTAMPTZ NOT NULL,
    actor       TEXT NOT NULL,
    action      TEXT NOT NULL,
    entity      TEXT NOT NULL,
    entity_ref  TEXT NOT NULL,
    details     JSONB NOT NULL
);
"#;

/// Postgres-backed warehouse store.
///
/// `PostgresStore` is `Send + Sync` and cheap to clone; all operations go
/// through the SQLx connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create all tables, constraints and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        tracing::info!("schema is up to date");
        Ok(())
    }
}

#[async_trait]
impl WarehouseStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PostgresTx { tx }))
    }
}

struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

const ORDER_COLUMNS: &str = "id, order_number, order_type, status, created_at";
const TRACKING_COLUMNS: &str =
    "order_id, tracking_id, tracking_url, carrier, created_at, updated_at";
const PICKLIST_COLUMNS: &str =
    "p.id, p.order_id, o.order_number, p.status, p.created_at, p.started_at, p.done_at";
const MOVEMENT_COLUMNS: &str =
    "id, item_id, location_id, movement_type, quantity, created_at, reference";

impl PostgresTx {
    async fn load_order(&mut self, row: Option<PgRow>) -> Result<Option<Order>, StoreError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let id = OrderId::from_uuid(col(&row, "id")?);

        let line_rows = sqlx::query(
            r#"
            SELECT l.id, l.line_no, l.quantity, l.item_id, i.sku, l.location_id, loc.code
            FROM order_lines l
            JOIN items i ON i.id = l.item_id
            JOIN locations loc ON loc.id = l.location_id
            WHERE l.order_id = $1
            ORDER BY l.line_no
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_order_lines", e))?;

        let lines = line_rows
            .iter()
            .map(line_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Order::restore(
            id,
            col(&row, "order_number")?,
            parse_col(&row, "order_type")?,
            parse_col(&row, "status")?,
            col(&row, "created_at")?,
            lines,
        )))
    }

    async fn load_picklist(&mut self, row: Option<PgRow>) -> Result<Option<PickList>, StoreError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let id = PickListId::from_uuid(col(&row, "id")?);

        let task_rows = sqlx::query(
            r#"
            SELECT id, order_line_id, quantity, status, picked_at, bin_id
            FROM pick_tasks
            WHERE picklist_id = $1
            ORDER BY seq
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_pick_tasks", e))?;

        let tasks = task_rows
            .iter()
            .map(task_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(PickList::restore(
            id,
            OrderId::from_uuid(col(&row, "order_id")?),
            col(&row, "order_number")?,
            parse_col(&row, "status")?,
            col(&row, "created_at")?,
            col(&row, "started_at")?,
            col(&row, "done_at")?,
            tasks,
        )))
    }

    async fn picklist_row(&mut self, id: PickListId, lock: bool) -> Result<Option<PgRow>, StoreError> {
        let sql = format!(
            "SELECT {PICKLIST_COLUMNS} FROM picklists p JOIN orders o ON o.id = p.order_id WHERE p.id = $1{}",
            if lock { " FOR UPDATE OF p" } else { "" }
        );
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("load_picklist", e))
    }

    async fn order_row_by_number(
        &mut self,
        number: &str,
        lock: bool,
    ) -> Result<Option<PgRow>, StoreError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        sqlx::query(&sql)
            .bind(number)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("load_order", e))
    }

    async fn delete_by_id(&mut self, table: &'static str, id: &Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(table, e))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn insert_item(&mut self, item: &Item) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO items (id, sku, name, description) VALUES ($1, $2, $3, $4)")
            .bind(item.id.as_uuid())
            .bind(&item.sku)
            .bind(&item.name)
            .bind(&item.description)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_item", e))?;
        Ok(())
    }

    async fn item_by_sku(&mut self, sku: &str) -> Result<Option<Item>, StoreError> {
        sqlx::query("SELECT id, sku, name, description FROM items WHERE sku = $1")
            .bind(sku)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("item_by_sku", e))?
            .as_ref()
            .map(item_from_row)
            .transpose()
    }

    async fn item_by_id(&mut self, id: ItemId) -> Result<Option<Item>, StoreError> {
        sqlx::query("SELECT id, sku, name, description FROM items WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("item_by_id", e))?
            .as_ref()
            .map(item_from_row)
            .transpose()
    }

    async fn update_item_description(
        &mut self,
        id: ItemId,
        description: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE items SET description = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(description)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_item_description", e))?;
        Ok(())
    }

    async fn list_items(&mut self) -> Result<Vec<Item>, StoreError> {
        sqlx::query("SELECT id, sku, name, description FROM items ORDER BY sku")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_items", e))?
            .iter()
            .map(item_from_row)
            .collect()
    }

    async fn delete_item(&mut self, id: ItemId) -> Result<bool, StoreError> {
        self.delete_by_id("items", id.as_uuid()).await
    }

    async fn insert_location(&mut self, location: &Location) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO locations (id, code, name) VALUES ($1, $2, $3)")
            .bind(location.id.as_uuid())
            .bind(&location.code)
            .bind(&location.name)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_location", e))?;
        Ok(())
    }

    async fn location_by_code(&mut self, code: &str) -> Result<Option<Location>, StoreError> {
        sqlx::query("SELECT id, code, name FROM locations WHERE code = $1")
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("location_by_code", e))?
            .as_ref()
            .map(location_from_row)
            .transpose()
    }

    async fn list_locations(&mut self) -> Result<Vec<Location>, StoreError> {
        sqlx::query("SELECT id, code, name FROM locations ORDER BY code")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_locations", e))?
            .iter()
            .map(location_from_row)
            .collect()
    }

    async fn delete_location(&mut self, id: LocationId) -> Result<bool, StoreError> {
        self.delete_by_id("locations", id.as_uuid()).await
    }

    async fn insert_zone(&mut self, zone: &Zone) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO zones (id, location_id, code, name) VALUES ($1, $2, $3, $4)")
            .bind(zone.id.as_uuid())
            .bind(zone.location_id.as_uuid())
            .bind(&zone.code)
            .bind(&zone.name)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_zone", e))?;
        Ok(())
    }

    async fn zone_by_code(
        &mut self,
        location_id: LocationId,
        code: &str,
    ) -> Result<Option<Zone>, StoreError> {
        sqlx::query("SELECT id, location_id, code, name FROM zones WHERE location_id = $1 AND code = $2")
            .bind(location_id.as_uuid())
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("zone_by_code", e))?
            .as_ref()
            .map(zone_from_row)
            .transpose()
    }

    async fn list_zones(&mut self, location_id: LocationId) -> Result<Vec<Zone>, StoreError> {
        sqlx::query("SELECT id, location_id, code, name FROM zones WHERE location_id = $1 ORDER BY code")
            .bind(location_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_zones", e))?
            .iter()
            .map(zone_from_row)
            .collect()
    }

    async fn delete_zone(&mut self, id: ZoneId) -> Result<bool, StoreError> {
        self.delete_by_id("zones", id.as_uuid()).await
    }

    async fn insert_bin(&mut self, bin: &Bin) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO bins (id, location_id, zone_id, code, name) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(bin.id.as_uuid())
        .bind(bin.location_id.as_uuid())
        .bind(bin.zone_id.as_uuid())
        .bind(&bin.code)
        .bind(&bin.name)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_bin", e))?;
        Ok(())
    }

    async fn bin_by_code(
        &mut self,
        location_id: LocationId,
        code: &str,
    ) -> Result<Option<Bin>, StoreError> {
        sqlx::query(
            "SELECT id, location_id, zone_id, code, name FROM bins WHERE location_id = $1 AND code = $2",
        )
        .bind(location_id.as_uuid())
        .bind(code)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("bin_by_code", e))?
        .as_ref()
        .map(bin_from_row)
        .transpose()
    }

    async fn bin_by_id(&mut self, id: BinId) -> Result<Option<Bin>, StoreError> {
        sqlx::query("SELECT id, location_id, zone_id, code, name FROM bins WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("bin_by_id", e))?
            .as_ref()
            .map(bin_from_row)
            .transpose()
    }

    async fn list_bins(&mut self, location_id: LocationId) -> Result<Vec<Bin>, StoreError> {
        sqlx::query(
            "SELECT id, location_id, zone_id, code, name FROM bins WHERE location_id = $1 ORDER BY code",
        )
        .bind(location_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_bins", e))?
        .iter()
        .map(bin_from_row)
        .collect()
    }

    async fn delete_bin(&mut self, id: BinId) -> Result<bool, StoreError> {
        self.delete_by_id("bins", id.as_uuid()).await
    }

    async fn assign_item_to_bin(&mut self, bin: BinId, item: ItemId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO bin_items (bin_id, item_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(bin.as_uuid())
        .bind(item.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("assign_item_to_bin", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn unassign_item_from_bin(
        &mut self,
        bin: BinId,
        item: ItemId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM bin_items WHERE bin_id = $1 AND item_id = $2")
            .bind(bin.as_uuid())
            .bind(item.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("unassign_item_from_bin", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn bin_items(&mut self, bin: BinId) -> Result<Vec<Item>, StoreError> {
        sqlx::query(
            r#"
            SELECT i.id, i.sku, i.name, i.description
            FROM bin_items bi
            JOIN items i ON i.id = bi.item_id
            WHERE bi.bin_id = $1
            ORDER BY i.sku
            "#,
        )
        .bind(bin.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("bin_items", e))?
        .iter()
        .map(item_from_row)
        .collect()
    }

    async fn bins_holding_item(
        &mut self,
        item: ItemId,
        location: LocationId,
    ) -> Result<Vec<BinId>, StoreError> {
        sqlx::query(
            r#"
            SELECT b.id
            FROM bins b
            JOIN bin_items bi ON bi.bin_id = b.id
            WHERE bi.item_id = $1 AND b.location_id = $2
            ORDER BY b.code
            "#,
        )
        .bind(item.as_uuid())
        .bind(location.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("bins_holding_item", e))?
        .iter()
        .map(|row| col(row, "id").map(BinId::from_uuid))
        .collect()
    }

    async fn lock_item_stock(&mut self, item: ItemId) -> Result<(), StoreError> {
        sqlx::query("SELECT id FROM items WHERE id = $1 FOR UPDATE")
            .bind(item.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_item_stock", e))?;
        Ok(())
    }

    async fn stock_at(&mut self, item: ItemId, location: LocationId) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(CASE WHEN movement_type = 'IN' THEN quantity ELSE -quantity END), 0)::BIGINT
                AS balance
            FROM stock_movements
            WHERE item_id = $1 AND location_id = $2
            "#,
        )
        .bind(item.as_uuid())
        .bind(location.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("stock_at", e))?;
        col(&row, "balance")
    }

    async fn stock_total(&mut self, item: ItemId) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(CASE WHEN movement_type = 'IN' THEN quantity ELSE -quantity END), 0)::BIGINT
                AS balance
            FROM stock_movements
            WHERE item_id = $1
            "#,
        )
        .bind(item.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("stock_total", e))?;
        col(&row, "balance")
    }

    async fn insert_movement(&mut self, movement: &StockMovement) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO stock_movements
                (id, item_id, location_id, movement_type, quantity, created_at, reference)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(movement.id.as_uuid())
        .bind(movement.item_id.as_uuid())
        .bind(movement.location_id.as_uuid())
        .bind(movement.movement_type.as_str())
        .bind(movement.quantity.get())
        .bind(movement.created_at)
        .bind(movement.reference.as_deref())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_movement", e))?;
        Ok(())
    }

    async fn movements_for_item(&mut self, item: ItemId) -> Result<Vec<StockMovement>, StoreError> {
        sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE item_id = $1 ORDER BY seq"
        ))
        .bind(item.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("movements_for_item", e))?
        .iter()
        .map(movement_from_row)
        .collect()
    }

    async fn recent_movements_for_item(
        &mut self,
        item: ItemId,
        limit: usize,
    ) -> Result<Vec<StockMovement>, StoreError> {
        sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE item_id = $1 ORDER BY seq DESC LIMIT $2"
        ))
        .bind(item.as_uuid())
        .bind(limit as i64)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("recent_movements_for_item", e))?
        .iter()
        .map(movement_from_row)
        .collect()
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, order_type, status, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.order_number())
        .bind(order.order_type().as_str())
        .bind(order.status().as_str())
        .bind(order.created_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;
        Ok(())
    }

    async fn insert_order_line(
        &mut self,
        order: OrderId,
        line: &OrderLine,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO order_lines (id, order_id, line_no, item_id, location_id, quantity)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(line.id.as_uuid())
        .bind(order.as_uuid())
        .bind(line.line_no as i32)
        .bind(line.item.id.as_uuid())
        .bind(line.location.id.as_uuid())
        .bind(line.quantity.get())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order_line", e))?;
        Ok(())
    }

    async fn order_by_number(&mut self, number: &str) -> Result<Option<Order>, StoreError> {
        let row = self.order_row_by_number(number, false).await?;
        self.load_order(row).await
    }

    async fn order_by_number_for_update(
        &mut self,
        number: &str,
    ) -> Result<Option<Order>, StoreError> {
        let row = self.order_row_by_number(number, true).await?;
        self.load_order(row).await
    }

    async fn order_by_id(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("order_by_id", e))?;
        self.load_order(row).await
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_order_status", e))?;
        Ok(())
    }

    async fn list_orders(&mut self, limit: usize) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY seq DESC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_orders", e))?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(order) = self.load_order(Some(row)).await? {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    async fn upsert_tracking(&mut self, tracking: &ShipmentTracking) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO shipment_tracking
                (order_id, tracking_id, tracking_url, carrier, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT ON CONSTRAINT shipment_tracking_order_id_key DO UPDATE
            SET tracking_id = EXCLUDED.tracking_id,
                tracking_url = EXCLUDED.tracking_url,
                carrier = EXCLUDED.carrier,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(tracking.order_id.as_uuid())
        .bind(&tracking.tracking_id)
        .bind(&tracking.tracking_url)
        .bind(&tracking.carrier)
        .bind(tracking.created_at)
        .bind(tracking.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_tracking", e))?;
        Ok(())
    }

    async fn tracking_for_order(
        &mut self,
        order: OrderId,
    ) -> Result<Option<ShipmentTracking>, StoreError> {
        sqlx::query(&format!(
            "SELECT {TRACKING_COLUMNS} FROM shipment_tracking WHERE order_id = $1"
        ))
        .bind(order.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("tracking_for_order", e))?
        .map(|row| tracking_from_row(&row))
        .transpose()
    }

    async fn delete_tracking(&mut self, order: OrderId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM shipment_tracking WHERE order_id = $1")
            .bind(order.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_tracking", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_picklist(&mut self, picklist: &PickList) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO picklists (id, order_id, status, created_at, started_at, done_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(picklist.id().as_uuid())
        .bind(picklist.order_id().as_uuid())
        .bind(picklist.status().as_str())
        .bind(picklist.created_at())
        .bind(picklist.started_at())
        .bind(picklist.done_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_picklist", e))?;

        for task in picklist.tasks() {
            sqlx::query(
                r#"
                INSERT INTO pick_tasks
                    (id, picklist_id, order_line_id, quantity, status, picked_at, bin_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(task.id.as_uuid())
            .bind(picklist.id().as_uuid())
            .bind(task.order_line_id.as_uuid())
            .bind(task.quantity.get())
            .bind(task.status.as_str())
            .bind(task.picked_at)
            .bind(task.bin_id.map(Uuid::from))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_pick_task", e))?;
        }
        Ok(())
    }

    async fn picklist_by_id(&mut self, id: PickListId) -> Result<Option<PickList>, StoreError> {
        let row = self.picklist_row(id, false).await?;
        self.load_picklist(row).await
    }

    async fn picklist_by_id_for_update(
        &mut self,
        id: PickListId,
    ) -> Result<Option<PickList>, StoreError> {
        let row = self.picklist_row(id, true).await?;
        self.load_picklist(row).await
    }

    async fn picklist_id_for_task(
        &mut self,
        task: PickTaskId,
    ) -> Result<Option<PickListId>, StoreError> {
        sqlx::query("SELECT picklist_id FROM pick_tasks WHERE id = $1")
            .bind(task.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("picklist_id_for_task", e))?
            .map(|row| col(&row, "picklist_id").map(PickListId::from_uuid))
            .transpose()
    }

    async fn picklist_id_for_order(
        &mut self,
        order: OrderId,
    ) -> Result<Option<PickListId>, StoreError> {
        sqlx::query("SELECT id FROM picklists WHERE order_id = $1")
            .bind(order.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("picklist_id_for_order", e))?
            .map(|row| col(&row, "id").map(PickListId::from_uuid))
            .transpose()
    }

    async fn update_picklist(&mut self, picklist: &PickList) -> Result<(), StoreError> {
        sqlx::query("UPDATE picklists SET status = $2, started_at = $3, done_at = $4 WHERE id = $1")
            .bind(picklist.id().as_uuid())
            .bind(picklist.status().as_str())
            .bind(picklist.started_at())
            .bind(picklist.done_at())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_picklist", e))?;
        Ok(())
    }

    async fn update_pick_task(&mut self, task: &PickTask) -> Result<(), StoreError> {
        sqlx::query("UPDATE pick_tasks SET status = $2, picked_at = $3 WHERE id = $1")
            .bind(task.id.as_uuid())
            .bind(task.status.as_str())
            .bind(task.picked_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_pick_task", e))?;
        Ok(())
    }

    async fn insert_audit_entry(&mut self, entry: &AuditEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_entries (id, recorded_at, actor, action, entity, entity_ref, details)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.recorded_at)
        .bind(&entry.actor)
        .bind(&entry.action)
        .bind(&entry.entity)
        .bind(&entry.entity_ref)
        .bind(&entry.details)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_audit_entry", e))?;
        Ok(())
    }

    async fn recent_audit_entries(&mut self, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
        sqlx::query(
            r#"
            SELECT id, recorded_at, actor, action, entity, entity_ref, details
            FROM audit_entries
            ORDER BY seq DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("recent_audit_entries", e))?
        .iter()
        .map(|row| {
            Ok(AuditEntry {
                id: col::<Uuid>(row, "id")?.into(),
                recorded_at: col(row, "recorded_at")?,
                actor: col(row, "actor")?,
                action: col(row, "action")?,
                entity: col(row, "entity")?,
                entity_ref: col(row, "entity_ref")?,
                details: col(row, "details")?,
            })
        })
        .collect()
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

// Row decoding

fn col<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Backend(format!("failed to read column {name}: {e}")))
}

fn parse_col<T>(row: &PgRow, name: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = DomainError>,
{
    let raw: String = col(row, name)?;
    raw.parse()
        .map_err(|e: DomainError| StoreError::Backend(format!("column {name}: {e}")))
}

fn quantity_col(row: &PgRow, name: &str) -> Result<Quantity, StoreError> {
    Quantity::new(col(row, name)?)
        .map_err(|e| StoreError::Backend(format!("column {name}: {e}")))
}

fn item_from_row(row: &PgRow) -> Result<Item, StoreError> {
    Ok(Item {
        id: ItemId::from_uuid(col(row, "id")?),
        sku: col(row, "sku")?,
        name: col(row, "name")?,
        description: col(row, "description")?,
    })
}

fn location_from_row(row: &PgRow) -> Result<Location, StoreError> {
    Ok(Location {
        id: LocationId::from_uuid(col(row, "id")?),
        code: col(row, "code")?,
        name: col(row, "name")?,
    })
}

fn zone_from_row(row: &PgRow) -> Result<Zone, StoreError> {
    Ok(Zone {
        id: ZoneId::from_uuid(col(row, "id")?),
        location_id: LocationId::from_uuid(col(row, "location_id")?),
        code: col(row, "code")?,
        name: col(row, "name")?,
    })
}

fn bin_from_row(row: &PgRow) -> Result<Bin, StoreError> {
    Ok(Bin {
        id: BinId::from_uuid(col(row, "id")?),
        location_id: LocationId::from_uuid(col(row, "location_id")?),
        zone_id: ZoneId::from_uuid(col(row, "zone_id")?),
        code: col(row, "code")?,
        name: col(row, "name")?,
    })
}

fn movement_from_row(row: &PgRow) -> Result<StockMovement, StoreError> {
    Ok(StockMovement {
        id: col::<Uuid>(row, "id")?.into(),
        item_id: ItemId::from_uuid(col(row, "item_id")?),
        location_id: LocationId::from_uuid(col(row, "location_id")?),
        movement_type: parse_col(row, "movement_type")?,
        quantity: quantity_col(row, "quantity")?,
        created_at: col(row, "created_at")?,
        reference: col(row, "reference")?,
    })
}

fn line_from_row(row: &PgRow) -> Result<OrderLine, StoreError> {
    let line_no: i32 = col(row, "line_no")?;
    Ok(OrderLine {
        id: OrderLineId::from_uuid(col(row, "id")?),
        line_no: line_no as u32,
        item: ItemRef {
            id: ItemId::from_uuid(col(row, "item_id")?),
            sku: col(row, "sku")?,
        },
        location: LocationRef {
            id: LocationId::from_uuid(col(row, "location_id")?),
            code: col(row, "code")?,
        },
        quantity: quantity_col(row, "quantity")?,
    })
}

fn tracking_from_row(row: &PgRow) -> Result<ShipmentTracking, StoreError> {
    Ok(ShipmentTracking {
        order_id: OrderId::from_uuid(col(row, "order_id")?),
        tracking_id: col(row, "tracking_id")?,
        tracking_url: col(row, "tracking_url")?,
        carrier: col(row, "carrier")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn task_from_row(row: &PgRow) -> Result<PickTask, StoreError> {
    let bin_id: Option<Uuid> = col(row, "bin_id")?;
    Ok(PickTask {
        id: PickTaskId::from_uuid(col(row, "id")?),
        order_line_id: OrderLineId::from_uuid(col(row, "order_line_id")?),
        quantity: quantity_col(row, "quantity")?,
        status: parse_col(row, "status")?,
        picked_at: col(row, "picked_at")?,
        bin_id: bin_id.map(BinId::from_uuid),
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            match db_err.code().as_deref() {
                Some("23505") => StoreError::UniqueViolation { constraint },
                Some("23503") => StoreError::ForeignKeyViolation { constraint },
                Some("22003") => {
                    StoreError::OutOfRange(format!("{}: {}", operation, db_err.message()))
                }
                _ => StoreError::Backend(format!(
                    "database error in {}: {}",
                    operation,
                    db_err.message()
                )),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::RowNotFound => {
            StoreError::Backend(format!("unexpected row not found in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
