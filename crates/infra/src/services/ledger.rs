use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use wms_core::{Entity, MovementId, Quantity};
use wms_inventory::{Balances, Item, MovementType, StockKey, StockMovement};

use super::{ReportingService, require_item, require_location};
use crate::audit::AuditTrail;
use crate::error::ServiceResult;
use crate::store::WarehouseStore;

/// Direct stock receipts and withdrawals against the append-only ledger.
#[derive(Clone)]
pub struct StockLedger {
    store: Arc<dyn WarehouseStore>,
    audit: Option<AuditTrail>,
}

impl StockLedger {
    pub fn new(store: Arc<dyn WarehouseStore>) -> Self {
        Self { store, audit: None }
    }

    pub fn with_audit(mut self, audit: AuditTrail) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Append an IN movement unless the balance of (item, location) would
    /// exceed `i64::MAX`.
    #[instrument(skip(self), err)]
    pub async fn record_in(
        &self,
        sku: &str,
        location_code: &str,
        quantity: i64,
        reference: Option<&str>,
    ) -> ServiceResult<MovementId> {
        let quantity = Quantity::new(quantity)?;
        let mut tx = self.store.begin().await?;
        let item = require_item(tx.as_mut(), sku).await?;
        let location = require_location(tx.as_mut(), location_code).await?;

        tx.lock_item_stock(item.id).await?;
        let key = StockKey::new(item.id, location.id);
        let current = tx.stock_at(item.id, location.id).await?;
        let mut balances: Balances = [(key, current)].into_iter().collect();
        balances.deposit(&item.to_ref(), &location.to_ref(), quantity)?;

        let movement = StockMovement::new(
            MovementType::In,
            item.id,
            location.id,
            quantity,
            reference,
            Utc::now(),
        );
        tx.insert_movement(&movement).await?;
        if let Some(audit) = &self.audit {
            audit.record(tx.as_mut(), Item::KIND, &item.sku, &movement).await?;
        }
        tx.commit().await?;

        info!(
            movement_id = %movement.id,
            sku = %item.sku,
            location = %location.code,
            balance = balances.get(&key),
            "stock received"
        );
        Ok(movement.id)
    }

    /// Append an OUT movement unless it would drive the balance of
    /// (item, location) negative.
    ///
    /// The item's stock is locked before the balance is read, so concurrent
    /// withdrawals are checked one after another.
    #[instrument(skip(self), err)]
    pub async fn record_out(
        &self,
        sku: &str,
        location_code: &str,
        quantity: i64,
        reference: Option<&str>,
    ) -> ServiceResult<MovementId> {
        let quantity = Quantity::new(quantity)?;
        let mut tx = self.store.begin().await?;
        let item = require_item(tx.as_mut(), sku).await?;
        let location = require_location(tx.as_mut(), location_code).await?;

        tx.lock_item_stock(item.id).await?;
        let key = StockKey::new(item.id, location.id);
        let available = tx.stock_at(item.id, location.id).await?;
        let mut balances: Balances = [(key, available)].into_iter().collect();
        balances.withdraw(&item.to_ref(), &location.to_ref(), quantity)?;

        let movement = StockMovement::new(
            MovementType::Out,
            item.id,
            location.id,
            quantity,
            reference,
            Utc::now(),
        );
        tx.insert_movement(&movement).await?;
        if let Some(audit) = &self.audit {
            audit.record(tx.as_mut(), Item::KIND, &item.sku, &movement).await?;
        }
        tx.commit().await?;

        info!(
            movement_id = %movement.id,
            sku = %item.sku,
            location = %location.code,
            remaining = balances.get(&key),
            "stock issued"
        );
        Ok(movement.id)
    }

    /// Σ IN − Σ OUT for (item, location).
    pub async fn stock_at(&self, sku: &str, location_code: &str) -> ServiceResult<i64> {
        ReportingService::new(self.store.clone())
            .stock_at(sku, location_code)
            .await
    }

    /// Σ IN − Σ OUT for the item across all locations.
    pub async fn stock_total(&self, sku: &str) -> ServiceResult<i64> {
        ReportingService::new(self.store.clone())
            .stock_total(sku)
            .await
    }
}
