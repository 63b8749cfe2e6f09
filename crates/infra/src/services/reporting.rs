use std::sync::Arc;

use tracing::{instrument, warn};

use wms_inventory::StockMovement;

use super::{clamp_limit, require_item, require_location};
use crate::error::ServiceResult;
use crate::store::WarehouseStore;

/// Read-only ledger reports. Never mutates.
#[derive(Clone)]
pub struct ReportingService {
    store: Arc<dyn WarehouseStore>,
}

impl ReportingService {
    pub fn new(store: Arc<dyn WarehouseStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self), err)]
    pub async fn stock_at(&self, sku: &str, location_code: &str) -> ServiceResult<i64> {
        let mut tx = self.store.begin().await?;
        let item = require_item(tx.as_mut(), sku).await?;
        let location = require_location(tx.as_mut(), location_code).await?;
        let balance = tx.stock_at(item.id, location.id).await?;
        if balance < 0 {
            warn!(sku = %item.sku, location = %location.code, balance, "negative stock balance in ledger");
        }
        Ok(balance)
    }

    #[instrument(skip(self), err)]
    pub async fn stock_total(&self, sku: &str) -> ServiceResult<i64> {
        let mut tx = self.store.begin().await?;
        let item = require_item(tx.as_mut(), sku).await?;
        let balance = tx.stock_total(item.id).await?;
        if balance < 0 {
            warn!(sku = %item.sku, balance, "negative stock total in ledger");
        }
        Ok(balance)
    }

    /// Every movement of the item, oldest first.
    #[instrument(skip(self), err)]
    pub async fn movement_history(&self, sku: &str) -> ServiceResult<Vec<StockMovement>> {
        let mut tx = self.store.begin().await?;
        let item = require_item(tx.as_mut(), sku).await?;
        Ok(tx.movements_for_item(item.id).await?)
    }

    /// Newest first; `limit` defaults to 50 and is clamped to `1..=200`.
    #[instrument(skip(self), err)]
    pub async fn recent_movements(
        &self,
        sku: &str,
        limit: Option<usize>,
    ) -> ServiceResult<Vec<StockMovement>> {
        let mut tx = self.store.begin().await?;
        let item = require_item(tx.as_mut(), sku).await?;
        Ok(tx
            .recent_movements_for_item(item.id, clamp_limit(limit))
            .await?)
    }
}
