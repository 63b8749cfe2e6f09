//! Carrier tracking for orders.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use wms_core::{DomainError, Entity};
use wms_orders::{Order, ShipmentTracking};

use super::orders::load_order_for_update;
use crate::audit::{AuditTrail, to_details};
use crate::error::ServiceResult;
use crate::store::WarehouseStore;

#[derive(Clone)]
pub struct TrackingService {
    store: Arc<dyn WarehouseStore>,
    audit: Option<AuditTrail>,
}

impl TrackingService {
    pub fn new(store: Arc<dyn WarehouseStore>) -> Self {
        Self { store, audit: None }
    }

    pub fn with_audit(mut self, audit: AuditTrail) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Attach tracking to an order, replacing any existing record. A blank
    /// carrier keeps the carrier already on file.
    #[instrument(skip(self), err)]
    pub async fn set(
        &self,
        order_number: &str,
        tracking_id: &str,
        tracking_url: &str,
        carrier: &str,
    ) -> ServiceResult<ShipmentTracking> {
        let mut tx = self.store.begin().await?;
        let order = load_order_for_update(tx.as_mut(), order_number).await?;

        let now = Utc::now();
        let tracking = match tx.tracking_for_order(*order.id()).await? {
            Some(existing) => existing.update(tracking_id, tracking_url, carrier, now)?,
            None => ShipmentTracking::new(*order.id(), tracking_id, tracking_url, carrier, now)?,
        };
        tx.upsert_tracking(&tracking).await?;
        if let Some(audit) = &self.audit {
            audit
                .record_change(
                    tx.as_mut(),
                    "orders.tracking.set",
                    ShipmentTracking::KIND,
                    order.order_number(),
                    to_details(&tracking)?,
                    now,
                )
                .await?;
        }
        tx.commit().await?;

        info!(
            order_number = %order.order_number(),
            tracking_id = %tracking.tracking_id,
            carrier = %tracking.carrier,
            "tracking set"
        );
        Ok(tracking)
    }

    /// `None` when the order exists but has no tracking yet.
    #[instrument(skip(self), err)]
    pub async fn get(&self, order_number: &str) -> ServiceResult<Option<ShipmentTracking>> {
        let number = DomainError::require_identifier("order number", order_number)?;
        let mut tx = self.store.begin().await?;
        let order = tx
            .order_by_number(number)
            .await?
            .ok_or_else(|| DomainError::not_found(Order::KIND, number))?;
        Ok(tx.tracking_for_order(*order.id()).await?)
    }

    /// Remove the order's tracking. Returns whether a record existed.
    #[instrument(skip(self), err)]
    pub async fn clear(&self, order_number: &str) -> ServiceResult<bool> {
        let mut tx = self.store.begin().await?;
        let order = load_order_for_update(tx.as_mut(), order_number).await?;

        let removed = tx.delete_tracking(*order.id()).await?;
        if let Some(audit) = self.audit.as_ref().filter(|_| removed) {
            audit
                .record_change(
                    tx.as_mut(),
                    "orders.tracking.cleared",
                    ShipmentTracking::KIND,
                    order.order_number(),
                    serde_json::Value::Null,
                    Utc::now(),
                )
                .await?;
        }
        tx.commit().await?;

        info!(order_number = %order.order_number(), removed, "tracking cleared");
        Ok(removed)
    }
}
