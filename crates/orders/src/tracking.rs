//! Carrier tracking attached to an order.
//!
//! An order has at most one tracking record. Setting tracking again
//! replaces the id and URL in place; a blank carrier keeps the one already
//! recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wms_core::{DomainError, DomainResult, Entity, OrderId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentTracking {
    pub order_id: OrderId,
    pub tracking_id: String,
    /// Empty when the carrier gave no URL.
    pub tracking_url: String,
    /// Empty when unknown.
    pub carrier: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShipmentTracking {
    pub fn new(
        order_id: OrderId,
        tracking_id: &str,
        tracking_url: &str,
        carrier: &str,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let tracking_id = DomainError::require_identifier("tracking id", tracking_id)?;
        Ok(Self {
            order_id,
            tracking_id: tracking_id.to_string(),
            tracking_url: tracking_url.trim().to_string(),
            carrier: carrier.trim().to_string(),
            created_at: at,
            updated_at: at,
        })
    }

    /// Replace the tracking id and URL. The carrier changes only when a
    /// non-blank one is given.
    pub fn update(
        mut self,
        tracking_id: &str,
        tracking_url: &str,
        carrier: &str,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let tracking_id = DomainError::require_identifier("tracking id", tracking_id)?;
        self.tracking_id = tracking_id.to_string();
        self.tracking_url = tracking_url.trim().to_string();
        let carrier = carrier.trim();
        if !carrier.is_empty() {
            self.carrier = carrier.to_string();
        }
        self.updated_at = at;
        Ok(self)
    }
}

impl Entity for ShipmentTracking {
    type Id = OrderId;
    const KIND: &'static str = "tracking";

    fn id(&self) -> &Self::Id {
        &self.order_id
    }
}
