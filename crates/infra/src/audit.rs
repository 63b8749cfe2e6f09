//! Audit trail.
//!
//! When enabled, each state change is recorded as an [`AuditEntry`] inside the
//! same transaction as the change, so an entry exists exactly when the change
//! was committed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::instrument;

use wms_core::{AuditEntryId, Event};

use crate::config::DEFAULT_ACTOR;
use crate::error::ServiceResult;
use crate::store::{StoreError, StoreTx, WarehouseStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub recorded_at: DateTime<Utc>,
    pub actor: String,
    /// Event type of the change, e.g. `orders.order.posted`.
    pub action: String,
    pub entity: String,
    /// Business identifier of the entity (SKU, order number, picklist id, ...).
    pub entity_ref: String,
    pub details: JsonValue,
}

/// Writes audit entries on behalf of one actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditTrail {
    actor: String,
}

impl AuditTrail {
    pub fn new(actor: &str) -> Self {
        let actor = actor.trim();
        Self {
            actor: if actor.is_empty() {
                DEFAULT_ACTOR.to_string()
            } else {
                actor.to_string()
            },
        }
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Record one domain event against `entity`/`entity_ref`.
    pub async fn record<E>(
        &self,
        tx: &mut dyn StoreTx,
        entity: &str,
        entity_ref: &str,
        event: &E,
    ) -> Result<(), StoreError>
    where
        E: Event + Serialize + Sync,
    {
        let details = to_details(event)?;
        self.record_change(
            tx,
            event.event_type(),
            entity,
            entity_ref,
            details,
            event.occurred_at(),
        )
        .await
    }

    /// Record a change that has no domain event of its own (catalog edits).
    pub async fn record_change(
        &self,
        tx: &mut dyn StoreTx,
        action: &str,
        entity: &str,
        entity_ref: &str,
        details: JsonValue,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        tx.insert_audit_entry(&AuditEntry {
            id: AuditEntryId::new(),
            recorded_at: at,
            actor: self.actor.clone(),
            action: action.to_string(),
            entity: entity.to_string(),
            entity_ref: entity_ref.to_string(),
            details,
        })
        .await
    }

    pub async fn record_all<E>(
        &self,
        tx: &mut dyn StoreTx,
        entity: &str,
        entity_ref: &str,
        events: &[E],
    ) -> Result<(), StoreError>
    where
        E: Event + Serialize + Sync,
    {
        for event in events {
            self.record(tx, entity, entity_ref, event).await?;
        }
        Ok(())
    }
}

pub(crate) fn to_details<T: Serialize + ?Sized>(value: &T) -> Result<JsonValue, StoreError> {
    serde_json::to_value(value)
        .map_err(|e| StoreError::Backend(format!("audit payload serialization failed: {e}")))
}

/// Read side of the audit trail.
#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn WarehouseStore>,
}

impl AuditService {
    pub const DEFAULT_LIMIT: usize = 50;
    pub const MAX_LIMIT: usize = 200;

    pub fn new(store: Arc<dyn WarehouseStore>) -> Self {
        Self { store }
    }

    /// Newest entries first. `limit` is clamped to `1..=MAX_LIMIT`.
    #[instrument(skip(self), err)]
    pub async fn recent(&self, limit: Option<usize>) -> ServiceResult<Vec<AuditEntry>> {
        let limit = limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT);
        let mut tx = self.store.begin().await?;
        Ok(tx.recent_audit_entries(limit).await?)
    }
}
