//! Application services.
//!
//! Each operation opens one store transaction, loads what it needs, lets the
//! domain decide, persists the outcome (plus audit entries when enabled) and
//! commits. Any error before the commit drops the transaction, which rolls
//! everything back.

pub mod catalog;
pub mod ledger;
pub mod orders;
pub mod picking;
pub mod reporting;
pub mod tracking;

pub use catalog::CatalogService;
pub use ledger::StockLedger;
pub use orders::OrderService;
pub use picking::{PickListView, PickTaskView, PickingService};
pub use reporting::ReportingService;
pub use tracking::TrackingService;

use wms_core::DomainError;
use wms_inventory::{Item, Location};

use crate::error::ServiceResult;
use crate::store::StoreTx;

/// Default and ceiling for list-style reads.
pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 200;

pub(crate) fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

pub(crate) async fn require_item(tx: &mut dyn StoreTx, sku: &str) -> ServiceResult<Item> {
    let sku = DomainError::require_identifier("sku", sku)?;
    tx.item_by_sku(sku)
        .await?
        .ok_or_else(|| DomainError::not_found("item", sku).into())
}

pub(crate) async fn require_location(tx: &mut dyn StoreTx, code: &str) -> ServiceResult<Location> {
    let code = DomainError::require_identifier("location code", code)?;
    tx.location_by_code(code)
        .await?
        .ok_or_else(|| DomainError::not_found("location", code).into())
}
