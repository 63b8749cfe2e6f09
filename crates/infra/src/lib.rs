//! `wms-infra` — persistence, application services and wiring for the
//! warehouse system.
//!
//! Domain crates decide; this crate loads state inside a store transaction,
//! hands it to the aggregates, persists the outcome and commits.

pub mod audit;
pub mod config;
pub mod error;
pub mod notifications;
pub mod services;
pub mod store;
pub mod warehouse;

#[cfg(test)]
mod integration_tests;

pub use audit::{AuditEntry, AuditService, AuditTrail};
pub use config::{NotificationConfig, WmsConfig};
pub use error::{ServiceError, ServiceResult};
pub use notifications::{
    LowStockAlert, LowStockMonitor, Notification, NotificationService, Notifier, NotifyError,
    TracingNotifier,
};
pub use services::{
    CatalogService, OrderService, PickListView, PickTaskView, PickingService, ReportingService,
    StockLedger, TrackingService,
};
pub use store::{InMemoryStore, PostgresStore, StoreError, StoreTx, WarehouseStore};
pub use warehouse::{Warehouse, WarehouseBuilder};
