//! Composition root: wires the services around one store handle.
//!
//! Optional capabilities (audit trail, low-stock notifications) are
//! registered on the [`WarehouseBuilder`] at startup.

use std::sync::Arc;

use tracing::info;

use crate::audit::{AuditService, AuditTrail};
use crate::config::{NotificationConfig, WmsConfig};
use crate::error::ServiceResult;
use crate::notifications::{LowStockMonitor, NotificationService, Notifier, TracingNotifier};
use crate::services::{
    CatalogService, OrderService, PickingService, ReportingService, StockLedger, TrackingService,
};
use crate::store::{InMemoryStore, PostgresStore, WarehouseStore};

#[derive(Clone)]
pub struct Warehouse {
    pub catalog: CatalogService,
    pub ledger: StockLedger,
    pub orders: OrderService,
    pub picking: PickingService,
    pub tracking: TrackingService,
    pub reporting: ReportingService,
    pub audit: AuditService,
    /// Present only when notifications were registered and enabled.
    pub low_stock: Option<LowStockMonitor>,
    store: Arc<dyn WarehouseStore>,
}

impl Warehouse {
    /// Postgres when `database_url` is set (schema is migrated on startup),
    /// otherwise a fresh in-memory store.
    pub async fn from_config(config: &WmsConfig) -> ServiceResult<Self> {
        let store: Arc<dyn WarehouseStore> = match &config.database_url {
            Some(url) => {
                let store = PostgresStore::connect(url).await?;
                store.migrate().await?;
                info!("using postgres store");
                Arc::new(store)
            }
            None => {
                info!("WMS_DATABASE_URL not set; using in-memory store");
                Arc::new(InMemoryStore::new())
            }
        };
        Ok(WarehouseBuilder::new(store).with_config(config).build())
    }

    /// In-memory warehouse without optional capabilities.
    pub fn in_memory() -> Self {
        WarehouseBuilder::new(Arc::new(InMemoryStore::new())).build()
    }

    pub fn store(&self) -> Arc<dyn WarehouseStore> {
        self.store.clone()
    }
}

pub struct WarehouseBuilder {
    store: Arc<dyn WarehouseStore>,
    audit: Option<AuditTrail>,
    notifications: Option<NotificationService>,
}

impl WarehouseBuilder {
    pub fn new(store: Arc<dyn WarehouseStore>) -> Self {
        Self {
            store,
            audit: None,
            notifications: None,
        }
    }

    pub fn with_audit_trail(mut self, actor: &str) -> Self {
        self.audit = Some(AuditTrail::new(actor));
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>, config: NotificationConfig) -> Self {
        self.notifications = Some(NotificationService::new(config, notifier));
        self
    }

    /// Register what the configuration enables. Notifications go to the
    /// [`TracingNotifier`].
    pub fn with_config(mut self, config: &WmsConfig) -> Self {
        if config.audit_enabled {
            self = self.with_audit_trail(&config.actor);
        }
        if config.notifications.enabled {
            self = self.with_notifier(Arc::new(TracingNotifier), config.notifications.clone());
        }
        self
    }

    pub fn build(self) -> Warehouse {
        let store = self.store;
        let mut catalog = CatalogService::new(store.clone());
        let mut ledger = StockLedger::new(store.clone());
        let mut orders = OrderService::new(store.clone());
        let mut picking = PickingService::new(store.clone());
        let mut tracking = TrackingService::new(store.clone());
        if let Some(trail) = self.audit {
            catalog = catalog.with_audit(trail.clone());
            ledger = ledger.with_audit(trail.clone());
            orders = orders.with_audit(trail.clone());
            picking = picking.with_audit(trail.clone());
            tracking = tracking.with_audit(trail);
        }

        let reporting = ReportingService::new(store.clone());
        let low_stock = self
            .notifications
            .filter(|n| n.config().enabled)
            .map(|n| LowStockMonitor::new(reporting.clone(), n));

        Warehouse {
            catalog,
            ledger,
            orders,
            picking,
            tracking,
            reporting,
            audit: AuditService::new(store.clone()),
            low_stock,
            store,
        }
    }
}
