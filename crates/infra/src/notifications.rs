//! Notification delivery and the low-stock monitor.
//!
//! Core operations never notify. A caller that just issued stock may ask the
//! [`LowStockMonitor`] to compare the item's total against the configured
//! threshold; alerts are handed to a [`Notifier`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

use wms_core::DomainError;

use crate::config::NotificationConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::services::ReportingService;

pub const LOW_STOCK_SUBJECT: &str = "LOW_STOCK";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub subject: String,
    pub message: String,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct NotifyError(pub String);

impl From<NotifyError> for ServiceError {
    fn from(err: NotifyError) -> Self {
        ServiceError::Notification(err.0)
    }
}

/// Delivery channel for notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Emits each notification as a structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            subject = %notification.subject,
            recipients = ?notification.recipients,
            message = %notification.message,
            "notify"
        );
        Ok(())
    }
}

/// Addresses notifications to the configured recipients. Disabled
/// configurations send nothing.
#[derive(Clone)]
pub struct NotificationService {
    config: NotificationConfig,
    notifier: Arc<dyn Notifier>,
}

impl NotificationService {
    pub fn new(config: NotificationConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self { config, notifier }
    }

    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }

    /// Returns `false` when notifications are disabled.
    pub async fn send(&self, subject: &str, message: &str) -> ServiceResult<bool> {
        if !self.config.enabled {
            debug!(subject, "notifications disabled; dropping");
            return Ok(false);
        }
        self.notifier
            .send(&Notification {
                subject: subject.to_string(),
                message: message.to_string(),
                recipients: self.config.recipients.clone(),
            })
            .await?;
        Ok(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LowStockAlert {
    pub sku: String,
    pub total: i64,
    pub threshold: i64,
}

impl LowStockAlert {
    pub fn message(&self) -> String {
        format!(
            "SKU {} stock={} is below threshold={}",
            self.sku, self.total, self.threshold
        )
    }
}

#[derive(Clone)]
pub struct LowStockMonitor {
    reporting: ReportingService,
    notifications: NotificationService,
}

impl LowStockMonitor {
    pub fn new(reporting: ReportingService, notifications: NotificationService) -> Self {
        Self {
            reporting,
            notifications,
        }
    }

    pub fn threshold(&self) -> i64 {
        self.notifications.config().low_stock_threshold
    }

    /// Check against the configured threshold.
    pub async fn check(&self, sku: &str) -> ServiceResult<Option<LowStockAlert>> {
        self.check_with_threshold(sku, self.threshold()).await
    }

    /// Alert when the item's total stock is strictly below `threshold`.
    /// Returns the alert that was raised, if any.
    #[instrument(skip(self), err)]
    pub async fn check_with_threshold(
        &self,
        sku: &str,
        threshold: i64,
    ) -> ServiceResult<Option<LowStockAlert>> {
        if threshold < 0 {
            return Err(DomainError::validation("threshold must be a non-negative integer").into());
        }
        let total = self.reporting.stock_total(sku).await?;
        if total >= threshold {
            debug!(sku, total, threshold, "stock above threshold");
            return Ok(None);
        }

        let alert = LowStockAlert {
            sku: sku.trim().to_string(),
            total,
            threshold,
        };
        self.notifications
            .send(LOW_STOCK_SUBJECT, &alert.message())
            .await?;
        Ok(Some(alert))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::services::{CatalogService, StockLedger};
    use crate::store::{InMemoryStore, WarehouseStore};

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send(&self, _: &Notification) -> Result<(), NotifyError> {
            Err(NotifyError("smtp unreachable".to_string()))
        }
    }

    async fn stocked_store(qty: i64) -> Arc<dyn WarehouseStore> {
        let store: Arc<dyn WarehouseStore> = Arc::new(InMemoryStore::new());
        let catalog = CatalogService::new(store.clone());
        catalog.create_item("SKU1", "Widget", "").await.unwrap();
        catalog.create_location("L1", "Main").await.unwrap();
        StockLedger::new(store.clone())
            .record_in("SKU1", "L1", qty, None)
            .await
            .unwrap();
        store
    }

    fn monitor(
        store: Arc<dyn WarehouseStore>,
        config: NotificationConfig,
        notifier: Arc<dyn Notifier>,
    ) -> LowStockMonitor {
        LowStockMonitor::new(
            ReportingService::new(store),
            NotificationService::new(config, notifier),
        )
    }

    #[tokio::test]
    async fn alerts_when_total_is_below_threshold() {
        let store = stocked_store(3).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let monitor = monitor(store, NotificationConfig::default(), notifier.clone());

        let alert = monitor.check("SKU1").await.unwrap().unwrap();
        assert_eq!(alert.total, 3);
        assert_eq!(alert.threshold, 10);

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "LOW_STOCK");
        assert_eq!(sent[0].message, "SKU SKU1 stock=3 is below threshold=10");
        assert_eq!(sent[0].recipients, vec!["warehouse@local".to_string()]);
    }

    #[tokio::test]
    async fn stock_equal_to_threshold_does_not_alert() {
        let store = stocked_store(10).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let monitor = monitor(store, NotificationConfig::default(), notifier.clone());

        assert!(monitor.check("SKU1").await.unwrap().is_none());
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn disabled_notifications_still_report_the_alert() {
        let store = stocked_store(1).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let config = NotificationConfig {
            enabled: false,
            ..NotificationConfig::default()
        };
        let monitor = monitor(store, config, notifier.clone());

        assert!(monitor.check("SKU1").await.unwrap().is_some());
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn negative_threshold_is_rejected() {
        let store = stocked_store(1).await;
        let monitor = monitor(
            store,
            NotificationConfig::default(),
            Arc::new(TracingNotifier),
        );

        let err = monitor.check_with_threshold("SKU1", -1).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn delivery_failure_surfaces_as_notification_error() {
        let store = stocked_store(1).await;
        let monitor = monitor(
            store,
            NotificationConfig::default(),
            Arc::new(FailingNotifier),
        );

        let err = monitor.check("SKU1").await.unwrap_err();
        assert!(matches!(err, ServiceError::Notification(msg) if msg == "smtp unreachable"));
    }
}
