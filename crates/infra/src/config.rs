//! Runtime configuration, read from the environment.
//!
//! | variable | default |
//! |---|---|
//! | `WMS_DATABASE_URL` | unset → in-memory store |
//! | `WMS_ACTOR` | `system` |
//! | `WMS_AUDIT_ENABLED` | `true` |
//! | `WMS_NOTIFICATIONS_ENABLED` | `true` |
//! | `WMS_NOTIFICATIONS_RECIPIENTS` | `warehouse@local` (comma separated) |
//! | `WMS_LOW_STOCK_THRESHOLD` | `10` |
//!
//! Unparseable values fall back to the default with a warning.

use serde::{Deserialize, Serialize};

pub const DEFAULT_ACTOR: &str = "system";
pub const DEFAULT_RECIPIENT: &str = "warehouse@local";
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub recipients: Vec<String>,
    /// Alert when total stock of an item is strictly below this value.
    pub low_stock_threshold: i64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            recipients: vec![DEFAULT_RECIPIENT.to_string()],
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WmsConfig {
    pub database_url: Option<String>,
    /// Recorded as the actor of every audit entry.
    pub actor: String,
    pub audit_enabled: bool,
    pub notifications: NotificationConfig,
}

impl Default for WmsConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            actor: DEFAULT_ACTOR.to_string(),
            audit_enabled: true,
            notifications: NotificationConfig::default(),
        }
    }
}

impl WmsConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut cfg = Self::default();

        cfg.database_url = get("WMS_DATABASE_URL");

        if let Some(actor) = get("WMS_ACTOR") {
            cfg.actor = actor;
        }

        if let Some(v) = get("WMS_AUDIT_ENABLED") {
            cfg.audit_enabled = parse_bool("WMS_AUDIT_ENABLED", &v, cfg.audit_enabled);
        }

        if let Some(v) = get("WMS_NOTIFICATIONS_ENABLED") {
            cfg.notifications.enabled =
                parse_bool("WMS_NOTIFICATIONS_ENABLED", &v, cfg.notifications.enabled);
        }

        if let Some(v) = get("WMS_NOTIFICATIONS_RECIPIENTS") {
            let recipients: Vec<String> = v
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect();
            if !recipients.is_empty() {
                cfg.notifications.recipients = recipients;
            }
        }

        if let Some(v) = get("WMS_LOW_STOCK_THRESHOLD") {
            match v.parse::<i64>() {
                Ok(n) if n >= 0 => cfg.notifications.low_stock_threshold = n,
                _ => tracing::warn!(
                    value = %v,
                    "WMS_LOW_STOCK_THRESHOLD must be a non-negative integer; using default"
                ),
            }
        }

        cfg
    }
}

fn parse_bool(key: &str, value: &str, default: bool) -> bool {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "on" => true,
        "0" | "false" | "f" | "no" | "off" => false,
        _ => {
            tracing::warn!(key, value, "invalid boolean; using default");
            default
        }
    }
}
