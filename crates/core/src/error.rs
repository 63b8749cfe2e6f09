//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures. Every variant
/// names the offending entity or identifier so an operator can correct the
/// input without inspecting internals. Storage failures belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A referenced item, location, order, picklist, task, zone or bin does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A value failed validation (empty identifier, non-positive quantity, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Duplicate identity or an operation that collides with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An OUT movement would drive the balance of (item, location) negative.
    #[error(
        "insufficient stock for item {sku} at location {location}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        sku: String,
        location: String,
        available: i64,
        requested: i64,
    },

    /// The entity's current status does not permit the requested operation.
    #[error("invalid status transition: cannot {action} {entity} {key} in status {status}")]
    InvalidStatusTransition {
        entity: &'static str,
        key: String,
        status: String,
        action: &'static str,
    },

    /// Posting requires at least one order line.
    #[error("order {order_number} has no lines")]
    NoLines { order_number: String },

    /// A picklist cannot be finished while tasks remain open.
    #[error("cannot finish picklist {picklist}: {open} task(s) still OPEN")]
    OpenTasksRemaining { picklist: String, open: usize },
}

impl DomainError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_transition(
        entity: &'static str,
        key: impl Into<String>,
        status: impl core::fmt::Display,
        action: &'static str,
    ) -> Self {
        Self::InvalidStatusTransition {
            entity,
            key: key.into(),
            status: status.to_string(),
            action,
        }
    }

    /// Validates a required identifier and returns it trimmed.
    pub fn require_identifier<'a>(field: &str, value: &'a str) -> DomainResult<&'a str> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(Self::validation(format!("{field} cannot be empty")));
        }
        Ok(trimmed)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
