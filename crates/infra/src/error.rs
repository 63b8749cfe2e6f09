use thiserror::Error;

use wms_core::DomainError;

use crate::store::StoreError;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Error returned by every service operation.
///
/// - **Domain errors**: rejected input or precondition → `ServiceError::Domain`
/// - **Storage errors**: backend failures and unmapped constraint violations → `ServiceError::Store`
/// - **Delivery errors**: a notifier rejected an alert → `ServiceError::Notification`
/// - **Internal errors**: an aggregate broke a contract the service relies on → `ServiceError::Internal`
///
/// Services never retry; the caller decides.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A registered notifier failed to deliver.
    #[error("notification delivery failed: {0}")]
    Notification(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(e) => Some(e),
            ServiceError::Store(_) | ServiceError::Notification(_) | ServiceError::Internal(_) => {
                None
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.domain().is_some_and(DomainError::is_not_found)
    }
}

/// Turns a violation of `constraint` into a domain `Conflict`; any other
/// storage error passes through unchanged.
pub(crate) fn conflict_on(
    err: StoreError,
    constraint: &str,
    message: impl FnOnce() -> String,
) -> ServiceError {
    if err.is_unique_violation_of(constraint) {
        DomainError::conflict(message()).into()
    } else {
        err.into()
    }
}

/// A foreign key violation on delete means the row is still referenced.
pub(crate) fn conflict_on_reference(err: StoreError, message: impl FnOnce() -> String) -> ServiceError {
    match err {
        StoreError::ForeignKeyViolation { .. } => DomainError::conflict(message()).into(),
        other => other.into(),
    }
}
