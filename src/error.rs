//! Error types for the dashboard.

use thiserror::Error;

/// Everything a dashboard operation can fail with.
///
/// `Connection` is the only variant the store adapter recovers from (by
/// switching to the local file store); the rest are surfaced to the caller.
#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Remote store unreachable: {0}")]
    Connection(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication failed")]
    Auth,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    StorageFatal(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

pub type Result<T> = std::result::Result<T, DashboardError>;

impl From<std::io::Error> for DashboardError {
    fn from(err: std::io::Error) -> Self {
        DashboardError::StorageFatal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for DashboardError {
    fn from(err: serde_json::Error) -> Self {
        DashboardError::StorageFatal(format!("JSON error: {}", err))
    }
}

impl From<rust_xlsxwriter::XlsxError> for DashboardError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        DashboardError::StorageFatal(format!("XLSX error: {}", err))
    }
}

impl DashboardError {
    /// Whether the store adapter should switch to the fallback store.
    pub fn is_connection(&self) -> bool {
        matches!(self, DashboardError::Connection(_))
    }
}
