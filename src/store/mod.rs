//! Record store adapter: remote spreadsheet with a local JSON fallback.

pub mod fallback;
pub mod local;
pub mod remote;

use log::{info, warn};
use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::schema::{Row, RowKey, Table};

pub use fallback::FallbackStore;
pub use local::LocalFileStore;
pub use remote::SheetsStore;

/// Row-level access to the persisted tables.
///
/// This is the only way the services touch persisted state.
pub trait RecordStore: Send + Sync {
    /// All rows of a table in storage order.
    fn get_rows(&self, table: Table) -> Result<Vec<Row>>;

    /// Append a row at the end of a table.
    fn append_row(&self, table: Table, row: &Row) -> Result<()>;

    /// Overwrite the row whose key matches. `NotFound` if none does.
    fn update_row(&self, table: Table, key: &RowKey, row: &Row) -> Result<()>;

    /// The first row whose key matches, if any.
    fn find_row(&self, table: Table, key: &RowKey) -> Result<Option<Row>> {
        Ok(self
            .get_rows(table)?
            .into_iter()
            .find(|row| table.key_of(row) == *key))
    }
}

impl<T: RecordStore + ?Sized> RecordStore for std::sync::Arc<T> {
    fn get_rows(&self, table: Table) -> Result<Vec<Row>> {
        (**self).get_rows(table)
    }

    fn append_row(&self, table: Table, row: &Row) -> Result<()> {
        (**self).append_row(table, row)
    }

    fn update_row(&self, table: Table, key: &RowKey, row: &Row) -> Result<()> {
        (**self).update_row(table, key, row)
    }

    fn find_row(&self, table: Table, key: &RowKey) -> Result<Option<Row>> {
        (**self).find_row(table, key)
    }
}

/// Which backend is serving requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Remote,
    Local,
}

/// Connection report for the status view
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub backend: Backend,

    /// True when the remote failed after start-up and the local store took over
    pub degraded: bool,

    pub tables: Vec<&'static str>,
}

/// Open the store the services run against
///
/// The remote spreadsheet is used when configured and its health check passes;
/// otherwise the local file store serves everything.
///
/// # Errors
/// * `StorageFatal` if the local data directory cannot be prepared
pub fn open_store(config: &Config) -> Result<FallbackStore> {
    let local = LocalFileStore::open(&config.data_dir)?;

    let remote = match &config.sheets {
        Some(sheets) => match SheetsStore::connect(sheets.clone()) {
            Ok(remote) => {
                info!("Connected to spreadsheet {}", sheets.spreadsheet_id);
                Some(remote)
            }
            Err(e) => {
                warn!("Spreadsheet unavailable ({}), falling back to local storage", e);
                None
            }
        },
        None => {
            info!("Spreadsheet credentials not configured, using local storage");
            None
        }
    };

    Ok(FallbackStore::new(remote, local))
}
