use log::warn;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;
use crate::schema::{Row, RowKey, Table};
use crate::store::{Backend, LocalFileStore, RecordStore, SheetsStore, StoreStatus};

/// The store the services run against
///
/// Serves from the remote spreadsheet while it answers. The first connection
/// failure switches every later call to the local files for the rest of the
/// process; the failed call is retried locally once. Nothing is copied between
/// the two stores.
pub struct FallbackStore {
    remote: Option<Box<dyn RecordStore>>,
    local: LocalFileStore,
    degraded: AtomicBool,
}

impl FallbackStore {
    pub fn new(remote: Option<SheetsStore>, local: LocalFileStore) -> Self {
        Self::with_primary(remote.map(|r| Box::new(r) as Box<dyn RecordStore>), local)
    }

    /// Like [`FallbackStore::new`] with any primary backend
    pub fn with_primary(remote: Option<Box<dyn RecordStore>>, local: LocalFileStore) -> Self {
        FallbackStore {
            remote,
            local,
            degraded: AtomicBool::new(false),
        }
    }

    /// Store backed only by the local files
    pub fn local_only(local: LocalFileStore) -> Self {
        Self::with_primary(None, local)
    }

    pub fn backend(&self) -> Backend {
        if self.active_remote().is_some() {
            Backend::Remote
        } else {
            Backend::Local
        }
    }

    pub fn status(&self) -> StoreStatus {
        StoreStatus {
            backend: self.backend(),
            degraded: self.degraded.load(Ordering::SeqCst),
            tables: Table::ALL.iter().map(|t| t.sheet_name()).collect(),
        }
    }

    fn active_remote(&self) -> Option<&dyn RecordStore> {
        if self.degraded.load(Ordering::SeqCst) {
            return None;
        }
        self.remote.as_deref()
    }

    fn run<T>(&self, op: &str, table: Table, f: impl Fn(&dyn RecordStore) -> Result<T>) -> Result<T> {
        if let Some(remote) = self.active_remote() {
            match f(remote) {
                Err(e) if e.is_connection() => {
                    warn!(
                        "{} on {} failed against the spreadsheet ({}); switching to local storage",
                        op, table, e
                    );
                    self.degraded.store(true, Ordering::SeqCst);
                }
                other => return other,
            }
        }
        f(&self.local)
    }
}

impl RecordStore for FallbackStore {
    fn get_rows(&self, table: Table) -> Result<Vec<Row>> {
        self.run("get_rows", table, |store| store.get_rows(table))
    }

    fn append_row(&self, table: Table, row: &Row) -> Result<()> {
        self.run("append_row", table, |store| store.append_row(table, row))
    }

    fn update_row(&self, table: Table, key: &RowKey, row: &Row) -> Result<()> {
        self.run("update_row", table, |store| store.update_row(table, key, row))
    }

    fn find_row(&self, table: Table, key: &RowKey) -> Result<Option<Row>> {
        self.run("find_row", table, |store| store.find_row(table, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DashboardError;
    use crate::schema::users;
    use std::sync::atomic::AtomicUsize;

    /// Primary that always fails with a connection error and counts calls
    struct Unreachable {
        calls: AtomicUsize,
    }

    impl RecordStore for Unreachable {
        fn get_rows(&self, _table: Table) -> Result<Vec<Row>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(DashboardError::Connection("connection refused".to_string()))
        }

        fn append_row(&self, _table: Table, _row: &Row) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(DashboardError::Connection("connection refused".to_string()))
        }

        fn update_row(&self, _table: Table, _key: &RowKey, _row: &Row) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(DashboardError::Connection("connection refused".to_string()))
        }
    }

    /// Primary that rejects writes with a non-connection error
    struct Rejecting;

    impl RecordStore for Rejecting {
        fn get_rows(&self, _table: Table) -> Result<Vec<Row>> {
            Ok(Vec::new())
        }

        fn append_row(&self, _table: Table, _row: &Row) -> Result<()> {
            Err(DashboardError::Validation("bad row".to_string()))
        }

        fn update_row(&self, table: Table, key: &RowKey, _row: &Row) -> Result<()> {
            Err(DashboardError::NotFound(format!("{} {}", table, key)))
        }
    }

    #[test]
    fn connection_failure_switches_to_local_for_good() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalFileStore::open(dir.path()).unwrap();
        let primary = std::sync::Arc::new(Unreachable {
            calls: AtomicUsize::new(0),
        });

        let store = FallbackStore::with_primary(Some(Box::new(primary.clone())), local);
        assert_eq!(store.backend(), Backend::Remote);

        let row = Row::new().with(users::USERNAME, "t1");
        store.append_row(Table::Users, &row).unwrap();
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.backend(), Backend::Local);
        assert!(store.status().degraded);

        let rows = store.get_rows(Table::Users).unwrap();
        assert_eq!(rows, vec![row]);
        // No further remote traffic once degraded
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn other_remote_errors_are_not_retried_locally() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalFileStore::open(dir.path()).unwrap();
        let store = FallbackStore::with_primary(Some(Box::new(Rejecting)), local.clone());

        let row = Row::new().with(users::USERNAME, "t1");
        let err = store.append_row(Table::Users, &row).unwrap_err();
        assert!(matches!(err, DashboardError::Validation(_)));
        assert!(local.get_rows(Table::Users).unwrap().is_empty());
        assert_eq!(store.backend(), Backend::Remote);
    }

    #[test]
    fn local_only_reports_local_backend() {
        let dir = tempfile::tempdir().unwrap();
        let store = FallbackStore::local_only(LocalFileStore::open(dir.path()).unwrap());
        let status = store.status();
        assert_eq!(status.backend, Backend::Local);
        assert!(!status.degraded);
        assert_eq!(status.tables, vec!["Users", "Reports", "EditLogs"]);
    }
}
