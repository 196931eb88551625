use log::debug;
use std::fs::{File, create_dir_all};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{DashboardError, Result};
use crate::schema::{Row, RowKey, Table};
use crate::store::RecordStore;

/// JSON-file backed tables
///
/// One file per table holding a pretty-printed array of row objects. Every
/// write rewrites the whole file.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    dir: PathBuf,
}

impl LocalFileStore {
    /// Open the store, creating the directory and empty table files
    ///
    /// # Arguments
    /// * `dir` - Directory the table files live in
    ///
    /// # Errors
    /// * Returns `StorageFatal` if the directory or a file cannot be created
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            create_dir_all(&dir)?;
        }

        let store = LocalFileStore { dir };
        for table in Table::ALL {
            let path = store.path(table);
            if !path.exists() {
                store.write_rows(table, &[])?;
            }
        }
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, table: Table) -> PathBuf {
        self.dir.join(table.file_name())
    }

    fn read_rows(&self, table: Table) -> Result<Vec<Row>> {
        let path = self.path(table);
        let mut file = File::open(&path).map_err(|e| {
            DashboardError::StorageFatal(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&contents).map_err(|e| {
            DashboardError::StorageFatal(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    fn write_rows(&self, table: Table, rows: &[Row]) -> Result<()> {
        let json = serde_json::to_string_pretty(rows)?;
        let path = self.path(table);
        let mut file = File::create(&path).map_err(|e| {
            DashboardError::StorageFatal(format!("Failed to create {}: {}", path.display(), e))
        })?;
        file.write_all(json.as_bytes())?;
        debug!("Wrote {} rows to {}", rows.len(), path.display());
        Ok(())
    }
}

impl RecordStore for LocalFileStore {
    fn get_rows(&self, table: Table) -> Result<Vec<Row>> {
        self.read_rows(table)
    }

    fn append_row(&self, table: Table, row: &Row) -> Result<()> {
        let mut rows = self.read_rows(table)?;
        rows.push(row.clone());
        self.write_rows(table, &rows)
    }

    fn update_row(&self, table: Table, key: &RowKey, row: &Row) -> Result<()> {
        let mut rows = self.read_rows(table)?;
        let slot = rows
            .iter_mut()
            .find(|existing| table.key_of(existing) == *key)
            .ok_or_else(|| DashboardError::NotFound(format!("{} row {}", table, key)))?;
        *slot = row.clone();
        self.write_rows(table, &rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::users;

    fn user_row(name: &str, role: &str) -> Row {
        Row::new().with(users::USERNAME, name).with(users::ROLE, role)
    }

    #[test]
    fn open_creates_empty_tables() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::open(dir.path().join("nested")).unwrap();
        for table in Table::ALL {
            assert!(store.dir().join(table.file_name()).exists());
            assert!(store.get_rows(table).unwrap().is_empty());
        }
    }

    #[test]
    fn append_keeps_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::open(dir.path()).unwrap();
        store.append_row(Table::Users, &user_row("b", "admin")).unwrap();
        store.append_row(Table::Users, &user_row("a", "telecaller")).unwrap();

        let names: Vec<String> = store
            .get_rows(Table::Users)
            .unwrap()
            .iter()
            .map(|r| r.get(users::USERNAME).to_string())
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn update_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::open(dir.path()).unwrap();
        store.append_row(Table::Users, &user_row("a", "telecaller")).unwrap();
        store.append_row(Table::Users, &user_row("b", "telecaller")).unwrap();

        store
            .update_row(Table::Users, &RowKey::new("a"), &user_row("a", "admin"))
            .unwrap();

        let rows = store.get_rows(Table::Users).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(users::ROLE), "admin");
        assert_eq!(
            store.find_row(Table::Users, &RowKey::new("b")).unwrap(),
            Some(user_row("b", "telecaller"))
        );
    }

    #[test]
    fn update_of_missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::open(dir.path()).unwrap();
        let err = store
            .update_row(Table::Users, &RowKey::new("ghost"), &user_row("ghost", "admin"))
            .unwrap_err();
        assert!(matches!(err, DashboardError::NotFound(_)));
        assert_eq!(store.find_row(Table::Users, &RowKey::new("ghost")).unwrap(), None);
    }

    #[test]
    fn corrupt_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("reports.json"), "{ not json").unwrap();
        let err = store.get_rows(Table::Reports).unwrap_err();
        assert!(matches!(err, DashboardError::StorageFatal(_)));
    }
}
