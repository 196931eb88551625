use log::{debug, info};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use crate::config::SheetsConfig;
use crate::error::{DashboardError, Result};
use crate::schema::{Row, RowKey, Table};
use crate::store::RecordStore;

/// Response body of the values endpoint
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<JsonValue>>,
}

/// Google Sheets backed tables
///
/// Each table is a worksheet whose first row holds the column headers. Rows
/// are read and written through the spreadsheet values API.
pub struct SheetsStore {
    config: SheetsConfig,
    agent: ureq::Agent,
}

impl SheetsStore {
    /// Build a client without touching the network
    pub fn new(config: SheetsConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        SheetsStore { config, agent }
    }

    /// Build a client and run the start-up health check
    ///
    /// Every table is read once; missing worksheets are created and empty ones
    /// get their header row.
    ///
    /// # Errors
    /// * `Connection` if the spreadsheet is unreachable or rejects the token
    pub fn connect(config: SheetsConfig) -> Result<Self> {
        let store = SheetsStore::new(config);
        for table in Table::ALL {
            store.ensure_table(table)?;
        }
        Ok(store)
    }

    fn base(&self) -> &str {
        self.config.api_base.trim_end_matches('/')
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.config.access_token)
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.base(),
            self.config.spreadsheet_id,
            urlencoding::encode(range)
        )
    }

    fn sheet_range(table: Table) -> String {
        format!("'{}'", table.sheet_name())
    }

    fn row_range(table: Table, sheet_row: usize) -> String {
        format!("'{}'!A{}", table.sheet_name(), sheet_row)
    }

    /// Raw cell grid of a worksheet, header row included
    fn fetch_values(&self, table: Table) -> std::result::Result<Vec<Vec<String>>, ureq::Error> {
        let response = self
            .agent
            .get(&self.values_url(&Self::sheet_range(table)))
            .set("Authorization", &self.bearer())
            .call()?;
        let body: ValueRange = response.into_json()?;
        Ok(body
            .values
            .into_iter()
            .map(|cells| cells.into_iter().map(cell_text).collect())
            .collect())
    }

    fn read_values(&self, table: Table) -> Result<Vec<Vec<String>>> {
        self.fetch_values(table).map_err(connection_error)
    }

    fn append_cells(&self, table: Table, cells: Vec<String>) -> Result<()> {
        let url = format!("{}:append", self.values_url(&Self::row_range(table, 1)));
        self.agent
            .post(&url)
            .set("Authorization", &self.bearer())
            .query("valueInputOption", "RAW")
            .query("insertDataOption", "INSERT_ROWS")
            .send_json(json!({ "majorDimension": "ROWS", "values": [cells] }))
            .map_err(connection_error)?;
        Ok(())
    }

    fn put_cells(&self, table: Table, sheet_row: usize, cells: Vec<String>) -> Result<()> {
        self.agent
            .put(&self.values_url(&Self::row_range(table, sheet_row)))
            .set("Authorization", &self.bearer())
            .query("valueInputOption", "RAW")
            .send_json(json!({ "majorDimension": "ROWS", "values": [cells] }))
            .map_err(connection_error)?;
        Ok(())
    }

    fn add_sheet(&self, table: Table) -> Result<()> {
        let url = format!(
            "{}/v4/spreadsheets/{}:batchUpdate",
            self.base(),
            self.config.spreadsheet_id
        );
        self.agent
            .post(&url)
            .set("Authorization", &self.bearer())
            .send_json(json!({
                "requests": [{ "addSheet": { "properties": { "title": table.sheet_name() } } }]
            }))
            .map_err(connection_error)?;
        info!("Created worksheet {}", table);
        Ok(())
    }

    fn ensure_table(&self, table: Table) -> Result<()> {
        match self.fetch_values(table) {
            Ok(values) if values.is_empty() => self.write_header(table, &[]).map(|_| ()),
            Ok(_) => Ok(()),
            // An unknown range is how the API reports a missing worksheet
            Err(ureq::Error::Status(400, _)) => {
                self.add_sheet(table)?;
                self.write_header(table, &[]).map(|_| ())
            }
            Err(e) => Err(connection_error(e)),
        }
    }

    /// Merge the sheet's header row with the known columns and persist it if
    /// anything was missing. Returns the header row to write cells against.
    fn write_header(&self, table: Table, existing: &[String]) -> Result<Vec<String>> {
        let mut headers: Vec<String> = existing.to_vec();
        for column in table.headers() {
            if !headers.iter().any(|h| h == column) {
                headers.push(column.to_string());
            }
        }
        if headers.len() != existing.len() {
            debug!("Writing {} header columns to {}", headers.len(), table);
            self.put_cells(table, 1, headers.clone())?;
        }
        Ok(headers)
    }

    fn layout(&self, table: Table, values: &[Vec<String>]) -> Result<Vec<String>> {
        let existing = values.first().cloned().unwrap_or_default();
        self.write_header(table, &existing)
    }
}

impl RecordStore for SheetsStore {
    fn get_rows(&self, table: Table) -> Result<Vec<Row>> {
        let values = self.read_values(table)?;
        let Some((headers, data)) = values.split_first() else {
            return Ok(Vec::new());
        };
        Ok(data
            .iter()
            .map(|cells| Row::from_cells(headers, cells))
            .filter(|row| !row.is_blank())
            .collect())
    }

    fn append_row(&self, table: Table, row: &Row) -> Result<()> {
        let values = self.read_values(table)?;
        let headers = self.layout(table, &values)?;
        let columns: Vec<&str> = headers.iter().map(String::as_str).collect();
        self.append_cells(table, row.to_cells(&columns))
    }

    fn update_row(&self, table: Table, key: &RowKey, row: &Row) -> Result<()> {
        let values = self.read_values(table)?;
        let existing = values.first().cloned().unwrap_or_default();

        let position = values
            .iter()
            .skip(1)
            .position(|cells| table.key_of(&Row::from_cells(&existing, cells)) == *key)
            .ok_or_else(|| DashboardError::NotFound(format!("{} row {}", table, key)))?;

        let headers = self.write_header(table, &existing)?;
        let columns: Vec<&str> = headers.iter().map(String::as_str).collect();
        // Sheet rows are 1-based and row 1 is the header
        self.put_cells(table, position + 2, row.to_cells(&columns))
    }
}

fn cell_text(value: JsonValue) -> String {
    match value {
        JsonValue::String(s) => s,
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

/// Every remote failure (network, auth, quota, server, bad payload) is a
/// connection problem from the adapter's point of view.
fn connection_error(err: ureq::Error) -> DashboardError {
    match err {
        ureq::Error::Status(code, response) => DashboardError::Connection(format!(
            "spreadsheet API returned {} {}",
            code,
            response.status_text()
        )),
        ureq::Error::Transport(transport) => DashboardError::Connection(transport.to_string()),
    }
}
