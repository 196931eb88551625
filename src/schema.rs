//! Table layout shared by every store backend.
//!
//! Rows are spreadsheet rows: string cells addressed by column header. The
//! header lists below fix the column order used on the remote sheet; the local
//! JSON files store the same rows as objects.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use crate::clock::{format_date, parse_date};

pub mod users {
    pub const USERNAME: &str = "Username";
    pub const PASSWORD: &str = "Password";
    pub const ROLE: &str = "Role";
    pub const NAME: &str = "Name";
    pub const TELECALLER_NAME: &str = "TelecallerName";
    pub const PERMISSIONS: &str = "Permissions";
    pub const CREATED_AT: &str = "CreatedAt";
    pub const UPDATED_AT: &str = "UpdatedAt";
    pub const IS_ACTIVE: &str = "IsActive";

    pub const HEADERS: &[&str] = &[
        USERNAME,
        PASSWORD,
        ROLE,
        NAME,
        TELECALLER_NAME,
        PERMISSIONS,
        CREATED_AT,
        UPDATED_AT,
        IS_ACTIVE,
    ];
}

pub mod reports {
    pub const DATE: &str = "Date";
    pub const TELECALLER: &str = "Telecaller";
    pub const DAY: &str = "Day";
    pub const TOTAL_CALLS: &str = "Total Calls";
    pub const NEW_DATA: &str = "New Data";
    pub const CRM_DATA: &str = "CRM Data";
    pub const COUNTRY_DATA: &str = "Country Data";
    pub const FAIR_DATA: &str = "Fair Data";
    pub const VIDEO: &str = "Video";
    pub const VIDEO_DETAILS: &str = "Video Details";
    pub const OTHER_WORK: &str = "Other Work Description";
    pub const VISITED_STUDENTS: &str = "Visited Students";
    pub const REMARKS: &str = "Remarks";
    pub const TIMESTAMP: &str = "Timestamp";
    pub const UPDATED_AT: &str = "Updated At";
    pub const SUBMITTED_BY: &str = "Submitted By";

    pub const HEADERS: &[&str] = &[
        DATE,
        TELECALLER,
        DAY,
        TOTAL_CALLS,
        NEW_DATA,
        CRM_DATA,
        COUNTRY_DATA,
        FAIR_DATA,
        VIDEO,
        VIDEO_DETAILS,
        OTHER_WORK,
        VISITED_STUDENTS,
        REMARKS,
        TIMESTAMP,
        UPDATED_AT,
        SUBMITTED_BY,
    ];
}

pub mod edit_logs {
    pub const ID: &str = "Id";
    pub const TIMESTAMP: &str = "Timestamp";
    pub const USER: &str = "User";
    pub const USERNAME: &str = "Username";
    pub const ROLE: &str = "Role";
    pub const ACTION: &str = "Action";
    pub const REPORT_DATE: &str = "ReportDate";
    pub const TELECALLER: &str = "Telecaller";
    pub const ORIGINAL_DATA: &str = "OriginalData";
    pub const NEW_DATA: &str = "NewData";

    pub const HEADERS: &[&str] = &[
        ID,
        TIMESTAMP,
        USER,
        USERNAME,
        ROLE,
        ACTION,
        REPORT_DATE,
        TELECALLER,
        ORIGINAL_DATA,
        NEW_DATA,
    ];
}

/// Logical tables persisted by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Table {
    Users,
    Reports,
    EditLogs,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::Users, Table::Reports, Table::EditLogs];

    /// Worksheet title on the remote spreadsheet
    pub fn sheet_name(&self) -> &'static str {
        match self {
            Table::Users => "Users",
            Table::Reports => "Reports",
            Table::EditLogs => "EditLogs",
        }
    }

    /// File name inside the local data directory
    pub fn file_name(&self) -> &'static str {
        match self {
            Table::Users => "users.json",
            Table::Reports => "reports.json",
            Table::EditLogs => "edit_logs.json",
        }
    }

    pub fn headers(&self) -> &'static [&'static str] {
        match self {
            Table::Users => users::HEADERS,
            Table::Reports => reports::HEADERS,
            Table::EditLogs => edit_logs::HEADERS,
        }
    }

    /// Record identifier of a row in this table
    ///
    /// Reports are keyed by date and telecaller; the date is normalised so
    /// rows written in the older `DD/MM/YYYY` form still match.
    pub fn key_of(&self, row: &Row) -> RowKey {
        match self {
            Table::Users => RowKey::new(row.get(users::USERNAME)),
            Table::Reports => {
                let raw = row.get(reports::DATE);
                let date = parse_date(raw).map(format_date).unwrap_or_else(|| raw.to_string());
                RowKey::report(&date, row.get(reports::TELECALLER))
            }
            Table::EditLogs => RowKey::new(row.get(edit_logs::ID)),
        }
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.sheet_name())
    }
}

/// Identifier used by `find_row` and `update_row`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey(String);

impl RowKey {
    pub fn new(key: impl Into<String>) -> Self {
        RowKey(key.into())
    }

    pub fn report(date: &str, telecaller: &str) -> Self {
        RowKey(format!("{}|{}", date, telecaller))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RowKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One table row: header -> cell text
///
/// Deserialisation accepts non-string JSON cells (numbers, booleans, null) so
/// hand-edited or older local files still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, JsonValue>")]
pub struct Row(BTreeMap<String, String>);

impl Row {
    pub fn new() -> Self {
        Row(BTreeMap::new())
    }

    /// Builder-style setter
    pub fn with(mut self, column: &str, value: impl Into<String>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<String>) {
        self.0.insert(column.to_string(), value.into());
    }

    /// Cell text, empty when the column is absent
    pub fn get(&self, column: &str) -> &str {
        self.0.get(column).map(String::as_str).unwrap_or("")
    }

    /// Build a row from positional cells, padding short rows with empty cells
    pub fn from_cells(headers: &[String], cells: &[String]) -> Self {
        let mut row = Row::new();
        for (i, header) in headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            row.set(header, cells.get(i).cloned().unwrap_or_default());
        }
        row
    }

    /// Cells in header order
    pub fn to_cells(&self, headers: &[&str]) -> Vec<String> {
        headers.iter().map(|h| self.get(h).to_string()).collect()
    }

    pub fn is_blank(&self) -> bool {
        self.0.values().all(|v| v.trim().is_empty())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.0.values().map(String::as_str)
    }
}

impl From<BTreeMap<String, JsonValue>> for Row {
    fn from(map: BTreeMap<String, JsonValue>) -> Self {
        let cells = map
            .into_iter()
            .map(|(k, v)| {
                let text = match v {
                    JsonValue::String(s) => s,
                    JsonValue::Null => String::new(),
                    JsonValue::Bool(true) => "True".to_string(),
                    JsonValue::Bool(false) => "False".to_string(),
                    other => other.to_string(),
                };
                (k, text)
            })
            .collect();
        Row(cells)
    }
}
