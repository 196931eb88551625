//! Domain records and their row encoding.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::clock::{format_date, format_timestamp, parse_date, parse_timestamp};
use crate::schema::{Row, edit_logs, reports, users};

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Telecaller,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Telecaller => "telecaller",
        }
    }

    pub fn parse(raw: &str) -> Option<Role> {
        match raw.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "telecaller" => Some(Role::Telecaller),
            _ => None,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-account capability flags
///
/// Stored as a JSON object in a single cell. Unknown keys are ignored and
/// missing keys read as `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Permissions {
    pub can_edit_all: bool,
    pub can_add_reports: bool,
    pub can_edit_own: bool,
    pub can_view_all: bool,
    pub can_manage_users: bool,
    pub can_export_data: bool,
    pub can_view_analytics: bool,
}

impl Permissions {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Admin => Permissions {
                can_edit_all: true,
                can_add_reports: true,
                can_edit_own: true,
                can_view_all: true,
                can_manage_users: true,
                can_export_data: true,
                can_view_analytics: true,
            },
            Role::Telecaller => Permissions {
                can_add_reports: true,
                can_edit_own: true,
                can_view_analytics: true,
                ..Permissions::default()
            },
        }
    }
}

/// A stored account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub username: String,

    /// Lowercase hex SHA-256 of the password
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub role: Role,
    pub name: String,

    /// Name reports are filed under; `None` for accounts that do not report
    pub telecaller_name: Option<String>,

    pub permissions: Permissions,
    pub created_at: String,
    pub updated_at: String,
    pub is_active: bool,
}

impl User {
    pub fn to_row(&self) -> Row {
        let permissions = serde_json::to_string(&self.permissions).unwrap_or_else(|_| "{}".into());
        Row::new()
            .with(users::USERNAME, self.username.as_str())
            .with(users::PASSWORD, self.password_hash.as_str())
            .with(users::ROLE, self.role.as_str())
            .with(users::NAME, self.name.as_str())
            .with(users::TELECALLER_NAME, self.telecaller_name.clone().unwrap_or_default())
            .with(users::PERMISSIONS, permissions)
            .with(users::CREATED_AT, self.created_at.as_str())
            .with(users::UPDATED_AT, self.updated_at.as_str())
            .with(users::IS_ACTIVE, bool_cell(self.is_active))
    }

    /// Decode a user row; `None` for rows without a username or known role
    pub fn from_row(row: &Row) -> Option<User> {
        let username = row.get(users::USERNAME).trim();
        if username.is_empty() {
            return None;
        }
        let role = Role::parse(row.get(users::ROLE))?;
        let permissions = serde_json::from_str(row.get(users::PERMISSIONS))
            .unwrap_or_else(|_| Permissions::for_role(role));

        Some(User {
            username: username.to_string(),
            password_hash: row.get(users::PASSWORD).to_string(),
            role,
            name: row.get(users::NAME).to_string(),
            telecaller_name: non_empty(row.get(users::TELECALLER_NAME)),
            permissions,
            created_at: row.get(users::CREATED_AT).to_string(),
            updated_at: row.get(users::UPDATED_AT).to_string(),
            // Missing flag means active, as the sheet was first written without it
            is_active: parse_bool(row.get(users::IS_ACTIVE)).unwrap_or(true),
        })
    }
}

/// Largest value a report counter may hold
pub const MAX_COUNTER: i64 = u32::MAX as i64;

/// Numbers and notes of one day's work
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportMetrics {
    pub total_calls: i64,
    pub new_data: i64,
    pub crm_data: i64,
    pub fair_data: i64,
    pub visited_students: i64,

    /// Country the new leads came from, if any
    pub country: Option<String>,

    pub video: bool,
    pub video_details: String,
    pub other_work: String,
    pub remarks: String,
}

impl ReportMetrics {
    /// Named numeric fields, in display order
    pub fn counters(&self) -> [(&'static str, i64); 5] {
        [
            ("total_calls", self.total_calls),
            ("new_data", self.new_data),
            ("crm_data", self.crm_data),
            ("fair_data", self.fair_data),
            ("visited_students", self.visited_students),
        ]
    }
}

/// One telecaller's report for one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReport {
    pub telecaller: String,
    pub date: NaiveDate,
    pub metrics: ReportMetrics,
    pub submitted_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
    pub submitted_by: String,
}

impl DailyReport {
    pub fn day_name(&self) -> &'static str {
        weekday_name(self.date.weekday())
    }

    pub fn to_row(&self) -> Row {
        let m = &self.metrics;
        Row::new()
            .with(reports::DATE, format_date(self.date))
            .with(reports::TELECALLER, self.telecaller.as_str())
            .with(reports::DAY, self.day_name())
            .with(reports::TOTAL_CALLS, m.total_calls.to_string())
            .with(reports::NEW_DATA, m.new_data.to_string())
            .with(reports::CRM_DATA, m.crm_data.to_string())
            .with(reports::COUNTRY_DATA, m.country.clone().unwrap_or_default())
            .with(reports::FAIR_DATA, m.fair_data.to_string())
            .with(reports::VIDEO, if m.video { "Yes" } else { "No" })
            .with(reports::VIDEO_DETAILS, m.video_details.as_str())
            .with(reports::OTHER_WORK, m.other_work.as_str())
            .with(reports::VISITED_STUDENTS, m.visited_students.to_string())
            .with(reports::REMARKS, m.remarks.as_str())
            .with(reports::TIMESTAMP, self.submitted_at.map(format_timestamp).unwrap_or_default())
            .with(reports::UPDATED_AT, self.updated_at.map(format_timestamp).unwrap_or_default())
            .with(reports::SUBMITTED_BY, self.submitted_by.as_str())
    }

    /// Decode a report row; `None` when the date cell does not parse
    pub fn from_row(row: &Row) -> Option<DailyReport> {
        let date = parse_date(row.get(reports::DATE))?;
        let metrics = ReportMetrics {
            total_calls: coerce_number(row.get(reports::TOTAL_CALLS)),
            new_data: coerce_number(row.get(reports::NEW_DATA)),
            crm_data: coerce_number(row.get(reports::CRM_DATA)),
            fair_data: coerce_number(row.get(reports::FAIR_DATA)),
            visited_students: coerce_number(row.get(reports::VISITED_STUDENTS)),
            country: non_empty(row.get(reports::COUNTRY_DATA)),
            video: row.get(reports::VIDEO).trim().eq_ignore_ascii_case("yes"),
            video_details: row.get(reports::VIDEO_DETAILS).to_string(),
            other_work: row.get(reports::OTHER_WORK).to_string(),
            remarks: row.get(reports::REMARKS).to_string(),
        };

        Some(DailyReport {
            telecaller: row.get(reports::TELECALLER).to_string(),
            date,
            metrics,
            submitted_at: parse_timestamp(row.get(reports::TIMESTAMP)),
            updated_at: parse_timestamp(row.get(reports::UPDATED_AT)),
            submitted_by: row.get(reports::SUBMITTED_BY).to_string(),
        })
    }
}

/// Kind of change recorded in the edit history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EditAction {
    Edit,
}

impl EditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditAction::Edit => "EDIT",
        }
    }

    pub fn parse(raw: &str) -> Option<EditAction> {
        match raw.trim().to_uppercase().as_str() {
            "EDIT" => Some(EditAction::Edit),
            _ => None,
        }
    }
}

/// Append-only record of an overwritten report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditHistoryEntry {
    pub id: String,
    pub timestamp: NaiveDateTime,

    /// Display name of the editor
    pub user: String,
    pub username: String,
    pub role: Role,
    pub action: EditAction,
    pub report_date: NaiveDate,
    pub telecaller: String,

    /// Metrics as they were before the edit
    pub original: ReportMetrics,

    /// Metrics written by the edit
    pub new: ReportMetrics,
}

impl EditHistoryEntry {
    pub fn to_row(&self) -> Row {
        Row::new()
            .with(edit_logs::ID, self.id.as_str())
            .with(edit_logs::TIMESTAMP, format_timestamp(self.timestamp))
            .with(edit_logs::USER, self.user.as_str())
            .with(edit_logs::USERNAME, self.username.as_str())
            .with(edit_logs::ROLE, self.role.as_str())
            .with(edit_logs::ACTION, self.action.as_str())
            .with(edit_logs::REPORT_DATE, format_date(self.report_date))
            .with(edit_logs::TELECALLER, self.telecaller.as_str())
            .with(edit_logs::ORIGINAL_DATA, snapshot(&self.original))
            .with(edit_logs::NEW_DATA, snapshot(&self.new))
    }

    pub fn from_row(row: &Row) -> Option<EditHistoryEntry> {
        Some(EditHistoryEntry {
            id: row.get(edit_logs::ID).to_string(),
            timestamp: parse_timestamp(row.get(edit_logs::TIMESTAMP))?,
            user: row.get(edit_logs::USER).to_string(),
            username: row.get(edit_logs::USERNAME).to_string(),
            role: Role::parse(row.get(edit_logs::ROLE)).unwrap_or(Role::Telecaller),
            action: EditAction::parse(row.get(edit_logs::ACTION))?,
            report_date: parse_date(row.get(edit_logs::REPORT_DATE))?,
            telecaller: row.get(edit_logs::TELECALLER).to_string(),
            original: serde_json::from_str(row.get(edit_logs::ORIGINAL_DATA)).unwrap_or_default(),
            new: serde_json::from_str(row.get(edit_logs::NEW_DATA)).unwrap_or_default(),
        })
    }
}

fn snapshot(metrics: &ReportMetrics) -> String {
    serde_json::to_string(metrics).unwrap_or_else(|_| "{}".to_string())
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Numeric cell clamped to `-MAX_COUNTER..=MAX_COUNTER`; anything unparseable counts as 0
fn coerce_number(raw: &str) -> i64 {
    let raw = raw.trim();
    raw.parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        .unwrap_or(0)
        .clamp(-MAX_COUNTER, MAX_COUNTER)
}

fn bool_cell(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
