use chrono::NaiveDate;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Actor;
use crate::clock::{Clock, days_before, format_date};
use crate::error::{DashboardError, Result};
use crate::models::{DailyReport, EditAction, EditHistoryEntry, MAX_COUNTER, ReportMetrics};
use crate::schema::{Row, RowKey, Table};
use crate::store::RecordStore;

/// Whether a submission added a new row or overwrote an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitOutcome {
    Created,
    Updated,
}

/// Criteria for [`ReportService::list_reports`]; empty fields match everything
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReportFilter {
    pub telecaller: Option<String>,

    /// Inclusive lower bound
    pub start_date: Option<NaiveDate>,

    /// Inclusive upper bound
    pub end_date: Option<NaiveDate>,

    pub video: Option<bool>,

    /// Case-insensitive substring matched against every cell of the row
    pub search: Option<String>,
}

impl ReportFilter {
    fn matches(&self, report: &DailyReport, row: &Row) -> bool {
        if let Some(telecaller) = self.telecaller.as_deref().filter(|t| !t.is_empty()) {
            if report.telecaller != telecaller {
                return false;
            }
        }
        if self.start_date.is_some_and(|start| report.date < start) {
            return false;
        }
        if self.end_date.is_some_and(|end| report.date > end) {
            return false;
        }
        if self.video.is_some_and(|video| report.metrics.video != video) {
            return false;
        }
        match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(term) => {
                let term = term.to_lowercase();
                row.values().any(|cell| cell.to_lowercase().contains(&term))
            }
            None => true,
        }
    }
}

/// Criteria for [`ReportService::edit_history`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HistoryFilter {
    /// Only entries from the last N days, today included
    pub days: Option<i64>,

    pub action: Option<EditAction>,

    /// Case-insensitive substring of the editor's username or display name
    pub editor: Option<String>,
}

/// Daily report submission and retrieval
pub struct ReportService<'a> {
    store: &'a dyn RecordStore,
    clock: &'a dyn Clock,
}

impl<'a> ReportService<'a> {
    pub fn new(store: &'a dyn RecordStore, clock: &'a dyn Clock) -> Self {
        ReportService { store, clock }
    }

    /// Validate and store one telecaller's report for one day
    ///
    /// A second submission for the same telecaller and date overwrites the
    /// first. Before overwriting, the previous values are appended to the edit
    /// history. The original submission time and submitter are kept.
    ///
    /// # Arguments
    /// * `actor` - The caller
    /// * `telecaller` - Name the report is filed under
    /// * `date` - Day the report covers; must not be in the future
    /// * `metrics` - The day's numbers; all counters must be non-negative
    ///
    /// # Returns
    /// * `Result<SubmitOutcome>` - `Created` for a new row, `Updated` for an overwrite
    ///
    /// # Errors
    /// * `Validation` for bad input
    /// * `PermissionDenied` if the caller may not file or edit for `telecaller`
    /// * Store errors that survive the local fallback
    pub fn submit_report(
        &self,
        actor: &Actor,
        telecaller: &str,
        date: NaiveDate,
        metrics: ReportMetrics,
    ) -> Result<SubmitOutcome> {
        let telecaller = telecaller.trim();
        let metrics = normalise(metrics);
        self.validate(telecaller, date, &metrics)?;
        actor.require(
            actor.can_add_report(telecaller),
            &format!("submit reports for {}", telecaller),
        )?;

        let now = self.clock.now();
        let key = RowKey::report(&format_date(date), telecaller);
        let existing = self
            .store
            .find_row(Table::Reports, &key)?
            .as_ref()
            .and_then(DailyReport::from_row);

        match existing {
            Some(previous) => {
                actor.require(
                    actor.can_edit_report(telecaller),
                    &format!("edit reports of {}", telecaller),
                )?;

                let entry = EditHistoryEntry {
                    id: Uuid::new_v4().to_string(),
                    timestamp: now,
                    user: actor.name.clone(),
                    username: actor.username.clone(),
                    role: actor.role,
                    action: EditAction::Edit,
                    report_date: date,
                    telecaller: telecaller.to_string(),
                    original: previous.metrics.clone(),
                    new: metrics.clone(),
                };
                self.store.append_row(Table::EditLogs, &entry.to_row())?;

                let report = DailyReport {
                    telecaller: telecaller.to_string(),
                    date,
                    metrics,
                    submitted_at: previous.submitted_at.or(Some(now)),
                    updated_at: Some(now),
                    submitted_by: previous.submitted_by,
                };
                self.store.update_row(Table::Reports, &key, &report.to_row())?;
                info!("{} updated report {} for {}", actor.username, format_date(date), telecaller);
                Ok(SubmitOutcome::Updated)
            }
            None => {
                let report = DailyReport {
                    telecaller: telecaller.to_string(),
                    date,
                    metrics,
                    submitted_at: Some(now),
                    updated_at: None,
                    submitted_by: actor.username.clone(),
                };
                self.store.append_row(Table::Reports, &report.to_row())?;
                info!("{} submitted report {} for {}", actor.username, format_date(date), telecaller);
                Ok(SubmitOutcome::Created)
            }
        }
    }

    fn validate(&self, telecaller: &str, date: NaiveDate, metrics: &ReportMetrics) -> Result<()> {
        if telecaller.is_empty() {
            return Err(DashboardError::Validation("Telecaller is required".to_string()));
        }
        if date > self.clock.today() {
            return Err(DashboardError::Validation(format!(
                "Report date {} is in the future",
                format_date(date)
            )));
        }
        if let Some((field, value)) = metrics.counters().into_iter().find(|(_, v)| *v < 0) {
            return Err(DashboardError::Validation(format!(
                "{} cannot be negative (got {})",
                field, value
            )));
        }
        if let Some((field, value)) = metrics.counters().into_iter().find(|(_, v)| *v > MAX_COUNTER) {
            return Err(DashboardError::Validation(format!(
                "{} cannot exceed {} (got {})",
                field, MAX_COUNTER, value
            )));
        }
        if metrics.video && metrics.video_details.is_empty() {
            return Err(DashboardError::Validation(
                "Video details are required when a video was made".to_string(),
            ));
        }
        Ok(())
    }

    /// Reports visible to the caller that match `filter`, in storage order
    ///
    /// Callers without `can_view_all` only see their own telecaller's rows.
    /// Rows whose date does not parse are skipped.
    pub fn list_reports(&self, actor: &Actor, filter: &ReportFilter) -> Result<Vec<DailyReport>> {
        let rows = self.store.get_rows(Table::Reports)?;
        let total = rows.len();
        let reports: Vec<DailyReport> = rows
            .iter()
            .filter_map(|row| DailyReport::from_row(row).map(|report| (report, row)))
            .filter(|(report, _)| actor.can_view_all() || actor.is_telecaller(&report.telecaller))
            .filter(|(report, row)| filter.matches(report, row))
            .map(|(report, _)| report)
            .collect();
        debug!("{} of {} report rows visible to {}", reports.len(), total, actor.username);
        Ok(reports)
    }

    /// Recorded edits matching `filter`, in storage order
    ///
    /// # Errors
    /// * `PermissionDenied` unless the caller holds `can_view_all`
    pub fn edit_history(&self, actor: &Actor, filter: &HistoryFilter) -> Result<Vec<EditHistoryEntry>> {
        actor.require(actor.can_view_all(), "view the edit history")?;

        let today = self.clock.today();
        let since = filter.days.and_then(|days| days_before(today, days.max(1) - 1));
        let editor = filter.editor.as_deref().map(|e| e.trim().to_lowercase());

        Ok(self
            .store
            .get_rows(Table::EditLogs)?
            .iter()
            .filter_map(EditHistoryEntry::from_row)
            .filter(|entry| since.is_none_or(|since| entry.timestamp.date() >= since))
            .filter(|entry| filter.action.is_none_or(|action| entry.action == action))
            .filter(|entry| match editor.as_deref() {
                Some(needle) if !needle.is_empty() => {
                    entry.username.to_lowercase().contains(needle)
                        || entry.user.to_lowercase().contains(needle)
                }
                _ => true,
            })
            .collect())
    }
}

/// Trim free text and drop video details when no video was made
fn normalise(mut metrics: ReportMetrics) -> ReportMetrics {
    metrics.country = metrics
        .country
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    metrics.video_details = if metrics.video {
        metrics.video_details.trim().to_string()
    } else {
        String::new()
    };
    metrics.other_work = metrics.other_work.trim().to_string();
    metrics.remarks = metrics.remarks.trim().to_string();
    metrics
}
