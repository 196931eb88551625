//! Aggregations over report lists for the dashboard charts.
//!
//! Every function here is pure: callers pass the reports (already scoped to
//! what the viewer may see) and the current date.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::clock::days_before;
use crate::models::DailyReport;

/// Totals for one telecaller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelecallerSummary {
    pub telecaller: String,
    pub total_calls: i64,
    pub new_data: i64,
    pub crm_data: i64,
    pub video_activities: usize,

    /// New data per 100 calls, one decimal
    pub conversion_rate: f64,
}

/// Number of reports naming a country
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountryCount {
    pub country: String,
    pub reports: usize,
}

/// Totals for one calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub total_calls: i64,
    pub new_data: i64,
}

/// Window for [`dashboard_stats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    #[default]
    Today,
    Yesterday,
    /// Last 7 days
    Week,
    /// Last 30 days
    Month,
    All,
}

impl TimeRange {
    pub fn parse(raw: &str) -> Option<TimeRange> {
        match raw.trim().to_lowercase().as_str() {
            "today" => Some(TimeRange::Today),
            "yesterday" => Some(TimeRange::Yesterday),
            "week" => Some(TimeRange::Week),
            "month" => Some(TimeRange::Month),
            "all" => Some(TimeRange::All),
            _ => None,
        }
    }

    fn contains(&self, date: NaiveDate, today: NaiveDate) -> bool {
        match self {
            TimeRange::Today => date == today,
            TimeRange::Yesterday => date == today - Duration::days(1),
            TimeRange::Week => date >= today - Duration::days(7),
            TimeRange::Month => date >= today - Duration::days(30),
            TimeRange::All => true,
        }
    }
}

/// Headline numbers of the dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_calls: i64,
    pub new_data: i64,
    pub crm_data: i64,
    pub fair_data: i64,
    pub visited_students: i64,
    pub video_activities: usize,

    /// Reports with a non-empty country
    pub country_entries: usize,

    pub avg_calls_per_day: f64,
    pub avg_new_data_per_day: f64,
    pub crm_completion_rate: f64,
    pub conversion_rate: f64,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// `part / whole` as a percentage, one decimal; 0 when `whole` is 0
fn rate(part: i64, whole: i64) -> f64 {
    if whole > 0 {
        round1(part as f64 / whole as f64 * 100.0)
    } else {
        0.0
    }
}

/// A window too wide for the calendar has no lower bound
fn within_days(report: &DailyReport, days: i64, today: NaiveDate) -> bool {
    report.date <= today && days_before(today, days).is_none_or(|since| report.date >= since)
}

/// Per-telecaller totals, ordered by telecaller name
pub fn per_telecaller(reports: &[DailyReport]) -> Vec<TelecallerSummary> {
    let mut grouped: BTreeMap<&str, TelecallerSummary> = BTreeMap::new();
    for report in reports {
        let entry = grouped
            .entry(report.telecaller.as_str())
            .or_insert_with(|| TelecallerSummary {
                telecaller: report.telecaller.clone(),
                total_calls: 0,
                new_data: 0,
                crm_data: 0,
                video_activities: 0,
                conversion_rate: 0.0,
            });
        entry.total_calls = entry.total_calls.saturating_add(report.metrics.total_calls);
        entry.new_data = entry.new_data.saturating_add(report.metrics.new_data);
        entry.crm_data = entry.crm_data.saturating_add(report.metrics.crm_data);
        if report.metrics.video {
            entry.video_activities += 1;
        }
    }

    grouped
        .into_values()
        .map(|mut summary| {
            summary.conversion_rate = rate(summary.new_data, summary.total_calls);
            summary
        })
        .collect()
}

/// Report count per country, most frequent first (ties by name)
pub fn per_country(reports: &[DailyReport]) -> Vec<CountryCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for report in reports {
        if let Some(country) = report.metrics.country.as_deref().filter(|c| !c.is_empty()) {
            *counts.entry(country).or_default() += 1;
        }
    }

    let mut result: Vec<CountryCount> = counts
        .into_iter()
        .map(|(country, reports)| CountryCount {
            country: country.to_string(),
            reports,
        })
        .collect();
    result.sort_by(|a, b| b.reports.cmp(&a.reports).then_with(|| a.country.cmp(&b.country)));
    result
}

/// Calls and new data summed per date, ascending
pub fn per_day(reports: &[DailyReport]) -> Vec<DailyTotal> {
    let mut days: BTreeMap<NaiveDate, (i64, i64)> = BTreeMap::new();
    for report in reports {
        let totals = days.entry(report.date).or_default();
        totals.0 = totals.0.saturating_add(report.metrics.total_calls);
        totals.1 = totals.1.saturating_add(report.metrics.new_data);
    }
    days.into_iter()
        .map(|(date, (total_calls, new_data))| DailyTotal {
            date,
            total_calls,
            new_data,
        })
        .collect()
}

/// Headline numbers over the reports falling in `range`
pub fn dashboard_stats(reports: &[DailyReport], range: TimeRange, today: NaiveDate) -> DashboardStats {
    let selected: Vec<&DailyReport> = reports
        .iter()
        .filter(|r| range.contains(r.date, today))
        .collect();
    if selected.is_empty() {
        return DashboardStats::default();
    }

    let mut stats = DashboardStats::default();
    let mut days = BTreeSet::new();
    for report in &selected {
        let m = &report.metrics;
        stats.total_calls = stats.total_calls.saturating_add(m.total_calls);
        stats.new_data = stats.new_data.saturating_add(m.new_data);
        stats.crm_data = stats.crm_data.saturating_add(m.crm_data);
        stats.fair_data = stats.fair_data.saturating_add(m.fair_data);
        stats.visited_students = stats.visited_students.saturating_add(m.visited_students);
        if m.video {
            stats.video_activities += 1;
        }
        if m.country.as_deref().is_some_and(|c| !c.is_empty()) {
            stats.country_entries += 1;
        }
        days.insert(report.date);
    }

    let day_count = days.len() as f64;
    stats.avg_calls_per_day = round1(stats.total_calls as f64 / day_count);
    stats.avg_new_data_per_day = round1(stats.new_data as f64 / day_count);
    stats.crm_completion_rate = rate(stats.crm_data, stats.total_calls);
    stats.conversion_rate = rate(stats.new_data, stats.total_calls);
    stats
}

/// Daily totals over the last `days` days up to `today`
pub fn trend(reports: &[DailyReport], days: i64, today: NaiveDate) -> Vec<DailyTotal> {
    let recent: Vec<DailyReport> = reports
        .iter()
        .filter(|r| within_days(r, days, today))
        .cloned()
        .collect();
    per_day(&recent)
}

/// Reports with a video over the last `days` days, newest first
pub fn video_activities(reports: &[DailyReport], days: i64, today: NaiveDate) -> Vec<DailyReport> {
    let mut videos: Vec<DailyReport> = reports
        .iter()
        .filter(|r| r.metrics.video && within_days(r, days, today))
        .cloned()
        .collect();
    videos.sort_by(|a, b| b.date.cmp(&a.date));
    videos
}
