use crate::auth::Actor;
use crate::error::Result;
use crate::models::{DailyReport, EditHistoryEntry};
use crate::schema::{Row, edit_logs, reports};

/// Report columns written as numbers in the XLSX export
const NUMERIC_COLUMNS: &[&str] = &[
    reports::TOTAL_CALLS,
    reports::NEW_DATA,
    reports::CRM_DATA,
    reports::FAIR_DATA,
    reports::VISITED_STUDENTS,
];

/// Fail unless the caller may download data
///
/// # Errors
/// * `PermissionDenied` unless the caller holds `can_export_data`
pub fn check_export(actor: &Actor) -> Result<()> {
    actor.require(actor.can_export_data(), "export data")
}

/// Convert reports to CSV
///
/// The first line holds the column headers of the Reports table; each report
/// follows in the given order. Values containing commas, quotes or newlines
/// are quoted.
///
/// # Arguments
/// * `reports` - Reports to export
///
/// # Returns
/// * `String` - CSV content
pub fn reports_to_csv(reports: &[DailyReport]) -> String {
    let rows: Vec<Row> = reports.iter().map(DailyReport::to_row).collect();
    rows_to_csv(reports::HEADERS, &rows)
}

/// Convert edit history entries to CSV
///
/// The value snapshots are written as the JSON they are stored as.
pub fn history_to_csv(entries: &[EditHistoryEntry]) -> String {
    let rows: Vec<Row> = entries.iter().map(EditHistoryEntry::to_row).collect();
    rows_to_csv(edit_logs::HEADERS, &rows)
}

fn rows_to_csv(headers: &[&str], rows: &[Row]) -> String {
    let mut csv_content = String::new();
    push_line(&mut csv_content, headers.iter().copied());
    for row in rows {
        push_line(&mut csv_content, headers.iter().map(|h| row.get(h)));
    }
    csv_content
}

fn push_line<'a>(out: &mut String, values: impl Iterator<Item = &'a str>) {
    for (i, value) in values.enumerate() {
        if i > 0 {
            out.push(',');
        }
        if value.contains(',') || value.contains('"') || value.contains('\n') {
            let escaped = value.replace('"', "\"\"");
            out.push_str(&format!("\"{}\"", escaped));
        } else {
            out.push_str(value);
        }
    }
    out.push('\n');
}

/// Convert reports to an XLSX workbook
///
/// One worksheet named `Reports` with a header row. Counter columns are
/// written as numbers so they can be summed in a spreadsheet application.
///
/// # Returns
/// * `Result<Vec<u8>>` - XLSX file content
///
/// # Errors
/// * `StorageFatal` if the workbook cannot be produced
pub fn reports_to_xlsx(reports: &[DailyReport]) -> Result<Vec<u8>> {
    use rust_xlsxwriter::{Workbook, Worksheet};

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name("Reports")?;

    for (c, header) in reports::HEADERS.iter().enumerate() {
        worksheet.write_string(0, c as u16, *header)?;
    }

    for (r, report) in reports.iter().enumerate() {
        let row = report.to_row();
        let sheet_row = (r + 1) as u32;
        for (c, header) in reports::HEADERS.iter().enumerate() {
            let value = row.get(header);
            if NUMERIC_COLUMNS.contains(header) {
                let number = value.parse::<f64>().unwrap_or(0.0);
                worksheet.write_number(sheet_row, c as u16, number)?;
            } else if !value.is_empty() {
                worksheet.write_string(sheet_row, c as u16, value)?;
            }
        }
    }

    workbook.push_worksheet(worksheet);
    let buffer = workbook.save_to_buffer()?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::parse_timestamp;
    use crate::models::{EditAction, Permissions, ReportMetrics, Role};
    use chrono::NaiveDate;

    fn report(remarks: &str) -> DailyReport {
        DailyReport {
            telecaller: "T1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            metrics: ReportMetrics {
                total_calls: 20,
                remarks: remarks.to_string(),
                ..ReportMetrics::default()
            },
            submitted_at: parse_timestamp("2024-01-05 18:00:00"),
            updated_at: None,
            submitted_by: "t1".to_string(),
        }
    }

    #[test]
    fn csv_has_header_and_escaped_cells() {
        let csv = reports_to_csv(&[report("busy, \"long\" day")]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Date,Telecaller,Day,Total Calls"));
        assert!(lines[1].starts_with("2024-01-05,T1,Friday,20,0,0,"));
        assert!(lines[1].contains("\"busy, \"\"long\"\" day\""));
    }

    #[test]
    fn history_csv_lists_entries() {
        let entry = EditHistoryEntry {
            id: "e1".to_string(),
            timestamp: parse_timestamp("2024-01-05 19:00:00").unwrap(),
            user: "Administrator".to_string(),
            username: "admin".to_string(),
            role: Role::Admin,
            action: EditAction::Edit,
            report_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            telecaller: "T1".to_string(),
            original: ReportMetrics::default(),
            new: ReportMetrics::default(),
        };
        let csv = history_to_csv(&[entry]);
        assert!(csv.starts_with("Id,Timestamp,User,Username,Role,Action"));
        assert!(csv.lines().nth(1).unwrap().starts_with("e1,2024-01-05 19:00:00,Administrator,admin,admin,EDIT"));
    }

    #[test]
    fn xlsx_is_a_zip_archive() {
        let bytes = reports_to_xlsx(&[report(""), report("second")]).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn export_needs_permission() {
        let mut actor = Actor {
            username: "t1".to_string(),
            name: "T1".to_string(),
            role: Role::Telecaller,
            telecaller_name: Some("T1".to_string()),
            permissions: Permissions::for_role(Role::Telecaller),
        };
        assert!(check_export(&actor).is_err());
        actor.permissions.can_export_data = true;
        assert!(check_export(&actor).is_ok());
    }
}
