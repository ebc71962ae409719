//! Spreadsheet and JSON rendering of a [`RunSummary`].
//!
//! The workbook has two sheets: "Table Info" lists every table with its
//! classification, "Result" lists every evaluated file with its resolved or
//! suggested table, unmatched columns, output path, remark and write status.

use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};

use chrono::NaiveDateTime;
use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook, Worksheet, XlsxError};
use thiserror::Error;

use crate::{
    reconcile::{FileResult, RunSummary},
    remap::RemapMode,
};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("XLSX error: {0}")]
    Xlsx(#[from] XlsxError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStyle {
    Plain,
    Evaluated,
    Corrected,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfoRow {
    pub number: usize,
    pub table: String,
    pub remark: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub number: usize,
    pub file: String,
    pub table: String,
    pub suggested_table: String,
    pub unmatched_columns: String,
    pub new_file: String,
    pub remark: String,
    pub status: String,
    pub style: RowStyle,
}

pub fn table_info_rows(summary: &RunSummary) -> Vec<TableInfoRow> {
    summary
        .tables
        .iter()
        .enumerate()
        .map(|(idx, status)| TableInfoRow {
            number: idx + 1,
            table: status.table.clone(),
            remark: status.change.remark(),
        })
        .collect()
}

pub fn result_rows(summary: &RunSummary) -> Vec<ResultRow> {
    summary
        .files
        .iter()
        .enumerate()
        .map(|(idx, file)| result_row(idx + 1, file, summary))
        .collect()
}

fn result_row(number: usize, file: &FileResult, summary: &RunSummary) -> ResultRow {
    let verdict = &file.verdict;
    let outcome = &file.outcome;

    let table = match verdict.table.as_deref() {
        Some(table) if verdict.auto_applied => format!("{table} (Auto applied)"),
        Some(table) => table.to_string(),
        None => String::new(),
    };

    let (suggested_table, unmatched_columns) = match &verdict.suggestion {
        Some(suggestion) => {
            let suggested = if suggestion.percentage > 0 {
                format!("{} ({}%)", suggestion.table, suggestion.percentage)
            } else {
                String::new()
            };
            let unmatched = if suggestion.is_reordering() {
                "Incorrect column ordering detected!".to_string()
            } else if suggestion.percentage == 100 {
                format!("Lacking columns: {}", suggestion.lacking.join(", "))
            } else {
                suggestion.unmatched.join(", ")
            };
            (suggested, unmatched)
        }
        None => (String::new(), String::new()),
    };

    let (mut remark, mut style) = match outcome.mode {
        RemapMode::Untouched => match &verdict.error {
            Some(error) => (error.clone(), RowStyle::Error),
            None if verdict.table.is_none() => (
                "Not evaluated. Unknown table structure.".to_string(),
                RowStyle::Plain,
            ),
            None => ("---".to_string(), RowStyle::Plain),
        },
        RemapMode::Renamed => ("Renamed table columns detected!".to_string(), RowStyle::Plain),
        RemapMode::Restructured => ("Csv table has been restructed!".to_string(), RowStyle::Plain),
        RemapMode::RenamedAndRestructured => (
            "Table columns renamed and restructured!".to_string(),
            RowStyle::Plain,
        ),
        RemapMode::HeaderCorrected => ("Corrected table header".to_string(), RowStyle::Corrected),
    };
    if let Some(error) = &outcome.error {
        remark = format!("{remark} {error}");
    }
    if verdict
        .table
        .as_deref()
        .is_some_and(|table| summary.is_changed(table))
    {
        style = RowStyle::Evaluated;
    }
    if outcome.error.is_some() {
        style = RowStyle::Error;
    }

    ResultRow {
        number,
        file: file.path.display().to_string(),
        table,
        suggested_table,
        unmatched_columns,
        new_file: outcome
            .output_path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "-".to_string()),
        remark,
        status: outcome.status.label().to_string(),
        style,
    }
}

/// `<dir>/<file_name>_<MMDDYYYY_HHMMSS>.xlsx`
pub fn report_path(dir: &Path, file_name: &str, timestamp: &NaiveDateTime) -> PathBuf {
    dir.join(format!(
        "{file_name}_{}.xlsx",
        timestamp.format("%m%d%Y_%H%M%S")
    ))
}

struct Styles {
    header: Format,
    plain: Format,
    evaluated: Format,
    corrected: Format,
    error: Format,
}

impl Styles {
    fn new() -> Self {
        let bordered = Format::new().set_border(FormatBorder::Thin);
        Styles {
            header: bordered
                .clone()
                .set_background_color(Color::RGB(0x5DB067))
                .set_bold(),
            evaluated: bordered.clone().set_background_color(Color::RGB(0xFFFFCC)),
            corrected: bordered.clone().set_background_color(Color::RGB(0xE6FFFF)),
            error: bordered.clone().set_font_color(Color::Red).set_bold(),
            plain: bordered,
        }
    }

    fn row(&self, style: RowStyle) -> &Format {
        match style {
            RowStyle::Plain => &self.plain,
            RowStyle::Evaluated => &self.evaluated,
            RowStyle::Corrected => &self.corrected,
            RowStyle::Error => &self.error,
        }
    }
}

pub fn write_workbook(summary: &RunSummary, path: &Path) -> Result<(), ReportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let styles = Styles::new();
    let mut workbook = Workbook::new();

    {
        let sheet = workbook.add_worksheet().set_name("Table Info")?;
        write_table_info(sheet, &table_info_rows(summary), &styles)?;
    }
    {
        let sheet = workbook.add_worksheet().set_name("Result")?;
        write_results(sheet, &result_rows(summary), &styles)?;
    }

    workbook.save(path)?;
    Ok(())
}

fn write_table_info(
    sheet: &mut Worksheet,
    rows: &[TableInfoRow],
    styles: &Styles,
) -> Result<(), XlsxError> {
    for (col, width) in [(0, 5), (1, 5), (2, 40), (3, 70)] {
        sheet.set_column_width(col, width)?;
    }
    for (col, title) in [(1, "No."), (2, "Table name"), (3, "Remarks")] {
        sheet.write_string_with_format(1, col, title, &styles.header)?;
    }
    for (idx, row) in rows.iter().enumerate() {
        let line = idx as u32 + 2;
        sheet.write_number_with_format(line, 1, row.number as f64, &styles.plain)?;
        sheet.write_string_with_format(line, 2, &row.table, &styles.plain)?;
        sheet.write_string_with_format(line, 3, row.remark, &styles.plain)?;
    }
    Ok(())
}

const RESULT_COLUMNS: [(&str, u16); 8] = [
    ("No.", 5),
    ("File", 160),
    ("Table name", 50),
    ("Suggested table model", 60),
    ("Unmatched column names", 100),
    ("New File Created", 180),
    ("Remarks", 100),
    ("CSV creation status", 30),
];

fn write_results(
    sheet: &mut Worksheet,
    rows: &[ResultRow],
    styles: &Styles,
) -> Result<(), XlsxError> {
    for (col, (title, width)) in RESULT_COLUMNS.iter().enumerate() {
        let col = col as u16;
        sheet.set_column_width(col, *width)?;
        sheet.write_string_with_format(1, col, *title, &styles.header)?;
    }
    for (idx, row) in rows.iter().enumerate() {
        let line = idx as u32 + 2;
        let format = styles.row(row.style);
        sheet.write_number_with_format(line, 0, row.number as f64, format)?;
        let cells = [
            &row.file,
            &row.table,
            &row.suggested_table,
            &row.unmatched_columns,
            &row.new_file,
            &row.remark,
            &row.status,
        ];
        for (offset, value) in cells.into_iter().enumerate() {
            sheet.write_string_with_format(line, offset as u16 + 1, value, format)?;
        }
    }
    Ok(())
}

pub fn write_summary_json(summary: &RunSummary, path: &Path) -> Result<(), ReportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, summary)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        diff::TableChange,
        matcher::{Suggestion, TableVerdict},
        reconcile::TableStatus,
        remap::{FileOutcome, WriteStatus},
    };
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn summary_with(files: Vec<FileResult>) -> RunSummary {
        RunSummary {
            tables: vec![
                TableStatus {
                    table: "users".to_string(),
                    change: TableChange::Restructured,
                },
                TableStatus {
                    table: "orders".to_string(),
                    change: TableChange::Unchanged,
                },
            ],
            files,
        }
    }

    fn suggestion(percentage: u32, unmatched: &[&str], lacking: &[&str]) -> Suggestion {
        Suggestion {
            table: "orders".to_string(),
            percentage,
            unmatched: unmatched.iter().map(|s| s.to_string()).collect(),
            lacking: lacking.iter().map(|s| s.to_string()).collect(),
            table_column_count: 3,
        }
    }

    fn file(verdict: TableVerdict, outcome: FileOutcome) -> FileResult {
        FileResult {
            path: PathBuf::from("data/file.csv"),
            verdict,
            outcome,
        }
    }

    #[test]
    fn unknown_structure_is_not_evaluated() {
        let summary = summary_with(vec![file(TableVerdict::default(), FileOutcome::untouched())]);
        let rows = result_rows(&summary);
        assert_eq!(rows[0].remark, "Not evaluated. Unknown table structure.");
        assert_eq!(rows[0].new_file, "-");
        assert_eq!(rows[0].status, "-");
        assert_eq!(rows[0].style, RowStyle::Plain);
    }

    #[test]
    fn suggestion_cells_describe_the_mismatch() {
        let partial = TableVerdict {
            suggestion: Some(suggestion(67, &["phone", "fax"], &[])),
            ..TableVerdict::default()
        };
        let subset = TableVerdict {
            suggestion: Some(suggestion(100, &[], &["status", "total"])),
            ..TableVerdict::default()
        };
        let reordered = TableVerdict {
            suggestion: Some(suggestion(100, &[], &[])),
            ..TableVerdict::default()
        };
        let summary = summary_with(vec![
            file(partial, FileOutcome::untouched()),
            file(subset, FileOutcome::untouched()),
            file(reordered, FileOutcome::untouched()),
        ]);
        let rows = result_rows(&summary);
        assert_eq!(rows[0].suggested_table, "orders (67%)");
        assert_eq!(rows[0].unmatched_columns, "phone, fax");
        assert_eq!(rows[1].unmatched_columns, "Lacking columns: status, total");
        assert_eq!(rows[2].unmatched_columns, "Incorrect column ordering detected!");
        assert_eq!(rows[2].number, 3);
    }

    #[test]
    fn read_errors_are_highlighted() {
        let verdict = TableVerdict {
            error: Some("Can not read file!".to_string()),
            ..TableVerdict::default()
        };
        let summary = summary_with(vec![file(verdict, FileOutcome::untouched())]);
        let rows = result_rows(&summary);
        assert_eq!(rows[0].remark, "Can not read file!");
        assert_eq!(rows[0].style, RowStyle::Error);
    }

    #[test]
    fn changed_tables_and_auto_applied_identities_are_marked() {
        let restructured = TableVerdict {
            table: Some("users".to_string()),
            column_count: 3,
            ..TableVerdict::default()
        };
        let corrected = TableVerdict {
            table: Some("orders".to_string()),
            auto_applied: true,
            ..TableVerdict::default()
        };
        let summary = summary_with(vec![
            file(
                restructured,
                FileOutcome {
                    mode: RemapMode::Restructured,
                    output_path: Some(PathBuf::from("data/file_new.csv")),
                    status: WriteStatus::Success,
                    error: None,
                },
            ),
            file(
                corrected,
                FileOutcome {
                    mode: RemapMode::HeaderCorrected,
                    output_path: None,
                    status: WriteStatus::TestMode,
                    error: None,
                },
            ),
        ]);
        let rows = result_rows(&summary);
        assert_eq!(rows[0].remark, "Csv table has been restructed!");
        assert_eq!(rows[0].style, RowStyle::Evaluated);
        assert_eq!(rows[0].new_file, "data/file_new.csv");
        assert_eq!(rows[0].status, "Success");
        assert_eq!(rows[1].table, "orders (Auto applied)");
        assert_eq!(rows[1].remark, "Corrected table header");
        assert_eq!(rows[1].style, RowStyle::Corrected);
        assert_eq!(rows[1].status, "No csv file written!");
    }

    #[test]
    fn table_info_rows_are_numbered_in_order() {
        let rows = table_info_rows(&summary_with(Vec::new()));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].remark, "Table has been restructured.");
        assert_eq!(rows[1].number, 2);
        assert_eq!(rows[1].remark, "Unchanged");
    }

    #[test]
    fn report_path_carries_timestamp() {
        let timestamp = NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(9, 5, 1)
            .unwrap();
        assert_eq!(
            report_path(Path::new("out"), "schema_report", &timestamp),
            PathBuf::from("out/schema_report_03072024_090501.xlsx")
        );
    }

    #[test]
    fn workbook_and_json_are_written() {
        let dir = tempdir().expect("temp dir");
        let summary = summary_with(vec![file(TableVerdict::default(), FileOutcome::untouched())]);
        let xlsx = dir.path().join("nested").join("report.xlsx");
        write_workbook(&summary, &xlsx).expect("write workbook");
        assert!(xlsx.metadata().unwrap().len() > 0);

        let json = dir.path().join("summary.json");
        write_summary_json(&summary, &json).expect("write json");
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(value["tables"][0]["change"], "restructured");
        assert_eq!(value["files"][0]["outcome"]["mode"], 0);
        assert_eq!(value["files"][0]["outcome"]["status"], "-");
    }
}
