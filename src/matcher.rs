//! Table identification for CSV headers.
//!
//! A header is first compared for exact ordered equality against every known
//! table; failing that, each table is scored by the share of header columns it
//! contains and the best-scoring table above the configured threshold becomes
//! the suggestion. Ties always resolve to the table declared first.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use log::debug;
use serde::Serialize;

use crate::schema::TableColumns;

pub const UNREADABLE_FILE: &str = "Can not read file!";

pub fn unreadable_line(line_number: usize) -> String {
    format!("Line no. {line_number} can not be read!!!")
}

/// Lowercases and trims every name and drops excluded names.
pub fn normalize_columns<I, S>(names: I, excluded: &[String]) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|name| name.as_ref().trim().to_lowercase())
        .filter(|name| !excluded.contains(name))
        .collect()
}

pub fn parse_header_line(line: &str, excluded: &[String]) -> Vec<String> {
    if line.is_empty() {
        return Vec::new();
    }
    normalize_columns(line.split(','), excluded)
}

impl TableColumns {
    /// Normalised copy of every table's columns, for comparison with headers.
    pub fn without_excluded(&self, excluded: &[String]) -> TableColumns {
        self.iter()
            .map(|(table, columns)| (table.to_string(), normalize_columns(columns, excluded)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub table: String,
    pub percentage: u32,
    pub unmatched: Vec<String>,
    pub lacking: Vec<String>,
    pub table_column_count: usize,
}

impl Suggestion {
    /// Full match whose column set equals the table's, only in another order.
    pub fn is_reordering(&self) -> bool {
        self.percentage == 100 && self.lacking.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Identification {
    Exact(String),
    Suggested {
        best: Suggestion,
        candidates: Vec<Suggestion>,
    },
    Unknown,
}

/// Percentage of header columns present in the table, rounded half to even.
pub fn match_percentage(found: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (100.0 * found as f64 / total as f64).round_ties_even() as u32
}

pub fn identify(header: &[String], tables: &TableColumns, threshold: f64) -> Identification {
    if let Some((table, _)) = tables.iter().find(|(_, columns)| *columns == header) {
        return Identification::Exact(table.to_string());
    }

    let candidates = suggest_tables(header, tables, threshold);
    let mut best: Option<&Suggestion> = None;
    for candidate in &candidates {
        if best.is_none_or(|current| candidate.percentage > current.percentage) {
            best = Some(candidate);
        }
    }
    match best.cloned() {
        Some(best) => Identification::Suggested { best, candidates },
        None => Identification::Unknown,
    }
}

fn suggest_tables(header: &[String], tables: &TableColumns, threshold: f64) -> Vec<Suggestion> {
    if header.is_empty() {
        return Vec::new();
    }
    tables
        .iter()
        .filter_map(|(table, columns)| {
            let (found, unmatched): (Vec<&String>, Vec<&String>) =
                header.iter().partition(|name| columns.contains(*name));
            let percentage = match_percentage(found.len(), header.len());
            if f64::from(percentage) < threshold {
                return None;
            }
            let lacking = if percentage == 100 {
                columns
                    .iter()
                    .filter(|name| !header.contains(*name))
                    .cloned()
                    .collect()
            } else {
                Vec::new()
            };
            Some(Suggestion {
                table: table.to_string(),
                percentage,
                unmatched: unmatched.into_iter().cloned().collect(),
                lacking,
                table_column_count: columns.len(),
            })
        })
        .collect()
}

/// Identity verdict for a single CSV file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableVerdict {
    pub table: Option<String>,
    pub column_count: usize,
    pub suggestion: Option<Suggestion>,
    pub auto_applied: bool,
    pub error: Option<String>,
}

impl TableVerdict {
    pub fn from_header(header: &[String], tables: &TableColumns, threshold: f64) -> Self {
        let mut verdict = TableVerdict {
            column_count: header.len(),
            ..TableVerdict::default()
        };
        match identify(header, tables, threshold) {
            Identification::Exact(table) => verdict.table = Some(table),
            Identification::Suggested { best, .. } => verdict.suggestion = Some(best),
            Identification::Unknown => {}
        }
        verdict
    }

    /// Adopts the suggested table when none of its columns are lacking and the
    /// header has as many columns as the table. The match may be partial: an
    /// unmatched header column can stand in for a missing table column.
    pub fn try_auto_apply(&mut self) -> bool {
        if self.table.is_some() {
            return false;
        }
        let Some(suggestion) = &self.suggestion else {
            return false;
        };
        if suggestion.lacking.is_empty() && self.column_count == suggestion.table_column_count {
            self.table = Some(suggestion.table.clone());
            self.auto_applied = true;
        }
        self.auto_applied
    }
}

/// Reads the header line of `path` and identifies its table.
///
/// Only the first line is read. Read failures are recorded on the verdict
/// rather than returned. A header left without columns that matches no table
/// is recorded as unreadable line 2.
pub fn identify_file(
    path: &Path,
    tables: &TableColumns,
    excluded: &[String],
    threshold: f64,
) -> TableVerdict {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            debug!("Opening {path:?} failed: {err}");
            return TableVerdict {
                error: Some(UNREADABLE_FILE.to_string()),
                ..TableVerdict::default()
            };
        }
    };
    match BufReader::new(file).lines().next() {
        None => TableVerdict::default(),
        Some(Ok(line)) => {
            let header = parse_header_line(line.trim(), excluded);
            let mut verdict = TableVerdict::from_header(&header, tables, threshold);
            if header.is_empty() && verdict.table.is_none() {
                debug!("Header of {path:?} has no column to score");
                verdict.error = Some(unreadable_line(2));
            }
            verdict
        }
        Some(Err(err)) => {
            debug!("Reading header of {path:?} failed: {err}");
            TableVerdict {
                error: Some(UNREADABLE_FILE.to_string()),
                ..TableVerdict::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn tables(entries: &[(&str, &[&str])]) -> TableColumns {
        entries
            .iter()
            .map(|(table, columns)| {
                (
                    table.to_string(),
                    columns.iter().map(|c| c.to_string()).collect(),
                )
            })
            .collect()
    }

    fn header(line: &str) -> Vec<String> {
        parse_header_line(line, &[])
    }

    #[test]
    fn header_normalization_trims_lowercases_and_excludes() {
        let excluded = vec!["created_by".to_string()];
        assert_eq!(
            parse_header_line(" ID , Name ,CREATED_BY", &excluded),
            vec!["id", "name"]
        );
        assert!(parse_header_line("", &excluded).is_empty());
    }

    #[test]
    fn exact_match_ignores_other_candidates() {
        let known = tables(&[
            ("orders", &["id", "user_id"]),
            ("users", &["id", "name", "email"]),
        ]);
        assert_eq!(
            identify(&header("id,name,email"), &known, 50.0),
            Identification::Exact("users".to_string())
        );
    }

    #[test]
    fn identical_layouts_resolve_to_first_declared_table() {
        let known = tables(&[("first", &["a", "b"]), ("second", &["a", "b"])]);
        assert_eq!(
            identify(&header("a,b"), &known, 50.0),
            Identification::Exact("first".to_string())
        );
    }

    #[test]
    fn fuzzy_match_records_unmatched_columns() {
        let known = tables(&[("users", &["id", "name", "email"])]);
        let Identification::Suggested { best, .. } =
            identify(&header("id,name,phone"), &known, 50.0)
        else {
            panic!("expected suggestion");
        };
        assert_eq!(best.table, "users");
        assert_eq!(best.percentage, 67);
        assert_eq!(best.unmatched, vec!["phone"]);
        assert!(best.lacking.is_empty());
    }

    #[test]
    fn below_threshold_yields_no_suggestion() {
        let known = tables(&[("users", &["id", "name", "email"])]);
        assert_eq!(
            identify(&header("id,foo,bar"), &known, 50.0),
            Identification::Unknown
        );
    }

    #[test]
    fn subset_header_reports_lacking_columns() {
        let known = tables(&[("users", &["id", "name", "email"])]);
        let Identification::Suggested { best, .. } = identify(&header("name,id"), &known, 50.0)
        else {
            panic!("expected suggestion");
        };
        assert_eq!(best.percentage, 100);
        assert_eq!(best.lacking, vec!["email"]);
        assert!(best.table_column_count > 2);
        assert!(!best.is_reordering());
    }

    #[test]
    fn reordered_header_is_full_match_without_lacking() {
        let known = tables(&[("users", &["id", "name", "email"])]);
        let Identification::Suggested { best, .. } =
            identify(&header("name,id,email"), &known, 50.0)
        else {
            panic!("expected suggestion");
        };
        assert!(best.is_reordering());
    }

    #[test]
    fn best_suggestion_prefers_higher_percentage_then_declared_order() {
        let known = tables(&[
            ("half", &["a", "x"]),
            ("full_one", &["a", "b", "z"]),
            ("full_two", &["b", "a", "y"]),
        ]);
        let Identification::Suggested { best, candidates } =
            identify(&header("a,b"), &known, 50.0)
        else {
            panic!("expected suggestion");
        };
        assert_eq!(candidates.len(), 3);
        assert_eq!(best.table, "full_one");
    }

    #[test]
    fn percentage_rounds_half_to_even() {
        assert_eq!(match_percentage(1, 8), 12);
        assert_eq!(match_percentage(3, 8), 38);
        assert_eq!(match_percentage(2, 3), 67);
        assert_eq!(match_percentage(0, 0), 0);
    }

    #[test]
    fn auto_apply_requires_equal_column_counts() {
        let known = tables(&[("users", &["id", "name", "email"])]);
        let mut reordered = TableVerdict::from_header(&header("email,id,name"), &known, 50.0);
        assert!(reordered.try_auto_apply());
        assert_eq!(reordered.table.as_deref(), Some("users"));

        let mut extra = TableVerdict::from_header(&header("id,name,email,phone"), &known, 50.0);
        assert!(!extra.try_auto_apply());
        assert!(extra.table.is_none());
    }

    #[test]
    fn auto_apply_adopts_partial_match_of_equal_width() {
        let known = tables(&[("t", &["a", "b", "c"])]);
        let mut verdict = TableVerdict::from_header(&header("a,b,x"), &known, 50.0);
        let suggestion = verdict.suggestion.clone().expect("suggestion");
        assert_eq!(suggestion.percentage, 67);
        assert_eq!(suggestion.unmatched, vec!["x"]);
        assert!(suggestion.lacking.is_empty());
        assert!(verdict.try_auto_apply());
        assert_eq!(verdict.table.as_deref(), Some("t"));
        assert!(verdict.auto_applied);
    }

    #[test]
    fn blank_header_line_is_an_unreadable_line() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "   ").unwrap();
        writeln!(file, "1,Alice").unwrap();
        let known = tables(&[("users", &["id", "name"])]);
        let verdict = identify_file(file.path(), &known, &[], 50.0);
        assert_eq!(verdict.error.as_deref(), Some("Line no. 2 can not be read!!!"));
        assert!(verdict.table.is_none());
        assert!(verdict.suggestion.is_none());

        let mut excluded_only = NamedTempFile::new().expect("temp file");
        writeln!(excluded_only, "row_id").unwrap();
        let excluded = vec!["row_id".to_string()];
        let verdict = identify_file(excluded_only.path(), &known, &excluded, 50.0);
        assert_eq!(verdict.error.as_deref(), Some("Line no. 2 can not be read!!!"));
    }

    #[test]
    fn empty_file_yields_a_neutral_verdict() {
        let file = NamedTempFile::new().expect("temp file");
        let known = tables(&[("users", &["id"])]);
        assert_eq!(
            identify_file(file.path(), &known, &[], 50.0),
            TableVerdict::default()
        );
    }

    #[test]
    fn identify_file_reads_only_the_header() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "ID,Name,Email").unwrap();
        writeln!(file, "1,Alice,alice@x.com").unwrap();
        let known = tables(&[("users", &["id", "name", "email"])]);
        let verdict = identify_file(file.path(), &known, &[], 50.0);
        assert_eq!(verdict.table.as_deref(), Some("users"));
        assert_eq!(verdict.column_count, 3);
        assert!(verdict.error.is_none());
    }

    #[test]
    fn identify_file_flags_missing_and_binary_files() {
        let known = tables(&[("users", &["id"])]);
        let missing = identify_file(Path::new("/nonexistent/file.csv"), &known, &[], 50.0);
        assert_eq!(missing.error.as_deref(), Some(UNREADABLE_FILE));

        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(&[0xff, 0xfe, b'\n']).unwrap();
        let binary = identify_file(file.path(), &known, &[], 50.0);
        assert!(binary.error.is_some());
    }
}
