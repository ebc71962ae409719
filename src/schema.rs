//! Schema text parsing into an ordered table/column model.
//!
//! Schema files follow a narrow, line-oriented layout whose markers are not
//! hard-coded: seven regular expressions supplied through configuration decide
//! where a table block starts and ends, how the table name is extracted, which
//! lines are skipped, and which column attributes (NOT NULL, DEFAULT, PRIMARY
//! KEY) apply.
//!
//! ## Responsibilities
//!
//! - Compiling the configured markers once into [`SchemaPatterns`]
//! - Driving a two-state scanner (outside / inside a table block)
//! - Building [`SchemaSnapshot`], which preserves declared table order
//! - Projecting snapshots into [`TableColumns`] name lists for matching

use std::{fs, path::Path};

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use thiserror::Error;

use crate::config::PatternConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaParseError {
    #[error("line {line}: field '{field}' in table '{table}' has no data type")]
    MissingDataType {
        line: usize,
        table: String,
        field: String,
    },
    #[error("line {line}: DEFAULT marker on field '{field}' in table '{table}' has no value")]
    MissingDefault {
        line: usize,
        table: String,
        field: String,
    },
    #[error("line {line}: column '{field}' is declared more than once in table '{table}'")]
    DuplicateColumn {
        line: usize,
        table: String,
        field: String,
    },
}

/// Pre-compiled line classifiers for the schema scanner.
#[derive(Debug, Clone)]
pub struct SchemaPatterns {
    table_start: Regex,
    table_end: Regex,
    table_name: Regex,
    field_exclude: Regex,
    not_null: Regex,
    default: Regex,
    primary_key: Regex,
}

impl SchemaPatterns {
    pub fn compile(config: &PatternConfig) -> Result<Self> {
        Ok(SchemaPatterns {
            table_start: compile_marker("table_start", &config.table_start)?,
            table_end: compile_marker("table_end", &config.table_end)?,
            table_name: compile_marker("table_name", &config.table_name)?,
            field_exclude: compile_marker("field_name_exclude", &config.field_name_exclude)?,
            not_null: compile_marker("not_null", &config.not_null)?,
            default: compile_marker("default", &config.default)?,
            primary_key: compile_marker("primary_key", &config.primary_key)?,
        })
    }

    /// Extracts the table name from a block-start line.
    ///
    /// When the pattern declares a capture group the first participating group
    /// is the name, otherwise the whole match is.
    fn extract_table_name<'a>(&self, line: &'a str) -> Option<&'a str> {
        let captures = self.table_name.captures(line)?;
        let name = captures
            .iter()
            .skip(1)
            .flatten()
            .next()
            .or_else(|| captures.get(0))?
            .as_str()
            .trim();
        (!name.is_empty()).then_some(name)
    }
}

fn compile_marker(key: &str, pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .with_context(|| format!("Compiling schema pattern '{key}' ({pattern})"))
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: String,
    pub not_null: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub primary_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        TableDefinition {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }
}

/// All tables parsed from one schema file, in declared order.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SchemaSnapshot {
    tables: Vec<TableDefinition>,
}

#[derive(Debug, Clone, Copy)]
enum ScanState {
    OutsideTable,
    InsideTable(usize),
}

impl SchemaSnapshot {
    pub fn load(path: &Path, patterns: &SchemaPatterns) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("Reading schema file {path:?}"))?;
        let snapshot = Self::parse(&text, patterns)
            .with_context(|| format!("Parsing schema file {path:?}"))?;
        Ok(snapshot)
    }

    pub fn parse(text: &str, patterns: &SchemaPatterns) -> Result<Self, SchemaParseError> {
        let mut snapshot = SchemaSnapshot::default();
        let mut state = ScanState::OutsideTable;

        for (idx, raw_line) in text.lines().enumerate() {
            let line_number = idx + 1;
            let line = raw_line.trim();
            if line.is_empty() || line == "(" {
                continue;
            }

            if patterns.table_start.is_match(line) {
                if let Some(name) = patterns.extract_table_name(line) {
                    state = ScanState::InsideTable(snapshot.open_table(name));
                }
                continue;
            }

            let ScanState::InsideTable(table_idx) = state else {
                continue;
            };
            if patterns.table_end.is_match(line) {
                state = ScanState::OutsideTable;
                continue;
            }
            if patterns.field_exclude.is_match(line) {
                continue;
            }

            let table = &mut snapshot.tables[table_idx];
            let column = parse_field_line(line, line_number, &table.name, patterns)?;
            if table.column(&column.name).is_some() {
                return Err(SchemaParseError::DuplicateColumn {
                    line: line_number,
                    table: table.name.clone(),
                    field: column.name,
                });
            }
            table.columns.push(column);
        }

        Ok(snapshot)
    }

    /// Opens a table block, resetting the column list of a re-declared table
    /// while keeping its original position.
    fn open_table(&mut self, name: &str) -> usize {
        match self.tables.iter().position(|table| table.name == name) {
            Some(idx) => {
                self.tables[idx].columns.clear();
                idx
            }
            None => {
                self.tables.push(TableDefinition::new(name));
                self.tables.len() - 1
            }
        }
    }

    pub fn push(&mut self, table: TableDefinition) {
        match self.tables.iter_mut().find(|existing| existing.name == table.name) {
            Some(existing) => *existing = table,
            None => self.tables.push(table),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.iter().find(|table| table.name == name)
    }

    pub fn tables(&self) -> &[TableDefinition] {
        &self.tables
    }

    pub fn column_layouts(&self) -> TableColumns {
        self.tables
            .iter()
            .map(|table| (table.name.clone(), table.column_names()))
            .collect()
    }
}

fn parse_field_line(
    line: &str,
    line_number: usize,
    table: &str,
    patterns: &SchemaPatterns,
) -> Result<ColumnDefinition, SchemaParseError> {
    let cleaned = line.replace(',', "");
    let tokens = cleaned.split_whitespace().collect::<Vec<_>>();
    let name = tokens.first().copied().unwrap_or_default().to_string();
    let data_type = tokens
        .get(1)
        .ok_or_else(|| SchemaParseError::MissingDataType {
            line: line_number,
            table: table.to_string(),
            field: name.clone(),
        })?
        .to_string();

    // The value is expected right after the DEFAULT keyword, i.e. the fourth token.
    let default = if patterns.default.is_match(&cleaned) {
        let value = tokens
            .get(3)
            .ok_or_else(|| SchemaParseError::MissingDefault {
                line: line_number,
                table: table.to_string(),
                field: name.clone(),
            })?;
        Some(unquote(value).to_string())
    } else {
        None
    };

    Ok(ColumnDefinition {
        not_null: patterns.not_null.is_match(&cleaned),
        primary_key: patterns.primary_key.is_match(&cleaned),
        name,
        data_type,
        default,
    })
}

fn unquote(value: &str) -> &str {
    for quote in ['\'', '"'] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Ordered table → column-name projection used for identity and diffing.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct TableColumns {
    entries: Vec<(String, Vec<String>)>,
}

impl TableColumns {
    pub fn get(&self, table: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, columns)| columns.as_slice())
    }

    pub fn contains(&self, table: &str) -> bool {
        self.get(table).is_some()
    }

    /// Inserts or replaces a table's columns. Replacing keeps the table's position.
    pub fn insert(&mut self, table: impl Into<String>, columns: Vec<String>) {
        let table = table.into();
        match self.entries.iter_mut().find(|(name, _)| *name == table) {
            Some((_, existing)) => *existing = columns,
            None => self.entries.push((table, columns)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, columns)| (name.as_str(), columns.as_slice()))
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl FromIterator<(String, Vec<String>)> for TableColumns {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        let mut columns = TableColumns::default();
        for (table, names) in iter {
            columns.insert(table, names);
        }
        columns
    }
}
