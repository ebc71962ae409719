//! CSV rewriting for renamed and restructured tables.
//!
//! Rows are split on bare commas; quoted fields are not understood. Renamed
//! and header-corrected files only get a new header line, restructured files
//! have every data row rebuilt in the new column order.

use std::{
    collections::HashMap,
    ffi::OsString,
    fmt,
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Serialize, Serializer};

use crate::{
    matcher::{UNREADABLE_FILE, unreadable_line},
    schema::{SchemaSnapshot, TableColumns, TableDefinition},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemapMode {
    Untouched,
    Renamed,
    Restructured,
    RenamedAndRestructured,
    HeaderCorrected,
}

impl RemapMode {
    pub fn derive(
        table: Option<&str>,
        auto_applied: bool,
        renamed: &[String],
        restructured: &[String],
    ) -> Self {
        let Some(table) = table else {
            return RemapMode::Untouched;
        };
        let is_renamed = renamed.iter().any(|name| name == table);
        let is_restructured = restructured.iter().any(|name| name == table);
        match (is_renamed, is_restructured) {
            (true, true) => RemapMode::RenamedAndRestructured,
            (false, true) => RemapMode::Restructured,
            (true, false) => RemapMode::Renamed,
            (false, false) if auto_applied => RemapMode::HeaderCorrected,
            (false, false) => RemapMode::Untouched,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            RemapMode::Untouched => 0,
            RemapMode::Renamed => 1,
            RemapMode::Restructured => 2,
            RemapMode::RenamedAndRestructured => 3,
            RemapMode::HeaderCorrected => 4,
        }
    }

    pub fn rewrites_rows(self) -> bool {
        matches!(
            self,
            RemapMode::Restructured | RemapMode::RenamedAndRestructured
        )
    }
}

impl Serialize for RemapMode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.code())
    }
}

/// Rebuilds rows of the old layout in the column order of `new_table`.
#[derive(Debug)]
pub struct RowRemapper<'a> {
    old_positions: HashMap<&'a str, usize>,
    new_table: &'a TableDefinition,
}

impl<'a> RowRemapper<'a> {
    pub fn new(old_columns: &'a [String], new_table: &'a TableDefinition) -> Self {
        let mut old_positions = HashMap::with_capacity(old_columns.len());
        for (idx, name) in old_columns.iter().enumerate() {
            old_positions.entry(name.as_str()).or_insert(idx);
        }
        RowRemapper {
            old_positions,
            new_table,
        }
    }

    /// Returns `None` when the row is too short to supply a carried-over column.
    pub fn remap(&self, values: &[&str]) -> Option<Vec<String>> {
        self.new_table
            .columns
            .iter()
            .map(|column| {
                let carried = match self.old_positions.get(column.name.as_str()) {
                    Some(&idx) => Some(*values.get(idx)?),
                    None => None,
                };
                Some(match carried {
                    Some(value) if !value.is_empty() => value.to_string(),
                    // Present but empty: a NULL stays NULL unless the column forbids it.
                    Some(_) if !column.not_null => String::new(),
                    _ => column.default.clone().unwrap_or_default(),
                })
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct RemapPlan<'a> {
    mode: RemapMode,
    header: Vec<String>,
    rows: Option<RowRemapper<'a>>,
}

impl<'a> RemapPlan<'a> {
    /// Builds the plan for `table`; `None` when a layout the mode needs is unknown.
    pub fn for_table(
        mode: RemapMode,
        table: &str,
        updated: &'a TableColumns,
        restructured: &'a SchemaSnapshot,
    ) -> Option<Self> {
        let old_columns = updated.get(table)?;
        if mode.rewrites_rows() {
            let new_table = restructured.table(table)?;
            Some(RemapPlan {
                mode,
                header: new_table.column_names(),
                rows: Some(RowRemapper::new(old_columns, new_table)),
            })
        } else {
            Some(RemapPlan {
                mode,
                header: old_columns.to_vec(),
                rows: None,
            })
        }
    }

    pub fn mode(&self) -> RemapMode {
        self.mode
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RemapOutput {
    pub lines: Vec<String>,
    pub error: Option<String>,
}

/// Rewrites every line from `reader` according to `plan`.
///
/// The first unreadable or unparseable line stops the loop; lines already
/// produced are kept and the failing line number is recorded.
pub fn remap_lines<R: BufRead>(reader: R, plan: &RemapPlan<'_>) -> RemapOutput {
    let mut output = RemapOutput::default();
    for (idx, line) in reader.lines().enumerate() {
        let line_number = idx + 1;
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                debug!("Reading line {line_number} failed: {err}");
                output.error = Some(if idx == 0 {
                    UNREADABLE_FILE.to_string()
                } else {
                    unreadable_line(line_number)
                });
                break;
            }
        };
        let line = line.trim();
        if idx == 0 {
            output.lines.push(plan.header.join(","));
            continue;
        }
        match &plan.rows {
            Some(remapper) => {
                let values = line.split(',').collect::<Vec<_>>();
                match remapper.remap(&values) {
                    Some(row) => output.lines.push(row.join(",")),
                    None => {
                        debug!(
                            "Line {line_number} has {} value(s), too few for the old layout",
                            values.len()
                        );
                        output.error = Some(unreadable_line(line_number));
                        break;
                    }
                }
            }
            None => output.lines.push(line.to_string()),
        }
    }
    output
}

/// Path of the modified copy: `suffix` inserted before the extension.
pub fn output_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_stem()
        .map(|stem| stem.to_os_string())
        .unwrap_or_else(OsString::new);
    name.push(suffix);
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

pub fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Creating output file {path:?}"))?;
    let mut writer = BufWriter::new(file);
    for line in lines {
        writeln!(writer, "{line}").with_context(|| format!("Writing {path:?}"))?;
    }
    writer
        .flush()
        .with_context(|| format!("Flushing {path:?}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    NotProcessed,
    Success,
    Failed,
    TestMode,
}

impl WriteStatus {
    pub fn label(self) -> &'static str {
        match self {
            WriteStatus::NotProcessed => "-",
            WriteStatus::Success => "Success",
            WriteStatus::Failed => "Failed",
            WriteStatus::TestMode => "No csv file written!",
        }
    }
}

impl fmt::Display for WriteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for WriteStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    pub mode: RemapMode,
    pub output_path: Option<PathBuf>,
    pub status: WriteStatus,
    pub error: Option<String>,
}

impl FileOutcome {
    pub fn untouched() -> Self {
        FileOutcome {
            mode: RemapMode::Untouched,
            output_path: None,
            status: WriteStatus::NotProcessed,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WriteOptions<'a> {
    pub test_mode: bool,
    pub suffix: Option<&'a str>,
}

/// Rewrites `path` under `plan` and writes the result unless in test mode.
pub fn process_file(path: &Path, plan: &RemapPlan<'_>, options: &WriteOptions<'_>) -> FileOutcome {
    let mut outcome = FileOutcome {
        mode: plan.mode,
        output_path: options.suffix.map(|suffix| output_path(path, suffix)),
        status: WriteStatus::NotProcessed,
        error: None,
    };
    if plan.mode == RemapMode::Untouched {
        return outcome;
    }

    let output = match File::open(path) {
        Ok(file) => remap_lines(BufReader::new(file), plan),
        Err(err) => {
            warn!("Opening {path:?} failed: {err}");
            outcome.error = Some(UNREADABLE_FILE.to_string());
            outcome.status = WriteStatus::Failed;
            return outcome;
        }
    };
    if let Some(error) = &output.error {
        warn!("{error} => {path:?}");
    }
    outcome.error = output.error;

    if options.test_mode {
        outcome.status = WriteStatus::TestMode;
        return outcome;
    }
    let destination = outcome.output_path.as_deref().unwrap_or(path);
    outcome.status = match write_lines(destination, &output.lines) {
        Ok(()) => WriteStatus::Success,
        Err(err) => {
            warn!("{err:#}");
            WriteStatus::Failed
        }
    };
    outcome
}
