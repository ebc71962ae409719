//! End-to-end reconciliation run.
//!
//! Stage order: current schema, renamed schema, renamed-table detection and
//! overlay, restructured schema, restructured-table detection, file discovery,
//! identification, remapping, then new/deleted table detection and table
//! classification for the report. Only schema loading and discovery can fail
//! the run; per-file problems are recorded on that file's result.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    config::Config,
    diff::{self, TableChange, TableChanges},
    discover,
    matcher::{self, TableVerdict},
    remap::{self, FileOutcome, RemapMode, RemapPlan, WriteOptions},
    schema::{SchemaPatterns, SchemaSnapshot, TableColumns},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Current,
    Renamed,
    Restructured,
}

/// The three parsed schema variants; optional variants are empty when absent.
#[derive(Debug, Clone, Default)]
pub struct SchemaStages {
    pub current: SchemaSnapshot,
    pub renamed: SchemaSnapshot,
    pub restructured: SchemaSnapshot,
}

impl SchemaStages {
    pub fn load(config: &Config, patterns: &SchemaPatterns) -> Result<Self> {
        let current = load_snapshot(&config.schema_current_path(), patterns)?;
        let renamed = match config.schema_renamed_path() {
            Some(path) => load_snapshot(&path, patterns)?,
            None => SchemaSnapshot::default(),
        };
        let restructured = match config.schema_restructured_path() {
            Some(path) => load_snapshot(&path, patterns)?,
            None => SchemaSnapshot::default(),
        };
        Ok(SchemaStages {
            current,
            renamed,
            restructured,
        })
    }

    pub fn stage(&self, stage: Stage) -> &SchemaSnapshot {
        match stage {
            Stage::Current => &self.current,
            Stage::Renamed => &self.renamed,
            Stage::Restructured => &self.restructured,
        }
    }
}

fn load_snapshot(path: &Path, patterns: &SchemaPatterns) -> Result<SchemaSnapshot> {
    let snapshot = SchemaSnapshot::load(path, patterns)?;
    info!("Parsed {} table(s) from {:?}", snapshot.len(), path);
    Ok(snapshot)
}

/// Table lists derived by comparing the schema stages.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub current: TableColumns,
    pub updated: TableColumns,
    pub renamed: Vec<String>,
    pub restructured: Vec<String>,
    pub new: Vec<String>,
    pub deleted: Vec<String>,
}

impl ChangeSet {
    pub fn from_stages(stages: &SchemaStages) -> Self {
        let current = stages.current.column_layouts();
        let renamed_layout = stages.renamed.column_layouts();
        let restructured_layout = stages.restructured.column_layouts();

        let renamed = if renamed_layout.is_empty() {
            Vec::new()
        } else {
            diff::modified_tables(&current, &renamed_layout)
        };
        if renamed.is_empty() {
            info!("No table column(s) renamed");
        }
        let updated = diff::overlay_renamed(&current, &renamed_layout, &renamed);

        let restructured = if restructured_layout.is_empty() {
            info!("No restructured schema supplied");
            Vec::new()
        } else {
            diff::modified_tables(&updated, &restructured_layout)
        };
        let (new, deleted) = diff::new_and_deleted_tables(&updated, &restructured_layout);

        debug!("Renamed tables: {renamed:?}");
        debug!("Restructured tables: {restructured:?}");
        ChangeSet {
            current,
            updated,
            renamed,
            restructured,
            new,
            deleted,
        }
    }

    pub fn classify(&self) -> Vec<TableStatus> {
        let changes = TableChanges {
            renamed: &self.renamed,
            restructured: &self.restructured,
            new: &self.new,
            deleted: &self.deleted,
        };
        diff::classify_tables(&self.current, &changes)
            .into_iter()
            .map(|(table, change)| TableStatus { table, change })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStatus {
    pub table: String,
    pub change: TableChange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileResult {
    pub path: PathBuf,
    pub verdict: TableVerdict,
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub tables: Vec<TableStatus>,
    pub files: Vec<FileResult>,
}

impl RunSummary {
    pub fn is_changed(&self, table: &str) -> bool {
        self.tables
            .iter()
            .any(|status| status.table == table && status.change.is_changed())
    }

    pub fn count_mode(&self, mode: RemapMode) -> usize {
        self.files
            .iter()
            .filter(|file| file.outcome.mode == mode)
            .count()
    }
}

pub struct Reconciler<'a> {
    config: &'a Config,
    patterns: SchemaPatterns,
}

impl<'a> Reconciler<'a> {
    pub fn new(config: &'a Config) -> Result<Self> {
        let patterns = SchemaPatterns::compile(&config.patterns)?;
        Ok(Reconciler { config, patterns })
    }

    pub fn load_stages(&self) -> Result<SchemaStages> {
        SchemaStages::load(self.config, &self.patterns)
    }

    /// Loads one stage; `None` when that optional stage is not configured.
    pub fn load_stage(&self, stage: Stage) -> Result<Option<SchemaSnapshot>> {
        let path = match stage {
            Stage::Current => Some(self.config.schema_current_path()),
            Stage::Renamed => self.config.schema_renamed_path(),
            Stage::Restructured => self.config.schema_restructured_path(),
        };
        path.map(|path| load_snapshot(&path, &self.patterns)).transpose()
    }

    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let source = self.config.source_path();
        let files = discover::discover_files(&source, &self.config.matching.file_search_pattern)
            .with_context(|| format!("Listing candidate files under {source:?}"))?;
        info!("Found {} candidate file(s) under {:?}", files.len(), source);
        Ok(files)
    }

    /// Identifies every file against the current schema, applying the
    /// auto-fix rule when enabled.
    pub fn identify(&self, files: &[PathBuf], current: &TableColumns) -> Vec<TableVerdict> {
        let excluded = self.config.matching.excluded_columns();
        let tables = current.without_excluded(&excluded);
        let threshold = self.config.matching.threshold;
        files
            .iter()
            .map(|path| {
                let mut verdict = matcher::identify_file(path, &tables, &excluded, threshold);
                if let Some(error) = &verdict.error {
                    warn!("{error} => {path:?}");
                }
                if self.config.processing.auto_fix.is_set() && verdict.try_auto_apply() {
                    debug!("Auto applied table {:?} to {path:?}", verdict.table);
                }
                verdict
            })
            .collect()
    }

    pub fn run(&self) -> Result<RunSummary> {
        let stages = self.load_stages()?;
        let changes = ChangeSet::from_stages(&stages);
        let files = self.discover()?;
        let verdicts = self.identify(&files, &changes.current);

        let options = WriteOptions {
            test_mode: self.config.processing.test_mode.is_set(),
            suffix: self.config.processing.modified_file_suffix.as_deref(),
        };
        if options.test_mode {
            info!("Test mode: no csv file will be written");
        }

        let results = files
            .into_iter()
            .zip(verdicts)
            .map(|(path, verdict)| {
                let outcome = self.process(&path, &verdict, &changes, &stages, &options);
                FileResult {
                    path,
                    verdict,
                    outcome,
                }
            })
            .collect::<Vec<_>>();

        let summary = RunSummary {
            tables: changes.classify(),
            files: results,
        };
        info!(
            "Evaluated {} file(s): {} renamed, {} restructured, {} renamed and restructured, {} header corrected",
            summary.files.len(),
            summary.count_mode(RemapMode::Renamed),
            summary.count_mode(RemapMode::Restructured),
            summary.count_mode(RemapMode::RenamedAndRestructured),
            summary.count_mode(RemapMode::HeaderCorrected),
        );
        Ok(summary)
    }

    fn process(
        &self,
        path: &Path,
        verdict: &TableVerdict,
        changes: &ChangeSet,
        stages: &SchemaStages,
        options: &WriteOptions<'_>,
    ) -> FileOutcome {
        debug!(">> {path:?}");
        let mode = RemapMode::derive(
            verdict.table.as_deref(),
            verdict.auto_applied,
            &changes.renamed,
            &changes.restructured,
        );
        let Some(table) = verdict.table.as_deref().filter(|_| mode != RemapMode::Untouched)
        else {
            return FileOutcome::untouched();
        };
        match RemapPlan::for_table(mode, table, &changes.updated, &stages.restructured) {
            Some(plan) => remap::process_file(path, &plan, options),
            None => {
                warn!("No layout available for table '{table}' => {path:?}");
                FileOutcome {
                    mode,
                    output_path: None,
                    status: remap::WriteStatus::Failed,
                    error: None,
                }
            }
        }
    }
}
