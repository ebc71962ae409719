//! Table-level comparison between schema stages.

use std::fmt;

use itertools::Itertools;
use serde::Serialize;

use crate::schema::TableColumns;

/// Tables of `old` whose ordered column list differs in `new`.
///
/// Tables missing from `new` are skipped here; they surface as deleted tables
/// through [`new_and_deleted_tables`].
pub fn modified_tables(old: &TableColumns, new: &TableColumns) -> Vec<String> {
    old.iter()
        .filter_map(|(table, old_columns)| match new.get(table) {
            Some(new_columns) if new_columns != old_columns => Some(table.to_string()),
            _ => None,
        })
        .collect()
}

/// Current layout with the renamed column lists swapped in for `renamed_tables`.
pub fn overlay_renamed(
    current: &TableColumns,
    renamed: &TableColumns,
    renamed_tables: &[String],
) -> TableColumns {
    let mut updated = current.clone();
    for table in renamed_tables {
        if let Some(columns) = renamed.get(table) {
            updated.insert(table.clone(), columns.to_vec());
        }
    }
    updated
}

pub fn new_and_deleted_tables(
    updated: &TableColumns,
    restructured: &TableColumns,
) -> (Vec<String>, Vec<String>) {
    let new_tables = if updated.is_empty() {
        Vec::new()
    } else {
        restructured
            .table_names()
            .filter(|table| !updated.contains(table))
            .map(str::to_string)
            .collect()
    };
    let deleted_tables = if restructured.is_empty() {
        Vec::new()
    } else {
        updated
            .table_names()
            .filter(|table| !restructured.contains(table))
            .map(str::to_string)
            .collect()
    };
    (new_tables, deleted_tables)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableChange {
    Renamed,
    Restructured,
    RenamedAndRestructured,
    New,
    Deleted,
    Unchanged,
}

impl TableChange {
    pub fn remark(self) -> &'static str {
        match self {
            TableChange::Renamed => "Table columns renamed.",
            TableChange::Restructured => "Table has been restructured.",
            TableChange::RenamedAndRestructured => "Table columns were renamed and restructured.",
            TableChange::New => "New table has been detected.",
            TableChange::Deleted => "Deleted table",
            TableChange::Unchanged => "Unchanged",
        }
    }

    pub fn is_changed(self) -> bool {
        self != TableChange::Unchanged
    }
}

impl fmt::Display for TableChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.remark())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TableChanges<'a> {
    pub renamed: &'a [String],
    pub restructured: &'a [String],
    pub new: &'a [String],
    pub deleted: &'a [String],
}

/// Classifies every known table: changed tables first, then the untouched
/// tables of the current schema in declared order.
pub fn classify_tables(
    current: &TableColumns,
    changes: &TableChanges<'_>,
) -> Vec<(String, TableChange)> {
    let contains = |list: &[String], table: &str| list.iter().any(|name| name == table);

    let changed = changes
        .renamed
        .iter()
        .chain(changes.restructured)
        .chain(changes.new)
        .chain(changes.deleted)
        .unique()
        .map(|table| {
            let renamed = contains(changes.renamed, table);
            let restructured = contains(changes.restructured, table);
            let change = if renamed && restructured {
                TableChange::RenamedAndRestructured
            } else if restructured {
                TableChange::Restructured
            } else if contains(changes.new, table) {
                TableChange::New
            } else if contains(changes.deleted, table) {
                TableChange::Deleted
            } else {
                TableChange::Renamed
            };
            (table.clone(), change)
        })
        .collect::<Vec<_>>();

    let unchanged = current
        .table_names()
        .filter(|table| !changed.iter().any(|(name, _)| name == table))
        .map(|table| (table.to_string(), TableChange::Unchanged))
        .collect::<Vec<_>>();

    changed.into_iter().chain(unchanged).collect()
}
