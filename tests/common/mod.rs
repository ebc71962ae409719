#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

pub const CURRENT_SCHEMA: &str = "\
CREATE TABLE users (
  id INTEGER NOT NULL PRIMARY KEY,
  nm VARCHAR(64),
  email VARCHAR(255) DEFAULT 'n/a' NOT NULL
);
CREATE TABLE orders (
  order_id INTEGER NOT NULL,
  user_id INTEGER
);
CREATE TABLE legacy (
  id INTEGER
);
";

pub const RENAMED_SCHEMA: &str = "\
CREATE TABLE users (
  id INTEGER NOT NULL PRIMARY KEY,
  name VARCHAR(64),
  email VARCHAR(255) DEFAULT 'n/a' NOT NULL
);
CREATE TABLE orders (
  order_id INTEGER NOT NULL,
  user_id INTEGER
);
CREATE TABLE legacy (
  id INTEGER
);
";

pub const RESTRUCTURED_SCHEMA: &str = "\
CREATE TABLE users (
  id INTEGER NOT NULL PRIMARY KEY,
  name VARCHAR(64),
  email VARCHAR(255) DEFAULT 'n/a' NOT NULL,
  phone VARCHAR(16) DEFAULT '000' NOT NULL
);
CREATE TABLE orders (
  order_id INTEGER NOT NULL,
  user_id INTEGER
);
CREATE TABLE audit (
  id INTEGER
);
";

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    /// Missing parent directories are created.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, contents).expect("write temp file contents");
        path
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.temp_dir.path().join(name)).expect("read temp file")
    }

    /// Lays down the three schema stages plus a config pointing at them.
    /// `processing` is spliced in verbatim as the `processing:` section.
    pub fn with_schemas(processing: &str) -> (Self, PathBuf) {
        let workspace = Self::new();
        workspace.write("schema/current.sql", CURRENT_SCHEMA);
        workspace.write("schema/renamed.sql", RENAMED_SCHEMA);
        workspace.write("schema/restructured.sql", RESTRUCTURED_SCHEMA);
        fs::create_dir_all(workspace.path().join("data")).expect("create data dir");
        let config = format!(
            "\
paths:
  schema_current: schema/current.sql
  schema_renamed: schema/renamed.sql
  schema_restructured: schema/restructured.sql
  source: data
processing:
{processing}
report:
  folder_name: out
  file_name: reconcile_report
"
        );
        let config_path = workspace.write("config.yml", &config);
        (workspace, config_path)
    }
}
