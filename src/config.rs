//! Run configuration loaded from a YAML document.
//!
//! A single [`Config`] is built once per invocation and handed to every stage
//! by reference. Relative paths are resolved against the directory holding the
//! configuration file so a config can travel with its schemas.

use std::{
    fmt,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, ensure};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

pub const DEFAULT_THRESHOLD: f64 = 50.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub paths: PathConfig,
    #[serde(default)]
    pub patterns: PatternConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathConfig {
    pub schema_current: PathBuf,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub schema_renamed: Option<PathBuf>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub schema_restructured: Option<PathBuf>,
    pub source: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub table_start: String,
    pub table_end: String,
    pub table_name: String,
    pub field_name_exclude: String,
    pub not_null: String,
    pub default: String,
    pub primary_key: String,
}

impl Default for PatternConfig {
    fn default() -> Self {
        PatternConfig {
            table_start: r"^CREATE\s+TABLE\b".to_string(),
            table_end: r"^\)".to_string(),
            table_name: r#"CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?[`"\[]?(\w+)"#.to_string(),
            field_name_exclude:
                r"^(--|CONSTRAINT\b|PRIMARY\s+KEY\b|UNIQUE\b|FOREIGN\s+KEY\b|CHECK\b|INDEX\b|KEY\b)"
                    .to_string(),
            not_null: r"\bNOT\s+NULL\b".to_string(),
            default: r"\bDEFAULT\b".to_string(),
            primary_key: r"\bPRIMARY\s+KEY\b".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub file_search_pattern: String,
    pub threshold: f64,
    pub excluded_suffix_field_names: String,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        MatchingConfig {
            file_search_pattern: r"\.csv$".to_string(),
            threshold: DEFAULT_THRESHOLD,
            excluded_suffix_field_names: String::new(),
        }
    }
}

impl MatchingConfig {
    /// Excluded column names, lowercased and trimmed.
    pub fn excluded_columns(&self) -> Vec<String> {
        self.excluded_suffix_field_names
            .split(',')
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub test_mode: Flag,
    pub auto_fix: Flag,
    #[serde(deserialize_with = "empty_as_none")]
    pub modified_file_suffix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    #[serde(deserialize_with = "empty_as_none")]
    pub output: Option<PathBuf>,
    pub folder_name: String,
    pub file_name: String,
    #[serde(deserialize_with = "empty_as_none")]
    pub summary_json: Option<PathBuf>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            output: None,
            folder_name: "report".to_string(),
            file_name: "reconcile_report".to_string(),
            summary_json: None,
        }
    }
}

/// `Y`/`N` switch. YAML booleans are accepted as well.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flag(pub bool);

impl Flag {
    pub fn is_set(self) -> bool {
        self.0
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0 { "Y" } else { "N" })
    }
}

impl Serialize for Flag {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Flag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bool(value) => Ok(Flag(value)),
            Raw::Text(text) => match text.trim().to_ascii_uppercase().as_str() {
                "Y" | "YES" | "TRUE" => Ok(Flag(true)),
                "N" | "NO" | "FALSE" | "" => Ok(Flag(false)),
                other => Err(de::Error::custom(format!(
                    "expected Y or N but found '{other}'"
                ))),
            },
        }
    }
}

fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: From<String>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .map(T::from))
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let mut config: Config = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config YAML {path:?}"))?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(text: &str, base_dir: &Path) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(text).context("Parsing config YAML")?;
        config.base_dir = base_dir.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    pub fn template() -> Self {
        Config {
            paths: PathConfig {
                schema_current: PathBuf::from("schema/current.sql"),
                schema_renamed: Some(PathBuf::from("schema/renamed.sql")),
                schema_restructured: Some(PathBuf::from("schema/restructured.sql")),
                source: PathBuf::from("data"),
            },
            processing: ProcessingConfig {
                test_mode: Flag(true),
                auto_fix: Flag(false),
                modified_file_suffix: Some("_modified".to_string()),
            },
            ..Config::default()
        }
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing config to YAML")
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            !self.paths.schema_current.as_os_str().is_empty(),
            "paths.schema_current must be set"
        );
        ensure!(
            !self.paths.source.as_os_str().is_empty(),
            "paths.source must be set"
        );
        if !self.matching.threshold.is_finite() || !(0.0..=100.0).contains(&self.matching.threshold)
        {
            return Err(anyhow!(
                "matching.threshold must be between 0 and 100 (found {})",
                self.matching.threshold
            ));
        }
        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn schema_current_path(&self) -> PathBuf {
        self.resolve(&self.paths.schema_current)
    }

    pub fn schema_renamed_path(&self) -> Option<PathBuf> {
        self.paths.schema_renamed.as_deref().map(|p| self.resolve(p))
    }

    pub fn schema_restructured_path(&self) -> Option<PathBuf> {
        self.paths
            .schema_restructured
            .as_deref()
            .map(|p| self.resolve(p))
    }

    pub fn source_path(&self) -> PathBuf {
        self.resolve(&self.paths.source)
    }

    pub fn report_dir(&self) -> PathBuf {
        match self.report.output.as_deref() {
            Some(dir) => self.resolve(dir),
            None => self.base_dir.join(&self.report.folder_name),
        }
    }

    pub fn summary_json_path(&self) -> Option<PathBuf> {
        self.report.summary_json.as_deref().map(|p| self.resolve(p))
    }
}
