use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::reconcile::Stage;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Reconcile CSV files against evolving table schemas",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Identify, rewrite and report on every CSV file under the source directory
    Run(RunArgs),
    /// Identify the table behind every CSV file without rewriting anything
    Identify(IdentifyArgs),
    /// List the tables and columns parsed from one schema stage
    Tables(TablesArgs),
    /// Write a configuration template
    Init(InitArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Configuration file (YAML)
    #[arg(short, long)]
    pub config: PathBuf,
    /// Override the CSV source directory
    #[arg(long)]
    pub source: Option<PathBuf>,
    /// Evaluate only; never write CSV files
    #[arg(long = "test-mode", conflicts_with = "no_test_mode")]
    pub test_mode: bool,
    /// Write CSV files even if the config enables test mode
    #[arg(long = "no-test-mode")]
    pub no_test_mode: bool,
    /// Adopt suggested tables for reordered headers
    #[arg(long = "auto-fix")]
    pub auto_fix: bool,
    /// Directory receiving the spreadsheet report
    #[arg(long = "report-dir")]
    pub report_dir: Option<PathBuf>,
    /// Skip the spreadsheet report
    #[arg(long = "no-report")]
    pub no_report: bool,
    /// Also write the run summary as JSON
    #[arg(long = "summary-json")]
    pub summary_json: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct IdentifyArgs {
    /// Configuration file (YAML)
    #[arg(short, long)]
    pub config: PathBuf,
    /// Override the CSV source directory
    #[arg(long)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct TablesArgs {
    /// Configuration file (YAML)
    #[arg(short, long)]
    pub config: PathBuf,
    /// Schema stage to list
    #[arg(long, value_enum, default_value = "current")]
    pub stage: StageArg,
    /// Emit the parsed tables as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Destination configuration file
    #[arg(short, long)]
    pub output: PathBuf,
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum StageArg {
    Current,
    Renamed,
    Restructured,
}

impl From<StageArg> for Stage {
    fn from(value: StageArg) -> Self {
        match value {
            StageArg::Current => Stage::Current,
            StageArg::Renamed => Stage::Renamed,
            StageArg::Restructured => Stage::Restructured,
        }
    }
}
