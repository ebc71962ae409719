pub mod cli;
pub mod config;
pub mod diff;
pub mod discover;
pub mod matcher;
pub mod reconcile;
pub mod remap;
pub mod report;
pub mod schema;

use std::{
    env,
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use itertools::Itertools;
use log::{LevelFilter, debug, error, info};

use crate::{
    cli::{Cli, Commands},
    config::{Config, Flag},
    reconcile::{Reconciler, Stage},
    schema::ColumnDefinition,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_reconcile", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => handle_run(&args),
        Commands::Identify(args) => handle_identify(&args),
        Commands::Tables(args) => handle_tables(&args),
        Commands::Init(args) => handle_init(&args),
    };
    if let Err(err) = &result {
        error!("{err:?}");
    }
    result
}

fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load(path).with_context(|| format!("Loading config from {path:?}"))?;
    debug!("Configuration: {config:?}");
    Ok(config)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Resolving {path:?}"))
}

fn handle_run(args: &cli::RunArgs) -> Result<()> {
    let mut config = load_config(&args.config)?;
    if let Some(source) = &args.source {
        config.paths.source = absolute(source)?;
    }
    if args.test_mode {
        config.processing.test_mode = Flag(true);
    } else if args.no_test_mode {
        config.processing.test_mode = Flag(false);
    }
    if args.auto_fix {
        config.processing.auto_fix = Flag(true);
    }
    if let Some(dir) = &args.report_dir {
        config.report.output = Some(absolute(dir)?);
    }
    info!(
        "Reconciling {:?} (test mode {}, auto fix {})",
        config.source_path(),
        config.processing.test_mode,
        config.processing.auto_fix
    );

    let summary = Reconciler::new(&config)?.run()?;

    if !args.no_report {
        let path = report::report_path(
            &config.report_dir(),
            &config.report.file_name,
            &chrono::Local::now().naive_local(),
        );
        report::write_workbook(&summary, &path)
            .with_context(|| format!("Writing report to {path:?}"))?;
        info!("Report written to {path:?}");
    }

    let json_path = match &args.summary_json {
        Some(path) => Some(absolute(path)?),
        None => config.summary_json_path(),
    };
    if let Some(path) = json_path {
        report::write_summary_json(&summary, &path)
            .with_context(|| format!("Writing summary to {path:?}"))?;
        info!("Summary written to {path:?}");
    }
    Ok(())
}

fn handle_identify(args: &cli::IdentifyArgs) -> Result<()> {
    let mut config = load_config(&args.config)?;
    if let Some(source) = &args.source {
        config.paths.source = absolute(source)?;
    }
    let reconciler = Reconciler::new(&config)?;
    let current = reconciler.load_stage(Stage::Current)?.unwrap_or_default();
    let files = reconciler.discover()?;
    let verdicts = reconciler.identify(&files, &current.column_layouts());

    for (path, verdict) in files.iter().zip(&verdicts) {
        let suggestion = verdict
            .suggestion
            .as_ref()
            .map(|s| format!("{} ({}%)", s.table, s.percentage))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}\t{}\t{}\t{}",
            path.display(),
            verdict.table.as_deref().unwrap_or("-"),
            suggestion,
            verdict.error.as_deref().unwrap_or("-")
        );
    }
    let resolved = verdicts.iter().filter(|v| v.table.is_some()).count();
    info!("Resolved {resolved} of {} file(s)", verdicts.len());
    Ok(())
}

fn handle_tables(args: &cli::TablesArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let reconciler = Reconciler::new(&config)?;
    let Some(snapshot) = reconciler.load_stage(Stage::from(args.stage))? else {
        bail!("No schema file configured for the {:?} stage", args.stage);
    };

    if args.json {
        let json = serde_json::to_string_pretty(snapshot.tables())
            .context("Serializing tables to JSON")?;
        println!("{json}");
    } else {
        for table in snapshot.tables() {
            println!(
                "{}: {}",
                table.name,
                table.columns.iter().map(describe_column).join(", ")
            );
        }
    }
    info!("Listed {} table(s) of the {:?} stage", snapshot.len(), args.stage);
    Ok(())
}

fn describe_column(column: &ColumnDefinition) -> String {
    let mut flags = Vec::new();
    if column.primary_key {
        flags.push("PK".to_string());
    }
    if column.not_null {
        flags.push("NOT NULL".to_string());
    }
    if let Some(default) = &column.default {
        flags.push(format!("DEFAULT {default}"));
    }
    if flags.is_empty() {
        format!("{} {}", column.name, column.data_type)
    } else {
        format!("{} {} [{}]", column.name, column.data_type, flags.join(", "))
    }
}

fn handle_init(args: &cli::InitArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        bail!(
            "{:?} already exists; pass --force to overwrite it",
            args.output
        );
    }
    let yaml = Config::template().to_yaml_string()?;
    fs::write(&args.output, yaml)
        .with_context(|| format!("Writing config template to {:?}", args.output))?;
    info!("Config template written to {:?}", args.output);
    Ok(())
}
