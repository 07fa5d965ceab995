//! Run configuration.
//!
//! A [`LoaderConfig`] is built once per process: defaults, then an optional
//! YAML file, then command-line overrides. It is validated up front and handed
//! to the pipeline by reference.

use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::ValueEnum;
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::{
    cli::{RunArgs, SourceArgs},
    error::{IngestError, IngestResult},
    io_utils,
};

pub const DEFAULT_BATCH_SIZE: usize = 10_000;
pub const DEFAULT_TABLE: &str = "qrc";
pub const ARCHIVE_DIR_NAME: &str = "processed";
pub const CONVERSION_DIR_NAME: &str = "converted";

/// Handling of lines whose field count disagrees with the header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum BadLinePolicy {
    /// Drop the line without comment
    #[default]
    Skip,
    /// Drop the line and log a warning naming it
    Warn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SinkSettings {
    pub drivers: Vec<String>,
    pub database: PathBuf,
    pub create_table: bool,
}

impl Default for SinkSettings {
    fn default() -> Self {
        SinkSettings {
            drivers: vec!["sqlite".to_string()],
            database: PathBuf::from("qrc.sqlite3"),
            create_table: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    pub source_dir: PathBuf,
    pub archive_dir: Option<PathBuf>,
    pub conversion_dir: Option<PathBuf>,
    pub table: String,
    pub batch_size: usize,
    pub legacy_encoding: String,
    pub bad_lines: BadLinePolicy,
    pub sink: SinkSettings,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            source_dir: PathBuf::from("."),
            archive_dir: None,
            conversion_dir: None,
            table: DEFAULT_TABLE.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            legacy_encoding: io_utils::DEFAULT_LEGACY_ENCODING.to_string(),
            bad_lines: BadLinePolicy::default(),
            sink: SinkSettings::default(),
        }
    }
}

impl LoaderConfig {
    pub fn for_source_dir(source_dir: impl Into<PathBuf>) -> Self {
        LoaderConfig {
            source_dir: source_dir.into(),
            ..LoaderConfig::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let mut raw = String::new();
        file.read_to_string(&mut raw)
            .with_context(|| format!("Reading config file {path:?}"))?;
        serde_yaml::from_str(&raw).with_context(|| format!("Parsing config file {path:?}"))
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.archive_dir
            .clone()
            .unwrap_or_else(|| self.source_dir.join(ARCHIVE_DIR_NAME))
    }

    pub fn conversion_dir(&self) -> PathBuf {
        self.conversion_dir
            .clone()
            .unwrap_or_else(|| self.source_dir.join(CONVERSION_DIR_NAME))
    }

    pub fn legacy_encoding(&self) -> IngestResult<&'static Encoding> {
        io_utils::resolve_encoding(Some(&self.legacy_encoding))
            .map_err(|err| IngestError::Config(err.to_string()))
    }

    pub fn validate(&self) -> IngestResult<()> {
        if self.batch_size == 0 {
            return Err(IngestError::Config(
                "batch size must be greater than zero".to_string(),
            ));
        }
        if self.table.trim().is_empty() {
            return Err(IngestError::Config(
                "target table identifier must not be empty".to_string(),
            ));
        }
        if self.sink.drivers.is_empty() {
            return Err(IngestError::Config(
                "at least one sink driver must be configured".to_string(),
            ));
        }
        self.legacy_encoding()?;
        Ok(())
    }

    fn apply_source_args(&mut self, args: &SourceArgs) {
        if let Some(dir) = &args.source_dir {
            self.source_dir = dir.clone();
        }
        if let Some(dir) = &args.conversion_dir {
            self.conversion_dir = Some(dir.clone());
        }
        if let Some(label) = &args.legacy_encoding {
            self.legacy_encoding = label.clone();
        }
    }

    fn apply_run_args(&mut self, args: &RunArgs) {
        self.apply_source_args(&args.source);
        if let Some(dir) = &args.archive_dir {
            self.archive_dir = Some(dir.clone());
        }
        if let Some(database) = &args.database {
            self.sink.database = database.clone();
        }
        if let Some(table) = &args.table {
            self.table = table.clone();
        }
        if let Some(size) = args.batch_size {
            self.batch_size = size;
        }
        if let Some(policy) = args.bad_lines {
            self.bad_lines = policy;
        }
        if !args.drivers.is_empty() {
            self.sink.drivers = args.drivers.clone();
        }
        if args.create_table {
            self.sink.create_table = true;
        }
    }
}

fn base_config(args: &SourceArgs) -> Result<LoaderConfig> {
    match &args.config {
        Some(path) => LoaderConfig::load(path),
        None => Ok(LoaderConfig::default()),
    }
}

/// Builds the configuration for a pipeline run.
pub fn resolve_run(args: &RunArgs) -> Result<LoaderConfig> {
    let mut config = base_config(&args.source)?;
    config.apply_run_args(args);
    config.validate()?;
    Ok(config)
}

/// Builds the configuration for commands that only look at the source directory.
pub fn resolve_source(args: &SourceArgs) -> Result<LoaderConfig> {
    let mut config = base_config(args)?;
    config.apply_source_args(args);
    config.legacy_encoding()?;
    Ok(config)
}
