//! File discovery and the per-file state machine of one run.
//!
//! A file moves `Discovered -> (Converting) -> Loading -> Archived`; any
//! failure leaves it `Failed` and in place for the next run. Failures are
//! isolated per file, only an unusable sink or source directory stops a run.

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use encoding_rs::{Encoding, UTF_8};
use log::{error, info, warn};

use crate::{
    config::LoaderConfig,
    convert,
    error::{IngestError, IngestResult},
    loader::{self, FileLoad, LoadOptions},
    sink::{Connection, Sink},
    table,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    LegacySpreadsheet,
    ModernSpreadsheet,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("csv") {
            Some(SourceFormat::Csv)
        } else if ext.eq_ignore_ascii_case("xls") {
            Some(SourceFormat::LegacySpreadsheet)
        } else if ext.eq_ignore_ascii_case("xlsx") {
            Some(SourceFormat::ModernSpreadsheet)
        } else {
            None
        }
    }

    pub fn needs_conversion(self) -> bool {
        !matches!(self, SourceFormat::Csv)
    }

    pub fn label(self) -> &'static str {
        match self {
            SourceFormat::Csv => "csv",
            SourceFormat::LegacySpreadsheet => "xls",
            SourceFormat::ModernSpreadsheet => "xlsx",
        }
    }

    /// Encoding the loaded CSV is read with: the legacy one for raw drops,
    /// UTF-8 for converted spreadsheets.
    pub fn load_encoding(self, legacy: &'static Encoding) -> &'static Encoding {
        if self.needs_conversion() { UTF_8 } else { legacy }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub format: SourceFormat,
}

impl SourceFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Lists candidate files directly inside `dir`, ordered by case-insensitive
/// file name. Subdirectories are never entered.
pub fn discover(dir: &Path) -> IngestResult<Vec<SourceFile>> {
    let entries = fs::read_dir(dir).map_err(|err| IngestError::read(dir, err))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| IngestError::read(dir, err))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(format) = SourceFormat::from_path(&path) {
            files.push(SourceFile { path, format });
        }
    }
    files.sort_by_cached_key(|file| {
        let name = file.file_name();
        (name.to_lowercase(), name)
    });
    Ok(files)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Archived,
    Failed(String),
}

/// Report for one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadResult {
    pub source: PathBuf,
    pub format: SourceFormat,
    pub rows: usize,
    pub skipped_lines: usize,
    pub elapsed: Duration,
    pub status: FileStatus,
}

impl LoadResult {
    pub fn succeeded(&self) -> bool {
        self.status == FileStatus::Archived
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub results: Vec<LoadResult>,
}

impl RunSummary {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn total_rows(&self) -> usize {
        self.results.iter().map(|r| r.rows).sum()
    }

    pub fn archived(&self) -> usize {
        self.results.iter().filter(|r| r.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.archived()
    }

    pub fn render(&self) -> String {
        let headers = ["file", "format", "status", "rows", "skipped", "seconds"]
            .iter()
            .map(|h| h.to_string())
            .collect::<Vec<_>>();
        let rows = self
            .results
            .iter()
            .map(|result| {
                let name = result
                    .source
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let status = match &result.status {
                    FileStatus::Archived => "archived".to_string(),
                    FileStatus::Failed(reason) => format!("failed: {reason}"),
                };
                vec![
                    name,
                    result.format.label().to_string(),
                    status,
                    loader::group_thousands(result.rows),
                    loader::group_thousands(result.skipped_lines),
                    format!("{:.1}", result.elapsed.as_secs_f64()),
                ]
            })
            .collect::<Vec<_>>();
        table::render_table(&headers, &rows, &[3, 4, 5])
    }
}

/// Processes every candidate in the source directory once.
pub fn run(config: &LoaderConfig, sink: &dyn Sink) -> IngestResult<RunSummary> {
    let archive_dir = config.archive_dir();
    fs::create_dir_all(&archive_dir).map_err(|source| IngestError::Archive {
        path: archive_dir.clone(),
        source,
    })?;

    let files = discover(&config.source_dir)?;
    if files.is_empty() {
        info!("No CSV/XLS/XLSX files found in {:?}.", config.source_dir);
        return Ok(RunSummary::default());
    }
    info!(
        "Found {} file(s) in {:?}",
        files.len(),
        config.source_dir
    );

    let legacy = config.legacy_encoding()?;
    let options = LoadOptions::from_config(config);
    let mut conn = sink.open()?;

    let mut summary = RunSummary::default();
    for file in &files {
        let started = Instant::now();
        let outcome = process_file(file, config, legacy, conn.as_mut(), &options, &archive_dir);
        let result = match outcome {
            Ok(load) => LoadResult {
                source: file.path.clone(),
                format: file.format,
                rows: load.rows,
                skipped_lines: load.skipped_lines,
                elapsed: started.elapsed(),
                status: FileStatus::Archived,
            },
            Err(err) => {
                error!("Failed on {}: {err}", file.path.display());
                LoadResult {
                    source: file.path.clone(),
                    format: file.format,
                    rows: 0,
                    skipped_lines: 0,
                    elapsed: started.elapsed(),
                    status: FileStatus::Failed(err.to_string()),
                }
            }
        };
        summary.results.push(result);
    }

    if let Err(err) = conn.close() {
        warn!("Closing connection failed: {err:#}");
    }
    info!(
        "Run complete: {} archived, {} failed, {} row(s) loaded",
        summary.archived(),
        summary.failed(),
        loader::group_thousands(summary.total_rows())
    );
    Ok(summary)
}

fn process_file(
    file: &SourceFile,
    config: &LoaderConfig,
    legacy: &'static Encoding,
    conn: &mut dyn Connection,
    options: &LoadOptions,
    archive_dir: &Path,
) -> IngestResult<FileLoad> {
    let target = if file.format.needs_conversion() {
        convert::convert_to_csv(&file.path, &config.conversion_dir())?
    } else {
        file.path.clone()
    };
    let encoding = file.format.load_encoding(legacy);
    let load = loader::load_file(&target, encoding, conn, options)?;
    archive(&file.path, archive_dir)?;
    Ok(load)
}

/// Moves `source` into `archive_dir` under the same file name, falling back to
/// copy-and-remove when a rename cannot cross filesystems.
pub fn archive(source: &Path, archive_dir: &Path) -> IngestResult<PathBuf> {
    let archive_error = |source_err: io::Error| IngestError::Archive {
        path: source.to_path_buf(),
        source: source_err,
    };
    let name = source.file_name().ok_or_else(|| {
        archive_error(io::Error::new(
            io::ErrorKind::InvalidInput,
            "source path has no file name",
        ))
    })?;
    let destination = archive_dir.join(name);
    if let Err(rename_err) = fs::rename(source, &destination) {
        fs::copy(source, &destination).map_err(|_| archive_error(rename_err))?;
        fs::remove_file(source).map_err(archive_error)?;
    }
    info!("[ARCHIVE] {} -> {}", source.display(), destination.display());
    Ok(destination)
}
