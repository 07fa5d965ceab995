//! Spreadsheet to CSV conversion.
//!
//! Only the first worksheet is read and every cell is rendered as text, so
//! identifiers such as `0788123456` keep their leading zeros. The output is a
//! UTF-8 CSV with a byte-order marker, named after the input, in the
//! conversion directory.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use calamine::{Data, ExcelDateTime, Reader, open_workbook_auto};
use chrono::NaiveDateTime;
use log::info;

use crate::{
    error::{IngestError, IngestResult},
    io_utils,
};

pub const CONVERTED_EXTENSION: &str = "csv";

/// Path the converted copy of `input` is written to inside `output_dir`.
pub fn converted_path(input: &Path, output_dir: &Path) -> PathBuf {
    let mut name = input
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "converted".into());
    name.push(".");
    name.push(CONVERTED_EXTENSION);
    output_dir.join(name)
}

/// Converts the first sheet of `input` into a CSV under `output_dir`, creating
/// the directory when needed. Returns the written path.
pub fn convert_to_csv(input: &Path, output_dir: &Path) -> IngestResult<PathBuf> {
    let output = converted_path(input, output_dir);
    info!(
        "[CONVERT] {} -> {} (sheet 1)",
        display_name(input),
        display_name(&output)
    );
    write_first_sheet(input, output_dir, &output)
        .map_err(|err| IngestError::conversion(input, format!("{err:#}")))?;
    Ok(output)
}

fn write_first_sheet(input: &Path, output_dir: &Path, output: &Path) -> Result<()> {
    let rows = read_first_sheet(input)?;
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Creating conversion directory {output_dir:?}"))?;
    let mut writer = io_utils::open_bom_csv_writer(output, io_utils::DEFAULT_DELIMITER)?;
    for row in &rows {
        writer
            .write_record(row)
            .with_context(|| format!("Writing {output:?}"))?;
    }
    writer
        .flush()
        .with_context(|| format!("Flushing {output:?}"))?;
    Ok(())
}

/// Reads the first worksheet as text rows. The header row is kept; rows with
/// no content are dropped.
pub fn read_first_sheet(input: &Path) -> Result<Vec<Vec<String>>> {
    let mut workbook =
        open_workbook_auto(input).with_context(|| format!("Opening workbook {input:?}"))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("Workbook has no sheets"))?
        .context("Reading first sheet")?;

    let rows = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect::<Vec<_>>())
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .collect::<Vec<_>>();
    if rows.is_empty() {
        return Err(anyhow!("First sheet is empty"));
    }
    Ok(rows)
}

/// Renders a cell the way it should appear in the CSV, without numeric or
/// date coercion beyond a stable text form.
pub fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(true) => "True".to_string(),
        Data::Bool(false) => "False".to_string(),
        Data::DateTime(value) => excel_datetime_text(value).unwrap_or_else(|| cell.to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(err) => err.to_string(),
    }
}

/// Durations render as `H:MM:SS`, serials below one day as a time of day and
/// everything else as a full timestamp.
fn excel_datetime_text(value: &ExcelDateTime) -> Option<String> {
    let serial = value.as_f64();
    if value.is_duration() {
        return Some(format_duration(serial));
    }
    let datetime = value.as_datetime()?;
    if (0.0..1.0).contains(&serial) {
        Some(datetime.format("%H:%M:%S").to_string())
    } else {
        Some(format_datetime(datetime))
    }
}

fn format_datetime(value: NaiveDateTime) -> String {
    value.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn format_duration(days: f64) -> String {
    let total = (days * 86_400.0).round() as i64;
    let sign = if total < 0 { "-" } else { "" };
    let secs = total.abs();
    format!(
        "{sign}{}:{:02}:{:02}",
        secs / 3600,
        secs / 60 % 60,
        secs % 60
    )
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
