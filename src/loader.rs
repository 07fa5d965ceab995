//! Batch loading: reconcile each raw batch, insert it with one batched
//! statement and commit before reading the next one.

use std::{
    path::Path,
    time::{Duration, Instant},
};

use encoding_rs::Encoding;
use log::{debug, info};

use crate::{
    chunks::{ChunkedReader, RawBatch},
    config::{BadLinePolicy, LoaderConfig},
    error::{IngestError, IngestResult},
    schema::{self, ColumnPlan},
    sink::{self, Connection},
};

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub insert_sql: String,
    pub batch_size: usize,
    pub bad_lines: BadLinePolicy,
}

impl LoadOptions {
    pub fn from_config(config: &LoaderConfig) -> Self {
        LoadOptions {
            insert_sql: sink::insert_statement(&config.table),
            batch_size: config.batch_size,
            bad_lines: config.bad_lines,
        }
    }
}

/// Outcome of loading one delimited file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileLoad {
    pub rows: usize,
    pub batches: usize,
    pub skipped_lines: usize,
    pub elapsed: Duration,
}

/// Inserts one batch and commits it. Empty batches are a no-op without a commit.
pub fn load_batch(
    conn: &mut dyn Connection,
    insert_sql: &str,
    path: &Path,
    headers: &[String],
    batch: &RawBatch,
) -> IngestResult<usize> {
    let rows = schema::reconcile(headers, &batch.rows);
    if rows.is_empty() {
        return Ok(0);
    }
    let load_error = |err: anyhow::Error| IngestError::Load {
        path: path.to_path_buf(),
        batch: batch.index,
        message: format!("{err:#}"),
    };
    conn.execute_batch(insert_sql, &rows).map_err(load_error)?;
    conn.commit().map_err(load_error)?;
    Ok(rows.len())
}

/// Streams `path` through the reader in bounded batches and loads each one.
pub fn load_file(
    path: &Path,
    encoding: &'static Encoding,
    conn: &mut dyn Connection,
    options: &LoadOptions,
) -> IngestResult<FileLoad> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    info!("[LOAD] {name} ({})", encoding.name());
    let started = Instant::now();

    let mut chunks = ChunkedReader::open(path, encoding, options.batch_size, options.bad_lines)?;
    let headers = chunks.headers().to_vec();
    let missing = ColumnPlan::from_headers(&headers).missing_columns();
    if !missing.is_empty() {
        debug!("{name}: filling absent column(s) with empty values: {missing:?}");
    }

    let mut load = FileLoad::default();
    for batch in chunks.by_ref() {
        let batch = batch?;
        let inserted = load_batch(conn, &options.insert_sql, path, &headers, &batch)?;
        if inserted == 0 {
            continue;
        }
        load.batches += 1;
        load.rows += inserted;
        info!(
            "  inserted {} rows (running total: {})",
            group_thousands(inserted),
            group_thousands(load.rows)
        );
    }
    load.skipped_lines = chunks.skipped_lines();
    load.elapsed = started.elapsed();

    info!(
        "[DONE] {name} -> {} rows in {:.1}s",
        group_thousands(load.rows),
        load.elapsed.as_secs_f64()
    );
    if load.skipped_lines > 0 {
        info!(
            "{name}: skipped {} malformed line(s)",
            group_thousands(load.skipped_lines)
        );
    }
    Ok(load)
}

pub fn group_thousands(value: usize) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TargetRow;
    use anyhow::{Result, anyhow};

    #[derive(Default)]
    struct Recorder {
        inserted: Vec<Vec<TargetRow>>,
        commits: usize,
        fail: bool,
    }

    impl Connection for Recorder {
        fn execute_batch(&mut self, _sql: &str, rows: &[TargetRow]) -> Result<usize> {
            if self.fail {
                return Err(anyhow!("constraint violated"));
            }
            self.inserted.push(rows.to_vec());
            Ok(rows.len())
        }

        fn commit(&mut self) -> Result<()> {
            self.commits += 1;
            Ok(())
        }

        fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    fn batch(index: usize, rows: &[&[&str]]) -> RawBatch {
        RawBatch {
            index,
            rows: rows
                .iter()
                .map(|row| row.iter().map(|v| v.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn load_batch_reconciles_inserts_and_commits() {
        let mut recorder = Recorder::default();
        let headers = vec!["qrc".to_string(), "Mobile No".to_string()];
        let inserted = load_batch(
            &mut recorder,
            "INSERT",
            Path::new("a.csv"),
            &headers,
            &batch(1, &[&["Q", " 0788 "]]),
        )
        .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(recorder.commits, 1);
        let row = &recorder.inserted[0][0];
        assert_eq!(row.get("QRC"), Some("Q"));
        assert_eq!(row.get("MobileNo"), Some("0788"));
    }

    #[test]
    fn empty_batch_skips_insert_and_commit() {
        let mut recorder = Recorder::default();
        let inserted = load_batch(
            &mut recorder,
            "INSERT",
            Path::new("a.csv"),
            &[],
            &batch(1, &[]),
        )
        .unwrap();
        assert_eq!(inserted, 0);
        assert_eq!(recorder.commits, 0);
        assert!(recorder.inserted.is_empty());
    }

    #[test]
    fn insert_failure_carries_file_and_batch_index() {
        let mut recorder = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let err = load_batch(
            &mut recorder,
            "INSERT",
            Path::new("feb.csv"),
            &["Date".to_string()],
            &batch(4, &[&["2024-02-01"]]),
        )
        .unwrap_err();
        match err {
            IngestError::Load {
                path,
                batch,
                message,
            } => {
                assert_eq!(path, Path::new("feb.csv"));
                assert_eq!(batch, 4);
                assert!(message.contains("constraint violated"));
            }
            other => panic!("expected load error, got {other:?}"),
        }
        assert_eq!(recorder.commits, 0);
    }

    #[test]
    fn group_thousands_inserts_separators() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(25_000), "25,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }
}
