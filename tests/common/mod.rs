#![allow(dead_code)]

use std::cell::RefCell;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Result, anyhow};
use qrc_loader::config::LoaderConfig;
use qrc_loader::error::{IngestError, IngestResult};
use qrc_loader::schema::TargetRow;
use qrc_loader::sink::{Connection, Sink};
use tempfile::{TempDir, tempdir};

/// QRC value that makes [`RecordingSink`] reject the batch containing it.
pub const POISON: &str = "POISON";

pub const CANONICAL_HEADER: &str =
    "Date,MobileNo,AgentNameID,SkillsetName,StartTime,EndTime,HandlingTime,Wrap-UP,QRC,LOB";

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Scratch source directory that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn config(&self) -> LoaderConfig {
        let mut config = LoaderConfig::for_source_dir(self.path());
        config.sink.database = self.path().join("sink").join("qrc.sqlite3");
        config
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents).expect("write temp file contents");
        path
    }

    /// Writes a canonical-header CSV with `rows` generated records.
    pub fn write_qrc_csv(&self, name: &str, rows: usize) -> PathBuf {
        self.write(name, &qrc_csv(rows, |_| "Q".to_string()))
    }

    pub fn copy_fixture(&self, fixture: &str) -> PathBuf {
        let destination = self.path().join(fixture);
        fs::copy(fixture_path(fixture), &destination).expect("copy fixture");
        destination
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path().join(relative).exists()
    }
}

pub fn qrc_csv(rows: usize, qrc: impl Fn(usize) -> String) -> String {
    let mut out = String::from(CANONICAL_HEADER);
    out.push('\n');
    for i in 0..rows {
        out.push_str(&format!(
            "2024-01-{day:02},07{i:08},Agent {i},Billing,08:00:00,08:05:00,300,Resolved,{qrc},Mobile\n",
            day = i % 28 + 1,
            qrc = qrc(i),
        ));
    }
    out
}

#[derive(Debug, Default)]
pub struct SinkLog {
    pub opens: usize,
    pub closes: usize,
    pub commits: usize,
    /// Committed batches in commit order.
    pub batches: Vec<Vec<TargetRow>>,
}

impl SinkLog {
    pub fn committed_rows(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.iter().map(Vec::len).collect()
    }

    pub fn all_rows(&self) -> Vec<TargetRow> {
        self.batches.iter().flatten().cloned().collect()
    }
}

/// In-memory sink that records every committed batch.
#[derive(Default)]
pub struct RecordingSink {
    pub log: Rc<RefCell<SinkLog>>,
    pub refuse_connections: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing() -> Self {
        Self {
            refuse_connections: true,
            ..Self::default()
        }
    }
}

impl Sink for RecordingSink {
    fn describe(&self) -> String {
        "recording sink".to_string()
    }

    fn open(&self) -> IngestResult<Box<dyn Connection>> {
        if self.refuse_connections {
            return Err(IngestError::Connection("refused".to_string()));
        }
        self.log.borrow_mut().opens += 1;
        Ok(Box::new(RecordingConnection {
            log: Rc::clone(&self.log),
            pending: Vec::new(),
        }))
    }
}

struct RecordingConnection {
    log: Rc<RefCell<SinkLog>>,
    pending: Vec<TargetRow>,
}

impl Connection for RecordingConnection {
    fn execute_batch(&mut self, _sql: &str, rows: &[TargetRow]) -> Result<usize> {
        if rows.iter().any(|row| row.get("QRC") == Some(POISON)) {
            return Err(anyhow!("rejected poisoned row"));
        }
        self.pending.extend_from_slice(rows);
        Ok(rows.len())
    }

    fn commit(&mut self) -> Result<()> {
        let batch = std::mem::take(&mut self.pending);
        let mut log = self.log.borrow_mut();
        log.commits += 1;
        log.batches.push(batch);
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.log.borrow_mut().closes += 1;
        Ok(())
    }
}
