//! Streaming reader that yields a delimited file as bounded row batches.
//!
//! Rows are kept as raw text in the encoding the caller chose. Lines whose
//! field count disagrees with the header are dropped according to the
//! [`BadLinePolicy`]; only I/O failures and undecodable bytes end the stream
//! with an error.

use std::{
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use encoding_rs::Encoding;
use log::{debug, warn};

use crate::{
    config::BadLinePolicy,
    error::{IngestError, IngestResult},
    io_utils,
};

/// One bounded group of raw rows. `index` is 1-based within the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBatch {
    pub index: usize,
    pub rows: Vec<Vec<String>>,
}

impl RawBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub struct ChunkedReader<R: Read> {
    path: PathBuf,
    reader: csv::Reader<R>,
    encoding: &'static Encoding,
    headers: Vec<String>,
    batch_size: usize,
    policy: BadLinePolicy,
    record: csv::ByteRecord,
    batches: usize,
    skipped: usize,
    finished: bool,
}

impl ChunkedReader<BufReader<File>> {
    pub fn open(
        path: &Path,
        encoding: &'static Encoding,
        batch_size: usize,
        policy: BadLinePolicy,
    ) -> IngestResult<Self> {
        let reader = io_utils::open_csv_reader_from_path(path, io_utils::DEFAULT_DELIMITER)
            .map_err(|err| IngestError::read(path, format!("{err:#}")))?;
        Self::from_csv(path, reader, encoding, batch_size, policy)
    }
}

impl<R: Read> ChunkedReader<R> {
    pub fn from_reader(
        label: &Path,
        reader: R,
        encoding: &'static Encoding,
        batch_size: usize,
        policy: BadLinePolicy,
    ) -> IngestResult<Self> {
        let reader = io_utils::open_csv_reader(reader, io_utils::DEFAULT_DELIMITER);
        Self::from_csv(label, reader, encoding, batch_size, policy)
    }

    fn from_csv(
        path: &Path,
        mut reader: csv::Reader<R>,
        encoding: &'static Encoding,
        batch_size: usize,
        policy: BadLinePolicy,
    ) -> IngestResult<Self> {
        let headers = io_utils::reader_headers(&mut reader, encoding)
            .map_err(|err| IngestError::read(path, format!("header row: {err:#}")))?;
        if headers.is_empty() {
            return Err(IngestError::read(path, "no header row"));
        }
        Ok(ChunkedReader {
            path: path.to_path_buf(),
            reader,
            encoding,
            headers,
            batch_size: batch_size.max(1),
            policy,
            record: csv::ByteRecord::new(),
            batches: 0,
            skipped: 0,
            finished: false,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of malformed lines dropped so far.
    pub fn skipped_lines(&self) -> usize {
        self.skipped
    }

    fn note_malformed(&mut self) {
        self.skipped += 1;
        let line = self
            .record
            .position()
            .map(|pos| pos.line())
            .unwrap_or_default();
        let expected = self.headers.len();
        let found = self.record.len();
        match self.policy {
            BadLinePolicy::Skip => debug!(
                "Skipping line {line} of {:?}: expected {expected} field(s), found {found}",
                self.path
            ),
            BadLinePolicy::Warn => warn!(
                "Skipping line {line} of {:?}: expected {expected} field(s), found {found}",
                self.path
            ),
        }
    }

    fn fail(&mut self, message: String) -> Option<IngestResult<RawBatch>> {
        self.finished = true;
        Some(Err(IngestError::read(&self.path, message)))
    }
}

impl<R: Read> Iterator for ChunkedReader<R> {
    type Item = IngestResult<RawBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let mut rows = Vec::with_capacity(self.batch_size.min(1024));
        while rows.len() < self.batch_size {
            match self.reader.read_byte_record(&mut self.record) {
                Ok(true) => {
                    if self.record.len() != self.headers.len() {
                        self.note_malformed();
                        continue;
                    }
                    match io_utils::decode_record(&self.record, self.encoding) {
                        Ok(values) => rows.push(values),
                        Err(err) => {
                            let line = self
                                .record
                                .position()
                                .map(|pos| pos.line())
                                .unwrap_or_default();
                            return self.fail(format!("line {line}: {err:#}"));
                        }
                    }
                }
                Ok(false) => {
                    self.finished = true;
                    break;
                }
                Err(err) => return self.fail(err.to_string()),
            }
        }
        if rows.is_empty() {
            return None;
        }
        self.batches += 1;
        Some(Ok(RawBatch {
            index: self.batches,
            rows,
        }))
    }
}
