//! Database sink contract and the drivers compiled into the binary.
//!
//! The pipeline only sees [`Sink`] and [`Connection`]. Driver selection happens
//! once, before the run, by probing the configured preference list against
//! [`available_drivers`] and producing a [`SinkConfig`].

use std::{fmt, path::PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use rusqlite::params_from_iter;

use crate::{
    config::LoaderConfig,
    error::{IngestError, IngestResult},
    schema::{self, TargetRow},
};

/// An open session against the target table.
pub trait Connection {
    /// Inserts `rows` with the parameterized `sql` statement inside the current
    /// transaction. On failure nothing from this call remains pending.
    fn execute_batch(&mut self, sql: &str, rows: &[TargetRow]) -> Result<usize>;

    fn commit(&mut self) -> Result<()>;

    fn close(self: Box<Self>) -> Result<()>;
}

pub trait Sink {
    /// Human-readable target, used in progress output.
    fn describe(&self) -> String;

    fn open(&self) -> IngestResult<Box<dyn Connection>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Sqlite,
}

impl Driver {
    pub fn name(self) -> &'static str {
        match self {
            Driver::Sqlite => "sqlite",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(Driver::Sqlite),
            _ => None,
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn available_drivers() -> Vec<Driver> {
    vec![Driver::Sqlite]
}

/// Fully resolved sink settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    pub driver: Driver,
    pub database: PathBuf,
    pub table: String,
    pub create_table: bool,
}

impl SinkConfig {
    /// Picks the first preferred driver that is available.
    pub fn resolve(config: &LoaderConfig) -> IngestResult<Self> {
        let available = available_drivers();
        let picked = config
            .sink
            .drivers
            .iter()
            .filter_map(|name| Driver::from_name(name))
            .find(|driver| available.contains(driver))
            .ok_or_else(|| {
                let installed = available
                    .iter()
                    .map(|driver| driver.name())
                    .collect::<Vec<_>>()
                    .join(", ");
                IngestError::Connection(format!(
                    "no suitable driver among {:?}; installed: [{installed}]",
                    config.sink.drivers
                ))
            })?;
        info!("Using driver: {picked}");
        Ok(SinkConfig {
            driver: picked,
            database: config.sink.database.clone(),
            table: config.table.clone(),
            create_table: config.sink.create_table,
        })
    }

    pub fn build(&self) -> Box<dyn Sink> {
        match self.driver {
            Driver::Sqlite => Box::new(SqliteSink::new(self.clone())),
        }
    }
}

/// Double-quotes each dot-separated part of an identifier.
pub fn quote_identifier(identifier: &str) -> String {
    identifier
        .split('.')
        .map(|part| format!("\"{}\"", part.trim().replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

/// Parameterized insert over the ten canonical columns.
pub fn insert_statement(table: &str) -> String {
    let columns = schema::canonical_names()
        .map(quote_identifier)
        .collect::<Vec<_>>()
        .join(",");
    let placeholders = vec!["?"; schema::COLUMN_COUNT].join(",");
    format!(
        "INSERT INTO {} ({columns}) VALUES ({placeholders})",
        quote_identifier(table)
    )
}

pub fn create_table_statement(table: &str) -> String {
    let columns = schema::CANONICAL_COLUMNS
        .iter()
        .map(|column| format!("{} TEXT", quote_identifier(column.name)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({columns})",
        quote_identifier(table)
    )
}

pub struct SqliteSink {
    config: SinkConfig,
}

impl SqliteSink {
    pub fn new(config: SinkConfig) -> Self {
        SqliteSink { config }
    }

    fn connect(&self) -> Result<rusqlite::Connection> {
        let path = &self.config.database;
        let conn = rusqlite::Connection::open(path)
            .with_context(|| format!("Opening SQLite database {path:?}"))?;
        conn.busy_timeout(std::time::Duration::from_secs(30))
            .context("Setting busy timeout")?;
        let probe: i64 = conn
            .query_row("SELECT 1", [], |row| row.get(0))
            .context("Probing connection with SELECT 1")?;
        debug!("Connection probe returned {probe}");
        if self.config.create_table {
            conn.execute_batch(&create_table_statement(&self.config.table))
                .with_context(|| format!("Creating table {}", self.config.table))?;
        }
        Ok(conn)
    }
}

impl Sink for SqliteSink {
    fn describe(&self) -> String {
        format!(
            "{} (table {})",
            self.config.database.display(),
            self.config.table
        )
    }

    fn open(&self) -> IngestResult<Box<dyn Connection>> {
        info!("Connecting to: {}", self.describe());
        let conn = self
            .connect()
            .map_err(|err| IngestError::Connection(format!("{err:#}")))?;
        Ok(Box::new(SqliteConnection {
            conn,
            in_transaction: false,
        }))
    }
}

pub struct SqliteConnection {
    conn: rusqlite::Connection,
    in_transaction: bool,
}

impl SqliteConnection {
    fn rollback(&mut self) {
        if self.in_transaction {
            if let Err(err) = self.conn.execute_batch("ROLLBACK") {
                debug!("Rollback failed: {err}");
            }
            self.in_transaction = false;
        }
    }
}

fn insert_rows(conn: &rusqlite::Connection, sql: &str, rows: &[TargetRow]) -> Result<usize> {
    let mut statement = conn
        .prepare_cached(sql)
        .context("Preparing insert statement")?;
    for (idx, row) in rows.iter().enumerate() {
        statement
            .execute(params_from_iter(row.fields().iter()))
            .with_context(|| format!("Inserting row {} of batch", idx + 1))?;
    }
    Ok(rows.len())
}

impl Connection for SqliteConnection {
    fn execute_batch(&mut self, sql: &str, rows: &[TargetRow]) -> Result<usize> {
        if !self.in_transaction {
            self.conn
                .execute_batch("BEGIN")
                .context("Starting transaction")?;
            self.in_transaction = true;
        }
        let result = insert_rows(&self.conn, sql, rows);
        if result.is_err() {
            self.rollback();
        }
        result
    }

    fn commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        match self.conn.execute_batch("COMMIT") {
            Ok(()) => {
                self.in_transaction = false;
                Ok(())
            }
            Err(err) => {
                // A failed COMMIT leaves the transaction open; discard it so the
                // next batch starts clean.
                self.rollback();
                Err(err).context("Committing transaction")
            }
        }
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.rollback();
        self.conn
            .close()
            .map_err(|(_, err)| err)
            .context("Closing SQLite connection")
    }
}
