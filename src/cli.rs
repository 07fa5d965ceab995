use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::BadLinePolicy;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Load CSV and spreadsheet drops into the QRC table",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load every candidate file in the source directory and archive the ones that succeed
    Run(RunArgs),
    /// Convert the first sheet of a spreadsheet into a UTF-8 CSV
    Convert(ConvertArgs),
    /// List candidate files in the order a run would process them
    Discover(DiscoverArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct SourceArgs {
    /// YAML configuration file; flags given on the command line take precedence
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Directory watched for .csv, .xls and .xlsx drops
    #[arg(short = 's', long = "source-dir")]
    pub source_dir: Option<PathBuf>,
    /// Directory receiving spreadsheet conversions (defaults to <source-dir>/converted)
    #[arg(long = "conversion-dir")]
    pub conversion_dir: Option<PathBuf>,
    /// Character encoding of raw CSV drops (defaults to windows-1252)
    #[arg(long = "legacy-encoding")]
    pub legacy_encoding: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Directory receiving successfully loaded originals (defaults to <source-dir>/processed)
    #[arg(long = "archive-dir")]
    pub archive_dir: Option<PathBuf>,
    /// Target database file
    #[arg(short, long)]
    pub database: Option<PathBuf>,
    /// Target table identifier
    #[arg(short, long)]
    pub table: Option<String>,
    /// Maximum rows inserted and committed per batch
    #[arg(long = "batch-size")]
    pub batch_size: Option<usize>,
    /// What to do with lines whose field count does not match the header
    #[arg(long = "bad-lines", value_enum)]
    pub bad_lines: Option<BadLinePolicy>,
    /// Preferred sink drivers in priority order
    #[arg(long = "driver", action = clap::ArgAction::Append)]
    pub drivers: Vec<String>,
    /// Create the target table when it does not exist yet
    #[arg(long = "create-table")]
    pub create_table: bool,
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Spreadsheet (.xls or .xlsx) to convert
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Directory for the converted CSV (defaults to a `converted` folder beside the input)
    #[arg(short = 'o', long = "output-dir")]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}
