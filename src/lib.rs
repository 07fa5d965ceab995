pub mod chunks;
pub mod cli;
pub mod config;
pub mod convert;
pub mod error;
pub mod io_utils;
pub mod loader;
pub mod pipeline;
pub mod schema;
pub mod sink;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::{
    cli::{Cli, Commands},
    sink::SinkConfig,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("qrc_loader", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => handle_run(&args),
        Commands::Convert(args) => handle_convert(&args),
        Commands::Discover(args) => handle_discover(&args),
    }
}

fn handle_run(args: &cli::RunArgs) -> Result<()> {
    let config = config::resolve_run(args).context("Resolving configuration")?;
    info!(
        "Watching {:?} (archive {:?}, conversions {:?}, batch size {})",
        config.source_dir,
        config.archive_dir(),
        config.conversion_dir(),
        config.batch_size
    );
    let sink_config = SinkConfig::resolve(&config)?;
    let sink = sink_config.build();
    let summary = pipeline::run(&config, sink.as_ref())?;
    if !summary.is_empty() {
        print!("{}", summary.render());
    }
    Ok(())
}

fn handle_convert(args: &cli::ConvertArgs) -> Result<()> {
    let output_dir = match &args.output_dir {
        Some(dir) => dir.clone(),
        None => args
            .input
            .parent()
            .map(|parent| parent.join(config::CONVERSION_DIR_NAME))
            .unwrap_or_else(|| config::CONVERSION_DIR_NAME.into()),
    };
    let written = convert::convert_to_csv(&args.input, &output_dir)?;
    println!("{}", written.display());
    Ok(())
}

fn handle_discover(args: &cli::DiscoverArgs) -> Result<()> {
    let config = config::resolve_source(&args.source).context("Resolving configuration")?;
    let legacy = config.legacy_encoding()?;
    let files = pipeline::discover(&config.source_dir)?;
    if files.is_empty() {
        info!("No CSV/XLS/XLSX files found in {:?}", config.source_dir);
        return Ok(());
    }
    let headers = ["#", "file", "format", "encoding"]
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let rows = files
        .iter()
        .enumerate()
        .map(|(idx, file)| {
            vec![
                (idx + 1).to_string(),
                file.file_name(),
                file.format.label().to_string(),
                file.format.load_encoding(legacy).name().to_string(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows, &[0]);
    info!("{} candidate file(s) in {:?}", files.len(), config.source_dir);
    Ok(())
}
