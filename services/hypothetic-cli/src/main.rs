//! Command-line front-end for hypothetic sources.
//!
//! Loads a YAML catalog, opens one source and prints what was asked for as
//! JSON on stdout:
//! - `--list-sources`: names of every source in the catalog
//! - `--show-metadata`: the enumerated metadata table (one row per object)
//! - `--schema`: shapes, dimensions and partition count (the default)
//! - `--partition '[1,0,0]'`: the values of one partition

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use cube_reader::Grib2CubeReader;
use hypothetic::{Catalog, HypotheticSource, KeyGeneratorRegistry, PartitionIndex};
use storage::RemoteAccess;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Parser, Debug)]
#[command(name = "hypothetic")]
#[command(about = "Assemble many remote cube files into one lazily loaded dataset")]
struct Args {
    /// Catalog file (YAML, `${VAR}` substitution applied)
    #[arg(long, env = "HYPOTHETIC_CATALOG", default_value = "catalog.yaml")]
    catalog: PathBuf,

    /// Source to open
    #[arg(short, long, env = "HYPOTHETIC_SOURCE")]
    source: Option<String>,

    /// Print the catalog's source names and exit
    #[arg(long)]
    list_sources: bool,

    /// Print the metadata table
    #[arg(long)]
    show_metadata: bool,

    /// Print the dataset schema
    #[arg(long)]
    schema: bool,

    /// Read one partition, given as a JSON list of indices
    #[arg(long)]
    partition: Option<String>,

    /// Directory for temporary local copies
    #[arg(long, env = "HYPOTHETIC_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "json")]
    log_format: LogFormat,
}

#[derive(Serialize)]
struct PartitionOutput {
    index: PartitionIndex,
    shape: Vec<usize>,
    values: Vec<f32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args)?;

    let catalog = Catalog::load(&args.catalog)
        .with_context(|| format!("failed to load catalog {}", args.catalog.display()))?;

    if args.list_sources {
        let names: Vec<&str> = catalog.names().collect();
        print_json(&json!(names))?;
        return Ok(());
    }

    let Some(name) = args.source.as_deref() else {
        bail!("--source is required unless --list-sources is given");
    };
    let config = catalog.source(name)?.clone();

    // Partition indices are validated before anything is fetched
    let partition = args
        .partition
        .as_deref()
        .map(|raw| raw.parse::<PartitionIndex>())
        .transpose()
        .context("invalid --partition")?;

    let mut fetcher = RemoteAccess::new().context("failed to create remote access")?;
    if let Some(dir) = &args.temp_dir {
        fetcher = fetcher.with_temp_dir(dir);
    }

    let mut source = HypotheticSource::new(
        name,
        config,
        Arc::new(KeyGeneratorRegistry::new()),
        Arc::new(fetcher),
        Arc::new(Grib2CubeReader::new()),
    )?;

    info!(source = %name, catalog = %args.catalog.display(), "Opening source");
    source
        .open()
        .await
        .with_context(|| format!("failed to open source '{}'", name))?;

    let mut output = Map::new();
    if args.show_metadata {
        output.insert("metadata".into(), serde_json::to_value(source.metadata_table())?);
    }
    if args.schema || (!args.show_metadata && partition.is_none()) {
        output.insert("schema".into(), serde_json::to_value(source.schema().await?)?);
    }
    if let Some(index) = partition {
        let block = source
            .read_partition(&index)
            .await
            .with_context(|| format!("failed to read partition {}", index))?;
        let partition = PartitionOutput {
            index,
            shape: block.shape().to_vec(),
            values: block.iter().copied().collect(),
        };
        output.insert("partition".into(), serde_json::to_value(partition)?);
    }

    print_json(&Value::Object(output))?;
    source.close();
    Ok(())
}

fn init_tracing(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so stdout stays valid JSON
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    match args.log_format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
    }
    Ok(())
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
