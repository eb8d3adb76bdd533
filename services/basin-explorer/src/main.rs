//! Basin explorer command line.
//!
//! - `run`: execute a workflow file end to end
//! - `collections`: list the collections of a STAC catalog
//! - `search`: print the ids of matching items as pages arrive

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use basin_common::{BoundingBox, CrsCode, DateRange, Footprint, OverwritePolicy};
use basin_explorer::{Pipeline, WorkflowConfig};
use catalog::{StacClient, StacClientOptions};
use stac_protocol::{AttributeFilter, ItemSearch};

#[derive(Parser, Debug)]
#[command(name = "basin-explorer")]
#[command(about = "Explore a river basin: boundary, rivers and STAC rasters clipped to it")]
struct Args {
    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a workflow file
    Run {
        /// Workflow YAML
        #[arg(short, long, env = "BASIN_WORKFLOW")]
        config: PathBuf,

        /// Override output_dir from the workflow file
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Re-download files already present in storage
        #[arg(long)]
        overwrite: bool,
    },

    /// List catalog collections
    Collections {
        /// STAC API root
        #[arg(long, env = "STAC_URL")]
        catalog: String,

        /// Request timeout in seconds
        #[arg(long, default_value = "60")]
        timeout: u64,
    },

    /// Search a collection and print item ids
    Search {
        /// STAC API root
        #[arg(long, env = "STAC_URL")]
        catalog: String,

        #[arg(long)]
        collection: String,

        /// minx,miny,maxx,maxy in lon/lat
        #[arg(long)]
        bbox: Option<String>,

        /// Interval such as 2030-01-01/2030-12-31
        #[arg(long)]
        datetime: Option<String>,

        /// Property equality, repeatable: --query cmip6:model=ACCESS-CM2
        #[arg(long = "query")]
        queries: Vec<String>,

        /// Stop after this many items
        #[arg(long)]
        limit: Option<usize>,

        /// Request timeout in seconds
        #[arg(long, default_value = "60")]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level, args.log_json)?;

    match args.command {
        Command::Run {
            config,
            output_dir,
            overwrite,
        } => run(config, output_dir, overwrite).await,
        Command::Collections { catalog, timeout } => collections(&catalog, timeout).await,
        Command::Search {
            catalog,
            collection,
            bbox,
            datetime,
            queries,
            limit,
            timeout,
        } => {
            let search = build_search(&collection, bbox.as_deref(), datetime.as_deref(), &queries)?;
            search_items(&catalog, search, limit, timeout).await
        }
    }
}

fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);
    if json {
        tracing::subscriber::set_global_default(builder.with_thread_ids(true).json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

async fn run(config_path: PathBuf, output_dir: Option<PathBuf>, overwrite: bool) -> Result<()> {
    let mut config = WorkflowConfig::load(&config_path)?;
    if let Some(dir) = output_dir {
        config.output_dir = dir;
    }
    if overwrite {
        config.storage.overwrite = OverwritePolicy::Overwrite;
    }

    info!(
        config = %config_path.display(),
        output_dir = %config.output_dir.display(),
        layers = config.layers.len(),
        "Starting basin workflow"
    );

    let pipeline = Pipeline::new(config)?;
    let summary = pipeline.run().await?;

    println!(
        "Basin {} ({} river ways, {:?})",
        summary.basin.label, summary.rivers.ways, summary.rivers.status
    );
    for layer in &summary.layers {
        println!(
            "  {}: {} item(s), {}x{} cells, mean {}",
            layer.name,
            layer.items.len(),
            layer.width,
            layer.height,
            layer
                .stats
                .mean
                .map(|m| format!("{:.3}", m))
                .unwrap_or_else(|| "n/a".to_string())
        );
    }
    for file in &summary.files {
        println!("  wrote {}", file.display());
    }
    Ok(())
}

fn client(catalog: &str, timeout: u64, max_items: Option<usize>) -> Result<StacClient> {
    let options = StacClientOptions {
        request_timeout: Duration::from_secs(timeout),
        max_items,
        ..StacClientOptions::default()
    };
    StacClient::new(catalog, options).with_context(|| format!("Invalid catalog URL: {}", catalog))
}

async fn collections(catalog: &str, timeout: u64) -> Result<()> {
    let collections = client(catalog, timeout, None)?.list_collections().await?;
    for collection in &collections {
        println!("{}\t{}", collection.id, collection.title.as_deref().unwrap_or(""));
    }
    info!(count = collections.len(), "Listed collections");
    Ok(())
}

fn build_search(
    collection: &str,
    bbox: Option<&str>,
    datetime: Option<&str>,
    queries: &[String],
) -> Result<ItemSearch> {
    let mut search = ItemSearch::new([collection]);
    if let Some(bbox) = bbox {
        let bbox = BoundingBox::parse(bbox).with_context(|| format!("Invalid --bbox '{}'", bbox))?;
        search = search.intersects(Footprint::from_bbox(&bbox, CrsCode::Epsg4326));
    }
    if let Some(datetime) = datetime {
        let range = DateRange::parse(datetime).with_context(|| format!("Invalid --datetime '{}'", datetime))?;
        search = search.datetime(range);
    }
    for query in queries {
        let filter = AttributeFilter::parse(query).with_context(|| format!("Invalid --query '{}'", query))?;
        search = search.filter(filter);
    }
    Ok(search)
}

async fn search_items(catalog: &str, search: ItemSearch, limit: Option<usize>, timeout: u64) -> Result<()> {
    info!(search = %search.describe(), "Searching catalog");
    let mut items = client(catalog, timeout, limit)?.search(search)?;
    let mut count = 0usize;
    while let Some(item) = items.next().await {
        let item = item?;
        let datetime = item.datetime().map(|d| d.to_rfc3339()).unwrap_or_default();
        println!("{}\t{}", item.id, datetime);
        count += 1;
    }
    info!(count, "Search complete");
    Ok(())
}
