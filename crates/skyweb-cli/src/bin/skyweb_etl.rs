//! SIA export pipeline: import → reference store → map tiles.
//!
//! Usage:
//!   cargo run -p skyweb-cli --bin skyweb-etl -- --xml-path export.xml --cycle 2401

use anyhow::{Context, Result};
use clap::Parser;
use skyweb_cli::init_tracing;
use skyweb_refdb::{parse_file, Config, DatabaseBuilder, TileGenerator};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Build the SkyWeb reference store from an SIA XML export")]
struct Args {
    /// SIA XML export
    #[arg(long)]
    xml_path: PathBuf,

    /// Publication cycle label (defaults to SKYWEB_CYCLE)
    #[arg(long)]
    cycle: Option<String>,

    /// Output directory for the store and tiles (defaults to SKYWEB_OUTPUT_DIR)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Build the store only
    #[arg(long)]
    skip_tiles: bool,

    /// Highest tile zoom level (defaults to SKYWEB_MAX_ZOOM)
    #[arg(long)]
    max_zoom: Option<u8>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;

    let mut config = Config::from_env();
    if let Some(cycle) = args.cycle {
        config.cycle = cycle;
    }
    if let Some(output) = args.output {
        config.output_dir = output;
    }
    if let Some(max_zoom) = args.max_zoom {
        config.max_zoom = max_zoom;
    }

    info!("Importing {}", args.xml_path.display());
    let data = parse_file(&args.xml_path).with_context(|| format!("importing {}", args.xml_path.display()))?;

    let report = DatabaseBuilder::new(&config.output_dir, &config.cycle)
        .build(&data)
        .await?;

    let tiles = if args.skip_tiles {
        info!("Skipping tile generation");
        None
    } else {
        let count = TileGenerator::new(&report.db_path, &config.output_dir, &config.cycle)
            .with_max_zoom(config.max_zoom)
            .generate_all()
            .await?;
        Some(count)
    };

    let summary = serde_json::json!({
        "build": report,
        "tiles": tiles,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
