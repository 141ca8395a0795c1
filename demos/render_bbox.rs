use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use osm_canvas::{Bounds, MapConfig, MapSession, OsmCanvasError};

#[derive(Parser)]
#[command(name = "osm-render-bbox")]
#[command(about = "Fetch an OpenStreetMap bounding box and render its ways to a PNG")]
struct Args {
    /// Bounding box as min_lon,min_lat,max_lon,max_lat
    #[arg(
        short,
        long,
        default_value = "-47.889,-22.010,-47.880,-22.001",
        allow_hyphen_values = true
    )]
    bbox: String,

    /// Image width in pixels (defaults to the configured viewport)
    #[arg(long)]
    width: Option<u32>,

    /// Image height in pixels (defaults to the configured viewport)
    #[arg(long)]
    height: Option<u32>,

    /// Output PNG file path
    #[arg(short, long, default_value = "map.png")]
    output: String,

    /// API root, e.g. https://api.openstreetmap.org/api/0.6
    #[arg(long)]
    base_url: Option<String>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_bbox(value: &str) -> Result<Bounds, String> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("Invalid bbox '{}': {}", value, e))?;

    match parts.as_slice() {
        [min_lon, min_lat, max_lon, max_lat] => {
            Ok(Bounds::new(*min_lon, *max_lon, *min_lat, *max_lat))
        }
        _ => Err(format!(
            "Invalid bbox '{}': expected min_lon,min_lat,max_lon,max_lat",
            value
        )),
    }
}

fn load_config(args: &Args) -> Result<MapConfig, String> {
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read {}: {}", path, e))?;
            MapConfig::from_json(&json).map_err(|e| e.to_string())?
        }
        None => MapConfig::default(),
    };

    if let Some(base_url) = &args.base_url {
        config = config.with_base_url(base_url.clone());
    }

    let width = args.width.unwrap_or(config.viewport.width);
    let height = args.height.unwrap_or(config.viewport.height);
    Ok(config.with_viewport(width, height))
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let bbox = parse_bbox(&args.bbox)?;
    let config = load_config(&args)?;

    info!("🌍 OSM bbox renderer starting...");
    info!("🔌 API: {}", config.api.base_url);
    info!("📍 Bounding box: {}", bbox.to_query());
    info!("📐 Approximate area: {:.2} km²", bbox.area_km2());
    info!(
        "🖼️  Output: {} ({}x{})",
        args.output, config.viewport.width, config.viewport.height
    );

    let mut session = MapSession::from_config(&config).map_err(|e| e.to_string())?;

    match session.login().await {
        Ok(capabilities) => {
            info!("✅ Logged in, API version {}", capabilities.version_minimum);
            if let Some(area) = capabilities.area_maximum {
                info!("  - Max area: {} square degrees", area);
            }
        }
        Err(OsmCanvasError::UnsupportedVersion { expected, found }) => {
            error!("❌ Server speaks API {}, this tool needs {}", found, expected);
            return Err("Unsupported API version".to_string());
        }
        Err(e) => {
            error!("❌ Login failed: {}", e);
            return Err(e.to_string());
        }
    }

    info!("⬇️  Fetching map data...");
    let loaded = match session.load(&bbox).await {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("❌ Failed to load map: {}", e);
            return Err(e.to_string());
        }
    };
    info!(
        "📊 {} nodes, {} ways fetched at {} in {:.1}s",
        loaded.metadata.node_count,
        loaded.metadata.way_count,
        loaded.metadata.fetched_at,
        loaded.metadata.processing_time_ms as f64 / 1000.0
    );

    match session.export_png(&args.output) {
        Ok(Some(stats)) => {
            info!(
                "💾 Rendered {} ways ({} segments) to {}",
                stats.ways_drawn, stats.segments, args.output
            );
            if stats.ways_skipped > 0 {
                warn!("⚠️  Skipped {} ways with a single node", stats.ways_skipped);
            }
            Ok(())
        }
        Ok(None) => Err("No map loaded".to_string()),
        Err(e) => {
            error!("❌ Failed to export PNG: {}", e);
            Err(e.to_string())
        }
    }
}
