use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;

use strava_explorer::{
    config, database, ActivityFilter, Config, ExplorerMap, SquareCheck, TrackCollection, Viewport,
};

mod map_server;

#[derive(Debug, Parser)]
#[command(name = "strava_explorer", about = "Explorer tiles and best square from GPS tracks")]
struct Cli {
    /// SQLite track store (overrides EXPLORER_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Directory with .gpx/.json track files (overrides EXPLORER_TRACK_DIR)
    #[arg(long, global = true)]
    track_dir: Option<PathBuf>,

    /// How squares are verified: boundary or filled (overrides EXPLORER_SQUARE_CHECK)
    #[arg(long, global = true)]
    square_check: Option<SquareCheck>,

    /// Comma-separated activity types, e.g. "Run,Hike" (overrides EXPLORER_ACTIVITIES)
    #[arg(long, global = true)]
    activities: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest new track files into the store
    Import,
    /// Serve tile overlay data over HTTP
    Serve {
        /// Listen address (overrides EXPLORER_BIND)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print tile count and best square as JSON
    Summary,
    /// Print rendering instructions for a viewport as JSON
    Visible {
        #[arg(long, allow_hyphen_values = true)]
        south: f64,
        #[arg(long, allow_hyphen_values = true)]
        west: f64,
        #[arg(long, allow_hyphen_values = true)]
        north: f64,
        #[arg(long, allow_hyphen_values = true)]
        east: f64,
    },
}

fn apply_overrides(cli: &Cli, mut config: Config) -> strava_explorer::Result<Config> {
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    if let Some(dir) = &cli.track_dir {
        config.track_dir = dir.clone();
    }
    if let Some(check) = cli.square_check {
        config.square_check = check;
    }
    if let Some(list) = &cli.activities {
        config.activities = ActivityFilter::parse(list);
    }
    if let Command::Serve { bind: Some(bind) } = &cli.command {
        config.bind = config::parse_bind(bind)?;
    }
    Ok(config)
}

/// Import pending files and return the full track collection.
fn load_collection(config: &Config) -> strava_explorer::Result<TrackCollection> {
    let mut conn = database::init_db(&config.db_path)?;
    let added = database::import_dir(&mut conn, &config.track_dir)?;
    if added > 0 {
        info!("Added {} new tracks", added);
    }
    Ok(TrackCollection::new(database::load_tracks(&conn)?))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = apply_overrides(&cli, Config::from_env()?)?;

    match cli.command {
        Command::Import => {
            let mut conn = database::init_db(&config.db_path)?;
            let added = database::import_dir(&mut conn, &config.track_dir)?;
            println!(
                "Imported {} tracks ({} total)",
                added,
                database::track_count(&conn)?
            );
        }
        Command::Serve { .. } => {
            return map_server::serve_map_server(config).await;
        }
        Command::Summary => {
            let tracks = load_collection(&config)?;
            let mut explorer = ExplorerMap::new(config.cache_capacity, config.square_check);
            let snapshot = explorer.snapshot(&tracks, &config.activities);
            let summary = serde_json::json!({
                "tracks": snapshot.track_count,
                "tiles": snapshot.covered.len(),
                "square_check": config.square_check,
                "max_square": {
                    "size": snapshot.cluster.size,
                    "origin": snapshot.cluster.origin,
                    "bounds": snapshot.cluster.bounds().map(|b| b.as_corners()),
                },
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Visible {
            south,
            west,
            north,
            east,
        } => {
            let viewport = Viewport::from_edges(south, west, north, east)?;
            let tracks = load_collection(&config)?;
            let mut explorer = ExplorerMap::new(config.cache_capacity, config.square_check);
            let (_, tiles) = explorer.render(&tracks, &config.activities, &viewport);
            println!("{}", serde_json::to_string_pretty(&tiles)?);
        }
    }

    Ok(())
}
