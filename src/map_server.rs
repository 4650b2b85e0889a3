use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use log::{error, info};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::net::TcpListener;

use strava_explorer::{
    database, ActivityFilter, Config, ExplorerMap, ExplorerStats, RenderTile, SquareCheck,
    TileIndex, TrackCollection, Viewport,
};

/// State shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    tracks: Arc<RwLock<Arc<TrackCollection>>>,
    explorer: Arc<Mutex<ExplorerMap>>,
    config: Arc<Config>,
}

type ApiError = (StatusCode, String);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    error!("Request failed: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

impl AppState {
    /// Wrap an open track store, loading its tracks into memory.
    pub fn new(conn: Connection, config: Config) -> strava_explorer::Result<Self> {
        let tracks = database::load_tracks(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            tracks: Arc::new(RwLock::new(Arc::new(TrackCollection::new(tracks)))),
            explorer: Arc::new(Mutex::new(ExplorerMap::new(
                config.cache_capacity,
                config.square_check,
            ))),
            config: Arc::new(config),
        })
    }

    fn current_tracks(&self) -> Arc<TrackCollection> {
        let guard = self.tracks.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    fn filter(&self, activities: Option<&str>) -> ActivityFilter {
        match activities {
            Some(list) => ActivityFilter::parse(list),
            None => self.config.activities.clone(),
        }
    }
}

/// JSON endpoints consumed by the map overlay.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tiles", get(list_visible_tiles))
        .route("/square-cluster", get(get_square_cluster))
        .route("/stats", get(get_stats))
        .route("/import", post(import_tracks))
        .with_state(state)
}

/// Import pending track files, then serve until the process is stopped.
pub async fn serve_map_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = database::init_db(&config.db_path)?;

    info!("Processing track files in {}...", config.track_dir.display());
    let new_tracks = database::import_dir(&mut conn, &config.track_dir)?;
    if new_tracks > 0 {
        info!("Added {} new tracks", new_tracks);
    }
    info!("Total tracks in database: {}", database::track_count(&conn)?);

    let bind = config.bind;
    let app = router(AppState::new(conn, config)?);

    let listener = TcpListener::bind(bind).await?;
    info!("Map server running at http://{}", bind);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Viewport edges in degrees, as reported by the map.
#[derive(Debug, Deserialize)]
pub struct TilesQuery {
    south: f64,
    west: f64,
    north: f64,
    east: f64,
    #[serde(default)]
    activities: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FilterQuery {
    #[serde(default)]
    activities: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SquareGeometry {
    size: u32,
    origin: TileIndex,
    /// `[[south, west], [north, east]]`, absent when no square exists
    bounds: Option<[[f64; 2]; 2]>,
    square_check: SquareCheck,
}

#[derive(Debug, Serialize)]
pub struct TilesResponse {
    tiles: Vec<RenderTile>,
    visible_count: usize,
    total_count: usize,
    max_square: SquareGeometry,
}

fn square_geometry(cluster: &strava_explorer::Cluster, check: SquareCheck) -> SquareGeometry {
    SquareGeometry {
        size: cluster.size,
        origin: cluster.origin,
        bounds: cluster.bounds().map(|b| b.as_corners()),
        square_check: check,
    }
}

/// Covered tiles inside the viewport plus the current best square.
async fn list_visible_tiles(
    State(state): State<AppState>,
    Query(query): Query<TilesQuery>,
) -> Result<Json<TilesResponse>, ApiError> {
    let viewport = Viewport::from_edges(query.south, query.west, query.north, query.east)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let filter = state.filter(query.activities.as_deref());
    let tracks = state.current_tracks();

    let mut explorer = lock(&state.explorer);
    let (snapshot, tiles) = explorer.render(&tracks, &filter, &viewport);

    Ok(Json(TilesResponse {
        visible_count: tiles.len(),
        total_count: snapshot.covered.len(),
        max_square: square_geometry(&snapshot.cluster, explorer.square_check()),
        tiles,
    }))
}

/// Best square for the selected activities.
async fn get_square_cluster(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Json<SquareGeometry> {
    let filter = state.filter(query.activities.as_deref());
    let tracks = state.current_tracks();

    let mut explorer = lock(&state.explorer);
    let snapshot = explorer.snapshot(&tracks, &filter);
    Json(square_geometry(&snapshot.cluster, explorer.square_check()))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    track_count: usize,
    selected_tracks: usize,
    tile_count: usize,
    max_square: u32,
    activities: String,
    cache: ExplorerStats,
}

/// Track, tile and cache counters.
async fn get_stats(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Json<StatsResponse> {
    let filter = state.filter(query.activities.as_deref());
    let tracks = state.current_tracks();

    let mut explorer = lock(&state.explorer);
    let snapshot = explorer.snapshot(&tracks, &filter);
    Json(StatsResponse {
        track_count: tracks.len(),
        selected_tracks: snapshot.track_count,
        tile_count: snapshot.covered.len(),
        max_square: snapshot.cluster.size,
        activities: filter.to_string(),
        cache: explorer.stats(),
    })
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    success: bool,
    message: String,
    imported: usize,
    track_count: usize,
}

/// Re-scan the track directory and swap in the updated collection.
async fn import_tracks(State(state): State<AppState>) -> Result<Json<ImportResponse>, ApiError> {
    let (imported, tracks) = {
        let mut conn = lock(&state.db);
        let imported = database::import_dir(&mut conn, &state.config.track_dir).map_err(internal)?;
        let tracks = database::load_tracks(&conn).map_err(internal)?;
        (imported, tracks)
    };

    let collection = Arc::new(TrackCollection::new(tracks));
    let track_count = collection.len();
    {
        let mut guard = state.tracks.write().unwrap_or_else(PoisonError::into_inner);
        *guard = collection;
    }

    info!("Import finished: {} new tracks, {} total", imported, track_count);
    Ok(Json(ImportResponse {
        success: true,
        message: format!("{} tracks imported", imported),
        imported,
        track_count,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use strava_explorer::{ActivityType, GeoPoint, Track};

    fn state_with(tracks: &[Track], config: Config) -> AppState {
        let mut conn = database::init_memory_db().unwrap();
        database::insert_tracks(&mut conn, tracks).unwrap();
        AppState::new(conn, config).unwrap()
    }

    fn square_run() -> Track {
        // Four points in the four tiles of a 2x2 block at the equator.
        Track::new(
            "square.json",
            ActivityType::Run,
            vec![
                GeoPoint::new(0.001, 0.001),
                GeoPoint::new(0.001, 0.01),
                GeoPoint::new(0.01, 0.001),
                GeoPoint::new(0.01, 0.01),
            ],
        )
    }

    #[tokio::test]
    async fn test_visible_tiles_endpoint() {
        let state = state_with(&[square_run()], Config::default());
        let query = TilesQuery {
            south: -0.05,
            west: -0.05,
            north: 0.05,
            east: 0.05,
            activities: None,
        };
        let Json(response) = list_visible_tiles(State(state), Query(query)).await.unwrap();
        assert_eq!(response.visible_count, 4);
        assert_eq!(response.total_count, 4);
        assert_eq!(response.max_square.size, 2);
        assert!(response.tiles.iter().all(|t| t.is_cluster_member));
    }

    #[tokio::test]
    async fn test_bad_viewport_is_rejected() {
        let state = state_with(&[], Config::default());
        let query = TilesQuery {
            south: 1.0,
            west: 0.0,
            north: 0.0,
            east: 1.0,
            activities: None,
        };
        let err = list_visible_tiles(State(state), Query(query)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_activity_filter_from_query() {
        let state = state_with(&[square_run()], Config::default());
        let Json(rides) = get_square_cluster(
            State(state.clone()),
            Query(FilterQuery {
                activities: Some("Ride".to_string()),
            }),
        )
        .await;
        assert_eq!(rides.size, 0);
        assert!(rides.bounds.is_none());

        let Json(stats) = get_stats(State(state), Query(FilterQuery { activities: None })).await;
        assert_eq!(stats.tile_count, 4);
        assert_eq!(stats.max_square, 2);
        assert_eq!(stats.activities, "all");
    }

    #[tokio::test]
    async fn test_import_reloads_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            track_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let state = state_with(&[], config);

        fs::write(
            dir.path().join("new.json"),
            r#"[{"activity_type": "Walk", "coords": [[46.0, 7.5]]}]"#,
        )
        .unwrap();
        let Json(imported) = import_tracks(State(state.clone())).await.unwrap();
        assert_eq!(imported.imported, 1);
        assert_eq!(imported.track_count, 1);

        let Json(stats) = get_stats(State(state), Query(FilterQuery { activities: None })).await;
        assert_eq!(stats.track_count, 1);
        assert_eq!(stats.max_square, 1);
    }
}
