//! # strava_explorer
//!
//! Explorer tiles from GPS tracks: which ~1 km grid cells a set of
//! activities passed through, the best square of explored cells, and the
//! subset currently visible on a map.
//!
//! The core (`tiles`, `coverage`, `cluster`, `viewport`) is pure and does no
//! I/O. `ingest` and `database` feed it validated tracks, `explorer`
//! memoizes its results.
//!
//! ```
//! use strava_explorer::{build_coverage, find_square_cluster, ActivityType, GeoPoint, Track};
//!
//! let track = Track::new(
//!     "morning-run",
//!     ActivityType::Run,
//!     vec![GeoPoint::new(47.3769, 8.5417), GeoPoint::new(47.3781, 8.5402)],
//! );
//! let covered = build_coverage([&track]);
//! let cluster = find_square_cluster(&covered);
//! assert_eq!(cluster.size, 1);
//! ```

pub mod cluster;
pub mod config;
pub mod coverage;
pub mod database;
pub mod error;
pub mod explorer;
pub mod ingest;
pub mod tiles;
pub mod viewport;

pub use cluster::{find_cluster, find_filled_square, find_square_cluster, Cluster, SquareCheck};
pub use config::Config;
pub use coverage::{build_coverage, ActivityFilter, ActivityType, CoveredSet, Track, TrackCollection};
pub use error::{ExplorerError, Result};
pub use explorer::{ExplorerMap, ExplorerStats, Snapshot};
pub use tiles::{bounds_of, lng_cell_size, tile_of, GeoPoint, TileBounds, TileIndex, LAT_CELL_SIZE};
pub use viewport::{render_tiles, visible_tiles, RenderTile, TileRange, Viewport};
