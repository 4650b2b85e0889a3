//! Restricting the covered set to what the map currently shows.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::cluster::Cluster;
use crate::coverage::CoveredSet;
use crate::error::{ExplorerError, Result};
use crate::tiles::{bounds_of, lng_cell_size, GeoPoint, TileBounds, TileIndex, LAT_CELL_SIZE};

/// Map something like Leaflet's unwrapped `190` back into `[-180, 180]`.
fn wrap_lng(lng: f64) -> f64 {
    if (-180.0..=180.0).contains(&lng) {
        lng
    } else {
        (lng + 180.0).rem_euclid(360.0) - 180.0
    }
}

/// Displayed map rectangle as reported by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub south_west: GeoPoint,
    pub north_east: GeoPoint,
}

impl Viewport {
    pub fn new(south_west: GeoPoint, north_east: GeoPoint) -> Result<Self> {
        let corners = [south_west.lat, south_west.lng, north_east.lat, north_east.lng];
        if corners.iter().any(|v| !v.is_finite()) {
            return Err(ExplorerError::InvalidViewport(
                "corner coordinates must be finite".to_string(),
            ));
        }
        if south_west.lat > north_east.lat {
            return Err(ExplorerError::InvalidViewport(format!(
                "south {} is north of north {}",
                south_west.lat, north_east.lat
            )));
        }
        if south_west.lat.abs() >= 90.0 || north_east.lat.abs() >= 90.0 {
            return Err(ExplorerError::InvalidViewport(
                "latitude must be strictly between -90 and 90".to_string(),
            ));
        }

        let (west, east) = if north_east.lng - south_west.lng >= 360.0 {
            (-180.0, 180.0)
        } else {
            (wrap_lng(south_west.lng), wrap_lng(north_east.lng))
        };
        if (west, east) != (south_west.lng, north_east.lng) {
            debug!(
                "Viewport longitudes {}..{} normalised to {}..{}",
                south_west.lng, north_east.lng, west, east
            );
        }
        Ok(Self {
            south_west: GeoPoint::new(south_west.lat, west),
            north_east: GeoPoint::new(north_east.lat, east),
        })
    }

    pub fn from_edges(south: f64, west: f64, north: f64, east: f64) -> Result<Self> {
        Self::new(GeoPoint::new(south, west), GeoPoint::new(north, east))
    }

    /// Tile boxes covering the viewport. Longitude cell size is taken at the
    /// vertical midpoint. A viewport whose west edge lies east of its east
    /// edge wraps the antimeridian and yields two boxes.
    pub fn tile_ranges(&self) -> Vec<TileRange> {
        let mid_lat = (self.south_west.lat + self.north_east.lat) / 2.0;
        let cell = lng_cell_size(mid_lat);
        let min_y = (self.south_west.lat / LAT_CELL_SIZE).floor() as i32;
        let max_y = (self.north_east.lat / LAT_CELL_SIZE).floor() as i32;
        let column = |lng: f64| (lng / cell).floor() as i32;

        let (west, east) = (self.south_west.lng, self.north_east.lng);
        if west <= east {
            vec![TileRange {
                min_x: column(west),
                max_x: column(east),
                min_y,
                max_y,
            }]
        } else {
            vec![
                TileRange {
                    min_x: column(west),
                    max_x: column(180.0),
                    min_y,
                    max_y,
                },
                TileRange {
                    min_x: column(-180.0),
                    max_x: column(east),
                    min_y,
                    max_y,
                },
            ]
        }
    }
}

/// Inclusive box of tile indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRange {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
}

impl TileRange {
    pub fn contains(&self, tile: TileIndex) -> bool {
        (self.min_x..=self.max_x).contains(&tile.x) && (self.min_y..=self.max_y).contains(&tile.y)
    }
}

/// One rectangle for the renderer to draw.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderTile {
    pub tile: TileIndex,
    pub bounds: TileBounds,
    pub is_cluster_member: bool,
}

/// Members of `covered` inside the viewport's tile box.
pub fn visible_tiles(covered: &CoveredSet, viewport: &Viewport) -> CoveredSet {
    let ranges = viewport.tile_ranges();
    covered
        .iter()
        .filter(|tile| ranges.iter().any(|r| r.contains(**tile)))
        .copied()
        .collect()
}

/// Visible tiles with their rectangles and cluster membership, ordered by
/// `(y, x)`.
pub fn render_tiles(covered: &CoveredSet, cluster: &Cluster, viewport: &Viewport) -> Vec<RenderTile> {
    let mut visible: Vec<TileIndex> = visible_tiles(covered, viewport).into_iter().collect();
    visible.sort_by_key(|t| (t.y, t.x));

    let tiles: Vec<RenderTile> = visible
        .into_iter()
        .map(|tile| RenderTile {
            tile,
            bounds: bounds_of(tile),
            is_cluster_member: cluster.contains(tile),
        })
        .collect();

    debug!(
        "Viewport {:?}: {} of {} tiles visible",
        viewport,
        tiles.len(),
        covered.len()
    );
    tiles
}
