use serde::{Deserialize, Serialize};

/// Height of a tile in degrees of latitude (roughly 1 km).
pub const LAT_CELL_SIZE: f64 = 1.0 / 110.574;

/// Kilometres per degree of longitude at the equator.
const KM_PER_LNG_DEGREE: f64 = 111.32;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite, non-polar and inside the longitude range.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && self.lat.abs() < 90.0
            && self.lng.abs() <= 180.0
    }
}

/// Grid cell identifier. `x` counts longitude cells, `y` latitude cells.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TileIndex {
    pub x: i32,
    pub y: i32,
}

impl TileIndex {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// Geographic rectangle of a tile, south-west to north-east.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl TileBounds {
    pub fn contains(&self, point: GeoPoint) -> bool {
        point.lat >= self.south
            && point.lat <= self.north
            && point.lng >= self.west
            && point.lng <= self.east
    }

    /// `[[south, west], [north, east]]`, the shape Leaflet expects.
    pub fn as_corners(&self) -> [[f64; 2]; 2] {
        [[self.south, self.west], [self.north, self.east]]
    }
}

/// Width of a tile in degrees of longitude at the given latitude.
///
/// Longitude degrees shrink towards the poles, so this grows with `|lat|`
/// and is singular at ±90°.
pub fn lng_cell_size(lat: f64) -> f64 {
    1.0 / (KM_PER_LNG_DEGREE * lat.to_radians().cos())
}

pub fn tile_of(point: GeoPoint) -> TileIndex {
    let x = (point.lng / lng_cell_size(point.lat)).floor() as i32;
    let y = (point.lat / LAT_CELL_SIZE).floor() as i32;
    TileIndex::new(x, y)
}

/// Convert a tile index back to its lat/lng rectangle.
///
/// A tile's longitude span depends on latitude, so each longitude edge is
/// taken at whichever latitude edge pushes it outward: the one nearer the
/// equator for a positive multiple of the cell width, the one farther away
/// for a negative multiple. The result contains every point `tile_of` maps
/// to the tile. North of the equator and east of Greenwich this is simply
/// west at the south edge and east at the north edge.
pub fn bounds_of(tile: TileIndex) -> TileBounds {
    let south = tile.y as f64 * LAT_CELL_SIZE;
    let north = (tile.y + 1) as f64 * LAT_CELL_SIZE;
    let (near, far) = if south.abs() <= north.abs() {
        (south, north)
    } else {
        (north, south)
    };
    let narrow = lng_cell_size(near);
    let wide = lng_cell_size(far);

    let east_x = tile.x + 1;
    TileBounds {
        south,
        west: tile.x as f64 * if tile.x >= 0 { narrow } else { wide },
        north,
        east: east_x as f64 * if east_x >= 0 { wide } else { narrow },
    }
}
