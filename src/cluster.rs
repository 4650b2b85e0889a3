//! Detection of the "best square": a square block of explored tiles.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::coverage::CoveredSet;
use crate::error::ExplorerError;
use crate::tiles::{bounds_of, TileBounds, TileIndex};

/// A square of `size` x `size` tiles whose lowest corner is `origin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub origin: TileIndex,
    pub size: u32,
}

impl Cluster {
    pub fn empty() -> Self {
        Self {
            origin: TileIndex::new(0, 0),
            size: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn contains(&self, tile: TileIndex) -> bool {
        let dx = i64::from(tile.x) - i64::from(self.origin.x);
        let dy = i64::from(tile.y) - i64::from(self.origin.y);
        let size = i64::from(self.size);
        (0..size).contains(&dx) && (0..size).contains(&dy)
    }

    pub fn tiles(&self) -> impl Iterator<Item = TileIndex> + '_ {
        let size = self.size as i32;
        (0..size).flat_map(move |dy| (0..size).map(move |dx| self.origin.offset(dx, dy)))
    }

    /// Geographic rectangle spanned by the whole square.
    pub fn bounds(&self) -> Option<TileBounds> {
        if self.is_empty() {
            return None;
        }
        let last = self.size as i32 - 1;
        // Tile width varies with latitude, so the outermost edges of a column
        // can come from either its top or bottom tile.
        let corners = [(0, 0), (last, 0), (0, last), (last, last)]
            .map(|(dx, dy)| bounds_of(self.origin.offset(dx, dy)));
        Some(corners.iter().skip(1).fold(corners[0], |acc, b| TileBounds {
            south: acc.south.min(b.south),
            west: acc.west.min(b.west),
            north: acc.north.max(b.north),
            east: acc.east.max(b.east),
        }))
    }
}

/// How a candidate square is verified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SquareCheck {
    /// Grow from each origin checking only the newly exposed edge strip.
    /// Interior cells are never inspected.
    #[default]
    Boundary,
    /// Every cell of the square must be covered.
    Filled,
}

impl FromStr for SquareCheck {
    type Err = ExplorerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "boundary" => Ok(SquareCheck::Boundary),
            "filled" => Ok(SquareCheck::Filled),
            other => Err(ExplorerError::Config(format!(
                "unknown square check '{}', expected 'boundary' or 'filled'",
                other
            ))),
        }
    }
}

impl fmt::Display for SquareCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SquareCheck::Boundary => f.write_str("boundary"),
            SquareCheck::Filled => f.write_str("filled"),
        }
    }
}

pub fn find_cluster(covered: &CoveredSet, check: SquareCheck) -> Cluster {
    let cluster = match check {
        SquareCheck::Boundary => find_square_cluster(covered),
        SquareCheck::Filled => find_filled_square(covered),
    };
    debug!(
        "Cluster ({}): size {} at ({}, {}) from {} tiles",
        check,
        cluster.size,
        cluster.origin.x,
        cluster.origin.y,
        covered.len()
    );
    cluster
}

/// Side length accepted by the boundary-growth check for one origin.
///
/// Step `len` requires `(x+i, y+len)` and `(x+len, y+i)` for `i` in
/// `0..len`. The diagonal corner `(x+len, y+len)` and everything inside
/// the square are left unchecked.
fn boundary_growth(covered: &CoveredSet, origin: TileIndex) -> u32 {
    let mut len: i32 = 0;
    while (0..len).all(|i| {
        covered.contains(&origin.offset(i, len)) && covered.contains(&origin.offset(len, i))
    }) {
        len += 1;
    }
    len as u32
}

/// Largest square found by the boundary-growth check over all origins.
///
/// The reported square may contain uncovered interior tiles. Among equal
/// sizes the origin that sorts first by `(y, x)` wins.
pub fn find_square_cluster(covered: &CoveredSet) -> Cluster {
    let mut best = Cluster::empty();
    for &origin in covered {
        let size = boundary_growth(covered, origin);
        if size > best.size
            || (size == best.size && (origin.y, origin.x) < (best.origin.y, best.origin.x))
        {
            best = Cluster { origin, size };
        }
    }
    best
}

/// Largest square whose every tile is covered.
///
/// Classic largest-square-of-ones recurrence, evaluated sparsely over the
/// covered tiles in `(y, x)` order so no bounding-box table is allocated.
pub fn find_filled_square(covered: &CoveredSet) -> Cluster {
    let mut ordered: Vec<TileIndex> = covered.iter().copied().collect();
    ordered.sort_by_key(|t| (t.y, t.x));

    let mut dp: HashMap<TileIndex, u32> = HashMap::with_capacity(ordered.len());
    let mut best = Cluster::empty();

    for tile in ordered {
        let below = dp.get(&tile.offset(0, -1)).copied().unwrap_or(0);
        let left = dp.get(&tile.offset(-1, 0)).copied().unwrap_or(0);
        let diagonal = dp.get(&tile.offset(-1, -1)).copied().unwrap_or(0);
        let size = below.min(left).min(diagonal) + 1;
        dp.insert(tile, size);

        if size > best.size {
            let back = size as i32 - 1;
            best = Cluster {
                origin: tile.offset(-back, -back),
                size,
            };
        }
    }

    best
}
