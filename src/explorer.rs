//! # Explorer
//!
//! Memoized coverage and cluster computation.
//!
//! Covered set and cluster depend only on the tracks, the activity filter
//! and the square check, never on the viewport. They are computed once per
//! distinct key and kept in an LRU cache, so panning and zooming only
//! re-run the visibility filter.

use log::{debug, info};
use lru::LruCache;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::cluster::{find_cluster, Cluster, SquareCheck};
use crate::coverage::{build_coverage, ActivityFilter, CoveredSet, TrackCollection};
use crate::viewport::{render_tiles, RenderTile, Viewport};

/// Everything derived from one track selection.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub covered: CoveredSet,
    pub cluster: Cluster,
    pub track_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SnapshotKey {
    fingerprint: u64,
    track_count: usize,
    point_count: usize,
    filter: ActivityFilter,
    check: SquareCheck,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExplorerStats {
    pub cached_snapshots: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

pub struct ExplorerMap {
    check: SquareCheck,
    cache: LruCache<SnapshotKey, Arc<Snapshot>>,
    hits: u64,
    misses: u64,
}

impl ExplorerMap {
    pub fn new(capacity: NonZeroUsize, check: SquareCheck) -> Self {
        Self {
            check,
            cache: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    pub fn square_check(&self) -> SquareCheck {
        self.check
    }

    /// Covered set and cluster for the tracks accepted by `filter`.
    pub fn snapshot(&mut self, tracks: &TrackCollection, filter: &ActivityFilter) -> Arc<Snapshot> {
        let key = SnapshotKey {
            fingerprint: tracks.fingerprint(),
            track_count: tracks.len(),
            point_count: tracks.point_count(),
            filter: filter.clone(),
            check: self.check,
        };

        if let Some(snapshot) = self.cache.get(&key) {
            self.hits += 1;
            debug!("Explorer cache hit for filter '{}'", filter);
            return Arc::clone(snapshot);
        }

        self.misses += 1;
        let selected: Vec<_> = tracks.filtered(filter).collect();
        let covered = build_coverage(selected.iter().copied());
        let cluster = find_cluster(&covered, self.check);
        info!(
            "Computed coverage for {} tracks ({}): {} tiles, best square {}",
            selected.len(),
            filter,
            covered.len(),
            cluster.size
        );

        let snapshot = Arc::new(Snapshot {
            covered,
            cluster,
            track_count: selected.len(),
        });
        self.cache.put(key, Arc::clone(&snapshot));
        snapshot
    }

    /// Rendering instructions for the tiles visible in `viewport`.
    pub fn render(
        &mut self,
        tracks: &TrackCollection,
        filter: &ActivityFilter,
        viewport: &Viewport,
    ) -> (Arc<Snapshot>, Vec<RenderTile>) {
        let snapshot = self.snapshot(tracks, filter);
        let tiles = render_tiles(&snapshot.covered, &snapshot.cluster, viewport);
        (snapshot, tiles)
    }

    pub fn stats(&self) -> ExplorerStats {
        ExplorerStats {
            cached_snapshots: self.cache.len(),
            capacity: self.cache.cap().get(),
            hits: self.hits,
            misses: self.misses,
        }
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::{ActivityType, Track};
    use crate::tiles::{lng_cell_size, tile_of, GeoPoint, LAT_CELL_SIZE};

    fn explorer(capacity: usize) -> ExplorerMap {
        ExplorerMap::new(NonZeroUsize::new(capacity).unwrap(), SquareCheck::Boundary)
    }

    /// A run zig-zagging over a 3x3 block of tiles near Bern.
    fn collection() -> TrackCollection {
        let base = tile_of(GeoPoint::new(46.95, 7.44));
        let mut points = Vec::new();
        for row in 0..3 {
            for col in 0..3 {
                let lat = 46.95 + (row as f64 + 0.5) * LAT_CELL_SIZE;
                let cell = lng_cell_size(lat);
                let lng = (base.x as f64 + col as f64 + 0.5) * cell;
                points.push(GeoPoint::new(lat, lng));
            }
        }
        TrackCollection::new(vec![
            Track::new("run", ActivityType::Run, points),
            Track::new("ride", ActivityType::Ride, vec![GeoPoint::new(45.0, 6.0)]),
        ])
    }

    #[test]
    fn test_snapshot_is_memoized() {
        let tracks = collection();
        let mut map = explorer(4);
        let all = ActivityFilter::all();

        let first = map.snapshot(&tracks, &all);
        let second = map.snapshot(&tracks, &all);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(map.stats().hits, 1);
        assert_eq!(map.stats().misses, 1);
        assert_eq!(first.covered.len(), 10);
        assert_eq!(first.track_count, 2);
    }

    #[test]
    fn test_filter_changes_key() {
        let tracks = collection();
        let mut map = explorer(4);

        let runs = map.snapshot(&tracks, &ActivityFilter::only([ActivityType::Run]));
        let rides = map.snapshot(&tracks, &ActivityFilter::only([ActivityType::Ride]));
        assert_eq!(runs.covered.len(), 9);
        assert_eq!(runs.cluster.size, 3);
        assert_eq!(rides.covered.len(), 1);
        assert_eq!(rides.cluster.size, 1);
        assert_eq!(map.stats().cached_snapshots, 2);
    }

    #[test]
    fn test_new_tracks_recompute() {
        let mut map = explorer(4);
        let all = ActivityFilter::all();
        let before = map.snapshot(&collection(), &all);

        let mut tracks: Vec<Track> = collection().tracks().to_vec();
        tracks.push(Track::new("walk", ActivityType::Walk, vec![GeoPoint::new(44.0, 5.0)]));
        let after = map.snapshot(&TrackCollection::new(tracks), &all);

        assert_eq!(after.covered.len(), before.covered.len() + 1);
        assert_eq!(map.stats().misses, 2);
    }

    #[test]
    fn test_equal_fingerprints_with_different_content_do_not_share() {
        let mut map = explorer(4);
        let all = ActivityFilter::all();

        let first = TrackCollection::with_fingerprint(collection().tracks().to_vec(), 42);
        let mut grown = collection().tracks().to_vec();
        grown.push(Track::new("walk", ActivityType::Walk, vec![GeoPoint::new(44.0, 5.0)]));
        let grown = TrackCollection::with_fingerprint(grown, 42);

        let before = map.snapshot(&first, &all);
        let after = map.snapshot(&grown, &all);
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.covered.len(), before.covered.len() + 1);
        assert_eq!(map.stats().misses, 2);
    }

    #[test]
    fn test_viewport_changes_reuse_snapshot() {
        let tracks = collection();
        let mut map = explorer(2);
        let all = ActivityFilter::all();

        let near = Viewport::from_edges(46.9, 7.3, 47.1, 7.6).unwrap();
        let elsewhere = Viewport::from_edges(44.9, 5.9, 45.1, 6.1).unwrap();

        let (_, tiles) = map.render(&tracks, &all, &near);
        assert_eq!(tiles.len(), 9);
        assert!(tiles.iter().all(|t| t.is_cluster_member));

        let (_, tiles) = map.render(&tracks, &all, &elsewhere);
        assert_eq!(tiles.len(), 1);
        assert!(!tiles[0].is_cluster_member);

        assert_eq!(map.stats().misses, 1);
        assert_eq!(map.stats().hits, 1);
    }

    #[test]
    fn test_capacity_evicts() {
        let tracks = collection();
        let mut map = explorer(1);
        map.snapshot(&tracks, &ActivityFilter::only([ActivityType::Run]));
        map.snapshot(&tracks, &ActivityFilter::only([ActivityType::Ride]));
        assert_eq!(map.stats().cached_snapshots, 1);

        map.clear();
        assert_eq!(map.stats().cached_snapshots, 0);
        assert_eq!(map.stats().capacity, 1);
    }
}
