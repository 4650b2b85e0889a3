//! Tracks and the set of tiles they cover.

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::tiles::{tile_of, GeoPoint, TileIndex};

/// Distinct tiles touched by at least one track point.
pub type CoveredSet = HashSet<TileIndex>;

/// Activity category of a track. Unknown categories are kept by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActivityType {
    Hike,
    Walk,
    Run,
    Ride,
    Other(String),
}

impl ActivityType {
    pub fn as_str(&self) -> &str {
        match self {
            ActivityType::Hike => "Hike",
            ActivityType::Walk => "Walk",
            ActivityType::Run => "Run",
            ActivityType::Ride => "Ride",
            ActivityType::Other(name) => name,
        }
    }
}

impl From<&str> for ActivityType {
    /// Accepts Strava activity names and the words Strava writes into GPX
    /// `<type>` elements.
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "hike" | "hiking" => ActivityType::Hike,
            "walk" | "walking" => ActivityType::Walk,
            "run" | "running" | "trailrun" | "trail_run" => ActivityType::Run,
            "ride" | "cycling" | "biking" | "mountainbikeride" | "gravelride" => {
                ActivityType::Ride
            }
            _ => ActivityType::Other(s.trim().to_string()),
        }
    }
}

impl From<String> for ActivityType {
    fn from(s: String) -> Self {
        ActivityType::from(s.as_str())
    }
}

impl From<ActivityType> for String {
    fn from(t: ActivityType) -> Self {
        t.as_str().to_string()
    }
}

impl FromStr for ActivityType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ActivityType::from(s))
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// File or record the track was read from.
    pub source: String,
    pub activity_type: ActivityType,
    pub started_at: Option<DateTime<Utc>>,
    pub points: Vec<GeoPoint>,
}

impl Track {
    pub fn new(source: impl Into<String>, activity_type: ActivityType, points: Vec<GeoPoint>) -> Self {
        Self {
            source: source.into(),
            activity_type,
            started_at: None,
            points,
        }
    }
}

/// Compute the covered set of a collection of tracks.
pub fn build_coverage<'a, I>(tracks: I) -> CoveredSet
where
    I: IntoIterator<Item = &'a Track>,
{
    let mut covered = CoveredSet::new();
    let mut point_count = 0usize;
    for track in tracks {
        point_count += track.points.len();
        covered.extend(track.points.iter().map(|p| tile_of(*p)));
    }
    debug!(
        "Coverage: {} points mapped to {} tiles",
        point_count,
        covered.len()
    );
    covered
}

/// Selects tracks by activity type. An empty filter accepts everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityFilter {
    types: BTreeSet<ActivityType>,
}

impl ActivityFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only<I: IntoIterator<Item = ActivityType>>(types: I) -> Self {
        Self {
            types: types.into_iter().collect(),
        }
    }

    /// Parse a comma-separated list such as `"Run,Hike"`.
    pub fn parse(list: &str) -> Self {
        Self::only(
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ActivityType::from),
        )
    }

    pub fn accepts(&self, activity_type: &ActivityType) -> bool {
        self.types.is_empty() || self.types.contains(activity_type)
    }

    pub fn is_all(&self) -> bool {
        self.types.is_empty()
    }
}

impl fmt::Display for ActivityFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.types.is_empty() {
            return f.write_str("all");
        }
        let names: Vec<&str> = self.types.iter().map(|t| t.as_str()).collect();
        f.write_str(&names.join(","))
    }
}

/// An immutable set of tracks with a content fingerprint.
///
/// Two collections holding the same tracks in the same order have the same
/// fingerprint. The explorer cache keys on the fingerprint together with the
/// track and point counts, so a 64-bit hash collision alone cannot make two
/// different collections share a snapshot.
#[derive(Debug, Clone, Default)]
pub struct TrackCollection {
    tracks: Vec<Track>,
    fingerprint: u64,
    point_count: usize,
}

impl TrackCollection {
    pub fn new(tracks: Vec<Track>) -> Self {
        let mut hasher = DefaultHasher::new();
        tracks.len().hash(&mut hasher);
        for track in &tracks {
            track.source.hash(&mut hasher);
            track.activity_type.hash(&mut hasher);
            track.points.len().hash(&mut hasher);
            for p in &track.points {
                p.lat.to_bits().hash(&mut hasher);
                p.lng.to_bits().hash(&mut hasher);
            }
        }
        let point_count = tracks.iter().map(|t| t.points.len()).sum();
        Self {
            tracks,
            fingerprint: hasher.finish(),
            point_count,
        }
    }

    /// Collection with a chosen fingerprint, for exercising cache keys.
    #[cfg(test)]
    pub(crate) fn with_fingerprint(tracks: Vec<Track>, fingerprint: u64) -> Self {
        Self {
            fingerprint,
            ..Self::new(tracks)
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Total number of points across all tracks.
    pub fn point_count(&self) -> usize {
        self.point_count
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn filtered<'a>(&'a self, filter: &'a ActivityFilter) -> impl Iterator<Item = &'a Track> + 'a {
        self.tracks
            .iter()
            .filter(move |t| filter.accepts(&t.activity_type))
    }
}
