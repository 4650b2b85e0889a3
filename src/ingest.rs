//! Turning GPX and JSON track files into validated [`Track`]s.
//!
//! This is the only place coordinates are checked. Non-finite, polar or
//! out-of-range points are dropped here so the tiling core never sees them.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::coverage::{ActivityType, Track};
use crate::error::{ExplorerError, Result};
use crate::tiles::GeoPoint;

/// Precision of Strava's encoded summary polylines.
const POLYLINE_PRECISION: u32 = 5;

/// Keep only points the tiler is defined for.
pub fn sanitize_points(source: &str, points: Vec<GeoPoint>) -> Vec<GeoPoint> {
    let total = points.len();
    let valid: Vec<GeoPoint> = points.into_iter().filter(GeoPoint::is_valid).collect();
    if valid.len() < total {
        warn!(
            "{}: dropped {} of {} points with invalid coordinates",
            source,
            total - valid.len(),
            total
        );
    }
    valid
}

fn finish_track(
    source: String,
    activity_type: ActivityType,
    started_at: Option<DateTime<Utc>>,
    points: Vec<GeoPoint>,
) -> Result<Track> {
    let points = sanitize_points(&source, points);
    if points.is_empty() {
        return Err(ExplorerError::InvalidTrack {
            source_name: source,
            message: "no valid track points".to_string(),
        });
    }
    Ok(Track {
        source,
        activity_type,
        started_at,
        points,
    })
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Parse a GPX document into a track.
///
/// The activity type comes from the `<type>` element Strava writes into
/// exports, the start time from `<metadata><time>` or the first timed point.
/// Points from every `<trk>` and `<trkseg>` are joined in document order.
pub fn parse_gpx(source: &str, content: &str) -> Result<Track> {
    let gpx = gpx::read(content.as_bytes()).map_err(|e| ExplorerError::Gpx {
        source_name: source.to_string(),
        message: e.to_string(),
    })?;

    let metadata_time = gpx
        .metadata
        .as_ref()
        .and_then(|m| m.time.as_ref())
        .and_then(|t| t.format().ok())
        .and_then(|iso| parse_time(&iso));

    let activity_type = gpx
        .tracks
        .iter()
        .find_map(|t| t.type_.as_deref())
        .map(ActivityType::from)
        .unwrap_or_else(|| ActivityType::Other("Unknown".to_string()));

    let mut points = Vec::new();
    let mut first_point_time = None;
    for track in &gpx.tracks {
        for segment in &track.segments {
            for waypoint in &segment.points {
                if first_point_time.is_none() {
                    first_point_time = waypoint
                        .time
                        .as_ref()
                        .and_then(|t| t.format().ok())
                        .and_then(|iso| parse_time(&iso));
                }
                let point = waypoint.point();
                points.push(GeoPoint::new(point.y(), point.x()));
            }
        }
    }
    debug!("{}: {} GPX track points", source, points.len());

    finish_track(
        source.to_string(),
        activity_type,
        metadata_time.or(first_point_time),
        points,
    )
}

#[derive(Debug, Deserialize)]
struct TrackRecord {
    #[serde(default)]
    name: Option<String>,
    #[serde(alias = "type", alias = "sport_type")]
    activity_type: ActivityType,
    #[serde(default)]
    start_date: Option<DateTime<Utc>>,
    /// `[lat, lng]` pairs.
    #[serde(default)]
    coords: Option<Vec<[f64; 2]>>,
    /// Google encoded polyline, as in Strava's `summary_polyline`.
    #[serde(default, alias = "summary_polyline")]
    polyline: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TrackFile {
    Many(Vec<TrackRecord>),
    One(TrackRecord),
}

fn decode_polyline(source: &str, encoded: &str) -> Result<Vec<GeoPoint>> {
    let line = polyline::decode_polyline(encoded, POLYLINE_PRECISION).map_err(|e| {
        ExplorerError::Polyline {
            source_name: source.to_string(),
            message: e.to_string(),
        }
    })?;
    // geo coordinates are (x = lng, y = lat)
    Ok(line.coords().map(|c| GeoPoint::new(c.y, c.x)).collect())
}

fn record_to_track(file_name: &str, index: usize, record: TrackRecord) -> Result<Track> {
    let source = match record.name {
        Some(name) => format!("{}#{}", file_name, name),
        None => format!("{}#{}", file_name, index),
    };
    let points = match (record.coords, record.polyline) {
        (Some(coords), _) => coords
            .into_iter()
            .map(|[lat, lng]| GeoPoint::new(lat, lng))
            .collect(),
        (None, Some(encoded)) => decode_polyline(&source, &encoded)?,
        (None, None) => {
            return Err(ExplorerError::InvalidTrack {
                source_name: source,
                message: "record has neither coords nor polyline".to_string(),
            })
        }
    };
    finish_track(source, record.activity_type, record.start_date, points)
}

/// Parse a JSON track file: one record or an array of records.
///
/// Records that fail validation are logged and skipped; a malformed
/// document is an error.
pub fn parse_track_json(file_name: &str, content: &str) -> Result<Vec<Track>> {
    let records = match serde_json::from_str::<TrackFile>(content)? {
        TrackFile::Many(records) => records,
        TrackFile::One(record) => vec![record],
    };

    let mut tracks = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        match record_to_track(file_name, index, record) {
            Ok(track) => tracks.push(track),
            Err(e) => warn!("Skipping record: {}", e),
        }
    }
    Ok(tracks)
}

/// Read one `.gpx` or `.json` file.
pub fn load_track_file(path: &Path) -> Result<Vec<Track>> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let content = fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("gpx") => Ok(vec![parse_gpx(&name, &content)?]),
        Some("json") => parse_track_json(&name, &content),
        _ => Err(ExplorerError::InvalidTrack {
            source_name: name,
            message: "unsupported file extension".to_string(),
        }),
    }
}

/// Whether the loader understands this file.
pub fn is_track_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("gpx") | Some("json")
    )
}

/// Sorted paths of all track files in `dir`. A missing directory is empty.
pub fn track_files(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    if !dir.exists() {
        warn!("Track directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && is_track_file(p))
        .collect();
    paths.sort();
    Ok(paths)
}

/// Load every track file in `dir`. Bad files are logged and skipped.
pub fn load_track_dir(dir: &Path) -> Result<Vec<Track>> {
    let mut tracks = Vec::new();
    for path in track_files(dir)? {
        match load_track_file(&path) {
            Ok(loaded) => tracks.extend(loaded),
            Err(e) => warn!("Error processing {}: {}", path.display(), e),
        }
    }
    info!("Loaded {} tracks from {}", tracks.len(), dir.display());
    Ok(tracks)
}
