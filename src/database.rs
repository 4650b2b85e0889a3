use chrono::{DateTime, Utc};
use log::{info, warn};
use rusqlite::{params, Connection};
use std::path::Path;

use crate::coverage::{ActivityType, Track};
use crate::error::Result;
use crate::ingest;
use crate::tiles::GeoPoint;

/// Open (or create) the track store and make sure the schema exists.
pub fn init_db(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    create_schema(&conn)?;
    Ok(conn)
}

/// In-memory store, used by tests and one-shot CLI runs.
pub fn init_memory_db() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    create_schema(&conn)?;
    Ok(conn)
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tracks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            activity_type TEXT NOT NULL,
            started_at INTEGER,
            points_json TEXT NOT NULL
        )",
        [],
    )?;

    // Files already ingested, so re-imports only pick up new exports
    conn.execute(
        "CREATE TABLE IF NOT EXISTS processed_files (
            filename TEXT PRIMARY KEY,
            processed_at INTEGER NOT NULL
        )",
        [],
    )?;

    Ok(())
}

/// Whether `filename` was already ingested, successfully or not.
pub fn is_file_processed(conn: &Connection, filename: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM processed_files WHERE filename = ?1",
        params![filename],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Record `filename` so later imports skip it.
pub fn mark_file_processed(conn: &Connection, filename: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO processed_files (filename, processed_at) VALUES (?1, ?2)",
        params![filename, Utc::now().timestamp()],
    )?;
    Ok(())
}

/// Insert tracks in one transaction. Points are stored as `[[lat, lng], ...]`
/// JSON, which round-trips `f64` exactly.
pub fn insert_tracks(conn: &mut Connection, tracks: &[Track]) -> Result<usize> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO tracks (source, activity_type, started_at, points_json)
             VALUES (?1, ?2, ?3, ?4)",
        )?;

        for track in tracks {
            let pairs: Vec<[f64; 2]> = track.points.iter().map(|p| [p.lat, p.lng]).collect();
            stmt.execute(params![
                track.source,
                track.activity_type.as_str(),
                track.started_at.map(|t| t.timestamp()),
                serde_json::to_string(&pairs)?,
            ])?;
        }
    }
    tx.commit()?;
    Ok(tracks.len())
}

/// All stored tracks in insertion order.
pub fn load_tracks(conn: &Connection) -> Result<Vec<Track>> {
    let mut stmt = conn.prepare(
        "SELECT source, activity_type, started_at, points_json FROM tracks ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<i64>>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut tracks = Vec::new();
    for row in rows {
        let (source, activity_type, started_at, points_json) = row?;
        let pairs: Vec<[f64; 2]> = serde_json::from_str(&points_json)?;
        tracks.push(Track {
            source,
            activity_type: ActivityType::from(activity_type),
            started_at: started_at.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
            points: pairs
                .into_iter()
                .map(|[lat, lng]| GeoPoint::new(lat, lng))
                .collect(),
        });
    }
    Ok(tracks)
}

/// Number of stored tracks.
pub fn track_count(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))?;
    Ok(count as usize)
}

/// Ingest every track file in `dir` that has not been processed yet.
/// Returns the number of tracks added.
///
/// Files that fail to parse are marked processed and not retried. Files that
/// could not be read are left unmarked so the next import tries again.
pub fn import_dir(conn: &mut Connection, dir: &Path) -> Result<usize> {
    let mut added = 0;
    for path in ingest::track_files(dir)? {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        if is_file_processed(conn, &filename)? {
            continue;
        }

        match ingest::load_track_file(&path) {
            Ok(tracks) => {
                let count = insert_tracks(conn, &tracks)?;
                if count > 0 {
                    info!("Processed {}: {} tracks", filename, count);
                }
                added += count;
            }
            Err(e) if e.is_retryable() => {
                warn!("Could not read {}, will retry: {}", filename, e);
                continue;
            }
            Err(e) => warn!("Error processing {}: {}", filename, e),
        }
        mark_file_processed(conn, &filename)?;
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample_track() -> Track {
        Track {
            source: "activity_7.gpx".to_string(),
            activity_type: ActivityType::Hike,
            started_at: DateTime::<Utc>::from_timestamp(1_700_000_000, 0),
            points: vec![GeoPoint::new(46.5584, 7.8354), GeoPoint::new(46.5601, 7.8402)],
        }
    }

    #[test]
    fn test_round_trip_tracks() {
        let mut conn = init_memory_db().unwrap();
        let track = sample_track();
        insert_tracks(&mut conn, &[track.clone()]).unwrap();

        let loaded = load_tracks(&conn).unwrap();
        assert_eq!(loaded, vec![track]);
        assert_eq!(track_count(&conn).unwrap(), 1);
    }

    #[test]
    fn test_processed_files() {
        let conn = init_memory_db().unwrap();
        assert!(!is_file_processed(&conn, "a.gpx").unwrap());
        mark_file_processed(&conn, "a.gpx").unwrap();
        mark_file_processed(&conn, "a.gpx").unwrap();
        assert!(is_file_processed(&conn, "a.gpx").unwrap());
    }

    #[test]
    fn test_import_dir_skips_processed_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("rides.json"),
            r#"[{"activity_type": "Ride", "coords": [[46.0, 7.5], [46.01, 7.51]]},
                {"activity_type": "Run", "coords": [[47.0, 8.0]]}]"#,
        )
        .unwrap();
        fs::write(dir.path().join("broken.gpx"), "<gpx></gpx>").unwrap();

        let db_path = dir.path().join("tiles.db");
        let mut conn = init_db(&db_path).unwrap();
        assert_eq!(import_dir(&mut conn, dir.path()).unwrap(), 2);
        assert_eq!(import_dir(&mut conn, dir.path()).unwrap(), 0);
        assert!(is_file_processed(&conn, "broken.gpx").unwrap());

        let loaded = load_tracks(&conn).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].activity_type, ActivityType::Ride);
    }

    #[test]
    fn test_unreadable_file_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.json");
        // Not UTF-8 yet, as if the export were still being written.
        fs::write(&path, [0xff, 0xfe, 0x5b]).unwrap();

        let mut conn = init_memory_db().unwrap();
        assert_eq!(import_dir(&mut conn, dir.path()).unwrap(), 0);
        assert!(!is_file_processed(&conn, "upload.json").unwrap());

        fs::write(&path, r#"[{"activity_type": "Walk", "coords": [[46.9, 7.4]]}]"#).unwrap();
        assert_eq!(import_dir(&mut conn, dir.path()).unwrap(), 1);
        assert!(is_file_processed(&conn, "upload.json").unwrap());
    }
}
