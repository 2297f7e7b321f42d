//! Persisted match log.
//!
//! One SQLite file per run with three tables:
//! - `match_log`: one row per match row, local columns plus the `s_`
//!   candidate columns (NULL on sentinel rows) and both consolidation flags
//! - `classification`: final outcome per discovery id
//! - `album_decisions`: members of each consolidated album, by round

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};

use crate::models::{
    AlbumDecision, CandidateHit, Classification, LocalTrack, MatchRow, MatchTable,
};
use crate::progress::create_progress_bar;

const WRITE_BATCH_SIZE: usize = 10_000;

const SCHEMA: &str = "
    CREATE TABLE match_log (
        row_index INTEGER PRIMARY KEY,
        discovery_id INTEGER NOT NULL,
        title TEXT,
        artist TEXT,
        album TEXT,
        date TEXT,
        path TEXT NOT NULL,
        s_album TEXT,
        s_album_id TEXT,
        s_track_id TEXT,
        s_track TEXT,
        s_popularity INTEGER,
        s_artist TEXT,
        s_similarity REAL,
        album_matched INTEGER NOT NULL,
        album_track_mask INTEGER NOT NULL
    );
    CREATE INDEX idx_match_log_discovery ON match_log(discovery_id);

    CREATE TABLE classification (
        discovery_id INTEGER PRIMARY KEY,
        kind TEXT NOT NULL,
        remote_id TEXT
    );

    CREATE TABLE album_decisions (
        album_id TEXT NOT NULL,
        round INTEGER NOT NULL,
        mean_similarity REAL NOT NULL,
        discovery_id INTEGER NOT NULL,
        PRIMARY KEY (album_id, discovery_id)
    );";

// ============================================================================
// Writer
// ============================================================================

/// Write a fresh match log at `path`, replacing any existing file.
/// Callers are expected to have validated the path first.
pub fn write_match_log(
    path: &Path,
    table: &MatchTable,
    albums: &[AlbumDecision],
    classification: &BTreeMap<u64, Classification>,
) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)
            .with_context(|| format!("removing old match log {}", path.display()))?;
    }
    let mut conn = Connection::open(path)
        .with_context(|| format!("creating match log {}", path.display()))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA temp_store = MEMORY;",
    )?;
    conn.execute_batch(SCHEMA)?;

    write_rows(&mut conn, table.rows())?;

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO classification (discovery_id, kind, remote_id) VALUES (?1, ?2, ?3)",
        )?;
        for (id, class) in classification {
            stmt.execute(params![*id as i64, class.label(), class.remote_id()])?;
        }

        let mut stmt = tx.prepare_cached(
            "INSERT INTO album_decisions (album_id, round, mean_similarity, discovery_id)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (round, decision) in albums.iter().enumerate() {
            for id in &decision.member_discovery_ids {
                stmt.execute(params![
                    decision.album_id,
                    round as i64,
                    decision.mean_similarity,
                    *id as i64,
                ])?;
            }
        }
    }
    tx.commit()?;

    // Leave a single self-contained file for readers
    conn.execute_batch("PRAGMA journal_mode = DELETE;")?;

    log::info!("Wrote {} match rows to {}", table.len(), path.display());
    Ok(())
}

fn write_rows(conn: &mut Connection, rows: &[MatchRow]) -> Result<()> {
    let pb = create_progress_bar(rows.len() as u64, "Writing match log");

    for (chunk_idx, chunk) in rows.chunks(WRITE_BATCH_SIZE).enumerate() {
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO match_log (row_index, discovery_id, title, artist, album, date, path,
                    s_album, s_album_id, s_track_id, s_track, s_popularity, s_artist, s_similarity,
                    album_matched, album_track_mask)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            )?;

            for (offset, row) in chunk.iter().enumerate() {
                let index = chunk_idx * WRITE_BATCH_SIZE + offset;
                let local = &row.local;
                let c = row.candidate.as_ref();
                stmt.execute(params![
                    index as i64,
                    local.discovery_id as i64,
                    local.title,
                    local.artist,
                    local.album,
                    local.date,
                    local.path.to_string_lossy(),
                    c.and_then(|c| c.album.as_deref()),
                    c.and_then(|c| c.album_id.as_deref()),
                    c.map(|c| c.track_id.as_str()),
                    c.map(|c| c.track.as_str()),
                    c.map(|c| c.popularity),
                    c.map(|c| c.artist.as_str()),
                    c.map(|c| c.similarity),
                    row.album_matched,
                    row.album_track_mask,
                ])?;
                pb.inc(1);
            }
        }
        tx.commit()?;
    }

    pb.finish_with_message(format!("Wrote {} match rows", rows.len()));
    Ok(())
}

/// Write `artist - title` for every unmatched track, one per line.
/// Returns the number of lines written.
pub fn write_failed_matches(
    path: &Path,
    tracks: &[LocalTrack],
    classification: &BTreeMap<u64, Classification>,
) -> Result<usize> {
    let file = fs::File::create(path)
        .with_context(|| format!("creating failed matches file {}", path.display()))?;
    let mut out = BufWriter::new(file);
    let mut written = 0;

    for track in tracks {
        if classification.get(&track.discovery_id) == Some(&Classification::Unmatched) {
            writeln!(out, "{}", track.display_name())?;
            written += 1;
        }
    }
    out.flush()?;
    Ok(written)
}

// ============================================================================
// Reader
// ============================================================================

/// One persisted match row.
#[derive(Debug, Clone)]
pub struct LoggedRow {
    pub row_index: i64,
    pub discovery_id: u64,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub path: String,
    pub candidate: Option<CandidateHit>,
    pub album_matched: bool,
    pub album_track_mask: bool,
}

/// Persisted outcome for one local track.
#[derive(Debug, Clone)]
pub struct LoggedOutcome {
    pub discovery_id: u64,
    pub kind: String,
    pub remote_id: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub path: String,
}

pub fn open_match_log(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("opening match log {}", path.display()))
}

fn logged_row(row: &Row) -> rusqlite::Result<LoggedRow> {
    let track_id: Option<String> = row.get("s_track_id")?;
    let candidate = match track_id {
        Some(track_id) => Some(CandidateHit {
            album: row.get("s_album")?,
            album_id: row.get("s_album_id")?,
            track_id,
            track: row.get::<_, Option<String>>("s_track")?.unwrap_or_default(),
            popularity: row.get::<_, Option<i32>>("s_popularity")?.unwrap_or(0),
            artist: row.get::<_, Option<String>>("s_artist")?.unwrap_or_default(),
            similarity: row.get::<_, Option<f64>>("s_similarity")?.unwrap_or(0.0),
        }),
        None => None,
    };

    Ok(LoggedRow {
        row_index: row.get("row_index")?,
        discovery_id: row.get::<_, i64>("discovery_id")? as u64,
        title: row.get("title")?,
        artist: row.get("artist")?,
        album: row.get("album")?,
        path: row.get("path")?,
        candidate,
        album_matched: row.get("album_matched")?,
        album_track_mask: row.get("album_track_mask")?,
    })
}

/// Every match row of one local track, in emission order.
pub fn rows_for_track(conn: &Connection, discovery_id: u64) -> Result<Vec<LoggedRow>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM match_log WHERE discovery_id = ?1 ORDER BY row_index",
    )?;
    let rows = stmt
        .query_map([discovery_id as i64], logged_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

const OUTCOME_SELECT: &str = "
    SELECT c.discovery_id, c.kind, c.remote_id, m.title, m.artist, m.path
    FROM classification c
    JOIN match_log m ON m.row_index = (
        SELECT MIN(row_index) FROM match_log WHERE discovery_id = c.discovery_id
    )";

fn logged_outcome(row: &Row) -> rusqlite::Result<LoggedOutcome> {
    Ok(LoggedOutcome {
        discovery_id: row.get::<_, i64>(0)? as u64,
        kind: row.get(1)?,
        remote_id: row.get(2)?,
        title: row.get(3)?,
        artist: row.get(4)?,
        path: row.get(5)?,
    })
}

pub fn outcome_for_track(conn: &Connection, discovery_id: u64) -> Result<Option<LoggedOutcome>> {
    let sql = format!("{} WHERE c.discovery_id = ?1", OUTCOME_SELECT);
    let outcome = conn
        .query_row(&sql, [discovery_id as i64], logged_outcome)
        .optional()?;
    Ok(outcome)
}

/// All tracks classified as unmatched, by discovery id.
pub fn unmatched_tracks(conn: &Connection) -> Result<Vec<LoggedOutcome>> {
    let sql = format!(
        "{} WHERE c.kind = 'unmatched' ORDER BY c.discovery_id",
        OUTCOME_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], logged_outcome)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Track count per classification kind.
pub fn classification_counts(conn: &Connection) -> Result<BTreeMap<String, usize>> {
    let mut stmt = conn.prepare("SELECT kind, COUNT(*) FROM classification GROUP BY kind")?;
    let counts = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)))?
        .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
    Ok(counts)
}

/// Consolidated albums as (album_id, mean similarity, member count), in
/// selection order.
pub fn album_summary(conn: &Connection) -> Result<Vec<(String, f64, usize)>> {
    let mut stmt = conn.prepare(
        "SELECT album_id, mean_similarity, COUNT(*) FROM album_decisions
         GROUP BY album_id, round, mean_similarity ORDER BY round",
    )?;
    let albums = stmt
        .query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get::<_, i64>(2)? as usize))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(albums)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidate::{classify, consolidate_albums, select_standalone_matches};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn local(id: u64, title: &str) -> Arc<LocalTrack> {
        Arc::new(LocalTrack {
            discovery_id: id,
            title: Some(title.into()),
            artist: Some("Band".into()),
            album: None,
            date: Some("1999".into()),
            path: PathBuf::from(format!("/music/{}.mp3", id)),
        })
    }

    fn hit(album_id: &str, track_id: &str, similarity: f64) -> CandidateHit {
        CandidateHit {
            album: Some(format!("Album {}", album_id)),
            album_id: Some(album_id.into()),
            track_id: track_id.into(),
            track: track_id.into(),
            popularity: 10,
            artist: "Band".into(),
            similarity,
        }
    }

    fn sample() -> (Vec<LocalTrack>, MatchTable) {
        let locals: Vec<_> = (0..4).map(|i| local(i, &format!("Song {}", i))).collect();
        let mut table = MatchTable::new();
        table.push(MatchRow::new(locals[0].clone(), Some(hit("a", "a0", 0.9))));
        table.push(MatchRow::new(locals[0].clone(), Some(hit("z", "z0", 0.2))));
        table.push(MatchRow::new(locals[1].clone(), Some(hit("a", "a1", 0.8))));
        table.push(MatchRow::new(locals[2].clone(), Some(hit("b", "b2", 0.7))));
        table.push(MatchRow::new(locals[3].clone(), None));
        let tracks = locals.iter().map(|l| (**l).clone()).collect();
        (tracks, table)
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run-matches.sqlite3");
        let (_, mut table) = sample();
        let albums = consolidate_albums(&mut table, 2);
        let standalone = select_standalone_matches(&table);
        let classes = classify(&table, &albums, &standalone);

        write_match_log(&path, &table, &albums, &classes).unwrap();
        let conn = open_match_log(&path).unwrap();

        let rows = rows_for_track(&conn, 0).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_index, 0);
        assert!(rows[0].album_matched && rows[0].album_track_mask);
        assert!(!rows[1].album_matched && rows[1].album_track_mask);
        assert_eq!(rows[1].candidate.as_ref().unwrap().track_id, "z0");

        // Sentinel row: every s_ column NULL
        let sentinel = rows_for_track(&conn, 3).unwrap();
        assert_eq!(sentinel.len(), 1);
        assert!(sentinel[0].candidate.is_none());
        let nulls: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM match_log WHERE discovery_id = 3
                 AND s_album IS NULL AND s_album_id IS NULL AND s_track_id IS NULL
                 AND s_track IS NULL AND s_popularity IS NULL AND s_artist IS NULL
                 AND s_similarity IS NULL",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(nulls, 1);

        let counts = classification_counts(&conn).unwrap();
        assert_eq!(counts.get("album"), Some(&2));
        assert_eq!(counts.get("track"), Some(&1));
        assert_eq!(counts.get("unmatched"), Some(&1));

        let unmatched = unmatched_tracks(&conn).unwrap();
        assert_eq!(unmatched.len(), 1);
        assert_eq!(unmatched[0].discovery_id, 3);
        assert_eq!(unmatched[0].path, "/music/3.mp3");

        let outcome = outcome_for_track(&conn, 2).unwrap().unwrap();
        assert_eq!(outcome.kind, "track");
        assert_eq!(outcome.remote_id.as_deref(), Some("b2"));
        assert!(outcome_for_track(&conn, 99).unwrap().is_none());

        let albums = album_summary(&conn).unwrap();
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].0, "a");
        assert_eq!(albums[0].2, 2);
    }

    #[test]
    fn test_rewrite_replaces_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matches.sqlite3");
        let (_, table) = sample();
        let classes = classify(&table, &[], &select_standalone_matches(&table));

        write_match_log(&path, &table, &[], &classes).unwrap();
        write_match_log(&path, &table, &[], &classes).unwrap();

        let conn = open_match_log(&path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM match_log", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, table.len() as i64);
    }

    #[test]
    fn test_failed_matches_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spotify-matcher.log");
        let (tracks, table) = sample();
        let classes = classify(&table, &[], &select_standalone_matches(&table));

        let written = write_failed_matches(&path, &tracks, &classes).unwrap();
        assert_eq!(written, 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "Band - Song 3\n");
    }
}
