//! Playlist assembly and submission.

use std::thread;
use std::time::Duration;

use rustc_hash::FxHashSet;

use crate::catalog::CatalogClient;
use crate::error::{CatalogError, MatchError};
use crate::models::{AlbumDecision, StandaloneMatch};
use crate::progress::create_progress_bar;

pub const PLAYLIST_NAME: &str = "SpotifyMatcher";

#[derive(Debug, Clone)]
pub struct SubmitOptions {
    /// Track ids per add call, at most the catalog's per-call limit.
    pub batch_limit: usize,
    pub batch_delay: Duration,
    pub rate_limit_retries: u32,
}

/// Full track list of every winning album, then the standalone ids,
/// de-duplicated in first-seen order.
pub fn assemble_track_ids<C: CatalogClient + ?Sized>(
    catalog: &C,
    albums: &[AlbumDecision],
    standalone: &[StandaloneMatch],
) -> Result<Vec<String>, CatalogError> {
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut ids = Vec::new();

    for decision in albums {
        let tracks = catalog.album_tracks(&decision.album_id)?;
        log::debug!("Album {} resolved to {} tracks", decision.album_id, tracks.len());
        for id in tracks {
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
    }
    for m in standalone {
        if seen.insert(m.track_id.clone()) {
            ids.push(m.track_id.clone());
        }
    }

    Ok(ids)
}

/// Playlist description stamped with the creation time.
pub fn playlist_description(now: chrono::DateTime<chrono::Local>) -> String {
    format!(
        "Playlist automatically created by {} from local files on {}.",
        PLAYLIST_NAME,
        now.format("%-d %b %Y at %H:%M")
    )
}

/// Reuse `requested` when it names an existing playlist, otherwise create
/// a new one owned by `owner`.
pub fn ensure_playlist<C: CatalogClient + ?Sized>(
    catalog: &C,
    owner: &str,
    requested: Option<&str>,
) -> Result<String, CatalogError> {
    match requested.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) if catalog.playlist_exists(id)? => {
            log::info!("Using existing playlist {}", id);
            return Ok(id.to_string());
        }
        Some(id) => log::warn!("Playlist {} not found, creating a new one", id),
        None => log::info!("No playlist id given, creating a new one"),
    }

    let description = playlist_description(chrono::Local::now());
    let id = catalog.create_playlist(owner, PLAYLIST_NAME, &description)?;
    log::info!("Created playlist {} (https://open.spotify.com/playlist/{})", id, id);
    Ok(id)
}

/// Add `track_ids` to the playlist in batches, pausing between batches.
///
/// A rate-limited batch is retried after the server's `Retry-After` (or the
/// batch delay when absent), up to `rate_limit_retries` times. Any other
/// failure stops submission. Returns the number of ids submitted.
pub fn submit_tracks<C: CatalogClient + ?Sized>(
    catalog: &C,
    playlist_id: &str,
    track_ids: &[String],
    options: &SubmitOptions,
) -> Result<usize, MatchError> {
    if options.batch_limit == 0 {
        return Err(MatchError::InvalidConfig(
            "playlist_batch_limit must be at least 1".into(),
        ));
    }

    let batches: Vec<&[String]> = track_ids.chunks(options.batch_limit).collect();
    let pb = create_progress_bar(track_ids.len() as u64, "Adding tracks");

    for (idx, batch) in batches.iter().enumerate() {
        let mut attempts = 0u32;
        loop {
            match catalog.add_tracks(playlist_id, batch) {
                Ok(()) => break,
                Err(e) if e.is_rate_limited() && attempts < options.rate_limit_retries => {
                    attempts += 1;
                    let wait = e.retry_after().unwrap_or(options.batch_delay);
                    log::warn!(
                        "Rate limited on batch {}/{}, retry {} in {:?}",
                        idx + 1,
                        batches.len(),
                        attempts,
                        wait
                    );
                    thread::sleep(wait);
                }
                Err(e) => {
                    pb.abandon_with_message("Submission failed");
                    return Err(MatchError::Catalog(e));
                }
            }
        }

        pb.inc(batch.len() as u64);
        if idx + 1 < batches.len() && !options.batch_delay.is_zero() {
            thread::sleep(options.batch_delay);
        }
    }

    pb.finish_with_message(format!("Added {} tracks", track_ids.len()));
    Ok(track_ids.len())
}
