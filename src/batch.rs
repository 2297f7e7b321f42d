//! Batch matching: run the ranker over every local track and flatten the
//! results into the match table.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::catalog::CatalogClient;
use crate::error::MatchError;
use crate::models::{FieldWeight, LocalTrack, MatchRow, MatchTable, MatchingStats};
use crate::progress::{create_progress_bar, log_progress};
use crate::ranking::rank_candidates;

/// Knobs for [`batch_match`].
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub search_limit: usize,
    /// Pause after every issued search.
    pub request_delay: Duration,
    pub field_weights: Vec<FieldWeight>,
    /// Compare normalized field values instead of the raw tags.
    pub normalize_fields: bool,
}

/// Match every local track against the catalog.
///
/// Tracks are processed in consecutive batches of at most `batch_size`.
/// A track whose search fails (other than with a fatal credential error) or
/// returns nothing contributes one sentinel row; otherwise one row per
/// ranked candidate, in rank order.
pub fn batch_match<C: CatalogClient + ?Sized>(
    tracks: &[LocalTrack],
    catalog: &C,
    options: &BatchOptions,
    stats: &mut MatchingStats,
) -> Result<MatchTable, MatchError> {
    if options.batch_size == 0 {
        return Err(MatchError::InvalidConfig("batch_size must be at least 1".into()));
    }

    let mut table = MatchTable::new();
    let total = tracks.len() as u64;
    let batch_count = tracks.len().div_ceil(options.batch_size);
    let pb = create_progress_bar(total, "Matching tracks");
    let mut processed = 0u64;

    for (batch_idx, batch) in tracks.chunks(options.batch_size).enumerate() {
        log::debug!(
            "Batch {}/{}: {} tracks",
            batch_idx + 1,
            batch_count,
            batch.len()
        );

        for track in batch {
            let local = Arc::new(track.clone());
            let candidates = match rank_candidates(
                track,
                catalog,
                &options.field_weights,
                options.search_limit,
                options.normalize_fields,
            ) {
                Ok(None) => {
                    log::debug!("#{} has no searchable tags", track.discovery_id);
                    stats.empty_queries += 1;
                    Vec::new()
                }
                Ok(Some(candidates)) => {
                    stats.searched_tracks += 1;
                    pause(options.request_delay);
                    candidates
                }
                Err(e) if e.is_fatal() => {
                    pb.abandon_with_message("Matching aborted");
                    return Err(MatchError::Catalog(e));
                }
                Err(e) => {
                    log::warn!("Search failed for {}: {}", track.display_name(), e);
                    stats.searched_tracks += 1;
                    stats.search_failures += 1;
                    pause(options.request_delay);
                    Vec::new()
                }
            };

            if candidates.is_empty() {
                stats.tracks_without_candidates += 1;
                table.push(MatchRow::new(local, None));
            } else {
                stats.candidate_rows += candidates.len();
                for candidate in candidates {
                    table.push(MatchRow::new(Arc::clone(&local), Some(candidate)));
                }
            }

            processed += 1;
            pb.inc(1);
            log_progress("match", processed, total, 100);
        }
    }

    pb.finish_with_message(format!("Matched {} tracks into {} rows", tracks.len(), table.len()));
    Ok(table)
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryCatalog, RawHit};
    use crate::scoring::default_field_weights;
    use std::path::PathBuf;

    fn local(id: u64, title: Option<&str>) -> LocalTrack {
        LocalTrack {
            discovery_id: id,
            title: title.map(String::from),
            artist: Some("Band".into()),
            album: None,
            date: None,
            path: PathBuf::from(format!("/music/{}.flac", id)),
        }
    }

    fn hit(id: &str, name: &str) -> RawHit {
        RawHit {
            track_id: id.into(),
            name: name.into(),
            artists: vec!["Band".into()],
            album: Some("Record".into()),
            album_id: Some("rec".into()),
            popularity: 0,
        }
    }

    fn options(batch_size: usize) -> BatchOptions {
        BatchOptions {
            batch_size,
            search_limit: 10,
            request_delay: Duration::ZERO,
            field_weights: default_field_weights(),
            normalize_fields: false,
        }
    }

    #[test]
    fn test_rows_per_track_and_sentinels() {
        let tracks = vec![
            local(0, Some("One")),
            local(1, Some("Two")),
            local(2, Some("Three")),
        ];
        let catalog = InMemoryCatalog::new()
            .with_search("track:One artist:Band", vec![hit("x", "Nothing Alike"), hit("a", "One")])
            .with_search("track:Three artist:Band", vec![hit("c", "Three")]);

        let mut stats = MatchingStats::default();
        let table = batch_match(&tracks, &catalog, &options(2), &mut stats).unwrap();

        assert_eq!(table.len(), 4);
        assert_eq!(table.discovery_ids().len(), 3);

        // Track 0: two candidates, best first
        let rows: Vec<_> = table.rows_for(0).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].track_id(), Some("a"));
        assert!(rows[0].similarity() >= rows[1].similarity());

        // Track 1: sentinel row with no candidate
        let rows: Vec<_> = table.rows_for(1).collect();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].candidate.is_none());
        assert!(!rows[0].album_matched && !rows[0].album_track_mask);

        assert_eq!(stats.searched_tracks, 3);
        assert_eq!(stats.tracks_without_candidates, 1);
        assert_eq!(stats.candidate_rows, 3);
    }

    #[test]
    fn test_failed_search_becomes_sentinel() {
        let tracks = vec![local(0, Some("Broken")), local(1, Some("Fine"))];
        let catalog = InMemoryCatalog::new()
            .with_failing_query("track:Broken artist:Band")
            .with_search("track:Fine artist:Band", vec![hit("f", "Fine")]);

        let mut stats = MatchingStats::default();
        let table = batch_match(&tracks, &catalog, &options(1), &mut stats).unwrap();

        assert!(table.rows_for(0).all(|r| r.candidate.is_none()));
        assert_eq!(table.rows_for(1).count(), 1);
        assert_eq!(stats.search_failures, 1);
    }

    #[test]
    fn test_fatal_fault_aborts() {
        let tracks = vec![local(0, Some("One")), local(1, Some("Two"))];
        let catalog = InMemoryCatalog::new().with_rejected_credentials();
        let mut stats = MatchingStats::default();
        let result = batch_match(&tracks, &catalog, &options(5), &mut stats);
        assert!(matches!(result, Err(MatchError::Catalog(_))));
        assert_eq!(catalog.searches_issued().len(), 1);
    }

    #[test]
    fn test_unsearchable_track_gets_sentinel_without_search() {
        let mut track = local(0, None);
        track.artist = None;
        let catalog = InMemoryCatalog::new();
        let mut stats = MatchingStats::default();
        let table = batch_match(&[track], &catalog, &options(3), &mut stats).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.rows()[0].candidate.is_none());
        assert!(catalog.searches_issued().is_empty());
        assert_eq!(stats.empty_queries, 1);
    }

    #[test]
    fn test_pause_after_each_search() {
        let delay = Duration::from_millis(20);
        let mut unsearchable = local(3, None);
        unsearchable.artist = None;
        let tracks = vec![
            local(0, Some("One")),
            local(1, Some("Two")),
            local(2, Some("Three")),
            unsearchable,
        ];
        let catalog = InMemoryCatalog::new();
        let opts = BatchOptions {
            request_delay: delay,
            ..options(2)
        };

        let mut stats = MatchingStats::default();
        let start = std::time::Instant::now();
        batch_match(&tracks, &catalog, &opts, &mut stats).unwrap();
        assert!(start.elapsed() >= delay * 3, "elapsed {:?}", start.elapsed());
        assert_eq!(catalog.searches_issued().len(), 3);
        assert_eq!(stats.empty_queries, 1);
    }

    #[test]
    fn test_no_pause_without_search() {
        let delay = Duration::from_secs(2);
        let mut track = local(0, None);
        track.artist = None;
        let opts = BatchOptions {
            request_delay: delay,
            ..options(1)
        };

        let mut stats = MatchingStats::default();
        let start = std::time::Instant::now();
        batch_match(&[track], &InMemoryCatalog::new(), &opts, &mut stats).unwrap();
        assert!(start.elapsed() < delay, "elapsed {:?}", start.elapsed());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let catalog = InMemoryCatalog::new();
        let mut stats = MatchingStats::default();
        let result = batch_match(&[local(0, Some("x"))], &catalog, &options(0), &mut stats);
        assert!(matches!(result, Err(MatchError::InvalidConfig(_))));
    }
}
