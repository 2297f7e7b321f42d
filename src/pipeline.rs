//! End-to-end matching over an already discovered library.

use std::collections::BTreeMap;
use std::time::Instant;

use crate::batch::batch_match;
use crate::catalog::CatalogClient;
use crate::config::MatcherConfig;
use crate::consolidate::{classify, consolidate_albums, select_standalone_matches};
use crate::error::MatchError;
use crate::models::{AlbumDecision, Classification, LocalTrack, MatchTable, MatchingStats, StandaloneMatch};

/// Everything the engine decided for one library.
#[derive(Debug)]
pub struct MatchOutcome {
    pub table: MatchTable,
    pub albums: Vec<AlbumDecision>,
    pub standalone: Vec<StandaloneMatch>,
    pub classification: BTreeMap<u64, Classification>,
    pub stats: MatchingStats,
}

impl MatchOutcome {
    /// "N album, N track, N unmatched" for logs and error messages.
    pub fn classification_summary(&self) -> String {
        format!(
            "{} album, {} track, {} unmatched",
            self.stats.album_tracks, self.stats.standalone_matches, self.stats.unmatched
        )
    }
}

/// Match, consolidate and classify `tracks`.
pub fn match_library<C: CatalogClient + ?Sized>(
    tracks: &[LocalTrack],
    catalog: &C,
    config: &MatcherConfig,
) -> Result<MatchOutcome, MatchError> {
    config.validate()?;
    let start = Instant::now();
    let mut stats = MatchingStats {
        total_tracks: tracks.len(),
        ..Default::default()
    };

    let mut table = batch_match(tracks, catalog, &config.batch_options(), &mut stats)?;
    stats.log_phase("matching");

    let albums = consolidate_albums(&mut table, config.album_threshold);
    let standalone = select_standalone_matches(&table);
    let classification = classify(&table, &albums, &standalone);

    stats.albums_consolidated = albums.len();
    for class in classification.values() {
        match class {
            Classification::ConsolidatedAlbum(_) => stats.album_tracks += 1,
            Classification::StandaloneTrack(_) => stats.standalone_matches += 1,
            Classification::Unmatched => stats.unmatched += 1,
        }
    }
    stats.elapsed_seconds = start.elapsed().as_secs_f64();
    stats.log_phase("consolidation");

    Ok(MatchOutcome {
        table,
        albums,
        standalone,
        classification,
        stats,
    })
}
