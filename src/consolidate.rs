//! Album consolidation and standalone selection.
//!
//! Consolidation is a greedy fixpoint over the match table. Each round
//! regroups the rows that are still eligible by album id, keeps albums
//! nominated by at least `album_threshold` distinct local tracks, and picks
//! the one with the highest mean candidate similarity (smallest album id on
//! ties). Every local track with any row on the winner is claimed, so all of
//! its rows, including ones pointing at other albums, leave the pool. Each
//! round removes at least the winner's rows, so the loop terminates.
//!
//! Whatever is left unclaimed afterwards is matched track by track.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::models::{AlbumDecision, Classification, MatchTable, StandaloneMatch};

/// Mean similarity and distinct nominating tracks for one album in a round.
#[derive(Debug, Default)]
struct AlbumTally {
    similarity_sum: f64,
    rows: usize,
    tracks: FxHashSet<u64>,
}

impl AlbumTally {
    fn mean(&self) -> f64 {
        self.similarity_sum / self.rows as f64
    }
}

/// Best album among the eligible rows, if any reaches the threshold.
fn pick_winner(table: &MatchTable, album_threshold: usize) -> Option<(String, f64)> {
    let mut tallies: FxHashMap<&str, AlbumTally> = FxHashMap::default();

    for row in table.rows().iter().filter(|r| r.is_eligible()) {
        let (Some(album_id), Some(similarity)) = (row.album_id(), row.similarity()) else {
            continue;
        };
        let tally = tallies.entry(album_id).or_default();
        tally.similarity_sum += similarity;
        tally.rows += 1;
        tally.tracks.insert(row.discovery_id());
    }

    tallies
        .into_iter()
        .filter(|(_, tally)| tally.tracks.len() >= album_threshold)
        .map(|(album_id, tally)| (album_id, tally.mean()))
        .max_by(|(id_a, mean_a), (id_b, mean_b)| {
            // Higher mean wins; on equal means the smaller id wins
            mean_a.total_cmp(mean_b).then_with(|| id_b.cmp(id_a))
        })
        .map(|(album_id, mean)| (album_id.to_string(), mean))
}

/// Run album consolidation to a fixpoint, updating the table's flags.
///
/// Flags are reset on entry, so consolidating the same table again
/// reproduces the same decisions and flags. A decision's members are the
/// tracks newly claimed in its round; no track belongs to two decisions.
pub fn consolidate_albums(table: &mut MatchTable, album_threshold: usize) -> Vec<AlbumDecision> {
    table.reset_flags();
    let threshold = album_threshold.max(1);
    let mut decisions = Vec::new();
    let mut claimed: FxHashSet<u64> = FxHashSet::default();

    while let Some((album_id, mean_similarity)) = pick_winner(table, threshold) {
        // Every track with any row on the winner, across the full table
        let nominating: FxHashSet<u64> = table
            .rows()
            .iter()
            .filter(|r| r.album_id() == Some(album_id.as_str()))
            .map(|r| r.discovery_id())
            .collect();

        for row in table.rows_mut() {
            if nominating.contains(&row.discovery_id()) {
                row.album_track_mask = true;
            }
            if row.album_id() == Some(album_id.as_str()) {
                row.album_matched = true;
            }
        }

        let members: BTreeSet<u64> = nominating
            .into_iter()
            .filter(|id| claimed.insert(*id))
            .collect();

        log::info!(
            "Album {} selected: {} tracks, mean similarity {:.3}",
            album_id,
            members.len(),
            mean_similarity
        );
        decisions.push(AlbumDecision {
            album_id,
            member_discovery_ids: members,
            mean_similarity,
        });
    }

    decisions
}

/// Best remaining candidate for every unclaimed track.
///
/// Relies on rows being in descending similarity order within each track,
/// so the first eligible row with a candidate is the best one.
pub fn select_standalone_matches(table: &MatchTable) -> Vec<StandaloneMatch> {
    let mut seen: FxHashSet<u64> = FxHashSet::default();
    let mut matches = Vec::new();

    for row in table.rows().iter().filter(|r| r.is_eligible()) {
        let Some(candidate) = &row.candidate else {
            continue;
        };
        if seen.insert(row.discovery_id()) {
            matches.push(StandaloneMatch {
                discovery_id: row.discovery_id(),
                track_id: candidate.track_id.clone(),
                similarity: candidate.similarity,
            });
        }
    }

    matches
}

/// One classification per discovery id in the table.
pub fn classify(
    table: &MatchTable,
    albums: &[AlbumDecision],
    standalone: &[StandaloneMatch],
) -> BTreeMap<u64, Classification> {
    let mut result: BTreeMap<u64, Classification> = table
        .discovery_ids()
        .into_iter()
        .map(|id| (id, Classification::Unmatched))
        .collect();

    for decision in albums {
        for id in &decision.member_discovery_ids {
            result.insert(*id, Classification::ConsolidatedAlbum(decision.album_id.clone()));
        }
    }
    for m in standalone {
        if let Some(slot) = result.get_mut(&m.discovery_id) {
            if *slot == Classification::Unmatched {
                *slot = Classification::StandaloneTrack(m.track_id.clone());
            }
        }
    }

    result
}
