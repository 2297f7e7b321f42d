//! Core data models for local-to-catalog matching.
//!
//! This module contains the track records, the candidate/match table the
//! engine mutates, the decisions it derives, and run statistics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

// ============================================================================
// Local Models
// ============================================================================

/// Audio file discovered on disk, with the tags the matcher cares about.
/// `discovery_id` is assigned in traversal order and is the join key for
/// every downstream table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalTrack {
    pub discovery_id: u64,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub date: Option<String>,
    pub path: PathBuf,
}

impl LocalTrack {
    /// Tag value for `field`, `None` when missing or blank.
    pub fn field(&self, field: LocalField) -> Option<&str> {
        let value = match field {
            LocalField::Title => self.title.as_deref(),
            LocalField::Artist => self.artist.as_deref(),
            LocalField::Album => self.album.as_deref(),
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    /// "Artist - Title" label used in logs and the failed-matches file.
    pub fn display_name(&self) -> String {
        let artist = self.field(LocalField::Artist).unwrap_or("Unknown Artist");
        match self.field(LocalField::Title) {
            Some(title) => format!("{} - {}", artist, title),
            None => format!("{} - {}", artist, self.path.display()),
        }
    }
}

// ============================================================================
// Field Weights
// ============================================================================

/// Comparable tag on a local track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalField {
    Title,
    Artist,
    Album,
}

/// Comparable field on a catalog hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitField {
    Track,
    Artist,
    Album,
}

/// One (local field, hit field, weight) triple. `query_key` names the
/// catalog search filter the local value is sent under; pairs without one
/// only take part in scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldWeight {
    pub local: LocalField,
    pub hit: HitField,
    pub weight: f64,
    #[serde(default)]
    pub query_key: Option<String>,
}

// ============================================================================
// Candidate Models
// ============================================================================

/// Projection of one catalog search result, scored against a local track.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CandidateHit {
    pub album: Option<String>,
    pub album_id: Option<String>,
    pub track_id: String,
    pub track: String,
    pub popularity: i32, // 0-100
    pub artist: String,  // credited artists joined with ", "
    pub similarity: f64, // 0.0-1.0
}

/// One (local track x candidate-or-none) pairing. A row with no candidate is
/// the sentinel emitted for tracks whose search returned nothing.
#[derive(Clone, Debug)]
pub struct MatchRow {
    pub local: Arc<LocalTrack>,
    pub candidate: Option<CandidateHit>,
    /// Row points at an album that won consolidation.
    pub album_matched: bool,
    /// Row's track was claimed by a winning album.
    pub album_track_mask: bool,
}

impl MatchRow {
    pub fn new(local: Arc<LocalTrack>, candidate: Option<CandidateHit>) -> Self {
        Self {
            local,
            candidate,
            album_matched: false,
            album_track_mask: false,
        }
    }

    pub fn discovery_id(&self) -> u64 {
        self.local.discovery_id
    }

    pub fn album_id(&self) -> Option<&str> {
        self.candidate.as_ref().and_then(|c| c.album_id.as_deref())
    }

    pub fn track_id(&self) -> Option<&str> {
        self.candidate.as_ref().map(|c| c.track_id.as_str())
    }

    pub fn similarity(&self) -> Option<f64> {
        self.candidate.as_ref().map(|c| c.similarity)
    }

    /// Still available to album consolidation and standalone selection.
    pub fn is_eligible(&self) -> bool {
        !self.album_matched && !self.album_track_mask
    }
}

/// Flat table of match rows in emission order.
#[derive(Clone, Debug, Default)]
pub struct MatchTable {
    rows: Vec<MatchRow>,
}

impl MatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: MatchRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[MatchRow] {
        &self.rows
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [MatchRow] {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows belonging to one local track, in emission order.
    pub fn rows_for(&self, discovery_id: u64) -> impl Iterator<Item = &MatchRow> {
        self.rows
            .iter()
            .filter(move |r| r.discovery_id() == discovery_id)
    }

    pub fn discovery_ids(&self) -> BTreeSet<u64> {
        self.rows.iter().map(MatchRow::discovery_id).collect()
    }

    pub(crate) fn reset_flags(&mut self) {
        for row in &mut self.rows {
            row.album_matched = false;
            row.album_track_mask = false;
        }
    }
}

// ============================================================================
// Decisions
// ============================================================================

/// A remote album chosen to stand in for several local tracks.
#[derive(Clone, Debug, PartialEq)]
pub struct AlbumDecision {
    pub album_id: String,
    pub member_discovery_ids: BTreeSet<u64>,
    pub mean_similarity: f64,
}

/// A local track matched to a single remote track.
#[derive(Clone, Debug, PartialEq)]
pub struct StandaloneMatch {
    pub discovery_id: u64,
    pub track_id: String,
    pub similarity: f64,
}

/// Final outcome for one local track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    ConsolidatedAlbum(String),
    StandaloneTrack(String),
    Unmatched,
}

impl Classification {
    pub fn label(&self) -> &'static str {
        match self {
            Classification::ConsolidatedAlbum(_) => "album",
            Classification::StandaloneTrack(_) => "track",
            Classification::Unmatched => "unmatched",
        }
    }

    pub fn remote_id(&self) -> Option<&str> {
        match self {
            Classification::ConsolidatedAlbum(id) | Classification::StandaloneTrack(id) => {
                Some(id)
            }
            Classification::Unmatched => None,
        }
    }
}

// ============================================================================
// Statistics (Instrumentation)
// ============================================================================

/// Per-phase counters for a run, logged and optionally written as JSON.
#[derive(Default, Debug, Clone, Serialize)]
pub struct MatchingStats {
    // Discovery
    pub total_tracks: usize,

    // Batch matching
    pub searched_tracks: usize,
    pub empty_queries: usize,
    pub search_failures: usize,
    pub tracks_without_candidates: usize,
    pub candidate_rows: usize,

    // Consolidation and selection
    pub albums_consolidated: usize,
    pub album_tracks: usize,
    pub standalone_matches: usize,
    pub unmatched: usize,

    // Playlist
    pub playlist_track_ids: usize,

    // Timing
    pub elapsed_seconds: f64,
}

impl MatchingStats {
    /// Matched (album or standalone) tracks as a percentage of all tracks
    pub fn match_rate(&self) -> f64 {
        if self.total_tracks == 0 {
            0.0
        } else {
            100.0 * (self.album_tracks + self.standalone_matches) as f64
                / self.total_tracks as f64
        }
    }

    /// Log stats in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            log::info!("[STATS:{}]\n{}", phase, json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
