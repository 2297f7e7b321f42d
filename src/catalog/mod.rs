//! Remote catalog boundary.
//!
//! The engine only talks to the catalog through [`CatalogClient`]. The
//! Spotify implementation lives in [`spotify`]; [`memory`] holds a scripted
//! in-process catalog for offline runs and tests.

pub mod memory;
pub mod spotify;

use crate::error::CatalogError;
use crate::models::HitField;

pub use memory::InMemoryCatalog;
pub use spotify::SpotifyClient;

/// One track search result as returned by the catalog, before scoring.
#[derive(Clone, Debug, PartialEq)]
pub struct RawHit {
    pub track_id: String,
    pub name: String,
    pub artists: Vec<String>, // credited order
    pub album: Option<String>,
    pub album_id: Option<String>,
    pub popularity: i32,
}

impl RawHit {
    /// Value compared for `field`, `None` when missing or blank. Artist is
    /// the credited artist line, as stored on the ranked candidate.
    pub fn value(&self, field: HitField) -> Option<String> {
        match field {
            HitField::Track => Some(self.name.trim().to_string()),
            HitField::Artist => Some(self.artist_line()),
            HitField::Album => self.album.as_deref().map(|a| a.trim().to_string()),
        }
        .filter(|v| !v.is_empty())
    }

    /// Non-blank credited artists joined with ", ".
    pub fn artist_line(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Operations the matcher needs from a remote catalog.
///
/// All calls are blocking; callers pace them.
pub trait CatalogClient {
    /// Free-text track search, best hits first.
    fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<RawHit>, CatalogError>;

    /// Every track id on an album, in album order.
    fn album_tracks(&self, album_id: &str) -> Result<Vec<String>, CatalogError>;

    fn playlist_exists(&self, playlist_id: &str) -> Result<bool, CatalogError>;

    /// Create a playlist and return its id.
    fn create_playlist(
        &self,
        owner: &str,
        name: &str,
        description: &str,
    ) -> Result<String, CatalogError>;

    /// Append tracks. Callers keep each call within the catalog's item limit.
    fn add_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<(), CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_skips_blank_fields() {
        let hit = RawHit {
            track_id: "t1".into(),
            name: "Song".into(),
            artists: vec!["A".into(), " ".into(), "B".into()],
            album: Some("".into()),
            album_id: None,
            popularity: 10,
        };
        assert_eq!(hit.value(HitField::Track).as_deref(), Some("Song"));
        assert_eq!(hit.value(HitField::Artist).as_deref(), Some("A, B"));
        assert_eq!(hit.value(HitField::Album), None);

        let uncredited = RawHit {
            artists: vec!["  ".into()],
            ..hit
        };
        assert_eq!(uncredited.value(HitField::Artist), None);
    }
}
