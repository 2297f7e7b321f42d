//! Scripted in-process catalog.
//!
//! Searches are answered from a query -> hits table, albums from an
//! album -> track ids table, and playlist mutations are recorded so they
//! can be inspected afterwards. Faults can be injected per query or per
//! playlist call.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use super::{CatalogClient, RawHit};
use crate::error::CatalogError;

#[derive(Default)]
pub struct InMemoryCatalog {
    searches: HashMap<String, Vec<RawHit>>,
    albums: HashMap<String, Vec<String>>,
    failing_queries: HashSet<String>,
    credentials_rejected: bool,
    rate_limited_adds: Cell<usize>,
    reject_adds: bool,
    search_log: RefCell<Vec<String>>,
    add_calls: RefCell<Vec<Vec<String>>>,
    playlists: RefCell<HashMap<String, Vec<String>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `query` with `hits`, in the given order.
    pub fn with_search(mut self, query: &str, hits: Vec<RawHit>) -> Self {
        self.searches.insert(query.to_string(), hits);
        self
    }

    pub fn with_album(mut self, album_id: &str, track_ids: &[&str]) -> Self {
        self.albums.insert(
            album_id.to_string(),
            track_ids.iter().map(|id| id.to_string()).collect(),
        );
        self
    }

    pub fn with_playlist(self, playlist_id: &str) -> Self {
        self.playlists
            .borrow_mut()
            .insert(playlist_id.to_string(), Vec::new());
        self
    }

    /// Searching `query` fails with a 503.
    pub fn with_failing_query(mut self, query: &str) -> Self {
        self.failing_queries.insert(query.to_string());
        self
    }

    /// Every search fails with `Unauthorized`.
    pub fn with_rejected_credentials(mut self) -> Self {
        self.credentials_rejected = true;
        self
    }

    /// The next `count` add calls are rate limited.
    pub fn with_rate_limited_adds(self, count: usize) -> Self {
        self.rate_limited_adds.set(count);
        self
    }

    /// Every add call is rejected as invalid input.
    pub fn with_rejected_adds(mut self) -> Self {
        self.reject_adds = true;
        self
    }

    /// Queries issued so far, in order.
    pub fn searches_issued(&self) -> Vec<String> {
        self.search_log.borrow().clone()
    }

    /// Track id batches passed to `add_tracks`, including rejected ones.
    pub fn add_calls(&self) -> Vec<Vec<String>> {
        self.add_calls.borrow().clone()
    }

    pub fn playlist_tracks(&self, playlist_id: &str) -> Option<Vec<String>> {
        self.playlists.borrow().get(playlist_id).cloned()
    }
}

impl CatalogClient for InMemoryCatalog {
    fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<RawHit>, CatalogError> {
        self.search_log.borrow_mut().push(query.to_string());
        if self.credentials_rejected {
            return Err(CatalogError::Unauthorized("token expired".into()));
        }
        if self.failing_queries.contains(query) {
            return Err(CatalogError::Status {
                status: 503,
                body: "service unavailable".into(),
            });
        }
        Ok(self
            .searches
            .get(query)
            .map(|hits| hits.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn album_tracks(&self, album_id: &str) -> Result<Vec<String>, CatalogError> {
        self.albums
            .get(album_id)
            .cloned()
            .ok_or_else(|| CatalogError::InvalidRequest(format!("unknown album {}", album_id)))
    }

    fn playlist_exists(&self, playlist_id: &str) -> Result<bool, CatalogError> {
        Ok(self.playlists.borrow().contains_key(playlist_id))
    }

    fn create_playlist(
        &self,
        owner: &str,
        name: &str,
        _description: &str,
    ) -> Result<String, CatalogError> {
        let mut playlists = self.playlists.borrow_mut();
        let id = format!("{}-{}-{}", owner, name, playlists.len() + 1);
        playlists.insert(id.clone(), Vec::new());
        Ok(id)
    }

    fn add_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<(), CatalogError> {
        self.add_calls.borrow_mut().push(track_ids.to_vec());
        let remaining = self.rate_limited_adds.get();
        if remaining > 0 {
            self.rate_limited_adds.set(remaining - 1);
            return Err(CatalogError::RateLimited { retry_after: None });
        }
        if self.reject_adds {
            return Err(CatalogError::InvalidRequest("invalid track uri".into()));
        }
        match self.playlists.borrow_mut().get_mut(playlist_id) {
            Some(tracks) => {
                tracks.extend_from_slice(track_ids);
                Ok(())
            }
            None => Err(CatalogError::InvalidRequest(format!(
                "unknown playlist {}",
                playlist_id
            ))),
        }
    }
}
