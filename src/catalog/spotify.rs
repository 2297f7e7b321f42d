//! Spotify Web API client.
//!
//! Responses are decoded into typed structs whose optional parts are
//! `Option`s, so a missing album or a null track id simply drops out of the
//! projection instead of failing the whole search.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use super::{CatalogClient, RawHit};
use crate::error::CatalogError;

pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";
pub const DEFAULT_AUTH_URL: &str = "https://accounts.spotify.com/api/token";

/// Maximum items per "add tracks to playlist" call.
pub const PLAYLIST_ADD_LIMIT: usize = 100;

/// Maximum page size for album track listings.
const ALBUM_PAGE_SIZE: usize = 50;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Response Shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct Paging<T> {
    #[serde(default = "Vec::new")]
    items: Vec<Option<T>>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Option<Paging<TrackObject>>,
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    id: Option<String>,
    #[serde(default)]
    name: String,
    popularity: Option<i32>,
    #[serde(default)]
    artists: Vec<ArtistObject>,
    album: Option<AlbumObject>,
}

#[derive(Debug, Deserialize)]
struct ArtistObject {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct AlbumObject {
    id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SimplifiedTrack {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl TrackObject {
    /// Local files and unavailable tracks come back without an id.
    fn into_hit(self) -> Option<RawHit> {
        let track_id = self.id.filter(|id| !id.is_empty())?;
        let (album_id, album) = match self.album {
            Some(album) => (album.id.filter(|id| !id.is_empty()), album.name),
            None => (None, None),
        };
        Some(RawHit {
            track_id,
            name: self.name,
            artists: self.artists.into_iter().map(|a| a.name).collect(),
            album,
            album_id,
            popularity: self.popularity.unwrap_or(0),
        })
    }
}

fn search_hits(response: SearchResponse) -> Vec<RawHit> {
    response
        .tracks
        .map(|page| {
            page.items
                .into_iter()
                .flatten()
                .filter_map(TrackObject::into_hit)
                .collect()
        })
        .unwrap_or_default()
}

/// Seconds form of the Retry-After header. The HTTP-date form is ignored.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Map a non-2xx response onto the catalog error taxonomy.
fn check(response: Response) -> Result<Response, CatalogError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = response.text().unwrap_or_default();

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => CatalogError::RateLimited { retry_after },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CatalogError::Unauthorized(body),
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => CatalogError::InvalidRequest(body),
        other => CatalogError::Status {
            status: other.as_u16(),
            body,
        },
    })
}

// ============================================================================
// Client
// ============================================================================

pub struct SpotifyClient {
    http: Client,
    api_base: String,
    token: String,
}

impl SpotifyClient {
    /// Client using an existing bearer token. Playlist changes need a user
    /// token with the `playlist-modify-*` scopes.
    pub fn new(api_base: &str, token: &str) -> Result<Self, CatalogError> {
        Ok(Self {
            http: build_http()?,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Client authenticated with the client-credentials grant. The resulting
    /// app token can search and read albums but cannot modify playlists.
    pub fn with_client_credentials(
        api_base: &str,
        auth_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Self, CatalogError> {
        let http = build_http()?;
        let response = http
            .post(auth_url)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()?;
        let token: TokenResponse = check(response)?.json()?;
        log::debug!("Obtained client-credentials token");

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.access_token,
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http
            .get(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.token)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.token)
    }
}

fn build_http() -> Result<Client, CatalogError> {
    Ok(Client::builder()
        .user_agent(concat!("spotify-matcher/", env!("CARGO_PKG_VERSION")))
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

impl CatalogClient for SpotifyClient {
    fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<RawHit>, CatalogError> {
        let limit = limit.clamp(1, 50).to_string();
        let response = self
            .get("/search")
            .query(&[("q", query), ("type", "track"), ("limit", limit.as_str())])
            .send()?;
        let body: SearchResponse = check(response)?.json()?;
        Ok(search_hits(body))
    }

    fn album_tracks(&self, album_id: &str) -> Result<Vec<String>, CatalogError> {
        let mut track_ids = Vec::new();
        let mut offset = 0usize;
        loop {
            let response = self
                .get(&format!("/albums/{}/tracks", album_id))
                .query(&[
                    ("limit", ALBUM_PAGE_SIZE.to_string()),
                    ("offset", offset.to_string()),
                ])
                .send()?;
            let page: Paging<SimplifiedTrack> = check(response)?.json()?;
            let fetched = page.items.len();
            track_ids.extend(page.items.into_iter().flatten().filter_map(|t| t.id));

            if page.next.is_none() || fetched == 0 {
                break;
            }
            offset += fetched;
        }
        Ok(track_ids)
    }

    fn playlist_exists(&self, playlist_id: &str) -> Result<bool, CatalogError> {
        let response = self
            .get(&format!("/playlists/{}", playlist_id))
            .query(&[("fields", "id")])
            .send()?;
        match check(response) {
            Ok(_) => Ok(true),
            Err(CatalogError::InvalidRequest(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn create_playlist(
        &self,
        owner: &str,
        name: &str,
        description: &str,
    ) -> Result<String, CatalogError> {
        let response = self
            .post(&format!("/users/{}/playlists", owner))
            .json(&json!({
                "name": name,
                "description": description,
                "public": true,
            }))
            .send()?;
        let playlist: PlaylistObject = check(response)?.json()?;
        Ok(playlist.id)
    }

    fn add_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<(), CatalogError> {
        if track_ids.len() > PLAYLIST_ADD_LIMIT {
            return Err(CatalogError::InvalidRequest(format!(
                "{} tracks exceeds the per-call limit of {}",
                track_ids.len(),
                PLAYLIST_ADD_LIMIT
            )));
        }
        let uris: Vec<String> = track_ids
            .iter()
            .map(|id| format!("spotify:track:{}", id))
            .collect();
        let response = self
            .post(&format!("/playlists/{}/tracks", playlist_id))
            .json(&json!({ "uris": uris }))
            .send()?;
        check(response)?;
        Ok(())
    }
}
