//! Candidate ranking: query construction, projection and ordering of
//! catalog hits for one local track.

use crate::catalog::{CatalogClient, RawHit};
use crate::error::CatalogError;
use crate::models::{CandidateHit, FieldWeight, LocalTrack};
use crate::scoring::composite_similarity;

/// Search query for `local`: one `key:value` clause per weighted pair that
/// has a query key and a present local value, joined by single spaces.
/// Empty when the track has none of the queried fields.
pub fn build_query(local: &LocalTrack, weights: &[FieldWeight]) -> String {
    weights
        .iter()
        .filter_map(|pair| {
            let key = pair.query_key.as_deref()?;
            let value = local.field(pair.local)?;
            Some(format!("{}:{}", key, value))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Score raw hits against `local` and order them by descending similarity,
/// then descending popularity. The sort is stable, so remaining ties keep
/// the catalog's order. Hits with nothing comparable are dropped.
pub fn rank_hits(
    local: &LocalTrack,
    hits: Vec<RawHit>,
    weights: &[FieldWeight],
    normalize_fields: bool,
) -> Vec<CandidateHit> {
    let mut candidates: Vec<CandidateHit> = hits
        .into_iter()
        .filter_map(|hit| match composite_similarity(local, &hit, weights, normalize_fields) {
            Ok(similarity) => Some(CandidateHit {
                artist: hit.artist_line(),
                album: hit.album,
                album_id: hit.album_id,
                track_id: hit.track_id,
                track: hit.name,
                popularity: hit.popularity,
                similarity,
            }),
            Err(e) => {
                log::debug!("Dropping hit {} for #{}: {}", hit.track_id, local.discovery_id, e);
                None
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| b.popularity.cmp(&a.popularity))
    });
    candidates
}

/// Ranked candidates for one local track.
///
/// Returns `Ok(None)` when no query could be built, so the caller can tell
/// "nothing searched" from "searched, nothing found".
pub fn rank_candidates<C: CatalogClient + ?Sized>(
    local: &LocalTrack,
    catalog: &C,
    weights: &[FieldWeight],
    search_limit: usize,
    normalize_fields: bool,
) -> Result<Option<Vec<CandidateHit>>, CatalogError> {
    let query = build_query(local, weights);
    if query.is_empty() {
        return Ok(None);
    }

    log::debug!("Searching #{}: {}", local.discovery_id, query);
    let hits = catalog.search_tracks(&query, search_limit)?;
    Ok(Some(rank_hits(local, hits, weights, normalize_fields)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::scoring::default_field_weights;
    use std::path::PathBuf;

    fn local(title: Option<&str>, artist: Option<&str>, album: Option<&str>) -> LocalTrack {
        LocalTrack {
            discovery_id: 7,
            title: title.map(String::from),
            artist: artist.map(String::from),
            album: album.map(String::from),
            date: None,
            path: PathBuf::from("/music/x.mp3"),
        }
    }

    fn hit(id: &str, name: &str, popularity: i32) -> RawHit {
        RawHit {
            track_id: id.into(),
            name: name.into(),
            artists: vec!["Artist".into()],
            album: None,
            album_id: None,
            popularity,
        }
    }

    #[test]
    fn test_build_query() {
        let weights = default_field_weights();
        assert_eq!(
            build_query(&local(Some("Song"), Some("Artist"), Some("Album")), &weights),
            "track:Song artist:Artist"
        );
        assert_eq!(build_query(&local(None, Some("Artist"), None), &weights), "artist:Artist");
        assert_eq!(build_query(&local(None, None, Some("Album")), &weights), "");
    }

    #[test]
    fn test_rank_orders_by_similarity_then_popularity() {
        let l = local(Some("Song"), None, None);
        let hits = vec![
            hit("far", "Something Else Entirely", 100),
            hit("exact-low", "Song", 10),
            hit("exact-high", "Song", 90),
            hit("exact-low-2", "Song", 10),
        ];
        let ranked = rank_hits(&l, hits, &default_field_weights(), false);
        let ids: Vec<&str> = ranked.iter().map(|c| c.track_id.as_str()).collect();
        // Equal similarity and popularity keep the catalog's order
        assert_eq!(ids, vec!["exact-high", "exact-low", "exact-low-2", "far"]);
        for pair in ranked.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    #[test]
    fn test_rank_drops_incomparable_hits() {
        let l = local(Some("Song"), None, None);
        let blank = RawHit {
            name: "  ".into(),
            ..hit("blank", "", 0)
        };
        let ranked = rank_hits(&l, vec![blank, hit("ok", "Song", 1)], &default_field_weights(), false);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].track_id, "ok");
    }

    #[test]
    fn test_empty_query_issues_no_search() {
        let catalog = InMemoryCatalog::new();
        let result = rank_candidates(&local(None, None, None), &catalog, &default_field_weights(), 5, false);
        assert!(matches!(result, Ok(None)));
        assert!(catalog.searches_issued().is_empty());
    }

    #[test]
    fn test_rank_candidates_uses_catalog() {
        let catalog = InMemoryCatalog::new()
            .with_search("track:Song artist:Artist", vec![hit("a", "Song", 5)]);
        let ranked = rank_candidates(
            &local(Some("Song"), Some("Artist"), None),
            &catalog,
            &default_field_weights(),
            5,
            false,
        )
        .unwrap()
        .unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].artist, "Artist");
        assert!((ranked[0].similarity - 1.0).abs() < 1e-9);
    }
}
