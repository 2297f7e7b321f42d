//! End-to-end matching against a scripted catalog.

use std::collections::BTreeSet;
use std::path::PathBuf;

use spotify_matcher::catalog::{InMemoryCatalog, RawHit};
use spotify_matcher::config::MatcherConfig;
use spotify_matcher::models::{Classification, LocalTrack};
use spotify_matcher::pipeline::match_library;
use spotify_matcher::playlist::{assemble_track_ids, ensure_playlist, submit_tracks, SubmitOptions};

fn local(id: u64, title: &str, artist: &str) -> LocalTrack {
    LocalTrack {
        discovery_id: id,
        title: Some(title.into()),
        artist: Some(artist.into()),
        album: None,
        date: None,
        path: PathBuf::from(format!("/music/{:02}.mp3", id)),
    }
}

fn hit(track_id: &str, name: &str, artist: &str, album_id: &str) -> RawHit {
    RawHit {
        track_id: track_id.into(),
        name: name.into(),
        artists: vec![artist.into()],
        album: Some(format!("Album {}", album_id)),
        album_id: Some(album_id.into()),
        popularity: 40,
    }
}

fn config() -> MatcherConfig {
    MatcherConfig {
        album_threshold: 3,
        request_delay_ms: 0,
        playlist_batch_delay_ms: 0,
        ..Default::default()
    }
}

#[test]
fn test_ten_tracks_one_album() {
    let tracks: Vec<LocalTrack> = (0..10)
        .map(|i| local(i, &format!("Song {}", i), "The Band"))
        .collect();

    // Tracks 0-2 find album X; the rest find nothing
    let mut catalog = InMemoryCatalog::new().with_album("X", &["x0", "x1", "x2", "x3", "x4"]);
    for i in 0..3 {
        catalog = catalog.with_search(
            &format!("track:Song {} artist:The Band", i),
            vec![hit(&format!("x{}", i), &format!("Song {}", i), "The Band", "X")],
        );
    }

    let outcome = match_library(&tracks, &catalog, &config()).unwrap();

    assert_eq!(outcome.albums.len(), 1);
    assert_eq!(outcome.albums[0].album_id, "X");
    assert_eq!(outcome.albums[0].member_discovery_ids, BTreeSet::from([0, 1, 2]));
    assert!(outcome.albums[0].mean_similarity >= 0.8);

    assert_eq!(outcome.classification.len(), 10);
    let unmatched = outcome
        .classification
        .values()
        .filter(|c| **c == Classification::Unmatched)
        .count();
    assert_eq!(unmatched, 7);
    assert!(outcome.standalone.is_empty());
    assert_eq!(outcome.classification_summary(), "3 album, 0 track, 7 unmatched");

    // Every track has at least one row, sentinels included
    assert_eq!(outcome.table.discovery_ids().len(), 10);
    assert_eq!(outcome.table.len(), 10);

    let ids = assemble_track_ids(&catalog, &outcome.albums, &outcome.standalone).unwrap();
    assert_eq!(ids, vec!["x0", "x1", "x2", "x3", "x4"]);
}

#[test]
fn test_albums_standalone_and_playlist() {
    let tracks = vec![
        local(0, "Intro", "Artist"),
        local(1, "Second", "Artist"),
        local(2, "Third", "Artist"),
        local(3, "Loner", "Solo"),
        local(4, "Nothing", "Nobody"),
    ];
    let catalog = InMemoryCatalog::new()
        .with_album("LP", &["lp1", "lp2", "lp3", "lp4"])
        .with_search(
            "track:Intro artist:Artist",
            vec![
                hit("lp1", "Intro", "Artist", "LP"),
                hit("comp1", "Intro", "Artist", "COMP"),
            ],
        )
        .with_search("track:Second artist:Artist", vec![hit("lp2", "Second", "Artist", "LP")])
        .with_search("track:Third artist:Artist", vec![hit("lp3", "Third", "Artist", "LP")])
        .with_search(
            "track:Loner artist:Solo",
            vec![hit("single", "Loner", "Solo", "SINGLE")],
        )
        .with_playlist("existing");

    let outcome = match_library(&tracks, &catalog, &config()).unwrap();

    assert_eq!(
        outcome.classification[&0],
        Classification::ConsolidatedAlbum("LP".into())
    );
    assert_eq!(
        outcome.classification[&3],
        Classification::StandaloneTrack("single".into())
    );
    assert_eq!(outcome.classification[&4], Classification::Unmatched);

    // The COMP row belongs to a claimed track and is masked
    let comp = outcome
        .table
        .rows()
        .iter()
        .find(|r| r.album_id() == Some("COMP"))
        .unwrap();
    assert!(comp.album_track_mask && !comp.album_matched);

    let ids = assemble_track_ids(&catalog, &outcome.albums, &outcome.standalone).unwrap();
    assert_eq!(ids, vec!["lp1", "lp2", "lp3", "lp4", "single"]);

    let playlist = ensure_playlist(&catalog, "me", Some("existing")).unwrap();
    let options = SubmitOptions {
        batch_limit: 2,
        batch_delay: std::time::Duration::ZERO,
        rate_limit_retries: 1,
    };
    submit_tracks(&catalog, &playlist, &ids, &options).unwrap();
    assert_eq!(catalog.playlist_tracks("existing").unwrap(), ids);
    assert_eq!(catalog.add_calls().len(), 3);
}

#[test]
fn test_repeated_runs_are_deterministic() {
    let tracks: Vec<LocalTrack> = (0..4)
        .map(|i| local(i, &format!("Track {}", i), "Group"))
        .collect();
    let mut catalog = InMemoryCatalog::new();
    for i in 0..4 {
        catalog = catalog.with_search(
            &format!("track:Track {} artist:Group", i),
            vec![
                hit(&format!("a{}", i), &format!("Track {}", i), "Group", "A"),
                hit(&format!("b{}", i), &format!("Track {}", i), "Group", "B"),
            ],
        );
    }

    let first = match_library(&tracks, &catalog, &config()).unwrap();
    let second = match_library(&tracks, &catalog, &config()).unwrap();
    assert_eq!(first.albums, second.albums);
    assert_eq!(first.classification, second.classification);

    // Equal means: the smaller album id wins and claims every track
    assert_eq!(first.albums.len(), 1);
    assert_eq!(first.albums[0].album_id, "A");
}
