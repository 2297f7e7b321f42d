//! Local music discovery: walk a directory tree and read audio tags.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use lofty::{read_from_path, Accessor, ItemKey, Tag, TaggedFileExt};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::models::LocalTrack;
use crate::progress::create_spinner;

/// Extensions (lowercase) treated as audio files.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "aac", "aif", "aiff", "ape", "flac", "m4a", "mp3", "mp4", "mpc", "oga", "ogg", "opus",
    "spx", "wav", "wv",
];

/// Tags read from one file, before a discovery id is assigned.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct FileTags {
    title: Option<String>,
    artist: Option<String>,
    album: Option<String>,
    date: Option<String>,
}

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Audio file paths under `root`, in sorted traversal order.
pub fn collect_audio_paths(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Music directory {} does not exist or is not a directory", root.display());
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if entry.file_type().is_file() && is_audio_file(entry.path()) {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn tags_from(tag: &Tag) -> FileTags {
    let date = tag
        .get_string(&ItemKey::RecordingDate)
        .map(String::from)
        .or_else(|| tag.year().map(|y| y.to_string()));

    FileTags {
        title: non_blank(tag.title().map(|v| v.into_owned())),
        artist: non_blank(tag.artist().map(|v| v.into_owned())),
        album: non_blank(tag.album().map(|v| v.into_owned())),
        date: non_blank(date),
    }
}

/// Read tags from one file. Files without any tag yield empty tags; files
/// that cannot be parsed are an error.
fn read_tags(path: &Path) -> Result<FileTags> {
    let tagged = read_from_path(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(tagged
        .primary_tag()
        .or_else(|| tagged.first_tag())
        .map(tags_from)
        .unwrap_or_default())
}

/// Discover every readable audio file under `root`.
///
/// Tags are read in parallel; results keep the sorted path order, and
/// discovery ids are assigned after unreadable files have been skipped, so
/// they are dense and stable for an unchanged tree.
pub fn discover(root: &Path) -> Result<Vec<LocalTrack>> {
    let spinner = create_spinner("Scanning music directory");
    let paths = collect_audio_paths(root)?;
    spinner.finish_with_message(format!("Found {} audio files", paths.len()));

    let read: Vec<(PathBuf, Result<FileTags>)> = paths
        .into_par_iter()
        .map(|path| {
            let tags = read_tags(&path);
            (path, tags)
        })
        .collect();

    let mut tracks = Vec::with_capacity(read.len());
    let mut skipped = 0usize;
    for (path, tags) in read {
        match tags {
            Ok(tags) => tracks.push(LocalTrack {
                discovery_id: tracks.len() as u64,
                title: tags.title,
                artist: tags.artist,
                album: tags.album,
                date: tags.date,
                path,
            }),
            Err(e) => {
                log::warn!("Skipping {:#}", e);
                skipped += 1;
            }
        }
    }

    log::info!(
        "Discovered {} tracks under {} ({} unreadable)",
        tracks.len(),
        root.display(),
        skipped
    );
    Ok(tracks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file(Path::new("/m/a.mp3")));
        assert!(is_audio_file(Path::new("/m/B.FLAC")));
        assert!(!is_audio_file(Path::new("/m/cover.jpg")));
        assert!(!is_audio_file(Path::new("/m/noext")));
    }

    #[test]
    fn test_collect_paths_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("b/02.mp3"), b"").unwrap();
        fs::write(dir.path().join("b/01.flac"), b"").unwrap();
        fs::write(dir.path().join("a/track.ogg"), b"").unwrap();
        fs::write(dir.path().join("a/notes.txt"), b"").unwrap();

        let paths = collect_audio_paths(dir.path()).unwrap();
        let relative: Vec<String> = paths
            .iter()
            .map(|p| {
                p.strip_prefix(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        assert_eq!(relative, vec!["a/track.ogg", "b/01.flac", "b/02.mp3"]);
    }

    #[test]
    fn test_unreadable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("garbage.mp3"), b"definitely not audio").unwrap();
        fs::write(dir.path().join("readme.txt"), b"hello").unwrap();

        let tracks = discover(dir.path()).unwrap();
        assert!(tracks.is_empty());
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  x ".into())), Some("x".into()));
        assert_eq!(non_blank(Some("   ".into())), None);
        assert_eq!(non_blank(None), None);
    }
}
