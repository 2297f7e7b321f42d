//! Holding copy of unmatched files.
//!
//! Every unmatched track is copied under the holding root at the same
//! relative path it has under the music root, so the collection that still
//! needs manual attention can be browsed on its own.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::models::{Classification, LocalTrack};
use crate::progress::{create_progress_bar, log_progress};
use crate::safety::validate_holding_dir;

/// Destination of `source` under `holding_root`, mirroring its position
/// relative to `music_root`. Files outside the music root keep only their
/// file name.
pub fn holding_path(music_root: &Path, holding_root: &Path, source: &Path) -> PathBuf {
    match source.strip_prefix(music_root) {
        Ok(relative) => holding_root.join(relative),
        Err(_) => holding_root.join(source.file_name().unwrap_or(source.as_os_str())),
    }
}

/// Copy every unmatched track into `holding_root`. Returns the number of
/// files copied.
pub fn copy_unmatched(
    music_root: &Path,
    holding_root: &Path,
    tracks: &[LocalTrack],
    classification: &BTreeMap<u64, Classification>,
) -> Result<usize> {
    validate_holding_dir(holding_root, music_root)?;

    let unmatched: Vec<&LocalTrack> = tracks
        .iter()
        .filter(|t| classification.get(&t.discovery_id) == Some(&Classification::Unmatched))
        .collect();

    let total = unmatched.len() as u64;
    let pb = create_progress_bar(total, "Copying unmatched files");

    for (i, track) in unmatched.iter().enumerate() {
        let dest = holding_path(music_root, holding_root, &track.path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::copy(&track.path, &dest).with_context(|| {
            format!("copying {} to {}", track.path.display(), dest.display())
        })?;

        pb.inc(1);
        log_progress("holding", i as u64 + 1, total, 100);
    }

    pb.finish_with_message(format!("Copied {} unmatched files", unmatched.len()));
    Ok(unmatched.len())
}
