//! Safety checks for files the matcher writes or copies.
//!
//! The music directory is the user's source collection: nothing the
//! matcher produces may land inside it or replace a file that is not one
//! of its own outputs.

use anyhow::{bail, Result};
use std::path::{Component, Path, PathBuf};

/// Pattern every match log filename must contain.
pub const MATCH_LOG_PATTERN: &str = "matches";

/// Lexically normalized absolute form of `path` (no filesystem access, so
/// it works for paths that do not exist yet).
fn absolute(path: &Path) -> PathBuf {
    let base = if path.is_absolute() {
        PathBuf::new()
    } else {
        std::env::current_dir().unwrap_or_default()
    };
    let mut out = PathBuf::new();
    for component in base.join(path).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn is_within(path: &Path, root: &Path) -> bool {
    absolute(path).starts_with(absolute(root))
}

/// Validates that a match log path is safe to (over)write.
///
/// Checks:
/// - Filename must contain [`MATCH_LOG_PATTERN`]
/// - Path must not be inside the music directory
pub fn validate_match_log_path(output: &Path, music_dir: &Path) -> Result<()> {
    let output_name = output.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if !output_name.contains(MATCH_LOG_PATTERN) {
        bail!(
            "Safety check failed: match log '{}' must contain '{}' in the name",
            output.display(),
            MATCH_LOG_PATTERN
        );
    }

    if is_within(output, music_dir) {
        bail!(
            "Safety check failed: match log '{}' cannot be inside the music directory '{}'",
            output.display(),
            music_dir.display()
        );
    }

    Ok(())
}

/// Validates that copying unmatched files into `holding_dir` cannot touch
/// the music directory.
pub fn validate_holding_dir(holding_dir: &Path, music_dir: &Path) -> Result<()> {
    if is_within(holding_dir, music_dir) {
        bail!(
            "Safety check failed: holding directory '{}' cannot be inside the music directory '{}'",
            holding_dir.display(),
            music_dir.display()
        );
    }
    if is_within(music_dir, holding_dir) {
        bail!(
            "Safety check failed: holding directory '{}' cannot contain the music directory '{}'",
            holding_dir.display(),
            music_dir.display()
        );
    }
    Ok(())
}
