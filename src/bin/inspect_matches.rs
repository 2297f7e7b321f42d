//! Audit a match log written by spotify-matcher
//!
//! Usage: inspect-matches <matches.sqlite3> [--track ID] [--unmatched]

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

use spotify_matcher::match_log::{
    album_summary, classification_counts, open_match_log, outcome_for_track, rows_for_track,
    unmatched_tracks,
};

#[derive(Parser)]
#[command(name = "inspect-matches")]
#[command(about = "Inspect a spotify-matcher match log")]
struct Args {
    log: PathBuf,

    /// Show every candidate row and the outcome for one discovery id
    #[arg(long)]
    track: Option<u64>,

    /// List every unmatched track
    #[arg(long)]
    unmatched: bool,
}

fn flag(value: bool) -> &'static str {
    if value {
        "x"
    } else {
        "."
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let conn = open_match_log(&args.log)?;

    if let Some(id) = args.track {
        let Some(outcome) = outcome_for_track(&conn, id)? else {
            bail!("No track with discovery id {} in {}", id, args.log.display());
        };
        println!(
            "#{} {} - {}",
            id,
            outcome.artist.as_deref().unwrap_or("?"),
            outcome.title.as_deref().unwrap_or("?")
        );
        println!("  path: {}", outcome.path);
        println!(
            "  outcome: {} {}",
            outcome.kind,
            outcome.remote_id.as_deref().unwrap_or("")
        );
        println!("\n  {:>5} {:>3} {:>3}  {:<24} {:<24} track", "sim", "alb", "msk", "track id", "album id");
        for row in rows_for_track(&conn, id)? {
            match &row.candidate {
                Some(c) => println!(
                    "  {:>5.3} {:>3} {:>3}  {:<24} {:<24} {} ({})",
                    c.similarity,
                    flag(row.album_matched),
                    flag(row.album_track_mask),
                    c.track_id,
                    c.album_id.as_deref().unwrap_or("-"),
                    c.track,
                    c.artist
                ),
                None => println!("  (no candidates)"),
            }
        }
        return Ok(());
    }

    if args.unmatched {
        let tracks = unmatched_tracks(&conn)?;
        for t in &tracks {
            println!(
                "#{:<6} {} - {}  [{}]",
                t.discovery_id,
                t.artist.as_deref().unwrap_or("?"),
                t.title.as_deref().unwrap_or("?"),
                t.path
            );
        }
        println!("\n{} unmatched tracks", tracks.len());
        return Ok(());
    }

    println!("{:=<60}", "");
    println!("Match log: {}", args.log.display());
    for (kind, count) in classification_counts(&conn)? {
        println!("  {:<10} {}", kind, count);
    }
    println!("{:=<60}", "");
    for (album_id, mean, members) in album_summary(&conn)? {
        println!("  {}  {} tracks, mean similarity {:.3}", album_id, members, mean);
    }

    Ok(())
}
