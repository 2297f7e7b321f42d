use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;

use spotify_matcher::catalog::SpotifyClient;
use spotify_matcher::config::MatcherConfig;
use spotify_matcher::discovery::discover;
use spotify_matcher::holding::copy_unmatched;
use spotify_matcher::match_log::{write_failed_matches, write_match_log};
use spotify_matcher::pipeline::{match_library, MatchOutcome};
use spotify_matcher::playlist::{assemble_track_ids, ensure_playlist, submit_tracks, SubmitOptions};
use spotify_matcher::progress::{format_duration, set_log_only};
use spotify_matcher::safety::validate_match_log_path;

#[derive(Parser)]
#[command(name = "spotify-matcher")]
#[command(about = "Match a local music collection against Spotify and build a playlist")]
struct Args {
    /// Root of the local music collection
    music_dir: PathBuf,

    /// Spotify user that owns a newly created playlist
    #[arg(short = 'u', long)]
    username: Option<String>,

    /// Existing playlist to add tracks to (a new one is created if missing)
    #[arg(short = 'p', long)]
    playlist_id: Option<String>,

    /// Match and write logs, but do not touch any playlist
    #[arg(long)]
    dry_run: bool,

    /// Plain-text list of tracks that could not be matched
    #[arg(short = 'f', long, default_value = "spotify-matcher.log")]
    failed_matches_file: PathBuf,

    /// SQLite match log (name must contain "matches")
    #[arg(long, default_value = "spotify-matcher-matches.sqlite3")]
    match_log: PathBuf,

    /// Copy unmatched files here, mirroring the music directory layout
    #[arg(long)]
    holding_dir: Option<PathBuf>,

    #[arg(long)]
    album_threshold: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Score normalized titles, artists and albums instead of raw tags
    #[arg(long)]
    normalize_fields: bool,

    /// TOML config file (defaults to ./spotify-matcher.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write run statistics as JSON
    #[arg(long)]
    stats: Option<PathBuf>,

    /// Spotify user access token
    #[arg(long, env = "SPOTIFY_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Disable progress bars, emit periodic log lines instead
    #[arg(long)]
    log_only: bool,
}

fn load_config(args: &Args) -> Result<MatcherConfig> {
    let mut config = MatcherConfig::load_with_file(args.config.as_ref())
        .context("Failed to load configuration")?;

    if let Some(threshold) = args.album_threshold {
        config.album_threshold = threshold;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if args.normalize_fields {
        config.normalize_fields = true;
    }
    if let Some(token) = &args.access_token {
        config.spotify.access_token = Some(token.clone());
    }

    config.validate()?;
    Ok(config)
}

fn connect(config: &MatcherConfig) -> Result<SpotifyClient> {
    let spotify = &config.spotify;
    if let Some(token) = spotify.access_token.as_deref().filter(|t| !t.is_empty()) {
        return Ok(SpotifyClient::new(&spotify.api_base, token)?);
    }
    match (spotify.client_id.as_deref(), spotify.client_secret.as_deref()) {
        (Some(id), Some(secret)) => {
            log::warn!("Using client credentials: searching works, playlist changes will not");
            Ok(SpotifyClient::with_client_credentials(
                &spotify.api_base,
                &spotify.auth_url,
                id,
                secret,
            )?)
        }
        _ => bail!(
            "No Spotify credentials: pass --access-token, set SPOTIFY_ACCESS_TOKEN, \
             or configure spotify.client_id and spotify.client_secret"
        ),
    }
}

fn print_summary(outcome: &MatchOutcome) {
    let stats = &outcome.stats;
    println!("\n{:=<60}", "");
    println!("Matching complete!");
    println!("  Local tracks:      {}", stats.total_tracks);
    println!("  Searched:          {}", stats.searched_tracks);
    println!("  Search failures:   {}", stats.search_failures);
    println!("  Albums:            {}", stats.albums_consolidated);
    println!("  Album tracks:      {}", stats.album_tracks);
    println!("  Standalone tracks: {}", stats.standalone_matches);
    println!("  Unmatched:         {}", stats.unmatched);
    println!("  Match rate:        {:.1}%", stats.match_rate());
    println!("{:=<60}", "");
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();
    set_log_only(args.log_only);

    let start = Instant::now();
    let config = load_config(&args)?;

    validate_match_log_path(&args.match_log, &args.music_dir)?;
    if !args.dry_run && args.username.is_none() && args.playlist_id.is_none() {
        bail!("Either --username (to create a playlist) or --playlist-id is required; use --dry-run to only match");
    }

    let tracks = discover(&args.music_dir)
        .with_context(|| format!("Failed to scan {}", args.music_dir.display()))?;
    if tracks.is_empty() {
        log::warn!("No audio files found under {}", args.music_dir.display());
    }

    let catalog = connect(&config)?;
    let mut outcome = match_library(&tracks, &catalog, &config)?;

    // Everything below the playlist step must survive a playlist failure
    write_match_log(&args.match_log, &outcome.table, &outcome.albums, &outcome.classification)?;
    let failed = write_failed_matches(&args.failed_matches_file, &tracks, &outcome.classification)?;
    log::info!(
        "Wrote {} unmatched tracks to {}",
        failed,
        args.failed_matches_file.display()
    );
    if let Some(holding_dir) = &args.holding_dir {
        copy_unmatched(&args.music_dir, holding_dir, &tracks, &outcome.classification)?;
    }
    print_summary(&outcome);

    if args.dry_run {
        log::info!("Dry run: playlist left untouched");
    } else {
        let summary = outcome.classification_summary();
        let track_ids = assemble_track_ids(&catalog, &outcome.albums, &outcome.standalone)
            .with_context(|| format!("Failed to resolve album tracks ({})", summary))?;
        outcome.stats.playlist_track_ids = track_ids.len();

        let owner = args.username.as_deref().unwrap_or_default();
        let playlist_id = ensure_playlist(&catalog, owner, args.playlist_id.as_deref())
            .with_context(|| format!("Failed to prepare playlist ({})", summary))?;

        let options = SubmitOptions {
            batch_limit: config.playlist_batch_limit,
            batch_delay: config.playlist_batch_delay(),
            rate_limit_retries: config.rate_limit_retries,
        };
        let added = submit_tracks(&catalog, &playlist_id, &track_ids, &options)
            .with_context(|| format!("Failed to add tracks to playlist {} ({})", playlist_id, summary))?;
        println!("Added {} tracks to playlist {}", added, playlist_id);
    }

    outcome.stats.elapsed_seconds = start.elapsed().as_secs_f64();
    if let Some(path) = &args.stats {
        outcome.stats.write_to_file(path)?;
        log::info!("Stats written to {}", path.display());
    }

    log::info!("Done in {}", format_duration(start.elapsed()));
    Ok(())
}
