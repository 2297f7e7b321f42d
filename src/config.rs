//! Matcher configuration.
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `SPOTIFY_MATCHER_*` environment variables (nested keys use
//! `__`, e.g. `SPOTIFY_MATCHER_SPOTIFY__ACCESS_TOKEN`). The CLI applies its
//! own flags on top of the loaded value.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::batch::BatchOptions;
use crate::catalog::spotify::{DEFAULT_API_BASE, DEFAULT_AUTH_URL, PLAYLIST_ADD_LIMIT};
use crate::error::MatchError;
use crate::models::FieldWeight;
use crate::scoring::default_field_weights;

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "spotify-matcher.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpotifySettings {
    pub api_base: String,
    pub auth_url: String,
    /// User token; required for playlist changes.
    pub access_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl Default for SpotifySettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            access_token: None,
            client_id: None,
            client_secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MatcherConfig {
    /// Distinct local tracks an album needs before it can be consolidated.
    pub album_threshold: usize,
    pub batch_size: usize,
    /// Hits requested per search.
    pub search_limit: usize,
    pub request_delay_ms: u64,
    pub playlist_batch_limit: usize,
    pub playlist_batch_delay_ms: u64,
    pub rate_limit_retries: u32,
    pub field_weights: Vec<FieldWeight>,
    /// Score normalized tag values instead of the raw ones.
    pub normalize_fields: bool,
    pub spotify: SpotifySettings,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            album_threshold: 3,
            batch_size: 50,
            search_limit: 5,
            request_delay_ms: 100,
            playlist_batch_limit: PLAYLIST_ADD_LIMIT,
            playlist_batch_delay_ms: 200,
            rate_limit_retries: 5,
            field_weights: default_field_weights(),
            normalize_fields: false,
            spotify: SpotifySettings::default(),
        }
    }
}

impl MatcherConfig {
    /// Load from defaults, `config_file` (or [`DEFAULT_CONFIG_FILE`] when it
    /// exists) and the environment.
    pub fn load_with_file<P: AsRef<Path>>(config_file: Option<P>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        builder = builder.add_source(Config::try_from(&Self::default())?);

        match config_file {
            // An explicit file must exist
            Some(path) => builder = builder.add_source(File::from(path.as_ref())),
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("SPOTIFY_MATCHER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.batch_size == 0 {
            return Err(MatchError::InvalidConfig("batch_size must be at least 1".into()));
        }
        if self.album_threshold == 0 {
            return Err(MatchError::InvalidConfig(
                "album_threshold must be at least 1".into(),
            ));
        }
        if self.search_limit == 0 {
            return Err(MatchError::InvalidConfig("search_limit must be at least 1".into()));
        }
        if !(1..=PLAYLIST_ADD_LIMIT).contains(&self.playlist_batch_limit) {
            return Err(MatchError::InvalidConfig(format!(
                "playlist_batch_limit must be between 1 and {}",
                PLAYLIST_ADD_LIMIT
            )));
        }
        if self.field_weights.is_empty() {
            return Err(MatchError::InvalidConfig("field_weights must not be empty".into()));
        }
        if let Some(bad) = self
            .field_weights
            .iter()
            .find(|w| !w.weight.is_finite() || w.weight < 0.0)
        {
            return Err(MatchError::InvalidConfig(format!(
                "weight for {:?}/{:?} must be a non-negative number",
                bad.local, bad.hit
            )));
        }
        if self.field_weights.iter().map(|w| w.weight).sum::<f64>() <= 0.0 {
            return Err(MatchError::InvalidConfig(
                "field_weights must not all be zero".into(),
            ));
        }
        Ok(())
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            batch_size: self.batch_size,
            search_limit: self.search_limit,
            request_delay: Duration::from_millis(self.request_delay_ms),
            field_weights: self.field_weights.clone(),
            normalize_fields: self.normalize_fields,
        }
    }

    pub fn playlist_batch_delay(&self) -> Duration {
        Duration::from_millis(self.playlist_batch_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HitField, LocalField};
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = MatcherConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.album_threshold, 3);
        assert_eq!(config.playlist_batch_limit, 100);
        assert_eq!(config.batch_options().request_delay, Duration::from_millis(100));
        assert!(!config.batch_options().normalize_fields);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
album_threshold = 4
batch_size = 10
normalize_fields = true

[spotify]
access_token = "abc"

[[field_weights]]
local = "title"
hit = "track"
weight = 2.0
query_key = "track"
"#
        )
        .unwrap();

        let config = MatcherConfig::load_with_file(Some(file.path())).unwrap();
        assert_eq!(config.album_threshold, 4);
        assert_eq!(config.batch_size, 10);
        assert!(config.normalize_fields);
        assert_eq!(config.search_limit, 5);
        assert_eq!(config.spotify.access_token.as_deref(), Some("abc"));
        assert_eq!(config.spotify.api_base, DEFAULT_API_BASE);
        assert_eq!(config.field_weights.len(), 1);
        assert_eq!(config.field_weights[0].local, LocalField::Title);
        assert_eq!(config.field_weights[0].hit, HitField::Track);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(MatcherConfig::load_with_file(Some(&missing)).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            MatcherConfig {
                batch_size: 0,
                ..Default::default()
            },
            MatcherConfig {
                album_threshold: 0,
                ..Default::default()
            },
            MatcherConfig {
                playlist_batch_limit: 101,
                ..Default::default()
            },
            MatcherConfig {
                field_weights: Vec::new(),
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(MatchError::InvalidConfig(_))));
        }

        let mut negative = MatcherConfig::default();
        negative.field_weights[1].weight = -0.5;
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_all_zero_weights() {
        let mut config = MatcherConfig::default();
        for weight in &mut config.field_weights {
            weight.weight = 0.0;
        }
        assert!(matches!(config.validate(), Err(MatchError::InvalidConfig(_))));

        // One non-zero weight is enough
        config.field_weights[0].weight = 1.0;
        assert!(config.validate().is_ok());
    }
}
