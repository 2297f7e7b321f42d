//! Spotify matcher library: match a local music collection against the
//! Spotify catalog and consolidate matches into whole albums.

pub mod batch;
pub mod catalog;
pub mod config;
pub mod consolidate;
pub mod discovery;
pub mod error;
pub mod holding;
pub mod match_log;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod playlist;
pub mod progress;
pub mod ranking;
pub mod safety;
pub mod scoring;
