//! postersync - keeps poster and backdrop artwork for a media library in sync
//!
//! Folders found by scans, the filesystem watcher and Radarr/Sonarr webhooks
//! are queued as work items. Each item is matched to an IMDb id through a
//! waterfall of caches and search providers, its artwork is fetched from the
//! rating poster service, and a media server refresh is scheduled.

pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod jobs;
pub mod media;
pub mod services;

pub use app::{AppState, build_app};
