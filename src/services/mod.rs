//! Artwork pipeline services

pub mod artwork;
pub mod dedup;
pub mod fetch_engine;
pub mod filename_parser;
pub mod library_state;
pub mod media_server;
pub mod prober;
pub mod providers;
pub mod queue;
pub mod rate_limiter;
pub mod refresh_channel;
pub mod resolver;
pub mod retry_policy;
pub mod scanner;
pub mod titles;
pub mod watcher;
pub mod waterfall;
pub mod webhooks;

pub use artwork::{ImageService, RpdbClient};
pub use dedup::ExpiringSet;
pub use fetch_engine::{FetchEngine, ItemOutcome};
pub use library_state::{LibraryState, QueueState};
pub use media_server::{MediaServer, PlexClient};
pub use prober::{FfprobeProber, Prober};
pub use providers::{IdTranslator, ProviderSet, SearchProvider};
pub use queue::WorkQueue;
pub use refresh_channel::{RefreshChannel, RefreshTimings};
pub use resolver::IdentifierResolver;
pub use scanner::{ScanStatus, ScanTarget, Scanner};
pub use watcher::{WatchIntake, spawn_fs_watcher};
pub use webhooks::{WebhookIntake, WebhookOutcome};
