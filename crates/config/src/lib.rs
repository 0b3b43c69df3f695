//! Configuration loading and validation for docsync.
//!
//! Two layers of configuration exist:
//! - [`BuildConfig`] describes one documentation build: ordered ranking
//!   rules, search ignore patterns and the project switches that decide which
//!   files are cataloged.
//! - [`AppConfig`] describes the `docsync` binary itself (database location,
//!   storage root, sync tuning) and embeds a default [`BuildConfig`].
//!
//! Both are loaded with `figment`: defaults, then a YAML/TOML/JSON file,
//! then `DOCSYNC_*` environment variables.

mod app;
mod build;
pub mod error;

pub use crate::app::{AppConfig, ENV_PREFIX, SyncSettings, default_config_path, default_database_path, load_build_config};
pub use crate::build::{BuildConfig, DEFAULT_SEARCH_IGNORE, ProjectConfig, RANK_RANGE, RankingRule, SearchConfig};
