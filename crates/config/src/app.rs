//! Application configuration for the `docsync` binary.

use crate::build::BuildConfig;
use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix of environment variable overrides; nested keys are separated by
/// `__`, as in `DOCSYNC_SYNC__CONCURRENCY=4`.
pub const ENV_PREFIX: &str = "DOCSYNC_";
const DEFAULT_CONCURRENCY: usize = 16;
const DATABASE_FILE: &str = "catalog.sqlite";
const CONFIG_FILE: &str = "config.yaml";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "docsync")
}

/// Where the catalog database lives unless configured otherwise.
pub fn default_database_path() -> PathBuf {
    project_dirs().map_or_else(|| PathBuf::from(DATABASE_FILE), |dirs| dirs.data_dir().join(DATABASE_FILE))
}

/// The configuration file read when none is given explicitly.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Re-read and re-hash pages that survive a sync, updating their hash in
    /// place when the content changed. Off by default: surviving pages are
    /// only re-marked.
    pub refresh_hashes: bool,
    /// Maximum number of files read and hashed at once.
    pub concurrency: usize,
    /// Compute and report changes, then roll them back.
    pub dry_run: bool,
}
impl Default for SyncSettings {
    fn default() -> Self {
        Self { refresh_hashes: false, concurrency: DEFAULT_CONCURRENCY, dry_run: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite database file holding the catalog.
    pub database: PathBuf,
    /// Root directory that version prefixes are resolved against.
    pub storage_root: PathBuf,
    pub sync: SyncSettings,
    /// Build configuration used unless a build supplies its own.
    pub build: BuildConfig,
}
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
            storage_root: PathBuf::from("."),
            sync: SyncSettings::default(),
            build: BuildConfig::default(),
        }
    }
}
impl AppConfig {
    /// Layered sources: defaults, then the configuration file, then
    /// `DOCSYNC_*` environment variables.
    ///
    /// An explicit `path` must exist; the default configuration file is only
    /// read if it does.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let figment = Figment::from(Serialized::defaults(Self::default()));
        let figment = match path {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::Load(format!("{} does not exist", path.display())));
                }
                merge_file(figment, path)?
            },
            None => match default_config_path().filter(|path| path.is_file()) {
                Some(path) => merge_file(figment, &path)?,
                None => figment,
            },
        };
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load and validate the configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(path)?
            .extract()
            .or_raise(|| ErrorKind::Load(path.map_or_else(|| "defaults".to_string(), |p| p.display().to_string())))?;
        config.validate()?;
        tracing::debug!(database = %config.database.display(), "loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync.concurrency == 0 {
            exn::bail!(ErrorKind::Invalid("sync.concurrency must be at least 1".to_string()));
        }
        self.build.validate()
    }
}

/// Load a standalone [`BuildConfig`] file, such as the one a documentation
/// build ships alongside its output.
///
/// YAML and JSON are parsed directly, so a `search.ranking` mapping keeps the
/// order it was written in.
pub fn load_build_config(path: &Path) -> Result<BuildConfig> {
    if !path.is_file() {
        exn::bail!(ErrorKind::Load(format!("{} does not exist", path.display())));
    }
    let failed = || ErrorKind::Load(path.display().to_string());
    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or_default().to_ascii_lowercase();
    let config: BuildConfig = match extension.as_str() {
        "yaml" | "yml" | "json" => {
            let source = std::fs::read_to_string(path).or_raise(failed)?;
            match (extension.as_str(), source.trim().is_empty()) {
                (_, true) => BuildConfig::default(),
                ("json", false) => serde_json::from_str(&source).or_raise(failed)?,
                (_, false) => serde_yaml::from_str(&source).or_raise(failed)?,
            }
        },
        _ => merge_file(Figment::from(Serialized::defaults(BuildConfig::default())), path)?
            .extract()
            .or_raise(failed)?,
    };
    config.validate()?;
    Ok(config)
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or_default().to_ascii_lowercase();
    Ok(match extension.as_str() {
        "yaml" | "yml" => figment.merge(Yaml::file(path)),
        "toml" => figment.merge(Toml::file(path)),
        "json" => figment.merge(Json::file(path)),
        _ => exn::bail!(ErrorKind::Load(format!("unsupported configuration format: {}", path.display()))),
    })
}
