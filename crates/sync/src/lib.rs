//! Keeps the documentation catalog in step with build output.
//!
//! - [`sync_version`] reconciles one version's catalog with the files its
//!   latest build left in storage.
//! - [`import_inventory`] replaces the version's domain objects with the
//!   cross-references exported by that build.
//!
//! Both take the version's lock from the [`Context`] for their whole pass,
//! and both apply their writes in a single unit of work.

pub mod error;
mod inventory;
mod lock;
mod sync;

pub use crate::inventory::{ImportReport, OBJECTS_INV, import_inventory, import_inventory_from_storage};
pub use crate::lock::{VersionGuard, VersionLocks};
pub use crate::sync::{SyncReport, SyncRequest, sync_version};
use crate::error::{ErrorKind, Result};
use docsync_catalog::{PatternSet, Ranker};
use docsync_config::{AppConfig, BuildConfig, ProjectConfig};
use exn::ResultExt;

/// Files read and hashed at once unless configured otherwise.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// How a listed file is cataloged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Class {
    Page,
    Plain,
}

/// Compiled build configuration and shared state for sync and import passes.
#[derive(Debug, Clone)]
pub struct Context {
    pub(crate) ranker: Ranker,
    pub(crate) ignore: PatternSet,
    pub(crate) project: ProjectConfig,
    pub(crate) refresh_hashes: bool,
    pub(crate) concurrency: usize,
    pub(crate) locks: VersionLocks,
}
impl Context {
    /// Validate and compile a build configuration.
    pub fn new(build: &BuildConfig) -> Result<Self> {
        build.validate().or_raise(|| ErrorKind::Configuration)?;
        Ok(Self {
            ranker: build.ranker().or_raise(|| ErrorKind::Configuration)?,
            ignore: build.ignore_patterns().or_raise(|| ErrorKind::Configuration)?,
            project: build.project.clone(),
            refresh_hashes: false,
            concurrency: DEFAULT_CONCURRENCY,
            locks: VersionLocks::new(),
        })
    }

    /// Build a context from the application configuration and its embedded
    /// build configuration.
    pub fn from_app(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(&config.build)?
            .with_refresh_hashes(config.sync.refresh_hashes)
            .with_concurrency(config.sync.concurrency))
    }

    /// Re-hash surviving pages and update their hash when content changed.
    pub fn with_refresh_hashes(mut self, refresh_hashes: bool) -> Self {
        self.refresh_hashes = refresh_hashes;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Share locks with other contexts, such as one per project build
    /// configuration over the same catalog.
    pub fn with_locks(mut self, locks: VersionLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn locks(&self) -> &VersionLocks {
        &self.locks
    }

    /// Decide whether and how a catalog path is cataloged.
    ///
    /// | File                 | Result                                                  |
    /// |----------------------|---------------------------------------------------------|
    /// | HTML page            | page                                                    |
    /// | ignored HTML page    | page with `index_all_pages`, else plain with `cdn_enabled` |
    /// | anything else        | plain with `cdn_enabled`                                |
    pub(crate) fn classify(&self, path: &str) -> Option<Class> {
        let plain = self.project.cdn_enabled.then_some(Class::Plain);
        if !path.ends_with(".html") {
            return plain;
        }
        match self.project.index_all_pages || !self.ignore.is_match(path) {
            true => Some(Class::Page),
            false => plain,
        }
    }
}
