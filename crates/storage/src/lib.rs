//! Storage capability for documentation build output.
//!
//! The catalog never writes to storage: it only needs to enumerate the files
//! a build produced under a version prefix and read their bytes. Backends
//! implement [`StorageBackend`] and are shared behind a [`BackendHandle`].

pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::models::FileInfo;
pub use crate::path::{to_catalog_path, validate as validate_path};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
