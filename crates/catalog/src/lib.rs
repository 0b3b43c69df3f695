//! Pure building blocks of the documentation catalog.
//!
//! Nothing in this crate performs I/O: storage listings, database rows and
//! inventory bytes are handed in by the caller, which keeps every algorithm
//! here deterministic and cheap to test.
//!
//! - [`hash`] fingerprints page content.
//! - [`Ranker`] resolves a page's search rank from ordered glob rules.
//! - [`diff`] splits a version's catalog into create/touch/delete sets.
//! - [`Inventory`] parses the cross-reference objects exported by a build.

mod diff;
pub mod error;
mod hash;
mod inventory;
pub mod models;
mod rank;

pub use crate::diff::{Diff, Keyed, diff};
pub use crate::hash::hash;
pub use crate::inventory::{Inventory, InventoryEntry, Rejection, Target};
pub use crate::rank::{DEFAULT_RANK, PatternSet, RankRule, Ranker, rank};
