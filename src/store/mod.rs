//! File-backed stores: catalog, ranking and identities

pub mod catalog;
pub mod identity;
pub mod ranking;

pub use catalog::{Catalog, CatalogDirs, CatalogError};
pub use identity::{IdentityCheck, IdentityRegistry};
pub use ranking::{RankingError, RankingStore};
