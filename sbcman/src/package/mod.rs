//! Catalog items and their persistence.
//!
//! The catalog's storage format is not part of the pipeline. The download
//! manager only needs to look an item up, add or update it, and save:
//!
//! ```text
//! DownloadManager ──upsert + save──► dyn GameCatalog
//!                                      ├── MemoryCatalog
//!                                      └── JsonCatalog (local_games.json)
//! ```

mod catalog;
mod metadata;

pub use catalog::{CatalogError, CatalogResult, GameCatalog, JsonCatalog, MemoryCatalog};
pub use metadata::PackageMetadata;
