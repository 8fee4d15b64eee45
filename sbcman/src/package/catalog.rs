//! Persistent catalog of installed items.
//!
//! The pipeline only needs add-or-update plus save; storage is up to the
//! implementation. [`JsonCatalog`] keeps a JSON array on disk, and
//! [`MemoryCatalog`] keeps everything in memory.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use super::metadata::PackageMetadata;

/// Errors raised by catalog persistence.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Reading or writing the backing file failed.
    #[error("catalog I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The backing file is not valid catalog JSON.
    #[error("invalid catalog file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Update of an item that is not in the catalog.
    #[error("item not in catalog: {0}")]
    NotFound(String),
}

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Store of installed items, keyed by id.
pub trait GameCatalog: Send {
    /// Look up an item.
    fn get(&self, id: &str) -> Option<&PackageMetadata>;

    /// Insert a new item.
    fn add(&mut self, item: PackageMetadata);

    /// Replace an existing item.
    fn update(&mut self, item: PackageMetadata) -> CatalogResult<()>;

    /// Persist the catalog.
    fn save(&self) -> CatalogResult<()>;

    /// Whether an item with this id exists.
    fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Update the item if present, add it otherwise.
    fn upsert(&mut self, item: PackageMetadata) -> CatalogResult<()> {
        if self.contains(&item.id) {
            debug!(id = %item.id, "Updating existing catalog entry");
            self.update(item)
        } else {
            debug!(id = %item.id, "Adding new catalog entry");
            self.add(item);
            Ok(())
        }
    }
}

/// In-memory catalog; `save` is a no-op.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    items: Vec<PackageMetadata>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// All items in insertion order.
    pub fn items(&self) -> &[PackageMetadata] {
        &self.items
    }
}

impl GameCatalog for MemoryCatalog {
    fn get(&self, id: &str) -> Option<&PackageMetadata> {
        self.items.iter().find(|item| item.id == id)
    }

    fn add(&mut self, item: PackageMetadata) {
        self.items.push(item);
    }

    fn update(&mut self, item: PackageMetadata) -> CatalogResult<()> {
        let slot = self
            .items
            .iter_mut()
            .find(|existing| existing.id == item.id)
            .ok_or_else(|| CatalogError::NotFound(item.id.clone()))?;
        *slot = item;
        Ok(())
    }

    fn save(&self) -> CatalogResult<()> {
        Ok(())
    }
}

/// Catalog persisted as a JSON array of items.
#[derive(Debug, Clone)]
pub struct JsonCatalog {
    path: PathBuf,
    items: MemoryCatalog,
}

impl JsonCatalog {
    /// Load the catalog at `path`; a missing file yields an empty catalog.
    pub fn load(path: impl Into<PathBuf>) -> CatalogResult<Self> {
        let path = path.into();

        let items = match File::open(&path) {
            Ok(file) => serde_json::from_reader(BufReader::new(file)).map_err(|source| {
                CatalogError::Parse {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(CatalogError::Io { path, source }),
        };

        Ok(Self {
            path,
            items: MemoryCatalog { items },
        })
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All items in file order.
    pub fn items(&self) -> &[PackageMetadata] {
        self.items.items()
    }
}

impl GameCatalog for JsonCatalog {
    fn get(&self, id: &str) -> Option<&PackageMetadata> {
        self.items.get(id)
    }

    fn add(&mut self, item: PackageMetadata) {
        self.items.add(item);
    }

    fn update(&mut self, item: PackageMetadata) -> CatalogResult<()> {
        self.items.update(item)
    }

    fn save(&self) -> CatalogResult<()> {
        let io_err = |source: io::Error| CatalogError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        // Write to a sibling file first so a crash never truncates the catalog.
        let temp_path = self.path.with_extension("json.tmp");
        let file = File::create(&temp_path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self.items.items())
            .map_err(|e| io_err(e.into()))?;
        writer.flush().map_err(io_err)?;
        fs::rename(&temp_path, &self.path).map_err(io_err)?;

        info!(path = %self.path.display(), items = self.items.items().len(), "Saved catalog");
        Ok(())
    }
}
