//! Photo indexer: incremental, content-addressed photo catalog
//!
//! Walks directory trees, fingerprints every image it has not seen before,
//! records it in a SQLite catalog together with its storage location, metadata
//! and category, and keeps one cached thumbnail per distinct content.
//! Duplicates fall out of the catalog as rows sharing `(content_hash, size)`.

pub mod categorize;
pub mod config;
pub mod db;
pub mod error;
pub mod exclusion;
pub mod identity;
pub mod locator;
pub mod metadata;
pub mod models;
pub mod progress;
pub mod scanner;
pub mod thumbnail;

pub use categorize::{Categorizer, Category, ImageTraits};
pub use config::{ConfigFile, ScanConfig};
pub use db::{Catalog, ListQuery, Page, SortKey, SortOrder};
pub use error::{CatalogError, ConfigError, ReadError, RenditionError, ScanError, ScanErrorKind};
pub use exclusion::ExclusionPolicy;
pub use identity::{ContentHasher, Fingerprint, Sha256Hasher};
pub use locator::{classify, Placement, StorageLocation};
pub use models::{
    CatalogEntry, CatalogStats, DuplicateGroup, EntryUpdate, InsertOutcome, LocationStats,
    ScanResult, ScanState,
};
pub use progress::{Event, ProgressReporter};
pub use scanner::{ScanProgress, Scanner};
pub use thumbnail::{Thumbnail, ThumbnailCache};
