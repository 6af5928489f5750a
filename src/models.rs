//! Core data models for the photo indexer

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::ScanError;

/// One indexed file in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Absolute path; unique key of the catalog
    pub path: PathBuf,
    /// Lowercase hex content fingerprint
    pub content_hash: String,
    /// File size in bytes
    pub size: u64,
    /// Storage location label (see [`crate::locator`])
    pub storage_location: String,
    /// Volume the file lives on
    pub volume_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Decoder format name (e.g. "JPEG")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// EXIF capture time, absent when the file carries none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_taken: Option<NaiveDateTime>,
    /// Filesystem modification time
    pub date_modified: DateTime<Utc>,
    /// Thumbnail asset file name, shared by every entry with the same hash
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// Classification label, overridable by the user
    pub category: String,
    /// Hidden from default listings
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
    /// When the row was first committed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<DateTime<Utc>>,
}

impl CatalogEntry {
    /// File name component of the path
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
    }

    /// Path as stored in the catalog; `None` when it is not valid UTF-8
    pub fn path_key(&self) -> Option<&str> {
        path_key(&self.path)
    }

    /// Whether `other` has the same content
    pub fn same_content(&self, other: &CatalogEntry) -> bool {
        self.content_hash == other.content_hash && self.size == other.size
    }
}

/// Catalog key of a path
///
/// Keys must round-trip to the same file, so paths that are not valid UTF-8
/// have no key rather than a lossy one.
pub fn path_key(path: &std::path::Path) -> Option<&str> {
    path.to_str()
}

/// Mutable fields of a catalog entry; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryUpdate {
    pub category: Option<String>,
    pub hidden: Option<bool>,
    /// New catalog path on an explicit rename. The file on disk is not touched.
    pub path: Option<PathBuf>,
}

impl EntryUpdate {
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.hidden.is_none() && self.path.is_none()
    }
}

/// Outcome of inserting one entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertOutcome {
    Inserted,
    /// Inserted; the same content was already catalogued at this path
    InsertedDuplicate(PathBuf),
    /// The path was already catalogued; nothing was written
    AlreadyIndexed,
}

/// Entries sharing the same `(content_hash, size)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub content_hash: String,
    pub size: u64,
    pub entries: Vec<CatalogEntry>,
}

impl DuplicateGroup {
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Bytes that could be reclaimed by keeping one copy
    pub fn redundant_bytes(&self) -> u64 {
        self.size * (self.entries.len().saturating_sub(1) as u64)
    }

    pub fn paths(&self) -> Vec<&PathBuf> {
        self.entries.iter().map(|e| &e.path).collect()
    }
}

/// Row count and bytes for one storage location / volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationStats {
    pub storage_location: String,
    pub volume_name: String,
    pub count: u64,
    pub bytes: u64,
}

/// Aggregate statistics over the catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub total: u64,
    pub total_bytes: u64,
    pub duplicate_groups: u64,
    /// Format name (None for undecodable files) and row count, most common first
    pub formats: Vec<(Option<String>, u64)>,
    pub locations: Vec<LocationStats>,
    pub categories: BTreeMap<String, u64>,
}

impl CatalogStats {
    pub fn total_gb(&self) -> f64 {
        self.total_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }
}

/// Terminal and intermediate states of a scan invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    #[default]
    Idle,
    Enumerating,
    Processing,
    /// Traversal exhausted the root
    Completed,
    /// Stop was requested; committed work is kept
    Stopped,
    /// The root was unavailable or the catalog could not commit
    Aborted,
}

impl ScanState {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanState::Idle => "idle",
            ScanState::Enumerating => "enumerating",
            ScanState::Processing => "processing",
            ScanState::Completed => "completed",
            ScanState::Stopped => "stopped",
            ScanState::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanState::Completed | ScanState::Stopped | ScanState::Aborted
        )
    }
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error details kept per scan; further errors are only counted
pub const MAX_RECORDED_ERRORS: usize = 1000;

/// Result of a scan operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanResult {
    /// Root that was scanned
    pub root: PathBuf,
    /// Final state of the invocation
    pub state: ScanState,
    /// Media files found under the root
    pub found_files: u64,
    /// Directories traversed
    pub total_dirs: u64,
    /// Files and directories pruned by the exclusion policy
    pub excluded: u64,
    /// New rows committed
    pub new_files: u64,
    /// Files skipped because their path was already catalogued
    pub skipped_files: u64,
    /// Files that could not be catalogued (unreadable, too large)
    pub failed_files: u64,
    /// New rows whose content was already catalogued under another path
    pub duplicates: u64,
    /// Rows committed without a thumbnail
    pub missing_thumbnails: u64,
    /// First errors encountered, at most [`MAX_RECORDED_ERRORS`]
    #[serde(skip)]
    pub errors: Vec<ScanError>,
    /// Every error encountered, including those not kept in `errors`
    pub error_total: u64,
    /// Total scan duration in milliseconds
    pub duration_ms: u64,
}

impl ScanResult {
    /// Create a new empty scan result
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            ..Default::default()
        }
    }

    /// Count an error, keeping its details while there is room
    pub fn record_error(&mut self, err: ScanError) {
        self.error_total += 1;
        if self.errors.len() < MAX_RECORDED_ERRORS {
            self.errors.push(err);
        }
    }

    /// Get the number of errors
    pub fn error_count(&self) -> u64 {
        self.error_total
    }

    /// Check if the scan ran to completion
    pub fn is_completed(&self) -> bool {
        self.state == ScanState::Completed
    }

    /// Files the scan looked at, whatever the outcome
    pub fn processed_files(&self) -> u64 {
        self.new_files + self.skipped_files + self.failed_files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, hash: &str, size: u64) -> CatalogEntry {
        CatalogEntry {
            path: PathBuf::from(path),
            content_hash: hash.to_string(),
            size,
            storage_location: "Local HD".to_string(),
            volume_name: "Macintosh HD".to_string(),
            width: None,
            height: None,
            format: None,
            date_taken: None,
            date_modified: Utc::now(),
            thumbnail: None,
            category: "image".to_string(),
            hidden: false,
            indexed_at: None,
        }
    }

    #[test]
    fn test_same_content_needs_hash_and_size() {
        let a = entry("/p/a.jpg", "abc", 10);
        let b = entry("/p/b.jpg", "abc", 10);
        let c = entry("/p/c.jpg", "abc", 11);
        assert!(a.same_content(&b));
        assert!(!a.same_content(&c));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(entry("/p/IMG_0001.JPG", "h", 1).file_name(), "IMG_0001.JPG");
    }

    #[test]
    fn test_duplicate_group_redundant_bytes() {
        let group = DuplicateGroup {
            content_hash: "abc".into(),
            size: 100,
            entries: vec![
                entry("/a.jpg", "abc", 100),
                entry("/b.jpg", "abc", 100),
                entry("/c.jpg", "abc", 100),
            ],
        };
        assert_eq!(group.count(), 3);
        assert_eq!(group.redundant_bytes(), 200);
    }

    #[test]
    fn test_entry_update_is_empty() {
        assert!(EntryUpdate::default().is_empty());
        let update = EntryUpdate {
            hidden: Some(true),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn test_scan_state_serialization() {
        assert_eq!(
            serde_json::to_string(&ScanState::Completed).unwrap(),
            "\"completed\""
        );
        assert!(ScanState::Aborted.is_terminal());
        assert!(!ScanState::Processing.is_terminal());
    }

    #[test]
    fn test_scan_result_default() {
        let result = ScanResult::new(PathBuf::from("/photos"));
        assert_eq!(result.state, ScanState::Idle);
        assert_eq!(result.processed_files(), 0);
        assert_eq!(result.error_count(), 0);
        assert!(!result.is_completed());
    }

    #[test]
    fn test_recorded_errors_are_capped_but_counted() {
        let mut result = ScanResult::new(PathBuf::from("/photos"));
        for i in 0..MAX_RECORDED_ERRORS + 5 {
            result.record_error(ScanError::new(
                crate::error::ScanErrorKind::Rendition,
                Some(PathBuf::from(format!("/photos/{i}.cr2"))),
                "unsupported",
            ));
        }
        assert_eq!(result.errors.len(), MAX_RECORDED_ERRORS);
        assert_eq!(result.error_count(), MAX_RECORDED_ERRORS as u64 + 5);
        assert_eq!(result.errors[0].path, Some(PathBuf::from("/photos/0.cr2")));
    }

    #[test]
    fn test_entry_serialization_skips_empty_fields() {
        let json = serde_json::to_value(entry("/a.jpg", "abc", 1)).unwrap();
        assert!(json.get("width").is_none());
        assert!(json.get("hidden").is_none());
        assert_eq!(json["category"], "image");
    }
}
