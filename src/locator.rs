//! Storage locator: where a catalogued path lives
//!
//! Classification looks only at the path string, so a path on an unmounted
//! volume still classifies the same way.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

/// Volume name used for the primary disk
pub const PRIMARY_VOLUME: &str = "Macintosh HD";

/// Storage location label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageLocation {
    /// Home directories on the primary disk
    LocalDisk,
    /// Removable or mounted volume
    External,
    /// iCloud Drive
    ICloud,
    /// Third-party sync folders (Dropbox, OneDrive, Google Drive, ...)
    CloudStorage,
    /// Anything else
    Other,
}

impl StorageLocation {
    /// Label stored in the catalog
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageLocation::LocalDisk => "Local HD",
            StorageLocation::External => "External Drive",
            StorageLocation::ICloud => "iCloud",
            StorageLocation::CloudStorage => "Cloud Storage",
            StorageLocation::Other => "Other",
        }
    }
}

impl std::fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of a path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub location: StorageLocation,
    pub volume_name: String,
}

impl Placement {
    fn new(location: StorageLocation, volume_name: impl Into<String>) -> Self {
        Self {
            location,
            volume_name: volume_name.into(),
        }
    }
}

/// Sync-folder names recognized anywhere in a path
const SYNC_FOLDERS: &[&str] = &["Dropbox", "OneDrive", "Google Drive"];

/// Classify a path into a storage location and volume name
pub fn classify(path: &Path) -> Placement {
    let segments: Vec<&str> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();
    let absolute = path.has_root();

    if absolute {
        if let Some(volume) = mount_volume(&segments) {
            return Placement::new(StorageLocation::External, volume);
        }
    }

    if contains_run(&segments, &["Library", "Mobile Documents"])
        || segments.iter().any(|s| s.contains("iCloud"))
    {
        return Placement::new(StorageLocation::ICloud, "iCloud Drive");
    }

    if let Some(pos) = find_run(&segments, &["Library", "CloudStorage"]) {
        let provider = segments
            .get(pos + 2)
            .map(|s| s.split('-').next().unwrap_or(*s))
            .filter(|s| !s.is_empty())
            .unwrap_or("CloudStorage");
        return Placement::new(StorageLocation::CloudStorage, provider);
    }

    if let Some(folder) = segments.iter().find(|s| SYNC_FOLDERS.contains(*s)) {
        return Placement::new(StorageLocation::CloudStorage, *folder);
    }

    if absolute && matches!(segments.first(), Some(&"Users") | Some(&"home")) {
        return Placement::new(StorageLocation::LocalDisk, PRIMARY_VOLUME);
    }

    Placement::new(StorageLocation::Other, "System")
}

/// Volume name for paths under a removable-media mount point
fn mount_volume<'a>(segments: &[&'a str]) -> Option<&'a str> {
    match segments {
        ["Volumes", name, ..] => Some(*name),
        ["media", _user, name, ..] => Some(*name),
        ["run", "media", _user, name, ..] => Some(*name),
        ["mnt", name, ..] => Some(*name),
        _ => None,
    }
}

fn find_run(segments: &[&str], run: &[&str]) -> Option<usize> {
    segments.windows(run.len()).position(|w| w == run)
}

fn contains_run(segments: &[&str], run: &[&str]) -> bool {
    find_run(segments, run).is_some()
}
