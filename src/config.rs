//! Configuration for the photo indexer

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Default batch size for catalog commits
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Default longest edge of a thumbnail, in pixels
pub const DEFAULT_THUMBNAIL_MAX_EDGE: u32 = 300;

/// Default JPEG quality of a thumbnail
pub const DEFAULT_THUMBNAIL_QUALITY: u8 = 85;

/// Default minimum interval between progress lines
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 500;

/// Default catalog database file
pub const DEFAULT_DB_PATH: &str = "photos.db";

/// Default thumbnail directory
pub const DEFAULT_THUMBNAIL_DIR: &str = "thumbnails";

/// Default configuration file
pub const DEFAULT_CONFIG_FILE: &str = "scan_config.json";

/// Configuration for a scan. Taken as a snapshot when the scan starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Root directories to scan
    pub roots: Vec<PathBuf>,

    /// Recognized media extensions (lowercase, without dot)
    pub extensions: HashSet<String>,

    /// Ordered exclusion patterns, see [`crate::exclusion::ExclusionPolicy`]
    pub exclude_patterns: Vec<String>,

    /// Prune every directory whose name starts with '.'
    ///
    /// Off by default: known dot-directories are listed in the exclusion
    /// patterns, and unlisted ones (e.g. `.originals`) may hold photos.
    pub skip_hidden_dirs: bool,

    /// Files larger than this are not indexed
    pub max_file_size: Option<u64>,

    /// Number of worker threads for hashing and thumbnails
    /// 0 means auto-detect
    pub num_threads: usize,

    /// Number of entries committed per transaction
    pub batch_size: usize,

    /// Maximum traversal depth below the root (None = unlimited)
    pub max_depth: Option<usize>,

    /// Follow symbolic links while walking
    pub follow_links: bool,

    /// Catalog database path
    pub db_path: PathBuf,

    /// Thumbnail cache directory
    pub thumbnail_dir: PathBuf,

    /// Longest thumbnail edge in pixels
    pub thumbnail_max_edge: u32,

    /// Thumbnail JPEG quality (1-100)
    pub thumbnail_quality: u8,

    /// Emit JSON progress lines on stderr
    pub show_progress: bool,

    /// Minimum interval between progress lines
    pub progress_interval_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            extensions: Self::default_extensions(),
            exclude_patterns: Self::default_exclude_patterns(),
            skip_hidden_dirs: false,
            max_file_size: None,
            num_threads: 0,
            batch_size: DEFAULT_BATCH_SIZE,
            max_depth: None,
            follow_links: false,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            thumbnail_dir: PathBuf::from(DEFAULT_THUMBNAIL_DIR),
            thumbnail_max_edge: DEFAULT_THUMBNAIL_MAX_EDGE,
            thumbnail_quality: DEFAULT_THUMBNAIL_QUALITY,
            show_progress: false,
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
        }
    }
}

impl ScanConfig {
    /// Create a new config with the given root directories
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            ..Default::default()
        }
    }

    /// Create a config builder
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::new()
    }

    /// Standard raster formats plus camera RAW and HEIF
    pub fn default_extensions() -> HashSet<String> {
        [
            // Standard formats
            "jpg", "jpeg", "png", "gif", "bmp", "webp", "avif", "tif", "tiff",
            // Apple / mobile
            "heic", "heif",
            // Canon, Nikon, Sony
            "cr2", "cr3", "crw", "nef", "nrw", "arw", "srf", "sr2",
            // Other manufacturers
            "dng", "orf", "rw2", "pef", "raf", "raw", "rwl", "mrw", "dcr", "kdc", "erf", "mef",
            "mos", "x3f",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// Get the default exclusion patterns
    pub fn default_exclude_patterns() -> Vec<String> {
        [
            // System
            "Library",
            "System",
            "private",
            ".Trash",
            "$RECYCLE.BIN",
            "System Volume Information",
            "@eaDir",
            // Cloud placeholders
            "Library/CloudStorage",
            "Dropbox",
            // Photo app libraries
            "*.photoslibrary",
            // Development
            "node_modules",
            ".git",
            ".svn",
            ".vscode",
            ".cursor",
            "vendor",
            "build",
            "dist",
            "__pycache__",
            ".pytest_cache",
            // Hidden app directories
            ".local",
            ".config",
            ".cache",
            ".npm",
            ".nvm",
            ".pyenv",
            ".conda",
            // Our own output
            "thumbnails",
            "waveforms",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// Check if an extension is a recognized media extension
    pub fn should_include_extension(&self, ext: &str) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        self.extensions.contains(&ext.to_lowercase())
    }

    /// Get the effective number of threads
    pub fn effective_threads(&self) -> usize {
        if self.num_threads == 0 {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        } else {
            self.num_threads
        }
    }

    /// Batch size, never zero
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    /// Load a JSON config file and apply it on top of this config.
    ///
    /// A missing file leaves the config untouched. When present, the exclusion
    /// list becomes `exclude_patterns` followed by `additional_excludes`, and
    /// `scan_paths` fill in the roots if none were set.
    pub fn load_file(mut self, path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("No config file at {:?}, using defaults", path);
            return Ok(self);
        }
        let file = ConfigFile::read(path)?;
        self.exclude_patterns = file.exclusions();
        if self.roots.is_empty() {
            self.roots = file.scan_paths.iter().map(|p| expand_home(p)).collect();
        }
        log::info!(
            "Loaded {} exclude patterns from {:?}",
            self.exclude_patterns.len(),
            path
        );
        Ok(self)
    }
}

/// On-disk scan configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub scan_paths: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub additional_excludes: Vec<String>,
}

impl ConfigFile {
    /// Read and parse a config file
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Ordered, de-duplicated exclusion list
    pub fn exclusions(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.exclude_patterns
            .iter()
            .chain(self.additional_excludes.iter())
            .filter(|p| !p.trim().is_empty())
            .filter(|p| seen.insert(p.to_string()))
            .cloned()
            .collect()
    }
}

/// Expand a leading `~` to the home directory
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = std::env::var_os("HOME") {
            let rest = rest.trim_start_matches('/');
            let home = PathBuf::from(home);
            return if rest.is_empty() { home } else { home.join(rest) };
        }
    }
    PathBuf::from(path)
}

/// Builder for ScanConfig
#[derive(Debug, Default)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the root directories
    pub fn roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.config.roots = roots;
        self
    }

    /// Add a root directory
    pub fn add_root(mut self, root: PathBuf) -> Self {
        self.config.roots.push(root);
        self
    }

    /// Set the recognized extensions
    pub fn extensions(mut self, extensions: HashSet<String>) -> Self {
        self.config.extensions = extensions;
        self
    }

    /// Replace the exclusion patterns
    pub fn exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.exclude_patterns = patterns;
        self
    }

    /// Append an exclusion pattern
    pub fn add_exclude(mut self, pattern: impl Into<String>) -> Self {
        self.config.exclude_patterns.push(pattern.into());
        self
    }

    pub fn skip_hidden_dirs(mut self, enabled: bool) -> Self {
        self.config.skip_hidden_dirs = enabled;
        self
    }

    pub fn max_file_size(mut self, limit: Option<u64>) -> Self {
        self.config.max_file_size = limit;
        self
    }

    /// Set the number of threads
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.num_threads = threads;
        self
    }

    /// Set the batch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the maximum traversal depth
    pub fn max_depth(mut self, depth: Option<usize>) -> Self {
        self.config.max_depth = depth;
        self
    }

    pub fn follow_links(mut self, enabled: bool) -> Self {
        self.config.follow_links = enabled;
        self
    }

    /// Set the database path
    pub fn db_path(mut self, path: PathBuf) -> Self {
        self.config.db_path = path;
        self
    }

    /// Set the thumbnail directory
    pub fn thumbnail_dir(mut self, path: PathBuf) -> Self {
        self.config.thumbnail_dir = path;
        self
    }

    pub fn thumbnail_max_edge(mut self, edge: u32) -> Self {
        self.config.thumbnail_max_edge = edge;
        self
    }

    pub fn thumbnail_quality(mut self, quality: u8) -> Self {
        self.config.thumbnail_quality = quality.clamp(1, 100);
        self
    }

    /// Enable or disable progress lines on stderr
    pub fn show_progress(mut self, enabled: bool) -> Self {
        self.config.show_progress = enabled;
        self
    }

    pub fn progress_interval_ms(mut self, interval: u64) -> Self {
        self.config.progress_interval_ms = interval;
        self
    }

    /// Build the config
    pub fn build(self) -> ScanConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ScanConfig::default();
        assert!(config.roots.is_empty());
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.thumbnail_max_edge, 300);
        assert_eq!(config.thumbnail_quality, 85);
        assert!(!config.skip_hidden_dirs);
        assert!(config.max_depth.is_none());
    }

    #[test]
    fn test_default_extensions() {
        let extensions = ScanConfig::default_extensions();
        assert!(extensions.contains("jpg"));
        assert!(extensions.contains("heic"));
        assert!(extensions.contains("cr2"));
        assert!(extensions.contains("dng"));
        assert!(!extensions.contains("mp4"));
        assert!(!extensions.contains("txt"));
    }

    #[test]
    fn test_should_include_extension() {
        let config = ScanConfig::default();
        assert!(config.should_include_extension("jpg"));
        assert!(config.should_include_extension("JPG"));
        assert!(config.should_include_extension("NeF"));
        assert!(!config.should_include_extension("txt"));
        assert!(!config.should_include_extension(""));
    }

    #[test]
    fn test_config_builder() {
        let config = ScanConfig::builder()
            .add_root(PathBuf::from("/test"))
            .num_threads(4)
            .batch_size(10)
            .add_exclude("Archive")
            .thumbnail_quality(150)
            .max_file_size(Some(1024))
            .build();

        assert_eq!(config.roots.len(), 1);
        assert_eq!(config.num_threads, 4);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.exclude_patterns.last().map(String::as_str), Some("Archive"));
        assert_eq!(config.thumbnail_quality, 100);
        assert_eq!(config.max_file_size, Some(1024));
    }

    #[test]
    fn test_effective_values() {
        let config = ScanConfig::builder().num_threads(8).batch_size(0).build();
        assert_eq!(config.effective_threads(), 8);
        assert_eq!(config.effective_batch_size(), 1);

        let auto_config = ScanConfig::default();
        assert!(auto_config.effective_threads() > 0);
    }

    #[test]
    fn test_missing_config_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ScanConfig::default()
            .load_file(&dir.path().join("scan_config.json"))
            .unwrap();
        assert_eq!(config.exclude_patterns, ScanConfig::default_exclude_patterns());
    }

    #[test]
    fn test_config_file_replaces_exclusions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan_config.json");
        std::fs::write(
            &path,
            r#"{
                "scan_paths": ["/data/photos"],
                "exclude_patterns": ["node_modules", "Library"],
                "additional_excludes": ["Library", "Old Backups", ""]
            }"#,
        )
        .unwrap();

        let config = ScanConfig::default().load_file(&path).unwrap();
        assert_eq!(
            config.exclude_patterns,
            vec!["node_modules", "Library", "Old Backups"]
        );
        assert_eq!(config.roots, vec![PathBuf::from("/data/photos")]);
    }

    #[test]
    fn test_config_file_does_not_override_explicit_roots() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan_config.json");
        std::fs::write(&path, r#"{"scan_paths": ["/elsewhere"]}"#).unwrap();

        let config = ScanConfig::new(vec![PathBuf::from("/mine")])
            .load_file(&path)
            .unwrap();
        assert_eq!(config.roots, vec![PathBuf::from("/mine")]);
        assert!(config.exclude_patterns.is_empty());
    }

    #[test]
    fn test_malformed_config_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan_config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = ScanConfig::default().load_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(expand_home("~/Pictures"), PathBuf::from(home).join("Pictures"));
        }
    }
}
