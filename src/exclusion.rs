//! Exclusion policy for directory traversal
//!
//! Patterns come in three forms, all matched against whole path segments:
//!
//! - `node_modules` matches a segment with exactly that name
//! - `Library/CloudStorage` matches that run of consecutive segments
//! - `*.photoslibrary` matches a segment ending in `.photoslibrary`
//!
//! Nothing is matched fuzzily: a false exclusion silently loses photos.

use std::path::{Component, Path, PathBuf};

use crate::config::ScanConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    Segment(String),
    Run(Vec<String>),
    Suffix(String),
}

impl Pattern {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().trim_matches('/');
        if raw.is_empty() {
            return None;
        }
        if let Some(suffix) = raw.strip_prefix('*') {
            return (!suffix.is_empty()).then(|| Pattern::Suffix(suffix.to_string()));
        }
        if raw.contains('/') {
            let run: Vec<String> = raw
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            return Some(Pattern::Run(run));
        }
        Some(Pattern::Segment(raw.to_string()))
    }

    fn matches(&self, segments: &[&str]) -> bool {
        match self {
            Pattern::Segment(name) => segments.iter().any(|s| *s == name.as_str()),
            Pattern::Suffix(suffix) => segments.iter().any(|s| s.ends_with(suffix.as_str())),
            Pattern::Run(run) => segments
                .windows(run.len())
                .any(|w| w.iter().zip(run).all(|(a, b)| *a == b.as_str())),
        }
    }
}

/// Decides which directories and files a scan visits
#[derive(Debug, Clone, Default)]
pub struct ExclusionPolicy {
    patterns: Vec<Pattern>,
    skip_hidden_dirs: bool,
    excluded_dirs: Vec<PathBuf>,
}

impl ExclusionPolicy {
    /// Build a policy from raw patterns. Blank patterns are ignored.
    pub fn new<I, S>(patterns: I, skip_hidden_dirs: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .filter_map(|p| Pattern::parse(p.as_ref()))
                .collect(),
            skip_hidden_dirs,
            excluded_dirs: Vec::new(),
        }
    }

    /// Policy for a scan configuration, excluding the thumbnail directory as well
    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(&config.exclude_patterns, config.skip_hidden_dirs)
            .exclude_dir(config.thumbnail_dir.clone())
    }

    /// Exclude an absolute directory (e.g. a previous output directory)
    pub fn exclude_dir(mut self, dir: PathBuf) -> Self {
        let dir = std::fs::canonicalize(&dir).unwrap_or(dir);
        self.excluded_dirs.push(dir);
        self
    }

    /// Number of name patterns in effect
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether `path`, relative to the scan root, should be visited.
    ///
    /// Every segment of the path is checked, so a file is rejected when any of
    /// its ancestors below the root is excluded.
    pub fn should_visit(&self, path: &Path, is_dir: bool) -> bool {
        let segments: Vec<&str> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect();
        if segments.is_empty() {
            return true;
        }

        if self.skip_hidden_dirs {
            // Only directories count: the last segment of a file path is the file.
            let dir_segments = if is_dir {
                &segments[..]
            } else {
                &segments[..segments.len() - 1]
            };
            if dir_segments.iter().any(|s| s.starts_with('.')) {
                return false;
            }
        }

        !self.patterns.iter().any(|p| p.matches(&segments))
    }

    /// Whether an absolute directory is one of the excluded output directories
    pub fn is_excluded_dir(&self, abs_path: &Path) -> bool {
        self.excluded_dirs.iter().any(|d| abs_path.starts_with(d))
    }
}
