//! Scan orchestrator: walks a root and catalogues every new image under it
//!
//! Traversal runs on the calling thread and decides, per file, whether work is
//! needed at all (extension, exclusion, already catalogued). Files that need
//! work are gathered into batches; each batch is fingerprinted, described and
//! thumbnailed on a rayon pool, then committed in one catalog transaction.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use walkdir::WalkDir;

use crate::categorize::{Categorizer, ImageTraits};
use crate::config::ScanConfig;
use crate::db::Catalog;
use crate::error::{ReadError, ScanError, ScanErrorKind};
use crate::exclusion::ExclusionPolicy;
use crate::identity::{ContentHasher, Sha256Hasher};
use crate::locator;
use crate::metadata::extract_metadata;
use crate::models::{path_key, CatalogEntry, InsertOutcome, ScanResult, ScanState};
use crate::progress::ProgressReporter;
use crate::thumbnail::ThumbnailCache;

/// Scan progress information
#[derive(Debug, Clone, Default)]
pub struct ScanProgress {
    pub state: ScanState,
    /// Media files found so far
    pub found_files: u64,
    /// Directories traversed so far
    pub scanned_dirs: u64,
    pub new_files: u64,
    pub skipped_files: u64,
    pub failed_files: u64,
    pub duplicates: u64,
    /// Current directory being scanned
    pub current_dir: String,
    /// Elapsed time in milliseconds
    pub elapsed_ms: u64,
}

impl ScanProgress {
    fn snapshot(result: &ScanResult, state: ScanState, current_dir: &str, start: Instant) -> Self {
        Self {
            state,
            found_files: result.found_files,
            scanned_dirs: result.total_dirs,
            new_files: result.new_files,
            skipped_files: result.skipped_files,
            failed_files: result.failed_files,
            duplicates: result.duplicates,
            current_dir: current_dir.to_string(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        }
    }
}

/// A file that is ready to be inserted
struct Prepared {
    entry: CatalogEntry,
    /// Set when the thumbnail could not be produced
    rendition_error: Option<ScanError>,
}

/// Drives scans against one catalog and thumbnail cache
pub struct Scanner<'a, H: ContentHasher = Sha256Hasher> {
    config: &'a ScanConfig,
    catalog: &'a mut Catalog,
    thumbnails: &'a ThumbnailCache,
    hasher: H,
    policy: ExclusionPolicy,
    categorizer: Categorizer,
    stop: Arc<AtomicBool>,
}

impl<'a> Scanner<'a, Sha256Hasher> {
    pub fn new(config: &'a ScanConfig, catalog: &'a mut Catalog, thumbnails: &'a ThumbnailCache) -> Self {
        Self {
            config,
            catalog,
            thumbnails,
            hasher: Sha256Hasher,
            policy: ExclusionPolicy::from_config(config).exclude_dir(thumbnails.dir().to_path_buf()),
            categorizer: Categorizer::default(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl<'a, H: ContentHasher> Scanner<'a, H> {
    /// Replace the content hasher
    pub fn with_hasher<G: ContentHasher>(self, hasher: G) -> Scanner<'a, G> {
        Scanner {
            config: self.config,
            catalog: self.catalog,
            thumbnails: self.thumbnails,
            hasher,
            policy: self.policy,
            categorizer: self.categorizer,
            stop: self.stop,
        }
    }

    pub fn with_categorizer(mut self, categorizer: Categorizer) -> Self {
        self.categorizer = categorizer;
        self
    }

    /// Share a stop flag with the caller; raising it stops the scan after
    /// the current batch
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Scan every configured root in sequence
    ///
    /// One root failing does not prevent the others. Roots after a stop
    /// request are not started.
    pub fn scan_all(&mut self) -> Vec<Result<ScanResult, ScanError>> {
        let roots = self.config.roots.clone();
        let mut results = Vec::with_capacity(roots.len());
        for root in &roots {
            if self.stop_requested() {
                log::info!("Stop requested, not scanning {:?}", root);
                break;
            }
            results.push(self.scan(root));
        }
        results
    }

    /// Scan one root
    ///
    /// Returns the summary when the scan completes or is stopped. A missing or
    /// unreadable root, or a catalog that cannot commit, ends the scan with an
    /// error; batches committed before that point are kept.
    pub fn scan(&mut self, root: &Path) -> Result<ScanResult, ScanError> {
        let start = Instant::now();
        let reporter = ProgressReporter::from_config(self.config);
        let mut result = ScanResult::new(root.to_path_buf());

        let outcome = match check_root(root) {
            Ok(root) => {
                result.root = root.clone();
                reporter.report_start(&root, self.config, self.policy.len());
                log::info!("Scanning {:?}", root);
                self.run(&root, &mut result, &reporter, start)
            }
            Err(e) => Err(e),
        };
        result.duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(state) => {
                result.state = state;
                log::info!(
                    "Scan of {:?} {}: {} found, {} new, {} skipped, {} failed, {} duplicates in {}ms",
                    result.root,
                    state,
                    result.found_files,
                    result.new_files,
                    result.skipped_files,
                    result.failed_files,
                    result.duplicates,
                    result.duration_ms
                );
                reporter.report_done(&result);
                Ok(result)
            }
            Err(e) => {
                result.state = ScanState::Aborted;
                log::error!("Scan of {:?} aborted: {}", result.root, e);
                reporter.report_error(&e);
                result.record_error(e.clone());
                reporter.report_done(&result);
                Err(e)
            }
        }
    }

    /// Traverse and process; returns the terminal state
    fn run(
        &mut self,
        root: &Path,
        result: &mut ScanResult,
        reporter: &ProgressReporter,
        start: Instant,
    ) -> Result<ScanState, ScanError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.effective_threads())
            .build()
            .map_err(|e| ScanError::new(ScanErrorKind::Unknown, None, e.to_string()))?;
        let batch_size = self.config.effective_batch_size();

        let mut state = ScanState::Enumerating;
        let mut pending: Vec<PathBuf> = Vec::with_capacity(batch_size);
        let mut current_dir = root.to_string_lossy().to_string();

        let policy = self.policy.clone();
        let excluded = Cell::new(0u64);

        let mut walker = WalkDir::new(root).follow_links(self.config.follow_links);
        if let Some(depth) = self.config.max_depth {
            walker = walker.max_depth(depth);
        }
        let entries = walker.into_iter().filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            let is_dir = e.file_type().is_dir();
            let relative = e.path().strip_prefix(root).unwrap_or(e.path());
            let visit = policy.should_visit(relative, is_dir)
                && !(is_dir && policy.is_excluded_dir(e.path()));
            if !visit {
                log::debug!("Excluded {:?}", e.path());
                excluded.set(excluded.get() + 1);
            }
            visit
        });

        for entry in entries {
            if self.stop_requested() {
                log::info!("Stop requested while scanning {:?}", root);
                state = ScanState::Stopped;
                break;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(|p| p.to_path_buf());
                    let kind = if e.io_error().map(|e| e.kind())
                        == Some(std::io::ErrorKind::PermissionDenied)
                    {
                        ScanErrorKind::PermissionDenied
                    } else {
                        ScanErrorKind::IoError
                    };
                    let err = ScanError::new(kind, path, e.to_string());
                    log::warn!("{}", err);
                    reporter.report_error(&err);
                    result.record_error(err);
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                result.total_dirs += 1;
                current_dir = entry.path().to_string_lossy().to_string();
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }

            let extension = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("");
            if extension.is_empty() || !self.config.should_include_extension(extension) {
                continue;
            }
            result.found_files += 1;

            if path_key(entry.path()).is_none() {
                let err = ScanError::from(ReadError::new(
                    entry.path(),
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "file name is not valid UTF-8",
                    ),
                ));
                log::warn!("{}", err);
                reporter.report_error(&err);
                result.record_error(err);
                result.failed_files += 1;
                continue;
            }

            if self.catalog.exists(entry.path())? {
                log::debug!("Already indexed {:?}", entry.path());
                result.skipped_files += 1;
                continue;
            }

            if let Some(limit) = self.config.max_file_size {
                match entry.metadata() {
                    Ok(meta) if meta.len() > limit => {
                        log::debug!("Skipping {:?}: {} bytes exceeds limit", entry.path(), meta.len());
                        result.failed_files += 1;
                        continue;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let err = ScanError::new(
                            ScanErrorKind::IoError,
                            Some(entry.path().to_path_buf()),
                            e.to_string(),
                        );
                        log::warn!("{}", err);
                        reporter.report_error(&err);
                        result.record_error(err);
                        result.failed_files += 1;
                        continue;
                    }
                }
            }

            pending.push(entry.into_path());
            if pending.len() >= batch_size {
                state = ScanState::Processing;
                self.process_batch(std::mem::take(&mut pending), &pool, result, reporter)?;
            }

            if reporter.should_report() {
                reporter.report_progress(&ScanProgress::snapshot(result, state, &current_dir, start));
            }
        }

        if !pending.is_empty() {
            self.process_batch(pending, &pool, result, reporter)?;
        }
        result.excluded = excluded.get();

        if state == ScanState::Stopped {
            Ok(ScanState::Stopped)
        } else {
            Ok(ScanState::Completed)
        }
    }

    /// Prepare a batch in parallel, then commit it in one transaction
    fn process_batch(
        &mut self,
        paths: Vec<PathBuf>,
        pool: &ThreadPool,
        result: &mut ScanResult,
        reporter: &ProgressReporter,
    ) -> Result<(), ScanError> {
        let hasher = &self.hasher;
        let thumbnails = self.thumbnails;
        let categorizer = &self.categorizer;

        let prepared: Vec<Result<Prepared, ScanError>> = pool.install(|| {
            paths
                .par_iter()
                .map(|path| prepare_entry(path, hasher, thumbnails, categorizer))
                .collect()
        });

        let mut entries = Vec::with_capacity(prepared.len());
        for item in prepared {
            match item {
                Ok(Prepared {
                    entry,
                    rendition_error,
                }) => {
                    if let Some(err) = rendition_error {
                        log::warn!("No thumbnail for {:?}: {}", entry.path, err.message);
                        reporter.report_error(&err);
                        result.record_error(err);
                    }
                    entries.push(entry);
                }
                Err(err) => {
                    log::warn!("Failed to index: {}", err);
                    reporter.report_error(&err);
                    result.record_error(err);
                    result.failed_files += 1;
                }
            }
        }

        let outcomes = self.catalog.insert_batch(&entries)?;
        for (entry, outcome) in entries.iter().zip(outcomes) {
            match outcome {
                InsertOutcome::Inserted => result.new_files += 1,
                InsertOutcome::InsertedDuplicate(original) => {
                    log::info!(
                        "Duplicate content: {:?} matches {:?}",
                        entry.path,
                        original
                    );
                    result.new_files += 1;
                    result.duplicates += 1;
                }
                InsertOutcome::AlreadyIndexed => {
                    // Another scan committed this path after our existence check.
                    log::debug!("Already indexed {:?}", entry.path);
                    result.skipped_files += 1;
                    continue;
                }
            }
            if entry.thumbnail.is_none() {
                result.missing_thumbnails += 1;
            }
        }
        log::debug!("Committed batch of {}", entries.len());
        Ok(())
    }
}

/// Canonical root, or `RootUnavailable`
fn check_root(root: &Path) -> Result<PathBuf, ScanError> {
    let canonical = std::fs::canonicalize(root)
        .map_err(|e| ScanError::root_unavailable(root.to_path_buf(), e.to_string()))?;
    if !canonical.is_dir() {
        return Err(ScanError::root_unavailable(
            root.to_path_buf(),
            "not a directory",
        ));
    }
    std::fs::read_dir(&canonical)
        .map_err(|e| ScanError::root_unavailable(root.to_path_buf(), e.to_string()))?;
    Ok(canonical)
}

/// Everything that happens to one new file before the insert
fn prepare_entry<H: ContentHasher>(
    path: &Path,
    hasher: &H,
    thumbnails: &ThumbnailCache,
    categorizer: &Categorizer,
) -> Result<Prepared, ScanError> {
    let fs_meta = std::fs::metadata(path).map_err(|e| ReadError::new(path, e))?;
    let fingerprint = hasher.fingerprint(path)?;

    let placement = locator::classify(path);
    let metadata = extract_metadata(path);
    let traits = ImageTraits::new(
        path,
        metadata.width,
        metadata.height,
        metadata.date_taken.is_some(),
    );
    let category = categorizer.categorize(&traits);

    let (thumbnail, rendition_error) = match thumbnails.get_or_create(path, &fingerprint.hash) {
        Ok(thumb) => (Some(thumb.file_name), None),
        Err(e) => (None, Some(ScanError::from(e))),
    };

    let date_modified = fs_meta
        .modified()
        .map(DateTime::<Utc>::from)
        .map_err(|e| ReadError::new(path, e))?;

    Ok(Prepared {
        entry: CatalogEntry {
            path: path.to_path_buf(),
            content_hash: fingerprint.hash,
            size: fingerprint.size,
            storage_location: placement.location.as_str().to_string(),
            volume_name: placement.volume_name,
            width: metadata.width,
            height: metadata.height,
            format: metadata.format,
            date_taken: metadata.date_taken,
            date_modified,
            thumbnail,
            category: category.as_str().to_string(),
            hidden: false,
            indexed_at: None,
        },
        rendition_error,
    })
}
