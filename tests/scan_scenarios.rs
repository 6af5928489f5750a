//! End-to-end scan scenarios against a real catalog file and thumbnail cache

use image::{Rgb, RgbImage};
use photo_indexer::{
    Catalog, ContentHasher, Fingerprint, ListQuery, ReadError, ScanConfig, ScanErrorKind,
    ScanState, Scanner, Sha256Hasher, ThumbnailCache,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::TempDir;

/// A JPEG full of noise, so it barely compresses (about 100 KB)
fn write_noise_jpeg(path: &Path, seed: u32) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    RgbImage::from_fn(640, 480, |_, _| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let b = state.to_le_bytes();
        Rgb([b[1], b[2], b[3]])
    })
    .save(path)
    .unwrap();
}

struct Library {
    photos: TempDir,
    output: TempDir,
}

impl Library {
    /// a.jpg and b.jpg are byte-identical, c.jpg differs
    fn new() -> Self {
        let lib = Self {
            photos: TempDir::new().unwrap(),
            output: TempDir::new().unwrap(),
        };
        write_noise_jpeg(&lib.path("a.jpg"), 1);
        std::fs::copy(lib.path("a.jpg"), lib.path("b.jpg")).unwrap();
        write_noise_jpeg(&lib.path("c.jpg"), 2);
        lib
    }

    fn root(&self) -> PathBuf {
        self.photos.path().canonicalize().unwrap()
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    fn db_path(&self) -> PathBuf {
        self.output.path().join("photos.db")
    }

    fn config(&self) -> ScanConfig {
        ScanConfig::builder()
            .add_root(self.root())
            .db_path(self.db_path())
            .thumbnail_dir(self.output.path().join("thumbs"))
            .batch_size(2)
            .build()
    }

    fn cache(&self, config: &ScanConfig) -> ThumbnailCache {
        ThumbnailCache::from_config(config).unwrap()
    }
}

/// Fails to read any file with the given name
struct FailingHasher {
    file_name: &'static str,
}

impl ContentHasher for FailingHasher {
    fn fingerprint(&self, path: &Path) -> Result<Fingerprint, ReadError> {
        if path.file_name().and_then(|n| n.to_str()) == Some(self.file_name) {
            return Err(ReadError::new(
                path,
                std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            ));
        }
        Sha256Hasher.fingerprint(path)
    }
}

#[test]
fn three_files_make_one_duplicate_group_and_two_thumbnails() {
    let lib = Library::new();
    let size = std::fs::metadata(lib.path("a.jpg")).unwrap().len();
    assert!(size > 50_000, "fixture should be a sizeable jpeg, got {size}");

    let config = lib.config();
    let cache = lib.cache(&config);
    let mut catalog = Catalog::open(&config.db_path).unwrap();
    let result = Scanner::new(&config, &mut catalog, &cache)
        .scan(&lib.root())
        .unwrap();

    assert_eq!(result.state, ScanState::Completed);
    assert_eq!(result.found_files, 3);
    assert_eq!(result.new_files, 3);
    assert_eq!(result.duplicates, 1);
    assert_eq!(catalog.count().unwrap(), 3);

    let groups = catalog.duplicate_groups().unwrap();
    assert_eq!(groups.len(), 1);
    let mut paths: Vec<_> = groups[0].paths().into_iter().cloned().collect();
    paths.sort();
    assert_eq!(paths, vec![lib.path("a.jpg"), lib.path("b.jpg")]);
    assert_eq!(groups[0].size, size);

    // One rendition per distinct content
    assert_eq!(cache.asset_count().unwrap(), 2);
    let a = catalog.get(&lib.path("a.jpg")).unwrap().unwrap();
    let b = catalog.get(&lib.path("b.jpg")).unwrap().unwrap();
    let c = catalog.get(&lib.path("c.jpg")).unwrap().unwrap();
    assert_eq!(a.thumbnail, b.thumbnail);
    assert_ne!(a.thumbnail, c.thumbnail);
    assert!(cache.resolve(a.thumbnail.as_deref().unwrap()).is_file());
    assert_eq!(a.format.as_deref(), Some("JPEG"));
    assert_eq!((a.width, a.height), (Some(640), Some(480)));
}

#[test]
fn rescan_of_unchanged_root_adds_nothing() {
    let lib = Library::new();
    let config = lib.config();
    let cache = lib.cache(&config);
    let mut catalog = Catalog::open(&config.db_path).unwrap();

    Scanner::new(&config, &mut catalog, &cache)
        .scan(&lib.root())
        .unwrap();
    let query = ListQuery {
        include_hidden: true,
        ..Default::default()
    };
    let before = catalog.list(&query).unwrap();

    let second = Scanner::new(&config, &mut catalog, &cache)
        .scan(&lib.root())
        .unwrap();
    assert_eq!(second.state, ScanState::Completed);
    assert_eq!(second.new_files, 0);
    assert_eq!(second.skipped_files, 3);

    let after = catalog.list(&query).unwrap();
    assert_eq!(before, after);
}

#[test]
fn rescan_picks_up_new_paths_only() {
    let lib = Library::new();
    let config = lib.config();
    let cache = lib.cache(&config);
    let mut catalog = Catalog::open(&config.db_path).unwrap();

    Scanner::new(&config, &mut catalog, &cache)
        .scan(&lib.root())
        .unwrap();
    write_noise_jpeg(&lib.path("2024/d.jpg"), 3);

    let result = Scanner::new(&config, &mut catalog, &cache)
        .scan(&lib.root())
        .unwrap();
    assert_eq!(result.new_files, 1);
    assert_eq!(result.skipped_files, 3);
    assert_eq!(catalog.count().unwrap(), 4);
}

#[test]
fn deleted_file_keeps_its_row_and_group() {
    let lib = Library::new();
    let config = lib.config();
    let cache = lib.cache(&config);
    let mut catalog = Catalog::open(&config.db_path).unwrap();

    Scanner::new(&config, &mut catalog, &cache)
        .scan(&lib.root())
        .unwrap();
    std::fs::remove_file(lib.path("b.jpg")).unwrap();

    let result = Scanner::new(&config, &mut catalog, &cache)
        .scan(&lib.root())
        .unwrap();
    assert_eq!(result.found_files, 2);
    assert_eq!(result.new_files, 0);

    let stats = catalog.stats().unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.duplicate_groups, 1);
    let groups = catalog.duplicate_groups().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].count(), 2);
}

#[test]
fn excluded_segments_never_yield_rows() {
    let lib = Library::new();
    write_noise_jpeg(&lib.path("Library/Caches/cached.jpg"), 4);
    write_noise_jpeg(&lib.path("project/node_modules/pkg/logo.jpg"), 5);
    write_noise_jpeg(&lib.path("Exports/Drafts/draft.jpg"), 6);
    write_noise_jpeg(&lib.path("Exports/final.jpg"), 7);

    let mut config = lib.config();
    config.exclude_patterns.push("Exports/Drafts".to_string());
    let cache = lib.cache(&config);
    let mut catalog = Catalog::open(&config.db_path).unwrap();
    let result = Scanner::new(&config, &mut catalog, &cache)
        .scan(&lib.root())
        .unwrap();

    assert_eq!(result.new_files, 4);
    assert!(catalog.exists(&lib.path("Exports/final.jpg")).unwrap());
    for excluded in [
        "Library/Caches/cached.jpg",
        "project/node_modules/pkg/logo.jpg",
        "Exports/Drafts/draft.jpg",
    ] {
        assert!(!catalog.exists(&lib.path(excluded)).unwrap(), "{excluded}");
    }
}

#[test]
fn scanning_leaves_sources_untouched() {
    let lib = Library::new();
    let snapshot = |lib: &Library| -> HashMap<PathBuf, (Vec<u8>, SystemTime)> {
        ["a.jpg", "b.jpg", "c.jpg"]
            .iter()
            .map(|name| {
                let path = lib.path(name);
                let bytes = std::fs::read(&path).unwrap();
                let mtime = std::fs::metadata(&path).unwrap().modified().unwrap();
                (path, (bytes, mtime))
            })
            .collect()
    };
    let before = snapshot(&lib);

    let config = lib.config();
    let cache = lib.cache(&config);
    let mut catalog = Catalog::open(&config.db_path).unwrap();
    Scanner::new(&config, &mut catalog, &cache)
        .scan(&lib.root())
        .unwrap();

    assert_eq!(before, snapshot(&lib));
}

#[test]
fn unreadable_file_does_not_stop_the_scan() {
    let lib = Library::new();
    let config = lib.config();
    let cache = lib.cache(&config);
    let mut catalog = Catalog::open(&config.db_path).unwrap();

    let result = Scanner::new(&config, &mut catalog, &cache)
        .with_hasher(FailingHasher { file_name: "b.jpg" })
        .scan(&lib.root())
        .unwrap();

    assert_eq!(result.state, ScanState::Completed);
    assert_eq!(result.new_files, 2);
    assert_eq!(result.failed_files, 1);
    assert!(result
        .errors
        .iter()
        .any(|e| e.kind == ScanErrorKind::PermissionDenied && e.path == Some(lib.path("b.jpg"))));
    assert!(!catalog.exists(&lib.path("b.jpg")).unwrap());

    // The failed file is picked up once it becomes readable
    let retry = Scanner::new(&config, &mut catalog, &cache)
        .scan(&lib.root())
        .unwrap();
    assert_eq!(retry.new_files, 1);
    assert_eq!(catalog.duplicate_groups().unwrap().len(), 1);
}

#[cfg(target_os = "linux")]
#[test]
fn non_utf8_file_names_fail_individually_instead_of_colliding() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let lib = Library::new();
    let first = lib.root().join(OsStr::from_bytes(b"a\xff.jpg"));
    let second = lib.root().join(OsStr::from_bytes(b"a\xfe.jpg"));
    write_noise_jpeg(&first, 11);
    write_noise_jpeg(&second, 12);

    let config = lib.config();
    let cache = lib.cache(&config);
    let mut catalog = Catalog::open(&config.db_path).unwrap();
    let result = Scanner::new(&config, &mut catalog, &cache)
        .scan(&lib.root())
        .unwrap();

    assert_eq!(result.state, ScanState::Completed);
    assert_eq!(result.found_files, 5);
    assert_eq!(result.new_files, 3);
    assert_eq!(result.skipped_files, 0);
    assert_eq!(result.failed_files, 2);
    for path in [&first, &second] {
        assert!(result
            .errors
            .iter()
            .any(|e| e.kind == ScanErrorKind::Read && e.path.as_ref() == Some(path)));
    }

    // Every stored path resolves to the file it describes
    let page = catalog
        .list(&ListQuery {
            include_hidden: true,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(page.total, 3);
    assert!(page.entries.iter().all(|e| e.path.is_file()));

    // Still reported, never silently skipped, on the next pass
    let rescan = Scanner::new(&config, &mut catalog, &cache)
        .scan(&lib.root())
        .unwrap();
    assert_eq!(rescan.failed_files, 2);
    assert_eq!(rescan.skipped_files, 3);
}

#[test]
fn missing_root_aborts_without_touching_the_catalog() {
    let lib = Library::new();
    let config = lib.config();
    let cache = lib.cache(&config);
    let mut catalog = Catalog::open(&config.db_path).unwrap();

    let err = Scanner::new(&config, &mut catalog, &cache)
        .scan(&lib.root().join("unmounted"))
        .unwrap_err();
    assert_eq!(err.kind, ScanErrorKind::RootUnavailable);
    assert!(err.is_fatal());
    assert_eq!(catalog.count().unwrap(), 0);
}

#[test]
fn undecodable_image_is_catalogued_without_thumbnail() {
    let lib = Library::new();
    std::fs::write(lib.path("broken.jpg"), b"definitely not a jpeg").unwrap();

    let config = lib.config();
    let cache = lib.cache(&config);
    let mut catalog = Catalog::open(&config.db_path).unwrap();
    let result = Scanner::new(&config, &mut catalog, &cache)
        .scan(&lib.root())
        .unwrap();

    assert_eq!(result.state, ScanState::Completed);
    assert_eq!(result.new_files, 4);
    assert_eq!(result.missing_thumbnails, 1);
    assert!(result
        .errors
        .iter()
        .any(|e| e.kind == ScanErrorKind::Rendition));

    let broken = catalog.get(&lib.path("broken.jpg")).unwrap().unwrap();
    assert!(broken.thumbnail.is_none());
    assert!(broken.format.is_none());
    assert_eq!(broken.size, 21);
    assert_eq!(broken.category, "image");
}

#[test]
fn concurrent_scans_share_one_catalog() {
    let lib = Library::new();
    let config = lib.config();
    let cache = lib.cache(&config);
    let mut first = Catalog::open(&config.db_path).unwrap();
    let mut second = Catalog::open(&config.db_path).unwrap();

    std::thread::scope(|s| {
        for catalog in [&mut first, &mut second] {
            let config = &config;
            let cache = &cache;
            let root = lib.root();
            s.spawn(move || {
                let result = Scanner::new(config, catalog, cache).scan(&root).unwrap();
                assert_eq!(result.state, ScanState::Completed);
            });
        }
    });

    assert_eq!(first.count().unwrap(), 3);
    assert_eq!(cache.asset_count().unwrap(), 2);
}
