//! Content-addressed thumbnail cache
//!
//! Assets are named after the first [`THUMBNAIL_KEY_LEN`] characters of the
//! content hash, so every catalogued copy of the same bytes shares one file.
//! A hit never touches the source file.

use image::codecs::jpeg::JpegEncoder;
use image::ImageReader;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::config::{ScanConfig, DEFAULT_THUMBNAIL_MAX_EDGE, DEFAULT_THUMBNAIL_QUALITY};
use crate::error::RenditionError;

/// Number of hash characters in an asset name
pub const THUMBNAIL_KEY_LEN: usize = 16;

/// Asset file extension
const THUMBNAIL_EXT: &str = "jpg";

/// A thumbnail asset returned by the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    /// Asset file name, stored in the catalog
    pub file_name: String,
    /// Full path of the asset
    pub path: PathBuf,
    /// Whether this call rendered the asset
    pub generated: bool,
}

/// Thumbnail store on durable storage
#[derive(Debug, Clone)]
pub struct ThumbnailCache {
    dir: PathBuf,
    max_edge: u32,
    quality: u8,
}

impl ThumbnailCache {
    /// Open (and create if needed) a cache directory
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            max_edge: DEFAULT_THUMBNAIL_MAX_EDGE,
            quality: DEFAULT_THUMBNAIL_QUALITY,
        })
    }

    /// Open the cache configured for a scan
    pub fn from_config(config: &ScanConfig) -> std::io::Result<Self> {
        Ok(Self::open(&config.thumbnail_dir)?
            .with_max_edge(config.thumbnail_max_edge)
            .with_quality(config.thumbnail_quality))
    }

    pub fn with_max_edge(mut self, max_edge: u32) -> Self {
        self.max_edge = max_edge.max(1);
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache key for a content hash
    pub fn key(hash: &str) -> &str {
        match hash.char_indices().nth(THUMBNAIL_KEY_LEN) {
            Some((idx, _)) => &hash[..idx],
            None => hash,
        }
    }

    /// Asset file name for a content hash
    pub fn file_name_for(hash: &str) -> String {
        format!("{}.{}", Self::key(hash), THUMBNAIL_EXT)
    }

    /// Asset path for a content hash; no I/O
    pub fn path_for(&self, hash: &str) -> PathBuf {
        self.dir.join(Self::file_name_for(hash))
    }

    /// Resolve a stored reference against the cache directory
    pub fn resolve(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.path_for(hash).is_file()
    }

    /// Return the asset for `hash`, rendering it from `source` on a miss
    pub fn get_or_create(&self, source: &Path, hash: &str) -> Result<Thumbnail, RenditionError> {
        let file_name = Self::file_name_for(hash);
        let path = self.dir.join(&file_name);

        if path.is_file() {
            log::debug!("Thumbnail hit {} for {:?}", file_name, source);
            return Ok(Thumbnail {
                file_name,
                path,
                generated: false,
            });
        }

        self.render(source, &path)?;
        log::debug!("Generated thumbnail {} for {:?}", file_name, source);
        Ok(Thumbnail {
            file_name,
            path,
            generated: true,
        })
    }

    /// Decode, downscale, encode and atomically write one asset
    fn render(&self, source: &Path, target: &Path) -> Result<(), RenditionError> {
        let io_err = |e: std::io::Error| RenditionError::Io {
            path: source.to_path_buf(),
            source: e,
        };

        let image = ImageReader::open(source)
            .map_err(io_err)?
            .with_guessed_format()
            .map_err(io_err)?
            .decode()
            .map_err(|e| RenditionError::Decode {
                path: source.to_path_buf(),
                source: e,
            })?;

        // Never upscale; thumbnail() keeps the aspect ratio.
        let image = if image.width() > self.max_edge || image.height() > self.max_edge {
            image.thumbnail(self.max_edge, self.max_edge)
        } else {
            image
        };
        let rgb = image.to_rgb8();

        // Write next to the target and rename, so readers never see a partial file
        // and concurrent writers of the same key are harmless.
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, self.quality);
            encoder
                .encode_image(&rgb)
                .map_err(|e| RenditionError::Encode {
                    path: source.to_path_buf(),
                    source: e,
                })?;
            writer.flush().map_err(io_err)?;
        }
        tmp.persist(target).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    /// Number of assets currently on disk
    pub fn asset_count(&self) -> std::io::Result<usize> {
        let mut count = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(THUMBNAIL_EXT) {
                count += 1;
            }
        }
        Ok(count)
    }
}
