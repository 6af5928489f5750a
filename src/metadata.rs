//! Image metadata extraction
//!
//! Dimensions and format come from the image header; the capture date comes
//! from EXIF `DateTimeOriginal`. Every field is best-effort: files the decoders
//! do not understand (most camera RAW formats, HEIC) yield `None`s.

use chrono::NaiveDateTime;
use exif::{In, Reader, Tag, Value};
use image::ImageReader;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// EXIF date format: "YYYY:MM:DD HH:MM:SS"
const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Metadata read once at index time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Upper-case decoder format name, e.g. "JPEG"
    pub format: Option<String>,
    pub date_taken: Option<NaiveDateTime>,
}

impl ImageMetadata {
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        }
    }
}

/// Extract metadata from an image file
pub fn extract_metadata(path: &Path) -> ImageMetadata {
    let mut metadata = ImageMetadata::default();

    if let Some((format, (w, h))) = read_header(path) {
        metadata.format = format;
        metadata.width = Some(w);
        metadata.height = Some(h);
    }

    metadata.date_taken = read_date_taken(path);
    metadata
}

/// Format and dimensions, only when the header actually decodes.
/// The reader falls back to the extension, so a format alone proves nothing.
fn read_header(path: &Path) -> Option<(Option<String>, (u32, u32))> {
    let reader = ImageReader::open(path).ok()?.with_guessed_format().ok()?;
    let format = reader
        .format()
        .map(|f| format!("{:?}", f).to_uppercase());
    let dimensions = reader.into_dimensions().ok()?;
    Some((format, dimensions))
}

fn read_date_taken(path: &Path) -> Option<NaiveDateTime> {
    let file = File::open(path).ok()?;
    let mut bufreader = BufReader::new(file);
    let exif = Reader::new().read_from_container(&mut bufreader).ok()?;
    let field = exif.get_field(Tag::DateTimeOriginal, In::PRIMARY)?;
    match field.value {
        Value::Ascii(ref vec) => vec
            .first()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .and_then(parse_exif_date),
        _ => None,
    }
}

/// Parse an EXIF timestamp, tolerating trailing NULs and whitespace
pub fn parse_exif_date(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim_end_matches('\0').trim();
    NaiveDateTime::parse_from_str(trimmed, EXIF_DATE_FORMAT).ok()
}
