//! Categorizer: ordered predicate → label rules, first match wins

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Built-in category labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Screenshot,
    Wallpaper,
    Photo,
    Social,
    Icon,
    Graphic,
    Image,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Screenshot => "screenshot",
            Category::Wallpaper => "wallpaper",
            Category::Photo => "photo",
            Category::Social => "social",
            Category::Icon => "icon",
            Category::Graphic => "graphic",
            Category::Image => "image",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the rules look at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageTraits {
    /// Lowercased file name
    pub file_name: String,
    /// Lowercased extension without the dot
    pub extension: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub has_capture_date: bool,
}

impl ImageTraits {
    pub fn new(path: &Path, width: Option<u32>, height: Option<u32>, has_capture_date: bool) -> Self {
        let lower = |s: Option<&std::ffi::OsStr>| {
            s.and_then(|s| s.to_str())
                .map(str::to_lowercase)
                .unwrap_or_default()
        };
        Self {
            file_name: lower(path.file_name()),
            extension: lower(path.extension()),
            width,
            height,
            has_capture_date,
        }
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }

    fn aspect_ratio(&self) -> Option<f64> {
        self.dimensions().map(|(w, h)| w as f64 / h as f64)
    }

    fn name_contains_any(&self, patterns: &[&str]) -> bool {
        patterns.iter().any(|p| self.file_name.contains(p))
    }
}

/// One categorization rule
pub struct Rule {
    pub name: &'static str,
    pub category: Category,
    pub matches: fn(&ImageTraits) -> bool,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("category", &self.category)
            .finish()
    }
}

const SCREENSHOT_PATTERNS: &[&str] = &[
    "screenshot",
    "screen shot",
    "screen_shot",
    "scr_",
    "capture",
    "screen capture",
    "shot_",
    "snap_",
];

const WALLPAPER_PATTERNS: &[&str] = &["wallpaper", "background", "bg_", "desktop"];

const GRAPHIC_PATTERNS: &[&str] = &["logo", "icon", "badge"];

/// Common display resolutions (width x height)
const SCREEN_RESOLUTIONS: &[(u32, u32)] = &[
    // 16:9
    (1920, 1080),
    (2560, 1440),
    (3840, 2160),
    // 16:10
    (1920, 1200),
    (2560, 1600),
    (1440, 900),
    (1680, 1050),
    // Retina
    (2880, 1800),
    (3456, 2234),
    // Laptops
    (1366, 768),
    (1280, 720),
];

/// Allowed deviation from a screen resolution (status bars, window chrome)
const SCREEN_TOLERANCE: u32 = 50;

fn screenshot_name(t: &ImageTraits) -> bool {
    t.name_contains_any(SCREENSHOT_PATTERNS)
}

fn screen_resolution(t: &ImageTraits) -> bool {
    t.dimensions().is_some_and(|(w, h)| {
        SCREEN_RESOLUTIONS
            .iter()
            .any(|&(sw, sh)| w.abs_diff(sw) < SCREEN_TOLERANCE && h.abs_diff(sh) < SCREEN_TOLERANCE)
    })
}

fn wallpaper_name(t: &ImageTraits) -> bool {
    t.name_contains_any(WALLPAPER_PATTERNS)
}

fn wide_high_res(t: &ImageTraits) -> bool {
    matches!((t.dimensions(), t.aspect_ratio()), (Some((w, _)), Some(r)) if w >= 2560 && r > 1.7 && r < 2.4)
}

fn has_capture_date(t: &ImageTraits) -> bool {
    t.has_capture_date
}

fn near_square(t: &ImageTraits) -> bool {
    matches!((t.dimensions(), t.aspect_ratio()), (Some((w, _)), Some(r)) if w >= 400 && r > 0.95 && r < 1.05)
}

fn small_square(t: &ImageTraits) -> bool {
    t.dimensions()
        .is_some_and(|(w, h)| w == h && w <= 512)
}

fn graphic_asset(t: &ImageTraits) -> bool {
    matches!(t.extension.as_str(), "png" | "gif" | "svg") && t.name_contains_any(GRAPHIC_PATTERNS)
}

/// The default rule table, in evaluation order
pub const DEFAULT_RULES: &[Rule] = &[
    Rule { name: "screenshot-name", category: Category::Screenshot, matches: screenshot_name },
    Rule { name: "screen-resolution", category: Category::Screenshot, matches: screen_resolution },
    Rule { name: "wallpaper-name", category: Category::Wallpaper, matches: wallpaper_name },
    Rule { name: "wide-high-res", category: Category::Wallpaper, matches: wide_high_res },
    Rule { name: "capture-date", category: Category::Photo, matches: has_capture_date },
    Rule { name: "near-square", category: Category::Social, matches: near_square },
    Rule { name: "small-square", category: Category::Icon, matches: small_square },
    Rule { name: "graphic-asset", category: Category::Graphic, matches: graphic_asset },
];

/// Evaluates a rule table; falls back to [`Category::Image`]
#[derive(Debug, Clone, Copy)]
pub struct Categorizer {
    rules: &'static [Rule],
}

impl Default for Categorizer {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES,
        }
    }
}

impl Categorizer {
    pub fn with_rules(rules: &'static [Rule]) -> Self {
        Self { rules }
    }

    /// Category of the first matching rule
    pub fn categorize(&self, traits: &ImageTraits) -> Category {
        self.rules
            .iter()
            .find(|rule| (rule.matches)(traits))
            .map(|rule| rule.category)
            .unwrap_or(Category::Image)
    }
}
