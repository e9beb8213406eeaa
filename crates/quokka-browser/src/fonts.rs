//! Font metrics and glyph rasterisation backed by fontdue.
//!
//! [§ 10.8 Line height calculations](https://www.w3.org/TR/CSS2/visudet.html#line-height)
//!
//! "CSS assumes that every font has font metrics that specify a
//! characteristic height above the baseline and a depth below it."
//!
//! System fonts are loaded once per process. Line metrics are cached per
//! (size, weight, slant) for the life of the process.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use fontdue::{Font, FontSettings, Metrics};
use quokka_css::layout::{FontSlant, FontWeight};
use quokka_css::{ApproximateFontMetrics, FontKey, FontMetrics};

/// Common system font paths to search for a default (regular) font.
const FONT_SEARCH_PATHS: &[&str] = &[
    // macOS
    "/System/Library/Fonts/Helvetica.ttc",
    "/System/Library/Fonts/SFNS.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    // Linux
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSans.ttf",
    // Windows
    "C:\\Windows\\Fonts\\arial.ttf",
    "C:\\Windows\\Fonts\\segoeui.ttf",
];

/// System font paths for bold variants.
const FONT_BOLD_SEARCH_PATHS: &[&str] = &[
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSansBold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

/// System font paths for italic variants.
const FONT_ITALIC_SEARCH_PATHS: &[&str] = &[
    "/System/Library/Fonts/Supplemental/Arial Italic.ttf",
    "/Library/Fonts/Arial Italic.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Oblique.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Oblique.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Italic.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSansOblique.ttf",
    "C:\\Windows\\Fonts\\ariali.ttf",
];

/// System font paths for bold-italic variants.
const FONT_BOLD_ITALIC_SEARCH_PATHS: &[&str] = &[
    "/System/Library/Fonts/Supplemental/Arial Bold Italic.ttf",
    "/Library/Fonts/Arial Bold Italic.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-BoldOblique.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-BoldOblique.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-BoldItalic.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSansBoldOblique.ttf",
    "C:\\Windows\\Fonts\\arialbi.ttf",
];

/// The faces found on this machine. Any of them may be missing.
struct FontSet {
    regular: Option<Font>,
    bold: Option<Font>,
    italic: Option<Font>,
    bold_italic: Option<Font>,
}

impl FontSet {
    fn load() -> Self {
        let set = Self {
            regular: load_font_from_paths(FONT_SEARCH_PATHS, "regular"),
            bold: load_font_from_paths(FONT_BOLD_SEARCH_PATHS, "bold"),
            italic: load_font_from_paths(FONT_ITALIC_SEARCH_PATHS, "italic"),
            bold_italic: load_font_from_paths(FONT_BOLD_ITALIC_SEARCH_PATHS, "bold-italic"),
        };
        if set.regular.is_none() {
            log::warn!(
                "no system font found, text will not be rendered (searched {} paths)",
                FONT_SEARCH_PATHS.len()
            );
        }
        set
    }

    /// Select the best available face, falling back through: exact match,
    /// partial match, regular.
    fn select(&self, weight: FontWeight, slant: FontSlant) -> Option<&Font> {
        let is_bold = weight == FontWeight::Bold;
        let is_italic = slant == FontSlant::Italic;
        match (is_bold, is_italic) {
            (true, true) => self
                .bold_italic
                .as_ref()
                .or(self.bold.as_ref())
                .or(self.regular.as_ref()),
            (true, false) => self.bold.as_ref().or(self.regular.as_ref()),
            (false, true) => self.italic.as_ref().or(self.regular.as_ref()),
            (false, false) => self.regular.as_ref(),
        }
    }
}

/// Try to load a font from a list of filesystem paths.
fn load_font_from_paths(paths: &[&str], label: &str) -> Option<Font> {
    for path in paths {
        let Ok(data) = std::fs::read(path) else {
            continue;
        };
        if let Ok(font) = Font::from_bytes(data, FontSettings::default()) {
            log::debug!("loaded {label} font: {path}");
            return Some(font);
        }
    }
    None
}

fn system_fonts() -> &'static FontSet {
    static FONTS: OnceLock<FontSet> = OnceLock::new();
    FONTS.get_or_init(FontSet::load)
}

type CacheKey = (u32, FontWeight, FontSlant);

/// Ascent and descent, both positive.
#[derive(Debug, Clone, Copy)]
struct LineMetrics {
    ascent: f32,
    descent: f32,
}

fn line_metrics_cache() -> &'static Mutex<HashMap<CacheKey, LineMetrics>> {
    static CACHE: OnceLock<Mutex<HashMap<CacheKey, LineMetrics>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Font metrics from the system fonts, falling back to
/// [`ApproximateFontMetrics`] when no font is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemFontMetrics;

impl SystemFontMetrics {
    /// Whether a real font backs the metrics.
    #[must_use]
    pub fn has_system_font() -> bool {
        system_fonts().regular.is_some()
    }

    fn line_metrics(font: &FontKey) -> LineMetrics {
        let key = font.cache_key();
        let mut cache = line_metrics_cache()
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *cache.entry(key).or_insert_with(|| {
            let measured = system_fonts()
                .select(font.weight, font.slant)
                .and_then(|face| face.horizontal_line_metrics(font.size));
            measured.map_or_else(
                || LineMetrics {
                    ascent: ApproximateFontMetrics.ascent(font),
                    descent: ApproximateFontMetrics.descent(font),
                },
                |m| LineMetrics {
                    ascent: m.ascent,
                    descent: -m.descent,
                },
            )
        })
    }
}

impl FontMetrics for SystemFontMetrics {
    fn measure(&self, font: &FontKey, text: &str) -> f32 {
        let Some(face) = system_fonts().select(font.weight, font.slant) else {
            return ApproximateFontMetrics.measure(font, text);
        };
        // Font::metrics avoids generating bitmaps when only the advance is
        // needed.
        text.chars()
            .filter(|ch| !ch.is_control())
            .map(|ch| face.metrics(ch, font.size).advance_width)
            .sum()
    }

    fn ascent(&self, font: &FontKey) -> f32 {
        Self::line_metrics(font).ascent
    }

    fn descent(&self, font: &FontKey) -> f32 {
        Self::line_metrics(font).descent
    }
}

/// A rasterised glyph: coverage bitmap plus placement metrics.
pub struct Glyph {
    /// Placement and advance.
    pub metrics: Metrics,
    /// One coverage byte per pixel, row-major.
    pub coverage: Vec<u8>,
}

/// Rasterise `ch` in `font`. `None` if no system font is installed.
#[must_use]
pub fn rasterize_glyph(font: &FontKey, ch: char) -> Option<Glyph> {
    let face = system_fonts().select(font.weight, font.slant)?;
    let (metrics, coverage) = face.rasterize(ch, font.size);
    Some(Glyph { metrics, coverage })
}

/// Ascent of `font` as the rasteriser sees it, used to place the baseline.
#[must_use]
pub fn baseline_offset(font: &FontKey) -> f32 {
    SystemFontMetrics.ascent(font)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_are_positive_and_cached() {
        let font = FontKey::with_size(12.0);
        let metrics = SystemFontMetrics;
        let ascent = metrics.ascent(&font);
        assert!(ascent > 0.0);
        assert!(metrics.descent(&font) >= 0.0);
        assert_eq!(metrics.ascent(&font), ascent);
        let cache = line_metrics_cache().lock().unwrap();
        assert!(cache.contains_key(&font.cache_key()));
    }

    #[test]
    fn test_measure_grows_with_text() {
        let font = FontKey::with_size(12.0);
        let metrics = SystemFontMetrics;
        assert_eq!(metrics.measure(&font, ""), 0.0);
        assert!(metrics.measure(&font, "hello") < metrics.measure(&font, "hello world"));
    }
}
