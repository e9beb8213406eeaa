//! Fonts as layout sees them: a key describing the face and size, and a
//! metrics provider that measures text in that face.

use quokka_dom::{DirtyGraph, DomTree, FieldId, NodeId, Property};

use crate::geometry::parse_px;

/// Font size used when `font-size` cannot be parsed.
const FALLBACK_FONT_SIZE_PX: f32 = 16.0;

/// [CSS Fonts § 2.2 font-weight](https://www.w3.org/TR/css-fonts-4/#font-weight-prop)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontWeight {
    /// 400 and below.
    Normal,
    /// `bold`, `bolder` and 600 and above.
    Bold,
}

impl FontWeight {
    /// Map a computed `font-weight` value.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "bold" | "bolder" => Self::Bold,
            other => match other.parse::<u32>() {
                Ok(n) if n >= 600 => Self::Bold,
                _ => Self::Normal,
            },
        }
    }
}

/// [CSS Fonts § 2.4 font-style](https://www.w3.org/TR/css-fonts-4/#font-style-prop)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontSlant {
    /// Upright.
    Normal,
    /// `italic` or `oblique`.
    Italic,
}

impl FontSlant {
    /// Map a computed `font-style` value.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "italic" | "oblique" => Self::Italic,
            _ => Self::Normal,
        }
    }
}

/// Everything needed to pick and size a face.
#[derive(Debug, Clone, PartialEq)]
pub struct FontKey {
    /// `font-family`, possibly empty.
    pub family: String,
    /// Size in device pixels, zoom applied.
    pub size: f32,
    /// Weight class.
    pub weight: FontWeight,
    /// Slant.
    pub slant: FontSlant,
}

impl FontKey {
    /// A font of `size` with default family, weight and slant.
    #[must_use]
    pub fn with_size(size: f32) -> Self {
        Self {
            family: String::new(),
            size,
            weight: FontWeight::Normal,
            slant: FontSlant::Normal,
        }
    }

    /// Hashable identity for process-wide caches: size, weight and slant.
    #[must_use]
    pub fn cache_key(&self) -> (u32, FontWeight, FontSlant) {
        (self.size.to_bits(), self.weight, self.slant)
    }
}

impl Default for FontKey {
    fn default() -> Self {
        Self::with_size(FALLBACK_FONT_SIZE_PX * 0.75)
    }
}

/// Text measurement.
///
/// Ascent and descent are distances from the baseline and are both
/// positive.
pub trait FontMetrics {
    /// Advance width of `text`.
    fn measure(&self, font: &FontKey, text: &str) -> f32;

    /// Height above the baseline.
    fn ascent(&self, font: &FontKey) -> f32;

    /// Depth below the baseline.
    fn descent(&self, font: &FontKey) -> f32;

    /// Distance between consecutive baselines.
    fn linespace(&self, font: &FontKey) -> f32 {
        self.ascent(font) + self.descent(font)
    }
}

/// Approximate font metrics using fixed ratios.
///
/// [§ 10.8 Line height calculations](https://www.w3.org/TR/CSS2/visudet.html#line-height)
///
/// "CSS assumes that every font has font metrics that specify a
/// characteristic height above the baseline and a depth below it."
///
/// Without font data, every glyph advances 0.6 of the font size, ascent is
/// 0.9 and descent 0.3. Deterministic, so layout tests do not depend on the
/// fonts installed on the machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproximateFontMetrics;

impl FontMetrics for ApproximateFontMetrics {
    fn measure(&self, font: &FontKey, text: &str) -> f32 {
        const CHAR_WIDTH_RATIO: f32 = 0.6;
        text.chars().count() as f32 * font.size * CHAR_WIDTH_RATIO
    }

    fn ascent(&self, font: &FontKey) -> f32 {
        font.size * 0.9
    }

    fn descent(&self, font: &FontKey) -> f32 {
        font.size * 0.3
    }
}

/// Resolve the font for `node` from its computed style, recording `notify`
/// as a dependent of each font property read.
///
/// The CSS pixel size is converted to points (×0.75) and scaled by `zoom`.
pub fn font_for(
    dom: &DomTree,
    graph: &mut DirtyGraph,
    node: NodeId,
    zoom: f32,
    notify: FieldId,
) -> FontKey {
    let Some(style) = dom.get(node).and_then(|n| n.style.as_ref()) else {
        return FontKey::with_size(FALLBACK_FONT_SIZE_PX * 0.75 * zoom);
    };
    let weight = FontWeight::parse(style.read(graph, Property::FontWeight, notify));
    let slant = FontSlant::parse(style.read(graph, Property::FontStyle, notify));
    let size_px = parse_px(style.read(graph, Property::FontSize, notify)).unwrap_or(FALLBACK_FONT_SIZE_PX);
    let family = style.read(graph, Property::FontFamily, notify).to_string();
    FontKey {
        family,
        size: size_px * 0.75 * zoom,
        weight,
        slant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_and_slant_parsing() {
        assert_eq!(FontWeight::parse("bold"), FontWeight::Bold);
        assert_eq!(FontWeight::parse("700"), FontWeight::Bold);
        assert_eq!(FontWeight::parse("normal"), FontWeight::Normal);
        assert_eq!(FontSlant::parse("italic"), FontSlant::Italic);
    }

    #[test]
    fn test_approximate_metrics() {
        let font = FontKey::with_size(10.0);
        let metrics = ApproximateFontMetrics;
        assert!((metrics.measure(&font, "abcd") - 24.0).abs() < 1e-4);
        assert!((metrics.linespace(&font) - 12.0).abs() < 1e-4);
    }
}
