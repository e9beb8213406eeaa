//! CSS parsing, style resolution, incremental layout and painting for the
//! Quokka browser.
//!
//! # Scope
//!
//! This crate implements:
//! - **CSS Parser** ([§ 5 Parsing](https://www.w3.org/TR/css-syntax-3/#parsing))
//!   - Style rules with a small selector grammar, `@media (prefers-color-scheme)`
//!   - Declaration blocks with error recovery
//!
//! - **CSS Selectors** ([Selectors Level 4](https://www.w3.org/TR/selectors-4/))
//!   - Tag, class, descendant and `:focus` selectors
//!   - Cascade priority
//!
//! - **Style resolver** ([CSS Cascading Level 4](https://www.w3.org/TR/css-cascade-4/))
//!   - Cascade, inheritance, inline `style` attributes
//!   - Percentage font sizes
//!   - `transition` seeding numeric animations
//!
//! - **Layout** ([CSS 2.1 § 9](https://www.w3.org/TR/CSS2/visuren.html))
//!   - Block and inline formatting, line breaking, replaced elements
//!   - Incremental: every geometric value is a dirty-tracked field
//!
//! - **Paint** ([CSS 2.1 Appendix E](https://www.w3.org/TR/CSS2/zindex.html))
//!   - A display list of draw commands wrapped in blend and transform effects
//!
//! # Not Yet Implemented
//!
//! - Box model edges (margin, border, padding)
//! - Positioned, floated, flex and grid layout
//! - Transforms other than `translate`

/// Style resolution per [CSS Cascading Level 4](https://www.w3.org/TR/css-cascade-4/).
pub mod cascade;
/// Colours per [CSS Color Level 4](https://www.w3.org/TR/css-color-4/).
pub mod color;
/// Rectangles and unit conversion.
pub mod geometry;
/// Incremental layout per [CSS 2.1 § 9](https://www.w3.org/TR/CSS2/visuren.html).
pub mod layout;
/// Display list and painting per [CSS 2.1 Appendix E](https://www.w3.org/TR/CSS2/zindex.html).
pub mod paint;
/// CSS parser per [§ 5 Parsing](https://www.w3.org/TR/css-syntax-3/#parsing).
pub mod parser;
/// Selector matching per [Selectors Level 4](https://www.w3.org/TR/selectors-4/).
pub mod selector;
/// User-agent stylesheet per [WHATWG HTML § 15 Rendering](https://html.spec.whatwg.org/multipage/rendering.html).
pub mod ua_stylesheet;

// Re-exports for convenience
pub use cascade::{REFRESH_RATE_SEC, StyleOutcome, StyleResolver, parse_transition};
pub use color::Color;
pub use geometry::{Rect, dpx, parse_px, parse_transform};
pub use layout::{
    ApproximateFontMetrics, EmbedHost, FontKey, FontMetrics, LayoutContext, LayoutKind, LayoutNode,
    LayoutTree, NullEmbedHost,
};
pub use paint::{
    BlendMode, BlendOp, DisplayItem, DrawCommand, DrawKind, EffectKey, EffectKind, Painter,
    VisualEffect, blend_op_for,
};
pub use parser::{
    Declarations, Media, Rule, parse_declarations, parse_selector, parse_stylesheet, sort_rules,
};
pub use selector::Selector;

use quokka_dom::{DomTree, ElementData, NodeType};

/// [§ 6.1 Cascade Sorting Order](https://www.w3.org/TR/css-cascade-4/#cascade-sort)
///
/// "Declarations from style sheets independently linked by the originating
/// document are treated as if they were concatenated in linking order."
///
/// Where a document stylesheet comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StylesheetSource {
    /// External stylesheet from `<link rel="stylesheet">`.
    ///
    /// [§ 4.2.4 The link element](https://html.spec.whatwg.org/multipage/semantics.html#the-link-element)
    External {
        /// The unresolved href.
        href: String,
    },
    /// Inline stylesheet from a `<style>` element.
    ///
    /// [§ 4.2.6 The style element](https://html.spec.whatwg.org/multipage/semantics.html#the-style-element)
    Inline {
        /// The element's text.
        css: String,
    },
}

/// [§ 4.2.4 The link element](https://html.spec.whatwg.org/multipage/semantics.html#the-link-element)
/// [§ 4.2.6 The style element](https://html.spec.whatwg.org/multipage/semantics.html#the-style-element)
///
/// Every stylesheet the document references, in document order.
#[must_use]
pub fn collect_stylesheet_sources(tree: &DomTree) -> Vec<StylesheetSource> {
    let mut sources = Vec::new();
    for id in tree.descendants(tree.root()) {
        let Some(NodeType::Element(data)) = tree.get(id).map(|n| &n.node_type) else {
            continue;
        };
        if data.tag_name == "link" {
            // STEP 1: Only stylesheet links.
            if !is_stylesheet_link(data) {
                continue;
            }
            // STEP 2: "The href attribute gives the address (a valid non-empty
            // URL potentially surrounded by spaces) of the linked resource."
            if let Some(href) = data.attr("href").map(str::trim) {
                if !href.is_empty() {
                    sources.push(StylesheetSource::External {
                        href: href.to_string(),
                    });
                }
            }
        } else if data.tag_name == "style" {
            sources.push(StylesheetSource::Inline {
                css: tree.text_content(id),
            });
        }
    }
    sources
}

/// [§ 2.4.7 Space-separated tokens](https://html.spec.whatwg.org/multipage/common-microsyntaxes.html#space-separated-tokens)
///
/// "If the rel attribute's value contains the token stylesheet, then the
/// link is a stylesheet link." Token comparison is ASCII case-insensitive.
fn is_stylesheet_link(data: &ElementData) -> bool {
    data.attr("rel").is_some_and(|rel| {
        rel.split_ascii_whitespace()
            .any(|token| token.eq_ignore_ascii_case("stylesheet"))
    })
}
