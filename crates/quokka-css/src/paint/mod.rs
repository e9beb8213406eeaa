//! CSS Painting
//!
//! [CSS 2.1 Appendix E - Elaborate description of Stacking Contexts](https://www.w3.org/TR/CSS2/zindex.html)
//!
//! This module implements the painting phase, which converts a layout tree into
//! a display list. The display list is a tree: leaves are drawing commands,
//! interior nodes are the visual effects (blends and translations) that style
//! applies to a subtree.
//!
//! # Architecture
//!
//! ```text
//! Style → Layout → Paint → Composite
//!                    ↓
//!              Vec<DisplayItem>
//! ```
//!
//! Each visual effect remembers the DOM node it came from, so a later change
//! to only `opacity` can be applied by the compositor without painting again.

mod display_list;
mod painter;

pub use display_list::{
    BlendMode, BlendOp, DisplayItem, DrawCommand, DrawKind, EffectKey, EffectKind, ImageQuality,
    VisualEffect, union_of,
};
pub use painter::{Painter, blend_op_for, parse_outline};
