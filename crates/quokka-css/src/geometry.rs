//! Rectangles, translations and device-pixel helpers.
//!
//! Rectangles are stored as edges (left, top, right, bottom) rather than
//! origin plus size: every bounds computation in the pipeline is a union or
//! an intersection, and those are edge operations.

use serde::Serialize;

/// An axis-aligned rectangle in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Rect {
    /// Left edge.
    pub left: f32,
    /// Top edge.
    pub top: f32,
    /// Right edge.
    pub right: f32,
    /// Bottom edge.
    pub bottom: f32,
}

impl Rect {
    /// The empty rectangle at the origin. Union with it is the identity.
    pub const EMPTY: Self = Self {
        left: 0.0,
        top: 0.0,
        right: 0.0,
        bottom: 0.0,
    };

    /// A rectangle from its four edges.
    #[must_use]
    pub const fn from_ltrb(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// A rectangle from its origin and size.
    #[must_use]
    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::from_ltrb(x, y, x + width, y + height)
    }

    /// Horizontal extent.
    #[must_use]
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    /// Vertical extent.
    #[must_use]
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Whether the rectangle encloses no area.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !(self.left < self.right && self.top < self.bottom)
    }

    /// Smallest rectangle containing both. Empty operands are ignored.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        if other.is_empty() {
            return *self;
        }
        if self.is_empty() {
            return *other;
        }
        Self::from_ltrb(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    /// Grow `self` in place to contain `other`.
    pub fn join(&mut self, other: &Self) {
        *self = self.union(other);
    }

    /// Whether the two rectangles share any area.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    /// The overlapping area, or `None` when the rectangles are disjoint.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        if !self.intersects(other) {
            return None;
        }
        Some(Self::from_ltrb(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        ))
    }

    /// Whether the point lies inside. Left and top edges are inclusive.
    #[must_use]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    /// The rectangle moved by `(dx, dy)`.
    #[must_use]
    pub fn offset(&self, dx: f32, dy: f32) -> Self {
        Self::from_ltrb(self.left + dx, self.top + dy, self.right + dx, self.bottom + dy)
    }

    /// The rectangle grown by `amount` on every side.
    #[must_use]
    pub fn outset(&self, amount: f32) -> Self {
        Self::from_ltrb(
            self.left - amount,
            self.top - amount,
            self.right + amount,
            self.bottom + amount,
        )
    }

    /// The smallest rectangle with integer edges that contains this one.
    #[must_use]
    pub fn round_out(&self) -> Self {
        Self::from_ltrb(
            self.left.floor(),
            self.top.floor(),
            self.right.ceil(),
            self.bottom.ceil(),
        )
    }
}

/// Convert CSS pixels to device pixels at `zoom`.
#[must_use]
pub fn dpx(css_px: f32, zoom: f32) -> f32 {
    css_px * zoom
}

/// Parse a `<length>` in pixels (`"12px"`, `"12.5px"`). Bare numbers are
/// accepted as pixels.
#[must_use]
pub fn parse_px(value: &str) -> Option<f32> {
    let value = value.trim();
    let number = value.strip_suffix("px").unwrap_or(value);
    number.trim().parse().ok()
}

/// [CSS Transforms § 13.1 2D Transform Functions](https://www.w3.org/TR/css-transforms-1/#two-d-transform-functions)
///
/// Only `translate(<tx>, <ty>)` is understood. Anything else (including
/// `none`) yields `None`.
#[must_use]
pub fn parse_transform(value: &str) -> Option<(f32, f32)> {
    let inner = value.trim().strip_prefix("translate(")?.strip_suffix(')')?;
    let (x, y) = inner.split_once(',')?;
    Some((parse_px(x)?, parse_px(y)?))
}

/// Map a rectangle through an optional translation.
#[must_use]
pub fn map_translation(rect: &Rect, translation: Option<(f32, f32)>) -> Rect {
    match translation {
        Some((dx, dy)) => rect.offset(dx, dy),
        None => *rect,
    }
}
