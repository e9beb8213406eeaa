//! Display list - a tree of drawing commands
//!
//! [CSS 2.1 Appendix E](https://www.w3.org/TR/CSS2/zindex.html)
//!
//! The display list is the output of the painting phase. Leaves are draw
//! commands; interior nodes are visual effects (a blend or a translation)
//! that apply to everything beneath them. Items are in painting order,
//! back to front.

use std::sync::Arc;

use quokka_common::image::LoadedImage;
use quokka_dom::{NodeId, WindowId};

use crate::color::Color;
use crate::geometry::{Rect, map_translation};
use crate::layout::FontKey;

/// Identity of the DOM node that produced a visual effect.
///
/// Stable across repaints of the same document, so the compositor can
/// match a new blend op to the layer tree it already has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectKey {
    /// Frame the node lives in.
    pub window: WindowId,
    /// The node.
    pub node: NodeId,
}

/// [Compositing and Blending § 10 Porter-Duff compositing operators](https://www.w3.org/TR/compositing-1/#porterduffcompositingoperators)
/// and [§ 5.3 mix-blend-mode](https://www.w3.org/TR/compositing-1/#mix-blend-mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Normal painting.
    SourceOver,
    /// Keep the destination where the source is opaque. Used for clipping.
    DestinationIn,
    /// `multiply`
    Multiply,
    /// `difference`
    Difference,
    /// `screen`
    Screen,
}

impl BlendMode {
    /// Map a `mix-blend-mode` value. The empty string means unset.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "" => None,
            "multiply" => Some(Self::Multiply),
            "difference" => Some(Self::Difference),
            "screen" => Some(Self::Screen),
            "destination-in" => Some(Self::DestinationIn),
            _ => Some(Self::SourceOver),
        }
    }
}

/// Parameters of a blend effect: group opacity and blend mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendOp {
    /// Group opacity, 0 to 1.
    pub opacity: f32,
    /// Blend mode, `None` when unset.
    pub mode: Option<BlendMode>,
    /// Whether the children must be drawn into an offscreen layer: a mode
    /// is set or the group is translucent.
    pub should_save: bool,
}

impl BlendOp {
    /// A blend op. `should_save` is derived.
    #[must_use]
    pub fn new(opacity: f32, mode: Option<BlendMode>) -> Self {
        Self {
            opacity,
            mode,
            should_save: mode.is_some() || opacity < 1.0,
        }
    }

    /// The mode to composite with.
    #[must_use]
    pub fn mode_or_default(&self) -> BlendMode {
        self.mode.unwrap_or(BlendMode::SourceOver)
    }
}

/// [CSS Images § 7.2 image-rendering](https://www.w3.org/TR/css-images-3/#the-image-rendering)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageQuality {
    /// `crisp-edges`, `pixelated`: nearest neighbour.
    Low,
    /// `auto`: bilinear.
    Medium,
    /// `high-quality`: bicubic.
    High,
}

impl ImageQuality {
    /// Map an `image-rendering` value.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "high-quality" => Self::High,
            "crisp-edges" | "pixelated" => Self::Low,
            _ => Self::Medium,
        }
    }
}

/// What a draw command draws.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawKind {
    /// A straight line.
    Line {
        /// Start x.
        x1: f32,
        /// Start y.
        y1: f32,
        /// End x.
        x2: f32,
        /// End y.
        y2: f32,
        /// Stroke colour.
        color: Color,
        /// Stroke width.
        thickness: f32,
    },
    /// Fill the command's rect.
    Rect {
        /// Fill colour.
        color: Color,
    },
    /// Fill the command's rect with rounded corners.
    RRect {
        /// Corner radius.
        radius: f32,
        /// Fill colour.
        color: Color,
    },
    /// A run of text with its top-left corner at `(x, y)`.
    Text {
        /// Left edge.
        x: f32,
        /// Top edge.
        y: f32,
        /// The text.
        text: String,
        /// Face and size.
        font: FontKey,
        /// Fill colour.
        color: Color,
    },
    /// A decoded image scaled into the command's rect.
    Image {
        /// Pixels.
        image: Arc<LoadedImage>,
        /// Sampling quality.
        quality: ImageQuality,
    },
    /// Stroke the command's rect.
    Outline {
        /// Stroke colour.
        color: Color,
        /// Stroke width.
        thickness: f32,
    },
}

/// A leaf of the display list.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCommand {
    /// Bounds of everything the command touches.
    pub rect: Rect,
    /// What to draw.
    pub kind: DrawKind,
}

impl DrawCommand {
    /// A line from `(x1, y1)` to `(x2, y2)`. The bounds cover the stroke.
    #[must_use]
    pub fn line(x1: f32, y1: f32, x2: f32, y2: f32, color: Color, thickness: f32) -> Self {
        let half = thickness / 2.0;
        Self {
            rect: Rect::from_ltrb(
                x1.min(x2) - half,
                y1.min(y2) - half,
                x1.max(x2) + half,
                y1.max(y2) + half,
            ),
            kind: DrawKind::Line {
                x1,
                y1,
                x2,
                y2,
                color,
                thickness,
            },
        }
    }

    /// A filled rectangle.
    #[must_use]
    pub const fn rect(rect: Rect, color: Color) -> Self {
        Self {
            rect,
            kind: DrawKind::Rect { color },
        }
    }

    /// A filled rounded rectangle.
    #[must_use]
    pub const fn rrect(rect: Rect, radius: f32, color: Color) -> Self {
        Self {
            rect,
            kind: DrawKind::RRect { radius, color },
        }
    }

    /// An outline of `rect`.
    #[must_use]
    pub const fn outline(rect: Rect, color: Color, thickness: f32) -> Self {
        Self {
            rect,
            kind: DrawKind::Outline { color, thickness },
        }
    }
}

/// What a visual effect does to its children.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectKind {
    /// Composite the children as a group.
    Blend(BlendOp),
    /// Translate the children. `None` is the identity.
    Transform(Option<(f32, f32)>),
}

/// An interior node of the display list.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualEffect {
    /// The effect.
    pub kind: EffectKind,
    /// Bounds of the children after the effect.
    pub rect: Rect,
    /// The DOM node whose style produced the effect.
    pub node: Option<EffectKey>,
    /// Whether the effect (or one below it) changes only at composite
    /// time, so it must start its own layer.
    pub needs_compositing: bool,
    /// The commands the effect applies to.
    pub children: Vec<DisplayItem>,
}

impl VisualEffect {
    /// A blend over `children`.
    #[must_use]
    pub fn blend(op: BlendOp, node: Option<EffectKey>, children: Vec<DisplayItem>) -> Self {
        let rect = union_of(&children);
        let needs_compositing = op.should_save || children.iter().any(DisplayItem::needs_compositing);
        Self {
            kind: EffectKind::Blend(op),
            rect,
            node,
            needs_compositing,
            children,
        }
    }

    /// A translation of `children`.
    #[must_use]
    pub fn transform(
        translation: Option<(f32, f32)>,
        node: Option<EffectKey>,
        children: Vec<DisplayItem>,
    ) -> Self {
        let rect = map_translation(&union_of(&children), translation);
        let needs_compositing =
            translation.is_some() || children.iter().any(DisplayItem::needs_compositing);
        Self {
            kind: EffectKind::Transform(translation),
            rect,
            node,
            needs_compositing,
            children,
        }
    }

    /// The same effect with different children.
    #[must_use]
    pub fn with_children(&self, children: Vec<DisplayItem>) -> Self {
        match self.kind {
            EffectKind::Blend(op) => Self::blend(op, self.node, children),
            EffectKind::Transform(translation) => Self::transform(translation, self.node, children),
        }
    }

    /// Map a rectangle in the children's space to the effect's parent space.
    #[must_use]
    pub fn map(&self, rect: &Rect) -> Rect {
        match self.kind {
            EffectKind::Transform(translation) => map_translation(rect, translation),
            EffectKind::Blend(_) => *rect,
        }
    }

    /// Map a rectangle in the parent's space into the children's space.
    #[must_use]
    pub fn unmap(&self, rect: &Rect) -> Rect {
        match self.kind {
            EffectKind::Transform(Some((dx, dy))) => rect.offset(-dx, -dy),
            _ => *rect,
        }
    }
}

/// One entry in a display list.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayItem {
    /// A draw command.
    Draw(DrawCommand),
    /// A visual effect wrapping more items.
    Effect(VisualEffect),
}

impl DisplayItem {
    /// Bounds of the item.
    #[must_use]
    pub const fn rect(&self) -> Rect {
        match self {
            Self::Draw(cmd) => cmd.rect,
            Self::Effect(effect) => effect.rect,
        }
    }

    /// Whether the item must start its own compositor layer.
    #[must_use]
    pub const fn needs_compositing(&self) -> bool {
        match self {
            Self::Draw(_) => false,
            Self::Effect(effect) => effect.needs_compositing,
        }
    }

    /// Number of draw commands in the subtree.
    #[must_use]
    pub fn draw_count(&self) -> usize {
        match self {
            Self::Draw(_) => 1,
            Self::Effect(effect) => effect.children.iter().map(Self::draw_count).sum(),
        }
    }

    /// Visit every visual effect in the subtree, pre-order.
    pub fn for_each_effect<'a>(&'a self, f: &mut impl FnMut(&'a VisualEffect)) {
        if let Self::Effect(effect) = self {
            f(effect);
            for child in &effect.children {
                child.for_each_effect(f);
            }
        }
    }
}

impl From<DrawCommand> for DisplayItem {
    fn from(cmd: DrawCommand) -> Self {
        Self::Draw(cmd)
    }
}

impl From<VisualEffect> for DisplayItem {
    fn from(effect: VisualEffect) -> Self {
        Self::Effect(effect)
    }
}

/// Union of the bounds of `items`.
#[must_use]
pub fn union_of(items: &[DisplayItem]) -> Rect {
    items
        .iter()
        .fold(Rect::EMPTY, |acc, item| acc.union(&item.rect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f32) -> DisplayItem {
        DrawCommand::rect(Rect::from_xywh(x, 0.0, 10.0, 10.0), Color::BLACK).into()
    }

    #[test]
    fn test_blend_bounds_and_compositing() {
        let opaque = VisualEffect::blend(BlendOp::new(1.0, None), None, vec![square(0.0), square(20.0)]);
        assert_eq!(opaque.rect, Rect::from_ltrb(0.0, 0.0, 30.0, 10.0));
        assert!(!opaque.needs_compositing);

        let faded = VisualEffect::blend(BlendOp::new(0.5, None), None, vec![square(0.0)]);
        assert!(faded.needs_compositing);
        let outer = VisualEffect::transform(None, None, vec![faded.into()]);
        assert!(outer.needs_compositing);
    }

    #[test]
    fn test_transform_maps_bounds() {
        let moved = VisualEffect::transform(Some((5.0, 7.0)), None, vec![square(0.0)]);
        assert_eq!(moved.rect, Rect::from_ltrb(5.0, 7.0, 15.0, 17.0));
        assert_eq!(moved.unmap(&moved.rect), Rect::from_ltrb(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_vertical_line_has_area() {
        let line = DrawCommand::line(5.0, 0.0, 5.0, 10.0, Color::RED, 1.0);
        assert!(!line.rect.is_empty());
    }

    #[test]
    fn test_blend_mode_parse() {
        assert_eq!(BlendMode::parse(""), None);
        assert_eq!(BlendMode::parse("multiply"), Some(BlendMode::Multiply));
        assert!(BlendOp::new(1.0, Some(BlendMode::SourceOver)).should_save);
        assert!(!BlendOp::new(1.0, None).should_save);
    }
}
