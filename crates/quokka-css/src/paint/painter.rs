//! Painter - generates a display list from a layout tree
//!
//! [CSS 2.1 Appendix E.2 Painting order](https://www.w3.org/TR/CSS2/zindex.html#painting-order)
//!
//! The painter walks the layout tree in pre-order. Each node contributes
//! its own draw commands, then its descendants' commands, and finally wraps
//! the lot in the visual effects its style asks for.

use quokka_common::image::LoadedImage;
use quokka_dom::{DirtyGraph, DomTree, LayoutId, NodeId, Property, WindowId};

use super::display_list::{
    BlendMode, BlendOp, DisplayItem, DrawCommand, DrawKind, EffectKey, ImageQuality, VisualEffect,
};
use crate::color::Color;
use crate::geometry::{Rect, dpx, parse_px, parse_transform};
use crate::layout::{EmbedHost, FontMetrics, LayoutKind, LayoutNode, LayoutTree};

/// Width of the text cursor, in device pixels.
const CURSOR_THICKNESS: f32 = 1.0;

/// Read a computed value for `node`, falling back to the initial value for
/// nodes that were never styled.
fn style_value<'a>(dom: &'a DomTree, graph: &DirtyGraph, node: NodeId, property: Property) -> &'a str {
    dom.get(node)
        .and_then(|n| n.style.as_ref())
        .map_or_else(|| property.initial_value(false), |style| style.get(graph, property))
}

/// The blend a node's style asks for: `opacity` and `mix-blend-mode`.
///
/// [CSS Overflow § 3](https://www.w3.org/TR/css-overflow-3/#overflow-properties)
///
/// `overflow: clip` forces an isolated group so the clip mask applies to
/// the node's content only.
///
/// Shared with the compositor's fast path, which recomputes just this op
/// when only `opacity` changed.
#[must_use]
pub fn blend_op_for(dom: &DomTree, graph: &DirtyGraph, node: NodeId) -> BlendOp {
    let opacity = style_value(dom, graph, node, Property::Opacity)
        .trim()
        .parse::<f32>()
        .unwrap_or(1.0)
        .clamp(0.0, 1.0);
    let mut mode = BlendMode::parse(style_value(dom, graph, node, Property::MixBlendMode));
    if style_value(dom, graph, node, Property::Overflow).trim() == "clip" && mode.is_none() {
        mode = Some(BlendMode::SourceOver);
    }
    BlendOp::new(opacity, mode)
}

/// [CSS UI § 5.1 outline](https://www.w3.org/TR/css-ui-4/#outline)
///
/// Only the `<width>px solid <color>` form is understood.
#[must_use]
pub fn parse_outline(value: &str) -> Option<(f32, Color)> {
    let mut parts = value.split_whitespace();
    let width = parts.next()?;
    let style = parts.next()?;
    let color = parts.next()?;
    if parts.next().is_some() || style != "solid" {
        return None;
    }
    let width = parse_px(width)?;
    Some((width, Color::try_parse(color)?))
}

/// Turns one frame's layout tree into a display list.
pub struct Painter<'a> {
    tree: &'a LayoutTree,
    dom: &'a DomTree,
    graph: &'a DirtyGraph,
    fonts: &'a dyn FontMetrics,
    host: &'a dyn EmbedHost,
    window: WindowId,
}

impl<'a> Painter<'a> {
    /// A painter for the frame `window`.
    #[must_use]
    pub fn new(
        tree: &'a LayoutTree,
        dom: &'a DomTree,
        graph: &'a DirtyGraph,
        fonts: &'a dyn FontMetrics,
        host: &'a dyn EmbedHost,
        window: WindowId,
    ) -> Self {
        Self {
            tree,
            dom,
            graph,
            fonts,
            host,
            window,
        }
    }

    /// Paint the whole tree.
    ///
    /// # Panics
    ///
    /// Panics if layout is not up to date.
    #[must_use]
    pub fn paint(&self) -> Vec<DisplayItem> {
        let mut display_list = Vec::new();
        self.paint_tree(self.tree.root(), &mut display_list);
        display_list
    }

    fn layout(&self, id: LayoutId) -> &'a LayoutNode {
        match self.tree.get(id) {
            Some(node) => node,
            None => panic!("painting stale layout id {id:?}"),
        }
    }

    fn style(&self, node: NodeId, property: Property) -> &'a str {
        style_value(self.dom, self.graph, node, property)
    }

    fn key(&self, node: NodeId) -> EffectKey {
        EffectKey {
            window: self.window,
            node,
        }
    }

    fn paint_tree(&self, id: LayoutId, display_list: &mut Vec<DisplayItem>) {
        let layout = self.layout(id);
        let should_paint = self.should_paint(layout);

        let mut cmds = if should_paint {
            self.paint_node(layout)
        } else {
            Vec::new()
        };

        if matches!(layout.kind, LayoutKind::Iframe) {
            let frame = self.dom.as_element(layout.node).and_then(|e| e.frame);
            let inner = match frame {
                Some(window) if self.host.child_frame_loaded(window) => self.host.paint_child_frame(window),
                _ => Vec::new(),
            };
            cmds.extend(self.paint_iframe_contents(layout, inner));
        } else {
            for child in self.tree.children(self.graph, id) {
                self.paint_tree(*child, &mut cmds);
            }
        }

        if should_paint {
            cmds = self.paint_effects(layout, cmds);
        }
        display_list.extend(cmds);
    }

    /// A block wrapping an `<input>` or `<button>` paints nothing itself:
    /// the embed inside it does.
    fn should_paint(&self, layout: &LayoutNode) -> bool {
        match layout.kind {
            LayoutKind::Block => !self
                .dom
                .tag_name(layout.node)
                .is_some_and(|tag| matches!(tag, "input" | "button")),
            _ => true,
        }
    }

    fn paint_node(&self, layout: &LayoutNode) -> Vec<DisplayItem> {
        match &layout.kind {
            LayoutKind::Document | LayoutKind::Line | LayoutKind::Iframe => {
                self.paint_background(layout).into_iter().collect()
            }
            LayoutKind::Block => self.paint_block(layout),
            LayoutKind::Text { word } => {
                let color = Color::parse(self.style(layout.node, Property::Color));
                vec![self.text(layout, word.clone(), color)]
            }
            LayoutKind::Input => self.paint_input(layout),
            LayoutKind::Image { image_height } => self.paint_image(layout, *image_height),
        }
    }

    /// [CSS Backgrounds § 3.10](https://www.w3.org/TR/css-backgrounds-3/#background-color)
    fn paint_background(&self, layout: &LayoutNode) -> Option<DisplayItem> {
        if matches!(layout.kind, LayoutKind::Document | LayoutKind::Line) {
            return None;
        }
        let color = Color::parse(self.style(layout.node, Property::BackgroundColor));
        if color.is_transparent() {
            return None;
        }
        let radius = self.border_radius(layout);
        Some(DrawCommand::rrect(layout.rect(self.graph), radius, color).into())
    }

    fn border_radius(&self, layout: &LayoutNode) -> f32 {
        let radius = parse_px(self.style(layout.node, Property::BorderRadius)).unwrap_or(0.0);
        dpx(radius, *layout.zoom.get(self.graph))
    }

    fn text(&self, layout: &LayoutNode, text: String, color: Color) -> DisplayItem {
        let x = *layout.x.get(self.graph);
        let y = *layout.y.get(self.graph);
        let font = layout.font.get(self.graph).clone();
        let rect = Rect::from_xywh(
            x,
            y,
            self.fonts.measure(&font, &text),
            self.fonts.ascent(&font) + self.fonts.descent(&font),
        );
        DrawCommand {
            rect,
            kind: DrawKind::Text {
                x,
                y,
                text,
                font,
                color,
            },
        }
        .into()
    }

    /// A vertical red line `offset` pixels into `layout`.
    fn cursor(&self, layout: &LayoutNode, offset: f32) -> DisplayItem {
        let x = *layout.x.get(self.graph) + offset;
        let y = *layout.y.get(self.graph);
        let height = *layout.height.get(self.graph);
        DrawCommand::line(x, y, x, y + height, Color::RED, CURSOR_THICKNESS).into()
    }

    fn paint_block(&self, layout: &LayoutNode) -> Vec<DisplayItem> {
        let mut cmds: Vec<DisplayItem> = self.paint_background(layout).into_iter().collect();

        let editing = self
            .dom
            .as_element(layout.node)
            .is_some_and(|e| e.focused && e.attrs.contains_key("contenteditable"));
        if editing {
            let last_text = self.last_text_run(layout);
            cmds.push(match last_text {
                Some(text) => self.cursor(text, *text.width.get(self.graph)),
                None => self.cursor(layout, 0.0),
            });
        }
        cmds
    }

    /// The last word laid out anywhere under `layout`.
    fn last_text_run(&self, layout: &LayoutNode) -> Option<&'a LayoutNode> {
        let mut found = None;
        let mut stack: Vec<LayoutId> = layout.children.get(self.graph).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let node = self.layout(id);
            if matches!(node.kind, LayoutKind::Text { .. }) {
                found = Some(node);
            }
            stack.extend(node.children.get(self.graph).iter().rev().copied());
        }
        found
    }

    /// [HTML § 4.10.5 The input element](https://html.spec.whatwg.org/multipage/input.html#the-input-element)
    ///
    /// An input shows its `value`; a button shows its single text child.
    fn paint_input(&self, layout: &LayoutNode) -> Vec<DisplayItem> {
        let mut cmds: Vec<DisplayItem> = self.paint_background(layout).into_iter().collect();
        let Some(element) = self.dom.as_element(layout.node) else {
            return cmds;
        };

        let text = match element.tag_name.as_str() {
            "input" => element.attr("value").unwrap_or_default().to_string(),
            _ => match self.dom.children(layout.node) {
                [only] => self.dom.as_text(*only).unwrap_or_default().to_string(),
                [] => String::new(),
                _ => {
                    quokka_common::warning::warn_once("Paint", "ignoring HTML contents inside button");
                    String::new()
                }
            },
        };

        let color = Color::parse(self.style(layout.node, Property::Color));
        let focused_input = element.focused && element.tag_name == "input";
        let advance = self.fonts.measure(layout.font.get(self.graph), &text);
        cmds.push(self.text(layout, text, color));
        if focused_input {
            cmds.push(self.cursor(layout, advance));
        }
        cmds
    }

    /// The image sits at the bottom of its box, which may be taller to fit
    /// the line.
    fn paint_image(&self, layout: &LayoutNode, image_height: f32) -> Vec<DisplayItem> {
        let image = self
            .dom
            .as_element(layout.node)
            .and_then(|e| e.image.clone())
            .unwrap_or_else(LoadedImage::broken);
        let rect = layout.rect(self.graph);
        let rect = Rect::from_ltrb(rect.left, rect.bottom - image_height, rect.right, rect.bottom);
        let quality = ImageQuality::parse(self.style(layout.node, Property::ImageRendering));
        vec![
            DrawCommand {
                rect,
                kind: DrawKind::Image { image, quality },
            }
            .into(),
        ]
    }

    /// The child frame's commands, moved inside the border and clipped to
    /// the content box.
    fn paint_iframe_contents(&self, layout: &LayoutNode, inner: Vec<DisplayItem>) -> Vec<DisplayItem> {
        let zoom = *layout.zoom.get(self.graph);
        let x = *layout.x.get(self.graph);
        let y = *layout.y.get(self.graph);
        let width = *layout.width.get(self.graph);
        let height = *layout.height.get(self.graph);
        let border = dpx(1.0, zoom);

        let moved = VisualEffect::transform(Some((x + border, y + border)), Some(self.key(layout.node)), inner);
        let content_box = Rect::from_ltrb(x + border, y + border, x + width - border, y + height - border);
        let mask = VisualEffect::blend(
            BlendOp::new(1.0, Some(BlendMode::DestinationIn)),
            None,
            vec![DrawCommand::rrect(content_box, 0.0, Color::WHITE).into()],
        );
        vec![
            VisualEffect::blend(
                BlendOp::new(1.0, Some(BlendMode::SourceOver)),
                None,
                vec![moved.into(), mask.into()],
            )
            .into(),
        ]
    }

    fn paint_effects(&self, layout: &LayoutNode, mut cmds: Vec<DisplayItem>) -> Vec<DisplayItem> {
        match layout.kind {
            LayoutKind::Document | LayoutKind::Text { .. } => cmds,
            LayoutKind::Line => {
                self.paint_inline_outlines(layout, &mut cmds);
                cmds
            }
            LayoutKind::Block | LayoutKind::Input | LayoutKind::Image { .. } | LayoutKind::Iframe => {
                let rect = layout.rect(self.graph);
                self.paint_outline(layout.node, &mut cmds, rect, *layout.zoom.get(self.graph));
                self.paint_visual_effects(layout, cmds, rect)
            }
        }
    }

    fn paint_outline(&self, node: NodeId, cmds: &mut Vec<DisplayItem>, rect: Rect, zoom: f32) {
        if let Some((thickness, color)) = parse_outline(self.style(node, Property::Outline)) {
            cmds.push(DrawCommand::outline(rect, color, dpx(thickness, zoom)).into());
        }
    }

    /// Inline elements (a focused link, say) have no box of their own, so
    /// their outline goes around the runs they produced on this line. The
    /// line's own block paints its outline itself.
    fn paint_inline_outlines(&self, line: &LayoutNode, cmds: &mut Vec<DisplayItem>) {
        let mut outline_rect = Rect::EMPTY;
        let mut outline_node = None;
        for child in line.children.get(self.graph) {
            let child = self.layout(*child);
            let Some(parent) = self.dom.parent(child.node) else {
                continue;
            };
            if parent == line.node || !matches!(child.kind, LayoutKind::Text { .. }) {
                continue;
            }
            if parse_outline(self.style(parent, Property::Outline)).is_some() {
                outline_rect = outline_rect.union(&child.rect(self.graph));
                outline_node = Some(parent);
            }
        }
        if let Some(node) = outline_node {
            self.paint_outline(node, cmds, outline_rect, *line.zoom.get(self.graph));
        }
    }

    /// [CSS Transforms § 6](https://www.w3.org/TR/css-transforms-1/#transform-property),
    /// [Compositing and Blending § 3.2](https://www.w3.org/TR/compositing-1/#isolation)
    ///
    /// Wrap `cmds` in the node's blend (opacity, blend mode and the
    /// `overflow: clip` mask) and then its translation.
    fn paint_visual_effects(&self, layout: &LayoutNode, mut cmds: Vec<DisplayItem>, rect: Rect) -> Vec<DisplayItem> {
        let node = layout.node;
        if self.style(node, Property::Overflow).trim() == "clip" {
            let radius = self.border_radius(layout);
            cmds.push(
                VisualEffect::blend(
                    BlendOp::new(1.0, Some(BlendMode::DestinationIn)),
                    None,
                    vec![DrawCommand::rrect(rect, radius, Color::WHITE).into()],
                )
                .into(),
            );
        }
        let translation = parse_transform(self.style(node, Property::Transform));
        let key = Some(self.key(node));
        let blend = VisualEffect::blend(blend_op_for(self.dom, self.graph, node), key, cmds);
        vec![VisualEffect::transform(translation, key, vec![blend.into()]).into()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_outline() {
        assert_eq!(parse_outline("2px solid red"), Some((2.0, Color::RED)));
        assert_eq!(parse_outline("none"), None);
        assert_eq!(parse_outline("1px dashed black"), None);
    }
}
