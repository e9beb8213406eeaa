//! Line boxes and text runs.
//!
//! [CSS 2.1 § 10.8 Line height calculations](https://www.w3.org/TR/CSS2/visudet.html#line-height)
//!
//! Text heights and ascents are padded by a factor of 1.25 for leading. A
//! line aligns every child on one baseline, placed below the tallest
//! ascent; for text the leading is taken back out so the glyphs' own
//! ascent sits on the baseline.

use quokka_dom::LayoutId;

use super::font::font_for;
use super::{LayoutContext, LayoutKind, LayoutTree, Slot};

/// Extra leading applied to text line metrics.
pub(crate) const LEADING: f32 = 1.25;

impl LayoutTree {
    pub(crate) fn layout_line(&mut self, cx: &mut LayoutContext<'_>, id: LayoutId) {
        if !self.node(id).layout_needed(cx.graph) {
            return;
        }
        self.place_in_flow(cx, id);

        let children = self.node(id).children.get(cx.graph).clone();
        for child in &children {
            self.layout_node(cx, *child);
        }

        if children.is_empty() {
            self.set(cx.graph, id, Slot::Ascent, 0.0);
            self.set(cx.graph, id, Slot::Descent, 0.0);
            self.set(cx.graph, id, Slot::Height, 0.0);
            self.clear_dirty_descendants(id);
            return;
        }

        let notify = self.field_id(id, Slot::Ascent);
        let ascent = children
            .iter()
            .map(|child| self.read(cx.graph, *child, Slot::Ascent, notify))
            .fold(0.0_f32, f32::max);
        self.set(cx.graph, id, Slot::Ascent, ascent);

        let notify = self.field_id(id, Slot::Descent);
        let descent = children
            .iter()
            .map(|child| self.read(cx.graph, *child, Slot::Descent, notify))
            .fold(0.0_f32, f32::max);
        self.set(cx.graph, id, Slot::Descent, descent);

        // [§ 10.8.1](https://www.w3.org/TR/CSS2/visudet.html#leading)
        // "the baselines of all boxes are aligned"
        for child in &children {
            let notify = self.field_id(*child, Slot::Y);
            let mut y = self.read(cx.graph, id, Slot::Y, notify)
                + self.read(cx.graph, id, Slot::Ascent, notify);
            let child_ascent = self.read(cx.graph, *child, Slot::Ascent, notify);
            if matches!(self.node(*child).kind, LayoutKind::Text { .. }) {
                y -= child_ascent / LEADING;
            } else {
                y -= child_ascent;
            }
            self.set(cx.graph, *child, Slot::Y, y);
        }

        let notify = self.field_id(id, Slot::Height);
        let height = self.read(cx.graph, id, Slot::Ascent, notify)
            + self.read(cx.graph, id, Slot::Descent, notify);
        self.set(cx.graph, id, Slot::Height, height);
        self.clear_dirty_descendants(id);
    }

    /// Zoom from the line, font from the node's style, and x just after the
    /// previous run plus one space (or at the line's start).
    ///
    /// The y coordinate is not computed here: the enclosing line sets it
    /// once every child's ascent is known.
    pub(crate) fn place_inline(&mut self, cx: &mut LayoutContext<'_>, id: LayoutId) {
        let node = self.node(id);
        let (Some(parent), previous, dom_node) = (node.parent, node.previous, node.node) else {
            return;
        };
        self.copy(cx.graph, id, parent, Slot::Zoom);

        let font_id = self.node(id).font.id();
        let zoom = self.read(cx.graph, id, Slot::Zoom, font_id);
        let font = font_for(cx.dom, cx.graph, dom_node, zoom, font_id);
        let _ = self.node_mut(id).font.update(cx.graph, font);

        match previous {
            Some(previous) => {
                let notify = self.field_id(id, Slot::X);
                let previous_x = self.read(cx.graph, previous, Slot::X, notify);
                let previous_width = self.read(cx.graph, previous, Slot::Width, notify);
                let space = cx.fonts.measure(self.node(previous).font.read(cx.graph, notify), " ");
                self.set(cx.graph, id, Slot::X, previous_x + space + previous_width);
            }
            None => self.copy(cx.graph, id, parent, Slot::X),
        }
    }

    pub(crate) fn layout_text(&mut self, cx: &mut LayoutContext<'_>, id: LayoutId) {
        if !self.node(id).layout_needed(cx.graph) {
            return;
        }
        self.place_inline(cx, id);

        let LayoutKind::Text { word } = &self.node(id).kind else {
            return;
        };
        let word = word.clone();

        let notify = self.field_id(id, Slot::Width);
        let width = cx.fonts.measure(self.node(id).font.read(cx.graph, notify), &word);
        self.set(cx.graph, id, Slot::Width, width);

        let notify = self.field_id(id, Slot::Ascent);
        let ascent = cx.fonts.ascent(self.node(id).font.read(cx.graph, notify)) * LEADING;
        self.set(cx.graph, id, Slot::Ascent, ascent);

        let notify = self.field_id(id, Slot::Descent);
        let descent = cx.fonts.descent(self.node(id).font.read(cx.graph, notify)) * LEADING;
        self.set(cx.graph, id, Slot::Descent, descent);

        let notify = self.field_id(id, Slot::Height);
        let height = cx.fonts.linespace(self.node(id).font.read(cx.graph, notify)) * LEADING;
        self.set(cx.graph, id, Slot::Height, height);
    }
}
