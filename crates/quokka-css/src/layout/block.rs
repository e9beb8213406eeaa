//! Document and block layout, and breaking inline content into lines.
//!
//! [CSS 2.1 § 9.4.1 Block formatting contexts](https://www.w3.org/TR/CSS2/visuren.html#block-formatting)
//!
//! "In a block formatting context, boxes are laid out one after the other,
//! vertically, beginning at the top of a containing block."

use quokka_common::image::LoadedImage;
use quokka_dom::{DomTree, FieldId, LayoutId, NodeId, NodeType};

use super::font::font_for;
use super::{
    IFRAME_WIDTH_PX, INPUT_WIDTH_PX, LayoutContext, LayoutKind, LayoutTree, Slot, HSTEP, VSTEP,
};
use crate::geometry::{dpx, parse_px};

/// Elements that start a block formatting context when they appear as a
/// child.
const BLOCK_ELEMENTS: &[&str] = &[
    "html", "body", "article", "section", "nav", "aside", "h1", "h2", "h3", "h4", "h5", "h6",
    "hgroup", "header", "footer", "address", "p", "hr", "pre", "blockquote", "ol", "ul", "menu",
    "li", "dl", "dt", "dd", "figure", "figcaption", "main", "div", "table", "form", "fieldset",
    "legend", "details", "summary",
];

/// Elements never laid out.
const HIDDEN_ELEMENTS: &[&str] = &["head", "style", "script", "title"];

/// How a block arranges its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LayoutMode {
    /// Children stack vertically.
    Block,
    /// Content flows into lines.
    Inline,
}

/// [CSS Display § 2](https://www.w3.org/TR/css-display-3/#the-display-properties)
///
/// Text is inline. An element with a block-level child is a block
/// container; one with only inline content (or an embed itself) lays out
/// inline; an empty element is an empty block.
pub(crate) fn layout_mode(dom: &DomTree, node: NodeId) -> LayoutMode {
    if dom.as_text(node).is_some() {
        return LayoutMode::Inline;
    }
    let children = dom.children(node);
    let has_block_child = children
        .iter()
        .any(|child| dom.tag_name(*child).is_some_and(|tag| BLOCK_ELEMENTS.contains(&tag)));
    if has_block_child {
        LayoutMode::Block
    } else if !children.is_empty()
        || dom
            .tag_name(node)
            .is_some_and(|tag| matches!(tag, "input" | "img" | "iframe"))
    {
        LayoutMode::Inline
    } else {
        LayoutMode::Block
    }
}

fn is_hidden(dom: &DomTree, node: NodeId) -> bool {
    dom.tag_name(node).is_some_and(|tag| HIDDEN_ELEMENTS.contains(&tag))
}

impl LayoutTree {
    /// [§ 10.1 Definition of "containing block"](https://www.w3.org/TR/CSS2/visudet.html#containing-block-details)
    ///
    /// The initial containing block is the viewport less a margin of
    /// `HSTEP` on each side; the document's one child is the block for the
    /// document element.
    pub(crate) fn layout_document(&mut self, cx: &mut LayoutContext<'_>, width: f32, zoom: f32) {
        let id = self.root;
        self.set(cx.graph, id, Slot::Zoom, zoom);
        self.set(cx.graph, id, Slot::Width, width - 2.0 * dpx(HSTEP, zoom));
        self.set(cx.graph, id, Slot::X, dpx(HSTEP, zoom));
        self.set(cx.graph, id, Slot::Y, dpx(VSTEP, zoom));

        if self.node(id).children.is_dirty(cx.graph) {
            let existing = self.node(id).children.peek().and_then(|c| c.first().copied());
            let child = match existing {
                Some(child) => child,
                None => {
                    let html = cx.dom.document_element().unwrap_or_else(|| cx.dom.root());
                    self.alloc(cx.dom, cx.graph, LayoutKind::Block, html, Some(id), None)
                }
            };
            self.node_mut(id).children.set(cx.graph, vec![child]);
        }

        let children = self.node(id).children.get(cx.graph).clone();
        for child in &children {
            self.layout_node(cx, *child);
        }
        self.clear_dirty_descendants(id);

        let notify = self.field_id(id, Slot::Height);
        let _ = self.node(id).children.read(cx.graph, notify);
        let height: f32 = children
            .iter()
            .map(|child| self.read(cx.graph, *child, Slot::Height, notify))
            .sum();
        self.set(cx.graph, id, Slot::Height, height);
    }

    /// Inherit zoom, width and x from the parent; stack below the previous
    /// sibling.
    pub(crate) fn place_in_flow(&mut self, cx: &mut LayoutContext<'_>, id: LayoutId) {
        let node = self.node(id);
        let (Some(parent), previous) = (node.parent, node.previous) else {
            return;
        };
        self.copy(cx.graph, id, parent, Slot::Zoom);
        self.copy(cx.graph, id, parent, Slot::Width);
        self.copy(cx.graph, id, parent, Slot::X);
        match previous {
            Some(previous) => {
                let notify = self.field_id(id, Slot::Y);
                let y = self.read(cx.graph, previous, Slot::Y, notify)
                    + self.read(cx.graph, previous, Slot::Height, notify);
                self.set(cx.graph, id, Slot::Y, y);
            }
            None => self.copy(cx.graph, id, parent, Slot::Y),
        }
    }

    pub(crate) fn layout_block(&mut self, cx: &mut LayoutContext<'_>, id: LayoutId) {
        if !self.node(id).layout_needed(cx.graph) {
            return;
        }
        self.place_in_flow(cx, id);
        self.layout_children_and_sum(cx, id);
    }

    /// Rebuild the child list if it is dirty, lay the children out, and sum
    /// their heights.
    fn layout_children_and_sum(&mut self, cx: &mut LayoutContext<'_>, id: LayoutId) {
        if self.node(id).children.is_dirty(cx.graph) {
            let old = self.node(id).children.peek().cloned().unwrap_or_default();
            let node = self.node(id).node;
            let new = match layout_mode(cx.dom, node) {
                LayoutMode::Block => self.build_block_children(cx, id, node),
                LayoutMode::Inline => self.build_lines(cx, id, node),
            };
            self.node_mut(id).children.set(cx.graph, new.clone());

            // The height is a sum over exactly the new children.
            let mut sources: Vec<FieldId> = new
                .iter()
                .map(|child| self.field_id(*child, Slot::Height))
                .collect();
            sources.push(self.node(id).children.id());
            self.node(id).height.set_dependencies(cx.graph, &sources);

            for child in old {
                self.destroy(cx.dom, cx.graph, child);
            }
        }

        let children = self.node(id).children.get(cx.graph).clone();
        for child in &children {
            self.layout_node(cx, *child);
        }
        self.clear_dirty_descendants(id);

        let notify = self.field_id(id, Slot::Height);
        let _ = self.node(id).children.read(cx.graph, notify);
        let height: f32 = children
            .iter()
            .map(|child| self.read(cx.graph, *child, Slot::Height, notify))
            .sum();
        self.set(cx.graph, id, Slot::Height, height);
    }

    fn build_block_children(
        &mut self,
        cx: &mut LayoutContext<'_>,
        id: LayoutId,
        node: NodeId,
    ) -> Vec<LayoutId> {
        let mut children = Vec::new();
        let mut previous = None;
        for child in cx.dom.children(node).to_vec() {
            if is_hidden(cx.dom, child) {
                continue;
            }
            let next = self.alloc(cx.dom, cx.graph, LayoutKind::Block, child, Some(id), previous);
            children.push(next);
            previous = Some(next);
        }
        children
    }

    /// [§ 9.4.2 Inline formatting contexts](https://www.w3.org/TR/CSS2/visuren.html#inline-formatting)
    ///
    /// "In an inline formatting context, boxes are laid out horizontally,
    /// one after the other, beginning at the top of a containing block."
    fn build_lines(&mut self, cx: &mut LayoutContext<'_>, id: LayoutId, node: NodeId) -> Vec<LayoutId> {
        let notify = self.node(id).children.id();
        let width = self.read(cx.graph, id, Slot::Width, notify);
        let zoom = self.read(cx.graph, id, Slot::Zoom, notify);
        let mut state = LineBreaker {
            block: id,
            block_node: node,
            notify,
            width,
            zoom,
            cursor_x: 0.0,
            lines: Vec::new(),
        };
        state.new_line(self, cx);
        state.recurse(self, cx, node);

        let mut lines = Vec::with_capacity(state.lines.len());
        for (line, children) in state.lines {
            self.node_mut(line).children.set(cx.graph, children);
            lines.push(line);
        }
        lines
    }
}

/// Accumulates lines while walking a block's inline content.
struct LineBreaker {
    block: LayoutId,
    block_node: NodeId,
    /// The block's `children` field; everything read while breaking lines
    /// invalidates it.
    notify: FieldId,
    width: f32,
    zoom: f32,
    cursor_x: f32,
    lines: Vec<(LayoutId, Vec<LayoutId>)>,
}

impl LineBreaker {
    fn new_line(&mut self, tree: &mut LayoutTree, cx: &mut LayoutContext<'_>) {
        let previous = self.lines.last().map(|(line, _)| *line);
        let line = tree.alloc(
            cx.dom,
            cx.graph,
            LayoutKind::Line,
            self.block_node,
            Some(self.block),
            previous,
        );
        self.lines.push((line, Vec::new()));
        self.cursor_x = 0.0;
    }

    fn recurse(&mut self, tree: &mut LayoutTree, cx: &mut LayoutContext<'_>, node: NodeId) {
        let tag = match cx.dom.get(node).map(|n| &n.node_type) {
            Some(NodeType::Text(text)) => {
                let words: Vec<String> = text.split_whitespace().map(str::to_string).collect();
                for word in words {
                    self.word(tree, cx, node, word);
                }
                return;
            }
            Some(NodeType::Element(element)) => element.tag_name.clone(),
            _ => return,
        };
        match tag.as_str() {
            "br" => self.new_line(tree, cx),
            "input" | "button" => self.input(tree, cx, node),
            "img" => self.image(tree, cx, node),
            "iframe" => self.iframe(tree, cx, node),
            hidden if HIDDEN_ELEMENTS.contains(&hidden) => {}
            _ => {
                for child in cx.dom.children(node).to_vec() {
                    self.recurse(tree, cx, child);
                }
            }
        }
    }

    fn word(&mut self, tree: &mut LayoutTree, cx: &mut LayoutContext<'_>, node: NodeId, word: String) {
        let font = font_for(cx.dom, cx.graph, node, self.zoom, self.notify);
        let width = cx.fonts.measure(&font, &word);
        self.add_inline_child(tree, cx, node, width, LayoutKind::Text { word });
    }

    fn input(&mut self, tree: &mut LayoutTree, cx: &mut LayoutContext<'_>, node: NodeId) {
        let width = dpx(INPUT_WIDTH_PX, self.zoom);
        self.add_inline_child(tree, cx, node, width, LayoutKind::Input);
    }

    fn image(&mut self, tree: &mut LayoutTree, cx: &mut LayoutContext<'_>, node: NodeId) {
        let width = match cx.dom.attribute(node, "width").and_then(parse_px) {
            Some(width) => dpx(width, self.zoom),
            None => {
                let intrinsic = cx
                    .dom
                    .as_element(node)
                    .and_then(|e| e.image.as_ref())
                    .map_or_else(|| LoadedImage::broken().width(), |image| image.width());
                dpx(intrinsic as f32, self.zoom)
            }
        };
        self.add_inline_child(
            tree,
            cx,
            node,
            width,
            LayoutKind::Image { image_height: 0.0 },
        );
    }

    fn iframe(&mut self, tree: &mut LayoutTree, cx: &mut LayoutContext<'_>, node: NodeId) {
        let width = match cx.dom.attribute(node, "width").and_then(parse_px) {
            Some(width) => dpx(width + 2.0, self.zoom),
            None => dpx(IFRAME_WIDTH_PX + 2.0, self.zoom),
        };
        self.add_inline_child(tree, cx, node, width, LayoutKind::Iframe);
    }

    /// Place an inline leaf of `width` on the current line, starting a new
    /// line first if it would overflow. A line that is still empty takes
    /// the leaf regardless, so an over-wide word gets a line of its own.
    fn add_inline_child(
        &mut self,
        tree: &mut LayoutTree,
        cx: &mut LayoutContext<'_>,
        node: NodeId,
        width: f32,
        kind: LayoutKind,
    ) {
        let line_is_empty = self.lines.last().is_none_or(|(_, children)| children.is_empty());
        if self.cursor_x + width > self.width && !line_is_empty {
            self.new_line(tree, cx);
        }
        let Some((line, children)) = self.lines.last_mut() else {
            return;
        };
        let previous = children.last().copied();
        let child = tree.alloc(cx.dom, cx.graph, kind, node, Some(*line), previous);
        children.push(child);

        let font = font_for(cx.dom, cx.graph, node, self.zoom, self.notify);
        self.cursor_x += width + cx.fonts.measure(&font, " ");
    }
}
