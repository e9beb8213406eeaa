//! Incremental layout.
//!
//! [CSS 2.1 § 9 Visual formatting model](https://www.w3.org/TR/CSS2/visuren.html)
//!
//! The layout tree is an arena of [`LayoutNode`]s. Every geometric value a
//! node has is a dirty-tracked [`Field`], so a mutation invalidates exactly
//! the values computed from it and the next pass recomputes only those.
//!
//! Node kinds:
//!
//! * `Document`: the root. Fixed margins around one block child.
//! * `Block`: stacks block children vertically, or breaks its inline
//!   content into `Line`s.
//! * `Line`: one line box; aligns its children on a common baseline.
//! * `Text`, `Input`, `Image`, `Iframe`: inline-level leaves.
//!
//! Building the tree and computing geometry happen in the same pass: a
//! node's `children` field is itself a dirty field, rebuilt only when
//! something it was built from changed.

mod block;
mod embed;
pub mod font;
mod inline;

use quokka_dom::{DirtyGraph, DomTree, Field, FieldId, LayoutId, NodeId};

use crate::geometry::Rect;

pub use embed::{EmbedHost, NullEmbedHost};
pub use font::{ApproximateFontMetrics, FontKey, FontMetrics, FontSlant, FontWeight};

/// Horizontal page margin, in CSS pixels.
pub const HSTEP: f32 = 13.0;

/// Vertical page margin, in CSS pixels.
pub const VSTEP: f32 = 18.0;

/// Width of a text input or button, in CSS pixels.
pub const INPUT_WIDTH_PX: f32 = 200.0;

/// Default iframe content width, in CSS pixels.
pub const IFRAME_WIDTH_PX: f32 = 300.0;

/// Default iframe content height, in CSS pixels.
pub const IFRAME_HEIGHT_PX: f32 = 150.0;

/// What a layout node lays out.
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutKind {
    /// The root of a frame's layout tree.
    Document,
    /// A block container.
    Block,
    /// One line box inside an inline-mode block.
    Line,
    /// One word of a text node.
    Text {
        /// The word, without surrounding whitespace.
        word: String,
    },
    /// A text `<input>` or a `<button>`.
    Input,
    /// An `<img>`.
    Image {
        /// Height of the image itself; the node's height may be taller to
        /// fit the line.
        image_height: f32,
    },
    /// An `<iframe>`.
    Iframe,
}

impl LayoutKind {
    /// Whether the node is an inline-level leaf that sits on a line.
    #[must_use]
    pub const fn is_inline_leaf(&self) -> bool {
        matches!(
            self,
            Self::Text { .. } | Self::Input | Self::Image { .. } | Self::Iframe
        )
    }
}

/// Names one of a node's numeric fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    X,
    Y,
    Width,
    Height,
    Zoom,
    Ascent,
    Descent,
}

/// A node in the layout tree.
#[derive(Debug)]
pub struct LayoutNode {
    /// What this node lays out.
    pub kind: LayoutKind,
    /// The DOM node it was built from. Lines share their block's node.
    pub node: NodeId,
    /// Enclosing layout node; `None` only for the document.
    pub parent: Option<LayoutId>,
    /// Previous sibling in the parent's child list.
    pub previous: Option<LayoutId>,
    /// Child layout nodes.
    pub children: Field<Vec<LayoutId>>,
    /// Left edge.
    pub x: Field<f32>,
    /// Top edge.
    pub y: Field<f32>,
    /// Width of the border box.
    pub width: Field<f32>,
    /// Height of the border box.
    pub height: Field<f32>,
    /// Zoom factor in effect.
    pub zoom: Field<f32>,
    /// Font used for text and inline spacing.
    pub font: Field<FontKey>,
    /// Distance from the top to the baseline.
    pub ascent: Field<f32>,
    /// Distance from the baseline to the bottom.
    pub descent: Field<f32>,
    has_dirty_descendants: bool,
}

impl LayoutNode {
    fn new(graph: &mut DirtyGraph, id: LayoutId, kind: LayoutKind, node: NodeId) -> Self {
        Self {
            kind,
            node,
            parent: None,
            previous: None,
            children: Field::owned(graph, "layout.children", id),
            x: Field::owned(graph, "layout.x", id),
            y: Field::owned(graph, "layout.y", id),
            width: Field::owned(graph, "layout.width", id),
            height: Field::owned(graph, "layout.height", id),
            zoom: Field::owned(graph, "layout.zoom", id),
            font: Field::owned(graph, "layout.font", id),
            ascent: Field::owned(graph, "layout.ascent", id),
            descent: Field::owned(graph, "layout.descent", id),
            has_dirty_descendants: false,
        }
    }

    /// Handles of every field the node owns.
    #[must_use]
    pub fn field_ids(&self) -> [FieldId; 9] {
        [
            self.children.id(),
            self.x.id(),
            self.y.id(),
            self.width.id(),
            self.height.id(),
            self.zoom.id(),
            self.font.id(),
            self.ascent.id(),
            self.descent.id(),
        ]
    }

    /// Whether a layout pass must visit this node: one of its own fields
    /// is dirty or a descendant's is.
    #[must_use]
    pub fn layout_needed(&self, graph: &DirtyGraph) -> bool {
        self.has_dirty_descendants || self.field_ids().iter().any(|id| graph.is_dirty(*id))
    }

    /// The border box.
    ///
    /// # Panics
    ///
    /// Panics if geometry is dirty.
    #[must_use]
    pub fn rect(&self, graph: &DirtyGraph) -> Rect {
        Rect::from_xywh(
            *self.x.get(graph),
            *self.y.get(graph),
            *self.width.get(graph),
            *self.height.get(graph),
        )
    }

    pub(crate) const fn num(&self, slot: Slot) -> &Field<f32> {
        match slot {
            Slot::X => &self.x,
            Slot::Y => &self.y,
            Slot::Width => &self.width,
            Slot::Height => &self.height,
            Slot::Zoom => &self.zoom,
            Slot::Ascent => &self.ascent,
            Slot::Descent => &self.descent,
        }
    }

    pub(crate) fn num_mut(&mut self, slot: Slot) -> &mut Field<f32> {
        match slot {
            Slot::X => &mut self.x,
            Slot::Y => &mut self.y,
            Slot::Width => &mut self.width,
            Slot::Height => &mut self.height,
            Slot::Zoom => &mut self.zoom,
            Slot::Ascent => &mut self.ascent,
            Slot::Descent => &mut self.descent,
        }
    }
}

/// Collaborators a layout pass needs besides the tree itself.
pub struct LayoutContext<'a> {
    /// The frame's DOM. Layout writes back-pointers into it.
    pub dom: &'a mut DomTree,
    /// The frame's dependency graph.
    pub graph: &'a mut DirtyGraph,
    /// Text measurement.
    pub fonts: &'a dyn FontMetrics,
    /// Access to child frames for `<iframe>`.
    pub host: &'a dyn EmbedHost,
}

/// Arena of layout nodes for one frame.
#[derive(Debug)]
pub struct LayoutTree {
    nodes: Vec<Option<LayoutNode>>,
    free: Vec<usize>,
    root: LayoutId,
    /// Viewport width the document was last laid out for.
    viewport_width: Option<f32>,
}

impl LayoutTree {
    /// A tree holding only the document node for `dom`.
    pub fn new(dom: &mut DomTree, graph: &mut DirtyGraph) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: LayoutId(0),
            viewport_width: None,
        };
        let document = dom.root();
        let root = tree.alloc(dom, graph, LayoutKind::Document, document, None, None);
        tree.root = root;
        tree
    }

    /// The document node.
    #[must_use]
    pub const fn root(&self) -> LayoutId {
        self.root
    }

    /// Look up a node.
    #[must_use]
    pub fn get(&self, id: LayoutId) -> Option<&LayoutNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// Whether the tree is empty. Never true: the document node always exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every live node in pre-order from the root.
    #[must_use]
    pub fn preorder(&self, graph: &DirtyGraph) -> Vec<LayoutId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(children) = self.get(id).and_then(|n| n.children.peek()) {
                if !self.node(id).children.is_dirty(graph) {
                    stack.extend(children.iter().rev().copied());
                }
            }
        }
        out
    }

    /// Live fields of the whole tree that are still dirty.
    #[must_use]
    pub fn dirty_field_count(&self, graph: &DirtyGraph) -> usize {
        self.nodes
            .iter()
            .flatten()
            .flat_map(LayoutNode::field_ids)
            .filter(|id| graph.is_dirty(*id))
            .count()
    }

    /// Height of the laid-out document.
    ///
    /// # Panics
    ///
    /// Panics if layout has not run since the last invalidation.
    #[must_use]
    pub fn document_height(&self, graph: &DirtyGraph) -> f32 {
        *self.node(self.root).height.get(graph)
    }

    pub(crate) fn node(&self, id: LayoutId) -> &LayoutNode {
        match self.get(id) {
            Some(node) => node,
            None => panic!("stale layout id {id:?}"),
        }
    }

    pub(crate) fn node_mut(&mut self, id: LayoutId) -> &mut LayoutNode {
        match self.nodes.get_mut(id.0).and_then(Option::as_mut) {
            Some(node) => node,
            None => panic!("stale layout id {id:?}"),
        }
    }

    /// Create a node. Every kind except `Line` and `Text` becomes its DOM
    /// node's layout object. Fields a kind never computes are set once here
    /// so they never read as dirty.
    pub(crate) fn alloc(
        &mut self,
        dom: &mut DomTree,
        graph: &mut DirtyGraph,
        kind: LayoutKind,
        node: NodeId,
        parent: Option<LayoutId>,
        previous: Option<LayoutId>,
    ) -> LayoutId {
        let index = self.free.pop().unwrap_or(self.nodes.len());
        let id = LayoutId(index);
        let mut layout = LayoutNode::new(graph, id, kind, node);
        layout.parent = parent;
        layout.previous = previous;

        match layout.kind {
            LayoutKind::Document | LayoutKind::Block => {
                layout.font.set(graph, FontKey::default());
                layout.ascent.set(graph, 0.0);
                layout.descent.set(graph, 0.0);
            }
            LayoutKind::Line => layout.font.set(graph, FontKey::default()),
            LayoutKind::Text { .. }
            | LayoutKind::Input
            | LayoutKind::Image { .. }
            | LayoutKind::Iframe => layout.children.set(graph, Vec::new()),
        }
        if !matches!(layout.kind, LayoutKind::Line | LayoutKind::Text { .. }) {
            if let Some(dom_node) = dom.get_mut(node) {
                dom_node.layout_object = Some(id);
            }
        }

        if index == self.nodes.len() {
            self.nodes.push(Some(layout));
        } else {
            self.nodes[index] = Some(layout);
        }
        id
    }

    /// Release a subtree: clear DOM back-pointers that still name its
    /// nodes, then drop their fields.
    pub(crate) fn destroy(&mut self, dom: &mut DomTree, graph: &mut DirtyGraph, id: LayoutId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(layout) = self.nodes.get_mut(current.0).and_then(Option::take) else {
                continue;
            };
            if let Some(children) = layout.children.peek() {
                stack.extend(children.iter().copied());
            }
            if let Some(dom_node) = dom.get_mut(layout.node) {
                if dom_node.layout_object == Some(current) {
                    dom_node.layout_object = None;
                }
            }
            let LayoutNode {
                children,
                x,
                y,
                width,
                height,
                zoom,
                font,
                ascent,
                descent,
                ..
            } = layout;
            children.release(graph);
            x.release(graph);
            y.release(graph);
            width.release(graph);
            height.release(graph);
            zoom.release(graph);
            font.release(graph);
            ascent.release(graph);
            descent.release(graph);
            self.free.push(current.0);
        }
    }

    /// Drain the graph's record of marked layout fields and flag every
    /// ancestor of their owners.
    pub(crate) fn absorb_dirty_owners(&mut self, graph: &mut DirtyGraph) {
        for owner in graph.take_dirty_owners() {
            let mut current = self.get(owner).and_then(|n| n.parent);
            while let Some(id) = current {
                let Some(node) = self.nodes.get_mut(id.0).and_then(Option::as_mut) else {
                    break;
                };
                node.has_dirty_descendants = true;
                current = node.parent;
            }
        }
    }

    pub(crate) fn clear_dirty_descendants(&mut self, id: LayoutId) {
        self.node_mut(id).has_dirty_descendants = false;
    }

    pub(crate) fn field_id(&self, id: LayoutId, slot: Slot) -> FieldId {
        self.node(id).num(slot).id()
    }

    /// Read `slot` of `id` on behalf of `notify`.
    pub(crate) fn read(&self, graph: &mut DirtyGraph, id: LayoutId, slot: Slot, notify: FieldId) -> f32 {
        *self.node(id).num(slot).read(graph, notify)
    }

    pub(crate) fn set(&mut self, graph: &mut DirtyGraph, id: LayoutId, slot: Slot, value: f32) {
        let _ = self.node_mut(id).num_mut(slot).update(graph, value);
    }

    /// `target.slot = source.slot`, recording the dependency.
    pub(crate) fn copy(&mut self, graph: &mut DirtyGraph, target: LayoutId, source: LayoutId, slot: Slot) {
        let notify = self.field_id(target, slot);
        let value = self.read(graph, source, slot, notify);
        self.set(graph, target, slot, value);
    }

    /// The clean children of `id`.
    ///
    /// # Panics
    ///
    /// Panics if the child list is dirty.
    #[must_use]
    pub fn children(&self, graph: &DirtyGraph, id: LayoutId) -> &[LayoutId] {
        self.node(id).children.get(graph)
    }

    /// Invalidate the child list of the block that lays out `node` (or of
    /// the nearest ancestor that has one), so the next pass rebuilds it.
    ///
    /// Called after DOM mutations: `innerHTML`, text edits.
    pub fn mark_children_dirty(&self, dom: &DomTree, graph: &mut DirtyGraph, node: NodeId) {
        let mut current = Some(node);
        while let Some(dom_node) = current {
            let block = dom
                .get(dom_node)
                .and_then(|n| n.layout_object)
                .and_then(|id| self.get(id))
                .filter(|layout| matches!(layout.kind, LayoutKind::Block | LayoutKind::Document));
            if let Some(block) = block {
                block.children.mark(graph);
                return;
            }
            current = dom.parent(dom_node);
        }
    }

    /// Invalidate the size of the embed laid out for `node`, after its
    /// `width`/`height` attributes changed.
    ///
    /// The line breaker of the containing block placed the embed by its old
    /// width, so that block's child list is invalidated too.
    pub fn mark_embed_size_dirty(&self, dom: &DomTree, graph: &mut DirtyGraph, node: NodeId) {
        if let Some(layout) = dom
            .get(node)
            .and_then(|n| n.layout_object)
            .and_then(|id| self.get(id))
        {
            layout.width.mark(graph);
            layout.height.mark(graph);
        }
        self.mark_children_dirty(dom, graph, node);
    }

    /// Invalidate the document width, after the viewport of the frame
    /// changed size.
    pub fn mark_viewport_dirty(&mut self, graph: &mut DirtyGraph) {
        self.viewport_width = None;
        self.node(self.root).width.mark(graph);
    }

    /// Lay out the whole tree for a viewport `width` at `zoom`. Returns
    /// whether any node was visited.
    pub fn layout(&mut self, cx: &mut LayoutContext<'_>, width: f32, zoom: f32) -> bool {
        self.absorb_dirty_owners(cx.graph);
        let root = self.root;
        if self.node(root).zoom.peek() != Some(&zoom) {
            self.node(root).zoom.mark(cx.graph);
        }
        if self.viewport_width != Some(width) {
            self.viewport_width = Some(width);
            self.node(root).width.mark(cx.graph);
        }
        self.absorb_dirty_owners(cx.graph);
        if !self.node(root).layout_needed(cx.graph) {
            return false;
        }
        self.layout_document(cx, width, zoom);
        // Marks made during the pass were for fields the pass then
        // recomputed.
        let _ = cx.graph.take_dirty_owners();
        true
    }

    /// Dispatch to the layout routine for `id`'s kind.
    pub(crate) fn layout_node(&mut self, cx: &mut LayoutContext<'_>, id: LayoutId) {
        match self.node(id).kind {
            LayoutKind::Document => {}
            LayoutKind::Block => self.layout_block(cx, id),
            LayoutKind::Line => self.layout_line(cx, id),
            LayoutKind::Text { .. } => self.layout_text(cx, id),
            LayoutKind::Input => self.layout_input(cx, id),
            LayoutKind::Image { .. } => self.layout_image(cx, id),
            LayoutKind::Iframe => self.layout_iframe(cx, id),
        }
    }

    /// Hit test: the DOM nodes of every node containing the point, in
    /// pre-order, so the last entry is the topmost and most specific.
    #[must_use]
    pub fn hit_test(&self, graph: &DirtyGraph, x: f32, y: f32) -> Vec<(LayoutId, NodeId)> {
        self.preorder(graph)
            .into_iter()
            .filter_map(|id| {
                let node = self.get(id)?;
                node.rect(graph).contains(x, y).then_some((id, node.node))
            })
            .collect()
    }
}
