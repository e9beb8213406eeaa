//! The accessibility tree.
//!
//! [WAI-ARIA 1.2 § 5 The Roles Model](https://www.w3.org/TR/wai-aria-1.2/#roles)
//! and [HTML-AAM § 3.5 HTML Element Role Mappings](https://www.w3.org/TR/html-aam-1.0/#html-element-role-mappings)
//!
//! Built from a frame's DOM and layout after every layout pass. Elements
//! without a role of their own are dropped and their children promoted, so
//! the tree holds only what a screen reader would announce.

use quokka_css::{LayoutKind, Rect};
use quokka_dom::{NodeId, NodeType, WindowId};
use serde::Serialize;

use crate::frame::{Frame, is_focusable};

/// What an accessibility node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The `<html>` element.
    Document,
    /// `<a>`
    Link,
    /// `<input>`
    Textbox,
    /// `<button>`
    Button,
    /// `<img>`
    Image,
    /// `<iframe>`; its children are the child frame's tree.
    Iframe,
    /// Any other focusable element.
    Focusable,
    /// Text directly inside a focusable element.
    FocusableText,
    /// Other text.
    StaticText,
    /// No role: the node is left out and its children promoted.
    None,
}

/// One node of the accessibility tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessibilityNode {
    /// The node's role.
    pub role: Role,
    /// What is announced for the node.
    pub name: String,
    /// Whether the element has focus.
    pub focused: bool,
    /// Frame the node belongs to.
    pub window: u64,
    /// DOM node index within that frame.
    pub node: usize,
    /// Bounds in the frame's document coordinates; one per line for text
    /// and inline elements.
    pub bounds: Vec<Rect>,
    /// Child nodes.
    pub children: Vec<AccessibilityNode>,
    /// For iframes: where the child document's origin sits in this frame.
    #[serde(skip)]
    pub child_origin: Option<(f32, f32)>,
}

impl AccessibilityNode {
    /// An empty document, for a frame with nothing loaded.
    #[must_use]
    pub fn empty_document(window: WindowId) -> Self {
        Self {
            role: Role::Document,
            name: "Document".to_string(),
            focused: false,
            window: window.0,
            node: NodeId::ROOT.0,
            bounds: Vec::new(),
            children: Vec::new(),
            child_origin: None,
        }
    }

    fn contains(&self, x: f32, y: f32) -> bool {
        self.bounds.iter().any(|rect| rect.contains(x, y))
    }

    /// The deepest node at a point in this node's frame coordinates.
    /// Later siblings are on top; iframes translate the point into the
    /// child document.
    #[must_use]
    pub fn hit_test(&self, x: f32, y: f32) -> Option<&Self> {
        let (cx, cy) = match self.child_origin {
            Some((ox, oy)) => {
                if !self.contains(x, y) {
                    return None;
                }
                (x - ox, y - oy)
            }
            None => (x, y),
        };
        for child in self.children.iter().rev() {
            if let Some(hit) = child.hit_test(cx, cy) {
                return Some(hit);
            }
        }
        self.contains(x, y).then_some(self)
    }

    /// Pre-order walk of the subtree.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Self)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }

    /// The first node in pre-order with `role`.
    #[must_use]
    pub fn find(&self, role: Role) -> Option<&Self> {
        let mut found = None;
        self.walk(&mut |node| {
            if found.is_none() && node.role == role {
                found = Some(node);
            }
        });
        found
    }

    /// Number of nodes in the subtree.
    #[must_use]
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(Self::len).sum::<usize>()
    }

    /// Never true: a tree has at least its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Elements whose contents are never rendered.
const SKIPPED_TAGS: [&str; 4] = ["head", "script", "style", "title"];

/// Builds the tree for one frame. Child frames are built through
/// `child_tree`, which the tab supplies.
pub struct AccessibilityBuilder<'a> {
    frame: &'a Frame,
    child_tree: &'a dyn Fn(WindowId) -> Option<AccessibilityNode>,
}

impl<'a> AccessibilityBuilder<'a> {
    /// A builder for `frame`.
    #[must_use]
    pub fn new(frame: &'a Frame, child_tree: &'a dyn Fn(WindowId) -> Option<AccessibilityNode>) -> Self {
        Self { frame, child_tree }
    }

    /// Build the frame's tree. The root is always a document node.
    #[must_use]
    pub fn build(&self) -> AccessibilityNode {
        let dom = self.frame.dom();
        let mut roots = self.build_node(dom.root());
        if roots.len() == 1 && roots[0].role == Role::Document {
            return roots.remove(0);
        }
        let mut document = AccessibilityNode::empty_document(self.frame.window());
        document.children = roots;
        document
    }

    /// The accessibility nodes for `node`: itself, or its children's if
    /// it has no role.
    fn build_node(&self, node: NodeId) -> Vec<AccessibilityNode> {
        let dom = self.frame.dom();
        if dom.tag_name(node).is_some_and(|tag| SKIPPED_TAGS.contains(&tag)) {
            return Vec::new();
        }
        if dom.as_text(node).is_some_and(|text| text.trim().is_empty()) {
            return Vec::new();
        }

        let role = self.role_of(node);
        let mut children = Vec::new();
        if role == Role::Iframe {
            let child = dom.as_element(node).and_then(|e| e.frame);
            if let Some(tree) = child.and_then(|window| (self.child_tree)(window)) {
                children.push(tree);
            }
        } else {
            for &child in dom.children(node) {
                children.extend(self.build_node(child));
            }
        }

        if role == Role::None {
            return children;
        }
        let child_origin = (role == Role::Iframe)
            .then(|| self.frame.iframe_content_origin(node))
            .flatten();
        vec![AccessibilityNode {
            role,
            name: self.name_of(node, role),
            focused: dom.as_element(node).is_some_and(|e| e.focused),
            window: self.frame.window().0,
            node: node.0,
            bounds: self.bounds_of(node),
            children,
            child_origin,
        }]
    }

    /// [HTML-AAM § 3.5](https://www.w3.org/TR/html-aam-1.0/#html-element-role-mappings)
    fn role_of(&self, node: NodeId) -> Role {
        let dom = self.frame.dom();
        match dom.get(node).map(|n| &n.node_type) {
            Some(NodeType::Text(_)) => {
                let parent_focusable = dom
                    .parent(node)
                    .and_then(|parent| dom.as_element(parent))
                    .is_some_and(is_focusable);
                if parent_focusable {
                    Role::FocusableText
                } else {
                    Role::StaticText
                }
            }
            Some(NodeType::Element(element)) => match element.tag_name.as_str() {
                "a" => Role::Link,
                "input" => Role::Textbox,
                "button" => Role::Button,
                "html" => Role::Document,
                "img" => Role::Image,
                "iframe" => Role::Iframe,
                _ if is_focusable(element) => Role::Focusable,
                _ => Role::None,
            },
            _ => Role::None,
        }
    }

    /// [Accessible Name and Description Computation § 4.3](https://www.w3.org/TR/accname-1.2/#mapping_additional_nd_te)
    fn name_of(&self, node: NodeId, role: Role) -> String {
        let dom = self.frame.dom();
        match role {
            Role::Document => "Document".to_string(),
            Role::Link | Role::Button => dom.text_content(node).trim().to_string(),
            Role::Textbox => dom.attribute(node, "value").unwrap_or_default().to_string(),
            Role::Image => dom.attribute(node, "alt").unwrap_or("Image").to_string(),
            Role::Iframe => "Child document".to_string(),
            Role::Focusable => dom.text_content(node).trim().to_string(),
            Role::FocusableText | Role::StaticText => dom.as_text(node).unwrap_or_default().trim().to_string(),
            Role::None => String::new(),
        }
    }

    /// A node with its own layout object takes that object's box. Text and
    /// inline elements take, per line of their block, the union of the
    /// words they produced.
    fn bounds_of(&self, node: NodeId) -> Vec<Rect> {
        if let Some(rect) = self.frame.layout_rect(node) {
            return vec![rect];
        }

        let dom = self.frame.dom();
        let layout = self.frame.layout();
        let graph = self.frame.graph();
        let Some(block) = dom
            .ancestors(node)
            .find_map(|ancestor| dom.get(ancestor).and_then(|n| n.layout_object))
        else {
            return Vec::new();
        };
        let Some(block_node) = layout.get(block) else {
            return Vec::new();
        };
        if block_node.children.is_dirty(graph) {
            return Vec::new();
        }

        let mut bounds = Vec::new();
        for &line in layout.children(graph, block) {
            let Some(line_node) = layout.get(line) else {
                continue;
            };
            if !matches!(line_node.kind, LayoutKind::Line) || line_node.children.is_dirty(graph) {
                continue;
            }
            let mut line_bounds: Option<Rect> = None;
            for &word in layout.children(graph, line) {
                let Some(word_node) = layout.get(word) else {
                    continue;
                };
                if word_node.node == node || dom.is_descendant_of(word_node.node, node) {
                    let rect = word_node.rect(graph);
                    line_bounds = Some(line_bounds.map_or(rect, |acc| acc.union(&rect)));
                }
            }
            bounds.extend(line_bounds);
        }
        bounds
    }
}
