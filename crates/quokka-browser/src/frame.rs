//! One document in a tab, top-level or nested in an `<iframe>`.
//!
//! [§ 7.3 Browsing contexts](https://html.spec.whatwg.org/multipage/document-sequences.html#windows)
//!
//! A [`Frame`] owns the DOM, the dirty-field graph, the layout tree and the
//! sorted rule list of its document, plus the dirty flags that tell the
//! scheduler which pipeline steps still have to run. Script runtimes and
//! child frames live in the tab, keyed by [`WindowId`].

use log::{debug, info, warn};
use quokka_common::image::LoadedImage;
use quokka_common::net::{Fetcher, Request, Response, percent_encode};
use quokka_common::url::{Origin, Url};
use quokka_css::layout::VSTEP;
use quokka_css::ua_stylesheet::default_rules;
use quokka_css::{
    DisplayItem, EmbedHost, FontMetrics, LayoutContext, LayoutTree, Painter, Rect, Rule, StyleOutcome,
    StyleResolver, StylesheetSource, collect_stylesheet_sources, dpx, parse_selector, parse_stylesheet,
    sort_rules,
};
use quokka_dom::{DirtyGraph, DomTree, ElementData, NodeId, NodeType, Property, WindowId};
use quokka_js::BridgeError;

use crate::config::SCROLL_STEP;
use crate::csp::ContentSecurityPolicy;
use crate::image_loader::ImageLoaderPipeline;
use crate::task::DiscardFlag;

/// Where a frame is in its load.
///
/// Transitions only go forward; a new load restarts at `Loading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Nothing loaded yet, or the last load failed.
    Unloaded,
    /// Fetching and parsing the document.
    Loading,
    /// The document is installed.
    Loaded,
}

/// Network access for a load.
#[derive(Clone, Copy)]
pub struct Loader<'a> {
    /// Fetches the document's sub-resources.
    pub fetcher: &'a dyn Fetcher,
    /// Decodes `<img>` sources.
    pub images: &'a ImageLoaderPipeline,
}

/// A script found while installing a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSource {
    /// The script's URL, or `inline script` for `<script>` text.
    pub label: String,
    /// The source text.
    pub source: String,
}

/// What the tab still has to do after a document is installed.
#[derive(Debug, Default)]
pub struct Subresources {
    /// Scripts to run, in document order.
    pub scripts: Vec<ScriptSource>,
    /// `<iframe>` elements and the documents to load into them.
    pub iframes: Vec<(NodeId, Url)>,
}

/// Per-frame state: document, rendering trees and dirty flags.
pub struct Frame {
    window: WindowId,
    parent: Option<WindowId>,
    url: Url,
    state: LoadState,
    csp: ContentSecurityPolicy,
    dom: DomTree,
    graph: DirtyGraph,
    layout: LayoutTree,
    rules: Vec<Rule>,
    viewport_width: f32,
    viewport_height: f32,
    scroll: f32,
    /// The document's styles must be recomputed.
    pub(crate) needs_style: bool,
    /// The layout tree has dirty fields.
    pub(crate) needs_layout: bool,
    /// The display list is stale.
    pub(crate) needs_paint: bool,
    discard_flag: Option<DiscardFlag>,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("window", &self.window)
            .field("parent", &self.parent)
            .field("url", &self.url.to_string())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Frame {
    /// An unloaded frame showing `about:blank`.
    #[must_use]
    pub fn new(window: WindowId, parent: Option<WindowId>, width: f32, height: f32) -> Self {
        let mut dom = DomTree::new();
        let mut graph = DirtyGraph::new();
        let layout = LayoutTree::new(&mut dom, &mut graph);
        Self {
            window,
            parent,
            url: Url::blank(),
            state: LoadState::Unloaded,
            csp: ContentSecurityPolicy::allow_all(),
            dom,
            graph,
            layout,
            rules: default_rules().to_vec(),
            viewport_width: width,
            viewport_height: height,
            scroll: 0.0,
            needs_style: true,
            needs_layout: true,
            needs_paint: true,
            discard_flag: None,
        }
    }

    /// This frame's window id.
    #[must_use]
    pub const fn window(&self) -> WindowId {
        self.window
    }

    /// The embedding frame, for iframes.
    #[must_use]
    pub const fn parent(&self) -> Option<WindowId> {
        self.parent
    }

    /// The document's URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// The document's origin.
    #[must_use]
    pub fn origin(&self) -> Origin {
        self.url.origin()
    }

    /// Load progress.
    #[must_use]
    pub const fn state(&self) -> LoadState {
        self.state
    }

    /// Whether a document is installed.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.state == LoadState::Loaded
    }

    /// The document.
    #[must_use]
    pub const fn dom(&self) -> &DomTree {
        &self.dom
    }

    /// The dependency graph of the document's style and layout fields.
    #[must_use]
    pub const fn graph(&self) -> &DirtyGraph {
        &self.graph
    }

    /// The layout tree.
    #[must_use]
    pub const fn layout(&self) -> &LayoutTree {
        &self.layout
    }

    /// The document's sub-resource policy.
    #[must_use]
    pub const fn csp(&self) -> &ContentSecurityPolicy {
        &self.csp
    }

    /// Viewport size in device pixels.
    #[must_use]
    pub const fn viewport(&self) -> (f32, f32) {
        (self.viewport_width, self.viewport_height)
    }

    /// Vertical scroll offset.
    #[must_use]
    pub const fn scroll(&self) -> f32 {
        self.scroll
    }

    /// Whether any pipeline step is pending for this frame.
    #[must_use]
    pub const fn needs_render(&self) -> bool {
        self.needs_style || self.needs_layout || self.needs_paint
    }

    /// Discard flag of the frame's current script runtime.
    #[must_use]
    pub fn discard_flag(&self) -> Option<DiscardFlag> {
        self.discard_flag.clone()
    }

    pub(crate) fn set_discard_flag(&mut self, flag: Option<DiscardFlag>) {
        self.discard_flag = flag;
    }

    /// Resolve `href` against the document URL, logging failures.
    #[must_use]
    pub fn resolve(&self, href: &str) -> Option<Url> {
        match self.url.resolve(href) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("ignoring '{href}' in {}: {e}", self.url);
                None
            }
        }
    }

    /// [§ 7.4.2.2 Beginning navigation](https://html.spec.whatwg.org/multipage/browsing-the-web.html#beginning-navigation)
    pub(crate) fn begin_load(&mut self) {
        self.state = LoadState::Loading;
        self.scroll = 0.0;
    }

    /// The document fetch failed: the frame shows nothing.
    pub(crate) fn fail_load(&mut self) {
        self.state = LoadState::Unloaded;
    }

    /// [§ 7.4.6 Populating a session history entry](https://html.spec.whatwg.org/multipage/browsing-the-web.html#populating-a-session-history-entry)
    ///
    /// Replace the frame's document with the one in `response`: read the
    /// policy, parse, gather stylesheets and decode images synchronously,
    /// and hand scripts and iframes back to the tab.
    pub(crate) fn install(&mut self, url: Url, response: &Response, loader: Loader<'_>) -> Subresources {
        info!("loading {url} into window {}", self.window.0);
        self.url = url;

        // STEP 1: Content-Security-Policy.
        self.csp = response
            .header("content-security-policy")
            .map_or_else(ContentSecurityPolicy::allow_all, ContentSecurityPolicy::parse);

        // STEP 2: Parse into a fresh graph; the old document's fields go
        // with the old graph.
        self.dom = quokka_html::parse_document(&response.text());
        self.graph = DirtyGraph::new();

        // STEP 3: Stylesheets, in document order after the user-agent rules.
        let mut rules = default_rules().to_vec();
        for source in collect_stylesheet_sources(&self.dom) {
            match source {
                StylesheetSource::Inline { css } => rules.extend(parse_stylesheet(&css)),
                StylesheetSource::External { href } => {
                    if let Some(css) = self.fetch_subresource(&href, loader.fetcher) {
                        rules.extend(parse_stylesheet(&css));
                    }
                }
            }
        }
        sort_rules(&mut rules);
        self.rules = rules;

        // STEP 4: Images.
        self.load_images(loader);

        // STEP 5: Iframes and scripts.
        let mut subresources = Subresources::default();
        for node in self.dom.descendants(self.dom.root()) {
            match self.dom.tag_name(node) {
                Some("iframe") => {
                    let Some(src) = self.dom.attribute(node, "src") else {
                        continue;
                    };
                    let Some(child_url) = self.resolve(src) else {
                        continue;
                    };
                    if !self.csp.allows(&child_url) {
                        info!("blocked iframe {child_url} due to Content-Security-Policy");
                        continue;
                    }
                    subresources.iframes.push((node, child_url));
                }
                Some("script") => {
                    let script = match self.dom.attribute(node, "src").map(str::to_string) {
                        Some(src) => self
                            .fetch_subresource(&src, loader.fetcher)
                            .map(|source| ScriptSource { label: src, source }),
                        None => Some(ScriptSource {
                            label: "inline script".to_string(),
                            source: self.dom.text_content(node),
                        }),
                    };
                    if let Some(script) = script.filter(|s| !s.source.trim().is_empty()) {
                        subresources.scripts.push(script);
                    }
                }
                _ => {}
            }
        }

        // STEP 6: Fresh layout tree.
        self.layout = LayoutTree::new(&mut self.dom, &mut self.graph);
        self.needs_style = true;
        self.needs_layout = true;
        self.needs_paint = true;
        self.state = LoadState::Loaded;
        subresources
    }

    /// Resolve, check against the policy and fetch a stylesheet or script.
    /// Failures are logged and yield `None`.
    fn fetch_subresource(&self, href: &str, fetcher: &dyn Fetcher) -> Option<String> {
        let url = self.resolve(href)?;
        if !self.csp.allows(&url) {
            info!("blocked {url} due to Content-Security-Policy");
            return None;
        }
        let request = Request::get(url.clone()).with_referrer(Some(&self.url));
        match fetcher.fetch(&request) {
            Ok(response) => Some(response.text()),
            Err(e) => {
                warn!("failed to load {url}: {e}");
                None
            }
        }
    }

    /// [§ 4.8.4.3 Updating the image data](https://html.spec.whatwg.org/multipage/images.html#updating-the-image-data)
    fn load_images(&mut self, loader: Loader<'_>) {
        let images: Vec<(NodeId, Option<Url>)> = self
            .dom
            .descendants(self.dom.root())
            .into_iter()
            .filter(|&node| self.dom.tag_name(node) == Some("img"))
            .map(|node| {
                let url = self.dom.attribute(node, "src").and_then(|src| self.resolve(src));
                (node, url)
            })
            .collect();
        for (node, url) in images {
            let image = match url {
                Some(url) if self.csp.allows(&url) => loader.images.load(loader.fetcher, &url, &self.url),
                Some(url) => {
                    info!("blocked image {url} due to Content-Security-Policy");
                    LoadedImage::broken()
                }
                None => LoadedImage::broken(),
            };
            if let Some(element) = self.dom.as_element_mut(node) {
                element.image = Some(image);
            }
        }
    }

    /// Run the style resolver if needed.
    pub(crate) fn restyle(&mut self, dark_mode: bool) -> Option<StyleOutcome> {
        if !self.needs_style {
            return None;
        }
        let outcome = StyleResolver::new(&self.rules, dark_mode).resolve(&mut self.dom, &mut self.graph);
        self.needs_style = false;
        self.needs_layout = true;
        Some(outcome)
    }

    /// Run layout if needed. Returns whether it ran.
    pub(crate) fn relayout(&mut self, fonts: &dyn FontMetrics, host: &dyn EmbedHost, zoom: f32) -> bool {
        if !self.needs_layout {
            return false;
        }
        let mut cx = LayoutContext {
            dom: &mut self.dom,
            graph: &mut self.graph,
            fonts,
            host,
        };
        let visited = self.layout.layout(&mut cx, self.viewport_width, zoom);
        debug!(
            "layout of window {} {}",
            self.window.0,
            if visited { "ran" } else { "was clean" }
        );
        self.needs_layout = false;
        self.needs_paint = true;
        true
    }

    /// Paint the laid-out document.
    ///
    /// # Panics
    ///
    /// Panics if layout is not up to date.
    #[must_use]
    pub fn paint(&self, fonts: &dyn FontMetrics, host: &dyn EmbedHost) -> Vec<DisplayItem> {
        Painter::new(&self.layout, &self.dom, &self.graph, fonts, host, self.window).paint()
    }

    /// Height of the laid-out document.
    #[must_use]
    pub fn document_height(&self) -> f32 {
        self.layout.document_height(&self.graph)
    }

    /// Resize the viewport. Returns whether the size changed.
    pub(crate) fn set_viewport(&mut self, width: f32, height: f32) -> bool {
        if (self.viewport_width, self.viewport_height) == (width, height) {
            return false;
        }
        self.viewport_width = width;
        self.viewport_height = height;
        self.layout.mark_viewport_dirty(&mut self.graph);
        self.needs_layout = true;
        true
    }

    /// Keep the scroll offset inside the document. Returns whether it moved.
    pub(crate) fn clamp_scroll(&mut self) -> bool {
        let max_scroll = (self.document_height() + 2.0 * VSTEP - self.viewport_height).max(0.0);
        let clamped = self.scroll.clamp(0.0, max_scroll);
        let changed = clamped != self.scroll;
        self.scroll = clamped;
        changed
    }

    /// Scroll by `delta` and clamp.
    pub(crate) fn scroll_by(&mut self, delta: f32) -> bool {
        let before = self.scroll;
        self.scroll += delta;
        let _ = self.clamp_scroll();
        self.scroll != before
    }

    /// Scroll so that `node` is in view, one scroll step below the top.
    /// Returns whether the offset changed.
    pub(crate) fn scroll_into_view(&mut self, node: NodeId) -> bool {
        let Some(rect) = self.layout_rect(node) else {
            return false;
        };
        if self.scroll < rect.top && rect.top < self.scroll + self.viewport_height {
            return false;
        }
        let before = self.scroll;
        self.scroll = rect.top - SCROLL_STEP;
        let _ = self.clamp_scroll();
        self.scroll != before
    }

    /// Mark every style cell dirty, e.g. after switching colour scheme.
    pub(crate) fn invalidate_styles(&mut self) {
        for node in self.dom.descendants(self.dom.root()) {
            if let Some(style) = self.dom.get(node).and_then(|n| n.style.as_ref()) {
                style.mark_all(&mut self.graph);
            }
        }
        self.needs_style = true;
    }

    /// Mark the styles of `node` and its descendants dirty.
    fn invalidate_subtree_styles(&mut self, node: NodeId) {
        for id in self.dom.descendants(node) {
            if let Some(style) = self.dom.get(id).and_then(|n| n.style.as_ref()) {
                style.mark_all(&mut self.graph);
            }
        }
        self.needs_style = true;
    }

    /// The element that is topmost at a point in document coordinates.
    #[must_use]
    pub fn hit_test(&self, x: f32, y: f32) -> Option<NodeId> {
        self.layout
            .hit_test(&self.graph, x, y)
            .last()
            .map(|&(_, node)| node)
    }

    /// The layout rectangle of `node`'s layout object, if it has one.
    ///
    /// `None` while a restyle or relayout is pending.
    #[must_use]
    pub fn layout_rect(&self, node: NodeId) -> Option<Rect> {
        if self.needs_style || self.needs_layout {
            return None;
        }
        let id = self.dom.get(node)?.layout_object?;
        Some(self.layout.get(id)?.rect(&self.graph))
    }

    /// Top-left of an iframe's content box, inside its 1px border.
    #[must_use]
    pub fn iframe_content_origin(&self, node: NodeId) -> Option<(f32, f32)> {
        if self.needs_style || self.needs_layout {
            return None;
        }
        let id = self.dom.get(node)?.layout_object?;
        let layout = self.layout.get(id)?;
        let rect = layout.rect(&self.graph);
        let border = dpx(1.0, *layout.zoom.get(&self.graph));
        Some((rect.left + border, rect.top + border))
    }

    /// Record the child frame shown by the `<iframe>` `node`.
    pub(crate) fn attach_child_frame(&mut self, node: NodeId, child: WindowId) {
        if let Some(element) = self.dom.as_element_mut(node) {
            element.frame = Some(child);
        }
    }

    /// The `<iframe>` element showing `child`.
    #[must_use]
    pub fn iframe_element(&self, child: WindowId) -> Option<NodeId> {
        self.dom
            .descendants(self.dom.root())
            .into_iter()
            .find(|&node| self.dom.as_element(node).is_some_and(|e| e.frame == Some(child)))
    }

    /// A child frame finished loading: its iframe's box must be laid out
    /// again so the child learns its viewport size.
    pub(crate) fn child_frame_loaded(&mut self, child: WindowId) {
        if let Some(node) = self.iframe_element(child) {
            self.layout.mark_embed_size_dirty(&self.dom, &mut self.graph, node);
            self.needs_layout = true;
        }
    }

    // ----- Script bridge --------------------------------------------------

    /// [§ 4.2.6 querySelectorAll](https://dom.spec.whatwg.org/#dom-parentnode-queryselectorall)
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::BadSelector`] if `selector` does not parse.
    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>, BridgeError> {
        let parsed = parse_selector(selector).ok_or_else(|| BridgeError::BadSelector(selector.to_string()))?;
        Ok(self
            .dom
            .descendants(self.dom.root())
            .into_iter()
            .filter(|&node| parsed.matches(&self.dom, node))
            .collect())
    }

    /// [§ 4.9 getAttribute](https://dom.spec.whatwg.org/#dom-element-getattribute)
    #[must_use]
    pub fn get_attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.dom.attribute(node, name).map(str::to_string)
    }

    /// [§ 4.9 setAttribute](https://dom.spec.whatwg.org/#dom-element-setattribute)
    ///
    /// Invalidates whatever the attribute feeds: the size of an image or
    /// iframe, the node's style, or just the paint.
    pub(crate) fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        let Some(element) = self.dom.as_element_mut(node) else {
            return;
        };
        let _ = element.attrs.insert(name.to_string(), value.to_string());
        let tag = element.tag_name.clone();

        match name {
            "width" | "height" if tag == "img" || tag == "iframe" => {
                self.layout.mark_embed_size_dirty(&self.dom, &mut self.graph, node);
                self.needs_layout = true;
            }
            "style" => {
                if let Some(style) = self.dom.get(node).and_then(|n| n.style.as_ref()) {
                    style.mark_all(&mut self.graph);
                }
                self.needs_style = true;
            }
            "class" | "id" => self.invalidate_subtree_styles(node),
            _ => self.needs_paint = true,
        }
    }

    /// [DOM Parsing § 2.3 innerHTML](https://w3c.github.io/DOM-Parsing/#dom-innerhtml-innerhtml)
    ///
    /// "Let fragment be the result of invoking the fragment parsing
    /// algorithm with the new value as markup"
    pub(crate) fn set_inner_html(&mut self, node: NodeId, html: &str) {
        if self.dom.as_element(node).is_none() {
            return;
        }

        // STEP 1: Detach the old children and free their style cells.
        for child in self.dom.remove_all_children(node) {
            for id in self.dom.descendants(child) {
                if let Some(style) = self.dom.get_mut(id).and_then(|n| n.style.take()) {
                    style.release(&mut self.graph);
                }
            }
        }

        // STEP 2: Graft the parsed fragment.
        let fragment = quokka_html::parse_fragment(html);
        if let Some(body) = fragment.body() {
            for &child in fragment.children(body) {
                let _ = self.dom.import_subtree(&fragment, child, node);
            }
        }

        // STEP 3: The block laying out `node` rebuilds its children.
        self.layout.mark_children_dirty(&self.dom, &mut self.graph, node);
        self.needs_style = true;
        self.needs_layout = true;
    }

    /// `element.style = css`: replace the inline style.
    pub(crate) fn set_style(&mut self, node: NodeId, css: &str) {
        self.set_attribute(node, "style", css);
    }

    // ----- Focus and editing ----------------------------------------------

    /// Set or clear focus on `node`. `:focus` rules may apply, so its
    /// style is recomputed.
    pub(crate) fn set_focused(&mut self, node: NodeId, focused: bool) {
        let Some(element) = self.dom.as_element_mut(node) else {
            return;
        };
        element.focused = focused;
        if let Some(style) = self.dom.get(node).and_then(|n| n.style.as_ref()) {
            style.mark_all(&mut self.graph);
            self.needs_style = true;
        }
        self.needs_paint = true;
    }

    /// [§ 4.10.5.1.2 Text state](https://html.spec.whatwg.org/multipage/input.html#text-(type=text)-state-and-search-state-(type=search))
    ///
    /// Clear an input's value, as a click into it does.
    pub(crate) fn clear_input(&mut self, node: NodeId) {
        if let Some(element) = self.dom.as_element_mut(node) {
            let _ = element.attrs.insert("value".to_string(), String::new());
            self.needs_paint = true;
        }
    }

    /// Type `ch` into `node`: appended to an input's value, or to the last
    /// text of a `contenteditable` element.
    pub(crate) fn insert_text(&mut self, node: NodeId, ch: char) {
        let Some(element) = self.dom.as_element_mut(node) else {
            return;
        };
        if element.tag_name == "input" {
            element.attrs.entry("value".to_string()).or_default().push(ch);
            self.needs_paint = true;
            return;
        }
        if !element.attrs.contains_key("contenteditable") {
            return;
        }

        let last_text = self
            .dom
            .descendants(node)
            .into_iter()
            .rev()
            .find(|&id| self.dom.as_text(id).is_some());
        match last_text.and_then(|id| self.dom.as_text_mut(id)) {
            Some(text) => text.push(ch),
            None => {
                let text = self.dom.alloc(NodeType::Text(ch.to_string()));
                self.dom.append_child(node, text);
                self.needs_style = true;
            }
        }
        self.layout.mark_children_dirty(&self.dom, &mut self.graph, node);
        self.needs_layout = true;
    }

    /// Elements that take part in sequential focus navigation, in the
    /// order Tab visits them.
    #[must_use]
    pub fn focus_order(&self) -> Vec<NodeId> {
        let mut focusable: Vec<(i64, NodeId)> = self
            .dom
            .descendants(self.dom.root())
            .into_iter()
            .filter_map(|node| {
                let element = self.dom.as_element(node)?;
                is_focusable(element).then(|| (tab_index(element), node))
            })
            .collect();
        // Stable: ties keep document order.
        focusable.sort_by_key(|&(index, _)| index);
        focusable.into_iter().map(|(_, node)| node).collect()
    }

    /// The link target of `node`, an `<a href>`.
    #[must_use]
    pub fn link_target(&self, node: NodeId) -> Option<Url> {
        if self.dom.tag_name(node) != Some("a") {
            return None;
        }
        let href = self.dom.attribute(node, "href")?;
        self.resolve(href)
    }

    /// The nearest `<form action>` containing `node`.
    #[must_use]
    pub fn form_of(&self, node: NodeId) -> Option<NodeId> {
        std::iter::once(node)
            .chain(self.dom.ancestors(node))
            .find(|&id| self.dom.tag_name(id) == Some("form") && self.dom.attribute(id, "action").is_some())
    }

    /// [§ 4.10.21.3 Form submission algorithm](https://html.spec.whatwg.org/multipage/form-control-infrastructure.html#form-submission-algorithm)
    ///
    /// "Let entry list be the result of constructing the entry list with
    /// form." Every named `<input>` contributes `name=value`, percent-encoded
    /// and joined with `&`. Returns the action URL and the body.
    #[must_use]
    pub fn form_submission(&self, form: NodeId) -> Option<(Url, String)> {
        let action = self.resolve(self.dom.attribute(form, "action")?)?;
        let body = self
            .dom
            .descendants(form)
            .into_iter()
            .filter_map(|node| {
                let element = self.dom.as_element(node)?;
                if element.tag_name != "input" {
                    return None;
                }
                let name = element.attr("name")?;
                let value = element.attr("value").unwrap_or_default();
                Some(format!("{}={}", percent_encode(name), percent_encode(value)))
            })
            .collect::<Vec<_>>()
            .join("&");
        Some((action, body))
    }

    // ----- Animations -----------------------------------------------------

    /// Whether any node has a running animation.
    #[must_use]
    pub fn has_animations(&self) -> bool {
        self.attached_nodes()
            .into_iter()
            .any(|node| self.dom.get(node).is_some_and(|n| !n.animations.is_empty()))
    }

    fn attached_nodes(&self) -> Vec<NodeId> {
        self.dom.descendants(self.dom.root())
    }

    /// [CSS Transitions § 3](https://www.w3.org/TR/css-transitions-1/#starting)
    ///
    /// Advance every running animation by one frame and store the new
    /// values. Finished animations are dropped.
    pub(crate) fn tick_animations(&mut self) -> AnimationTick {
        let mut tick = AnimationTick::default();
        for node in self.attached_nodes() {
            let Some(entry) = self.dom.get_mut(node) else {
                continue;
            };
            if entry.animations.is_empty() {
                continue;
            }
            let mut finished = Vec::new();
            for (&property, animation) in &mut entry.animations {
                match animation.animate() {
                    Some(value) => {
                        if let Some(style) = entry.style.as_mut() {
                            style.field_mut(property).set(&mut self.graph, value);
                        }
                        if property == Property::Opacity {
                            tick.composited.push(node);
                        } else {
                            tick.needs_paint = true;
                        }
                    }
                    None => finished.push(property),
                }
                if animation.is_finished() {
                    finished.push(property);
                }
            }
            for property in finished {
                let _ = entry.animations.remove(&property);
            }
        }
        tick.composited.dedup();
        if tick.needs_paint {
            self.needs_paint = true;
        }
        tick
    }
}

/// What one animation frame changed in a frame.
#[derive(Debug, Default)]
pub struct AnimationTick {
    /// Nodes whose opacity moved; the compositor can apply these alone.
    pub composited: Vec<NodeId>,
    /// A non-composited property moved.
    pub needs_paint: bool,
}

/// [§ 6.6.3 The tabindex attribute](https://html.spec.whatwg.org/multipage/interaction.html#attr-tabindex)
///
/// Elements without a positive `tabindex` come after those with one.
fn tab_index(element: &ElementData) -> i64 {
    match element.attr("tabindex").map(|v| v.trim().parse::<i64>()) {
        Some(Ok(0)) | None => 9_999_999,
        Some(Ok(index)) => index,
        Some(Err(_)) => 9_999_999,
    }
}

/// [§ 6.6.2 Data model](https://html.spec.whatwg.org/multipage/interaction.html#focusable-area)
///
/// Links, inputs, buttons, `contenteditable` elements and anything with a
/// non-negative `tabindex`.
#[must_use]
pub fn is_focusable(element: &ElementData) -> bool {
    if tab_index(element) < 0 {
        return false;
    }
    element.attrs.contains_key("tabindex")
        || element.attrs.contains_key("contenteditable")
        || matches!(element.tag_name.as_str(), "a" | "input" | "button")
}

#[cfg(test)]
mod tests {
    use quokka_common::net::MemoryFetcher;
    use quokka_css::{ApproximateFontMetrics, NullEmbedHost};

    use super::*;

    fn loaded(html: &str) -> Frame {
        let fetcher = MemoryFetcher::new();
        let images = ImageLoaderPipeline::new();
        let mut frame = Frame::new(WindowId::next(), None, 800.0, 600.0);
        frame.begin_load();
        let url = Url::parse("https://a.test/").unwrap();
        let _ = frame.install(
            url,
            &Response::ok(html),
            Loader {
                fetcher: &fetcher,
                images: &images,
            },
        );
        render(&mut frame);
        frame
    }

    fn render(frame: &mut Frame) {
        let _ = frame.restyle(false);
        let _ = frame.relayout(&ApproximateFontMetrics, &NullEmbedHost, 1.0);
    }

    fn element(frame: &Frame, tag: &str) -> NodeId {
        frame
            .dom()
            .descendants(frame.dom().root())
            .into_iter()
            .find(|&n| frame.dom().tag_name(n) == Some(tag))
            .unwrap()
    }

    #[test]
    fn test_new_frame_is_unloaded_blank() {
        let mut frame = Frame::new(WindowId::next(), None, 800.0, 600.0);
        assert_eq!(frame.state(), LoadState::Unloaded);
        assert_eq!(frame.url().to_string(), "about:blank");
        render(&mut frame);
        assert_eq!(frame.document_height(), 0.0);
    }

    #[test]
    fn test_install_collects_scripts_and_iframes() {
        let fetcher = MemoryFetcher::new().with_body("https://a.test/x.js", "var x = 1;");
        let images = ImageLoaderPipeline::new();
        let mut frame = Frame::new(WindowId::next(), None, 800.0, 600.0);
        let subresources = frame.install(
            Url::parse("https://a.test/").unwrap(),
            &Response::ok(
                "<script src=x.js></script><script>var y;</script><script>  </script><iframe src=child.html></iframe>",
            ),
            Loader {
                fetcher: &fetcher,
                images: &images,
            },
        );
        let labels: Vec<&str> = subresources.scripts.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, ["x.js", "inline script"]);
        assert_eq!(subresources.iframes.len(), 1);
        assert_eq!(subresources.iframes[0].1.to_string(), "https://a.test/child.html");
        assert!(frame.is_loaded());
    }

    #[test]
    fn test_scroll_is_clamped_to_document() {
        let mut frame = loaded("<p>short</p>");
        assert!(!frame.scroll_by(100.0));
        assert_eq!(frame.scroll(), 0.0);
    }

    #[test]
    fn test_set_attribute_invalidates_embed_size() {
        let mut frame = loaded("<img width=10 height=10>");
        let img = element(&frame, "img");
        frame.set_attribute(img, "width", "40");
        assert!(frame.needs_layout);
        assert!(frame.layout_rect(img).is_none());
        render(&mut frame);
        let rect = frame.layout_rect(img).unwrap();
        assert_eq!(rect.width(), 40.0);
    }

    #[test]
    fn test_inner_html_replaces_children() {
        let mut frame = loaded("<div>old</div>");
        let div = element(&frame, "div");
        frame.set_inner_html(div, "<b>new</b> text");
        assert_eq!(frame.dom().text_content(div), "new text");
        render(&mut frame);
        assert_eq!(frame.layout().dirty_field_count(frame.graph()), 0);
    }

    #[test]
    fn test_query_selector_all() {
        let frame = loaded("<p class=a>1</p><p>2</p><div><p class=a>3</p></div>");
        assert_eq!(frame.query_selector_all("p").unwrap().len(), 3);
        assert_eq!(frame.query_selector_all(".a").unwrap().len(), 2);
        assert!(matches!(
            frame.query_selector_all("p["),
            Err(BridgeError::BadSelector(_))
        ));
    }

    #[test]
    fn test_typing_into_input_and_contenteditable() {
        let mut frame = loaded("<input><div contenteditable></div>");
        let input = element(&frame, "input");
        frame.insert_text(input, 'a');
        frame.insert_text(input, 'b');
        assert_eq!(frame.get_attribute(input, "value").as_deref(), Some("ab"));

        let div = element(&frame, "div");
        frame.insert_text(div, 'x');
        frame.insert_text(div, 'y');
        assert_eq!(frame.dom().text_content(div), "xy");
    }

    #[test]
    fn test_focus_order_ties_keep_document_order() {
        let frame = loaded("<a href=/1 id=a>a</a><button id=b>b</button><a tabindex=2 id=c>c</a><a tabindex=1 id=d>d</a><p tabindex=-1>p</p>");
        let ids: Vec<&str> = frame
            .focus_order()
            .into_iter()
            .filter_map(|n| frame.dom().attribute(n, "id"))
            .collect();
        assert_eq!(ids, ["d", "c", "a", "b"]);
    }

    #[test]
    fn test_form_submission_body() {
        let frame = loaded(
            "<form action=/submit><input name=topic value='a b'><input name=x value='1&2'><input value=skip><button>Go</button></form>",
        );
        let button = element(&frame, "button");
        let form = frame.form_of(button).unwrap();
        let (url, body) = frame.form_submission(form).unwrap();
        assert_eq!(url.to_string(), "https://a.test/submit");
        assert_eq!(body, "topic=a%20b&x=1%262");
    }

    #[test]
    fn test_link_target_resolves() {
        let frame = loaded("<a href=next.html>next</a>");
        let a = element(&frame, "a");
        assert_eq!(frame.link_target(a).unwrap().to_string(), "https://a.test/next.html");
    }
}
