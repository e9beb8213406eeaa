//! Replaced inline content: inputs, images and iframes.
//!
//! [CSS 2.1 § 10.3.2 Inline, replaced elements](https://www.w3.org/TR/CSS2/visudet.html#inline-replaced-width)

use quokka_common::image::LoadedImage;
use quokka_dom::{LayoutId, WindowId};

use super::{IFRAME_HEIGHT_PX, IFRAME_WIDTH_PX, INPUT_WIDTH_PX, LayoutContext, LayoutKind, LayoutTree, Slot};
use crate::geometry::{dpx, parse_px};
use crate::paint::DisplayItem;

/// Gives layout and paint access to the frames nested in `<iframe>`s.
///
/// The browser implements this over its frame table; tests and frames
/// without iframes use [`NullEmbedHost`].
pub trait EmbedHost {
    /// Whether the child frame has finished loading.
    fn child_frame_loaded(&self, window: WindowId) -> bool;

    /// Set the child frame's viewport to the iframe's content box.
    fn resize_child_frame(&self, window: WindowId, width: f32, height: f32);

    /// The child frame's display list, in its own coordinates.
    fn paint_child_frame(&self, window: WindowId) -> Vec<DisplayItem>;
}

/// An [`EmbedHost`] with no child frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEmbedHost;

impl EmbedHost for NullEmbedHost {
    fn child_frame_loaded(&self, _window: WindowId) -> bool {
        false
    }

    fn resize_child_frame(&self, _window: WindowId, _width: f32, _height: f32) {}

    fn paint_child_frame(&self, _window: WindowId) -> Vec<DisplayItem> {
        Vec::new()
    }
}

impl LayoutTree {
    /// An embed's ascent is its full height: the box sits on the baseline.
    fn finish_embed(&mut self, cx: &mut LayoutContext<'_>, id: LayoutId) {
        let notify = self.field_id(id, Slot::Ascent);
        let height = self.read(cx.graph, id, Slot::Height, notify);
        self.set(cx.graph, id, Slot::Ascent, height);
        self.set(cx.graph, id, Slot::Descent, 0.0);
    }

    pub(crate) fn layout_input(&mut self, cx: &mut LayoutContext<'_>, id: LayoutId) {
        if !self.node(id).layout_needed(cx.graph) {
            return;
        }
        self.place_inline(cx, id);

        let notify = self.field_id(id, Slot::Width);
        let zoom = self.read(cx.graph, id, Slot::Zoom, notify);
        self.set(cx.graph, id, Slot::Width, dpx(INPUT_WIDTH_PX, zoom));

        let notify = self.field_id(id, Slot::Height);
        let height = cx.fonts.linespace(self.node(id).font.read(cx.graph, notify));
        self.set(cx.graph, id, Slot::Height, height);
        self.finish_embed(cx, id);
    }

    /// [§ 10.3.2](https://www.w3.org/TR/CSS2/visudet.html#inline-replaced-width)
    ///
    /// "if 'width' has a computed value of 'auto', and the element has an
    /// intrinsic ratio, then the used value of 'width' is: (used height) *
    /// (intrinsic ratio)"
    pub(crate) fn layout_image(&mut self, cx: &mut LayoutContext<'_>, id: LayoutId) {
        if !self.node(id).layout_needed(cx.graph) {
            return;
        }
        self.place_inline(cx, id);

        let dom_node = self.node(id).node;
        let width_attr = cx.dom.attribute(dom_node, "width").and_then(parse_px);
        let height_attr = cx.dom.attribute(dom_node, "height").and_then(parse_px);
        let (intrinsic_width, intrinsic_height) = cx
            .dom
            .as_element(dom_node)
            .and_then(|e| e.image.as_ref())
            .map_or_else(|| LoadedImage::broken().dimensions_f32(), |image| image.dimensions_f32());
        let aspect_ratio = if intrinsic_height > 0.0 {
            intrinsic_width / intrinsic_height
        } else {
            1.0
        };

        let notify = self.field_id(id, Slot::Width);
        let zoom = self.read(cx.graph, id, Slot::Zoom, notify);
        let (width, image_height) = match (width_attr, height_attr) {
            (Some(w), Some(h)) => (dpx(w, zoom), dpx(h, zoom)),
            (Some(w), None) => (dpx(w, zoom), dpx(w, zoom) / aspect_ratio),
            (None, Some(h)) => (dpx(h, zoom) * aspect_ratio, dpx(h, zoom)),
            (None, None) => (dpx(intrinsic_width, zoom), dpx(intrinsic_height, zoom)),
        };
        self.set(cx.graph, id, Slot::Width, width);
        if let LayoutKind::Image { image_height: stored } = &mut self.node_mut(id).kind {
            *stored = image_height;
        }

        let notify = self.field_id(id, Slot::Height);
        let _ = self.read(cx.graph, id, Slot::Zoom, notify);
        let linespace = cx.fonts.linespace(self.node(id).font.read(cx.graph, notify));
        self.set(cx.graph, id, Slot::Height, image_height.max(linespace));
        self.finish_embed(cx, id);
    }

    /// The iframe box is the content size plus a one-pixel border on each
    /// side. A loaded child frame gets its viewport resized to the content
    /// size.
    pub(crate) fn layout_iframe(&mut self, cx: &mut LayoutContext<'_>, id: LayoutId) {
        if !self.node(id).layout_needed(cx.graph) {
            return;
        }
        self.place_inline(cx, id);

        let dom_node = self.node(id).node;
        let width_attr = cx.dom.attribute(dom_node, "width").and_then(parse_px);
        let height_attr = cx.dom.attribute(dom_node, "height").and_then(parse_px);

        let notify = self.field_id(id, Slot::Width);
        let zoom = self.read(cx.graph, id, Slot::Zoom, notify);
        let width = dpx(width_attr.unwrap_or(IFRAME_WIDTH_PX) + 2.0, zoom);
        self.set(cx.graph, id, Slot::Width, width);

        let notify = self.field_id(id, Slot::Height);
        let zoom = self.read(cx.graph, id, Slot::Zoom, notify);
        let height = dpx(height_attr.unwrap_or(IFRAME_HEIGHT_PX) + 2.0, zoom);
        self.set(cx.graph, id, Slot::Height, height);

        let child_frame = cx.dom.as_element(dom_node).and_then(|e| e.frame);
        if let Some(window) = child_frame {
            if cx.host.child_frame_loaded(window) {
                let border = dpx(2.0, zoom);
                cx.host.resize_child_frame(window, width - border, height - border);
            }
        }
        self.finish_embed(cx, id);
    }
}
