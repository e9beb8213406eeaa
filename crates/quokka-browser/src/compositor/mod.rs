//! The compositor: rasters layers and draws the final frame.
//!
//! # Architecture
//!
//! ```text
//! Tab (main thread)                Compositor
//!   render() ── CommitData ──→  commit()
//!                                  ├─ new display list → LayerTree::build (raster)
//!                                  └─ composited updates → LayerTree::set_blend
//!                               composite() → Pixmap
//! ```
//!
//! The compositor owns no DOM. Everything it knows arrives in a
//! [`CommitData`].

mod canvas;
mod layer;

use std::path::Path;

use anyhow::Context as _;
use log::debug;
use quokka_common::url::Url;
use quokka_css::{Color, DisplayItem};
use quokka_dom::{NodeId, WindowId};
use tiny_skia::{Pixmap, Transform};

pub use layer::{CompositedLayer, LayerTree};

use crate::accessibility::AccessibilityNode;
use crate::commit::CommitData;
use crate::error::CompositorError;

/// Holds the layers of the last committed frame and draws them.
#[derive(Debug)]
pub struct Compositor {
    width: u32,
    height: u32,
    url: Option<Url>,
    scroll: f32,
    document_height: f32,
    dark_mode: bool,
    layers: LayerTree,
    /// Number of times layers were rebuilt and rastered.
    raster_count: usize,
    accessibility: Option<AccessibilityNode>,
    focus: Option<(WindowId, NodeId)>,
}

impl Compositor {
    /// An empty compositor for a `width` by `height` viewport.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            url: None,
            scroll: 0.0,
            document_height: 0.0,
            dark_mode: false,
            layers: LayerTree::default(),
            raster_count: 0,
            accessibility: None,
            focus: None,
        }
    }

    /// Take in a commit from the main thread.
    ///
    /// A new display list rebuilds and rasters the layers. Otherwise the
    /// composited blend ops in the commit are substituted in place and no
    /// layer is rastered again.
    pub fn commit(&mut self, commit: CommitData) {
        self.url = Some(commit.url);
        self.scroll = commit.scroll;
        self.document_height = commit.document_height;
        self.dark_mode = commit.dark_mode;
        self.width = commit.viewport.0.max(0.0) as u32;
        self.height = commit.viewport.1.max(0.0) as u32;
        self.focus = commit.focus;
        if let Some(tree) = commit.accessibility_tree {
            self.accessibility = Some(tree);
        }

        if let Some(display_list) = commit.display_list {
            self.layers = LayerTree::build(&display_list);
            self.raster_count += 1;
            debug!(
                "rastered {} layers for {}",
                self.layers.layers().len(),
                self.url.as_ref().map_or_else(String::new, ToString::to_string)
            );
        } else if let Some(updates) = commit.composited_updates {
            for (key, op) in updates {
                if !self.layers.set_blend(key, op) {
                    debug!("composited update for {key:?} has no layer");
                }
            }
        }
    }

    /// The current layers.
    #[must_use]
    pub fn layers(&self) -> &[CompositedLayer] {
        self.layers.layers()
    }

    /// How many display lists have been rastered.
    #[must_use]
    pub const fn raster_count(&self) -> usize {
        self.raster_count
    }

    /// URL of the last committed page.
    #[must_use]
    pub const fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Root scroll offset of the last commit.
    #[must_use]
    pub const fn scroll(&self) -> f32 {
        self.scroll
    }

    /// Height of the last committed document.
    #[must_use]
    pub const fn document_height(&self) -> f32 {
        self.document_height
    }

    /// The focused element of the last commit.
    #[must_use]
    pub const fn focus(&self) -> Option<(WindowId, NodeId)> {
        self.focus
    }

    /// The last accessibility tree received.
    #[must_use]
    pub const fn accessibility_tree(&self) -> Option<&AccessibilityNode> {
        self.accessibility.as_ref()
    }

    /// The accessibility node under a point in the viewport.
    #[must_use]
    pub fn accessibility_hit_test(&self, x: f32, y: f32) -> Option<&AccessibilityNode> {
        self.accessibility.as_ref()?.hit_test(x, y + self.scroll)
    }

    /// Draw the layers into a frame the size of the viewport.
    ///
    /// # Errors
    ///
    /// Returns [`CompositorError::Allocation`] if the viewport is empty or
    /// too large for a surface.
    pub fn composite(&self) -> Result<Pixmap, CompositorError> {
        let mut pixmap = background(self.width, self.height, self.dark_mode)?;
        self.layers
            .draw(&mut pixmap, Transform::from_translate(0.0, -self.scroll));
        Ok(pixmap)
    }

    /// Composite and save the frame as a PNG.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be drawn or written.
    pub fn save_png(&self, path: &Path) -> anyhow::Result<()> {
        let pixmap = self.composite()?;
        pixmap
            .save_png(path)
            .with_context(|| format!("failed to save screenshot to '{}'", path.display()))
    }
}

fn background(width: u32, height: u32, dark_mode: bool) -> Result<Pixmap, CompositorError> {
    let mut pixmap = Pixmap::new(width, height).ok_or(CompositorError::Allocation { width, height })?;
    let color = if dark_mode { Color::BLACK } else { Color::WHITE };
    pixmap.fill(tiny_skia::Color::from_rgba8(color.r, color.g, color.b, color.a));
    Ok(pixmap)
}

/// Draw a display list directly onto one surface, without layers.
///
/// # Errors
///
/// Returns [`CompositorError::Allocation`] if the surface cannot be
/// allocated.
pub fn draw_display_list(
    display_list: &[DisplayItem],
    width: u32,
    height: u32,
    scroll: f32,
    dark_mode: bool,
) -> Result<Pixmap, CompositorError> {
    let mut pixmap = background(width, height, dark_mode)?;
    canvas::draw_items(&mut pixmap, display_list, Transform::from_translate(0.0, -scroll));
    Ok(pixmap)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use quokka_css::{BlendOp, DrawCommand, EffectKey, Rect, VisualEffect};

    use super::*;

    fn key() -> EffectKey {
        EffectKey {
            window: WindowId(1),
            node: NodeId(2),
        }
    }

    fn commit(display_list: Option<Vec<DisplayItem>>, updates: Option<BTreeMap<EffectKey, BlendOp>>) -> CommitData {
        CommitData {
            url: Url::blank(),
            scroll: 0.0,
            document_height: 100.0,
            viewport: (40.0, 40.0),
            dark_mode: false,
            display_list,
            composited_updates: updates,
            accessibility_tree: None,
            focus: None,
            root_frame_focused: true,
        }
    }

    fn faded(opacity: f32) -> Vec<DisplayItem> {
        vec![
            DrawCommand::rect(Rect::from_xywh(0.0, 0.0, 10.0, 10.0), Color::RED).into(),
            VisualEffect::blend(
                BlendOp::new(opacity, None),
                Some(key()),
                vec![DrawCommand::rect(Rect::from_xywh(5.0, 5.0, 20.0, 20.0), Color::BLACK).into()],
            )
            .into(),
        ]
    }

    fn pixels_close(a: &Pixmap, b: &Pixmap) -> bool {
        a.pixels()
            .iter()
            .zip(b.pixels())
            .all(|(p, q)| {
                p.red().abs_diff(q.red()) <= 2
                    && p.green().abs_diff(q.green()) <= 2
                    && p.blue().abs_diff(q.blue()) <= 2
                    && p.alpha().abs_diff(q.alpha()) <= 2
            })
    }

    #[test]
    fn test_layers_match_flat_draw() {
        let mut compositor = Compositor::new(40, 40);
        compositor.commit(commit(Some(faded(0.5)), None));
        let layered = compositor.composite().unwrap();
        let flat = draw_display_list(&faded(0.5), 40, 40, 0.0, false).unwrap();
        assert!(pixels_close(&layered, &flat));
    }

    #[test]
    fn test_composited_update_skips_raster() {
        let mut compositor = Compositor::new(40, 40);
        compositor.commit(commit(Some(faded(0.5)), None));
        assert_eq!(compositor.raster_count(), 1);

        let updates = BTreeMap::from([(key(), BlendOp::new(0.25, None))]);
        compositor.commit(commit(None, Some(updates)));
        assert_eq!(compositor.raster_count(), 1);

        let flat = draw_display_list(&faded(0.25), 40, 40, 0.0, false).unwrap();
        assert!(pixels_close(&compositor.composite().unwrap(), &flat));
    }

    #[test]
    fn test_dark_background() {
        let mut compositor = Compositor::new(4, 4);
        let mut data = commit(Some(Vec::new()), None);
        data.viewport = (4.0, 4.0);
        data.dark_mode = true;
        compositor.commit(data);
        let pixmap = compositor.composite().unwrap();
        let px = pixmap.pixel(1, 1).unwrap();
        assert_eq!((px.red(), px.green(), px.blue(), px.alpha()), (0, 0, 0, 255));
    }

    #[test]
    fn test_empty_viewport_is_an_error() {
        let compositor = Compositor::new(0, 10);
        assert!(matches!(
            compositor.composite(),
            Err(CompositorError::Allocation { width: 0, height: 10 })
        ));
    }
}
