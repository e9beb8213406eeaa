//! What the main thread hands the compositor after a render.

use std::collections::BTreeMap;

use quokka_common::url::Url;
use quokka_css::{BlendOp, DisplayItem, EffectKey};
use quokka_dom::{NodeId, WindowId};

use crate::accessibility::AccessibilityNode;

/// An immutable snapshot of one rendered frame of the tab.
///
/// Moved (not shared) to the compositor thread.
#[derive(Debug, Clone)]
pub struct CommitData {
    /// URL of the root document.
    pub url: Url,
    /// Root frame scroll offset.
    pub scroll: f32,
    /// Height of the root document.
    pub document_height: f32,
    /// Viewport size in device pixels.
    pub viewport: (f32, f32),
    /// Paint the page background dark.
    pub dark_mode: bool,
    /// A new display list, when the page was repainted. `None` keeps the
    /// compositor's current one.
    pub display_list: Option<Vec<DisplayItem>>,
    /// Blend ops to substitute in the existing layer tree when only
    /// composited properties changed. `None` when a new display list is
    /// sent or nothing changed.
    pub composited_updates: Option<BTreeMap<EffectKey, BlendOp>>,
    /// The rebuilt accessibility tree, if layout ran.
    pub accessibility_tree: Option<AccessibilityNode>,
    /// The focused element and the frame it is in.
    pub focus: Option<(WindowId, NodeId)>,
    /// Whether keyboard focus is on the root frame rather than an iframe.
    pub root_frame_focused: bool,
}

impl CommitData {
    /// Whether the compositor must rebuild its layers.
    #[must_use]
    pub const fn needs_raster(&self) -> bool {
        self.display_list.is_some()
    }
}
