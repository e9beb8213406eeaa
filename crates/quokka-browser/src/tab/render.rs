//! The rendering half of the event loop: style, layout, paint and the
//! commit handed to the compositor.
//!
//! [§ 8.1.7.3 Update the rendering](https://html.spec.whatwg.org/multipage/webappapis.html#update-the-rendering)

use std::collections::BTreeMap;

use log::debug;
use quokka_css::{BlendOp, DisplayItem, EffectKey, EffectKind, EmbedHost, blend_op_for};
use quokka_dom::WindowId;

use super::Tab;
use crate::accessibility::{AccessibilityBuilder, AccessibilityNode};
use crate::commit::CommitData;
use crate::frame::Frame;

impl Tab {
    /// Bring style and layout of every frame up to date. Parents go first,
    /// so a child frame sees the viewport its iframe box gave it.
    pub(super) fn run_layout_passes(&self) {
        let dark_mode = self.dark_mode();
        let zoom = self.zoom();
        let root = self.root_window();
        for frame in self.all_frames() {
            let is_root = frame.borrow().window() == root;
            let outcome = frame.borrow_mut().restyle(dark_mode);
            if let Some(outcome) = outcome {
                if outcome.animations_started > 0 {
                    self.state.borrow_mut().needs_animation_frame = true;
                }
            }

            let laid_out = frame.borrow_mut().relayout(self.fonts.as_ref(), self, zoom);
            if laid_out {
                let scrolled = is_root && frame.borrow_mut().clamp_scroll();
                let mut state = self.state.borrow_mut();
                state.layout_changed = true;
                state.needs_paint = true;
                state.needs_accessibility = true;
                state.needs_commit |= scrolled;
            }
        }
    }

    /// Whether a render would produce a commit.
    #[must_use]
    pub fn needs_render(&self) -> bool {
        let state = self.state.borrow();
        state.needs_paint
            || state.needs_commit
            || state.needs_accessibility
            || !state.composited_updates.is_empty()
            || self.frames.borrow().values().any(|frame| frame.borrow().needs_render())
    }

    /// Whether an animation or `requestAnimationFrame` callback is waiting
    /// for the next frame.
    #[must_use]
    pub fn needs_animation_frame(&self) -> bool {
        self.state.borrow().needs_animation_frame
    }

    /// [§ 8.1.7.3 Update the rendering](https://html.spec.whatwg.org/multipage/webappapis.html#update-the-rendering)
    ///
    /// "For each doc of docs, run the animation frame callbacks", advance
    /// running animations by one frame, then render.
    pub fn run_animation_frame(&self) -> Option<CommitData> {
        // STEP 1: requestAnimationFrame callbacks.
        let windows = {
            let mut state = self.state.borrow_mut();
            state.needs_animation_frame = false;
            std::mem::take(&mut state.raf_windows)
        };
        for window in windows {
            if let Some(runtime) = self.runtime(window) {
                runtime.borrow_mut().run_animation_frame_callbacks();
            }
        }

        // STEP 2: Animations. Opacity changes go to the compositor alone.
        for frame in self.all_frames() {
            let window = frame.borrow().window();
            let tick = frame.borrow_mut().tick_animations();
            let mut state = self.state.borrow_mut();
            state
                .composited_updates
                .extend(tick.composited.into_iter().map(|node| EffectKey { window, node }));
        }

        // STEP 3: Render.
        let commit = self.render();
        if self.frames.borrow().values().any(|frame| frame.borrow().has_animations()) {
            self.state.borrow_mut().needs_animation_frame = true;
        }
        commit
    }

    /// Run style and layout, then paint if anything visual changed.
    ///
    /// Returns `None` when nothing changed since the last commit.
    pub fn render(&self) -> Option<CommitData> {
        self.run_layout_passes();

        // STEP 1: Paint, or patch the blend ops of composited layers.
        let needs_paint = self.state.borrow().needs_paint
            || self.frames.borrow().values().any(|frame| frame.borrow().needs_paint);
        let mut display_list = None;
        let mut composited_updates = None;
        if needs_paint {
            display_list = Some(self.paint_root());
        } else {
            let keys = std::mem::take(&mut self.state.borrow_mut().composited_updates);
            if !keys.is_empty() {
                match self.apply_composited_updates(&keys) {
                    Some(ops) => composited_updates = Some(ops),
                    None => display_list = Some(self.paint_root()),
                }
            }
        }

        // STEP 2: Accessibility.
        let needs_accessibility = std::mem::take(&mut self.state.borrow_mut().needs_accessibility);
        let accessibility_tree = if needs_accessibility {
            let tree = self.build_accessibility(self.root_window());
            self.state.borrow_mut().accessibility.clone_from(&tree);
            tree
        } else {
            None
        };

        // STEP 3: Commit, unless nothing at all changed.
        let (needs_commit, layout_changed) = {
            let mut state = self.state.borrow_mut();
            (
                std::mem::take(&mut state.needs_commit),
                std::mem::take(&mut state.layout_changed),
            )
        };
        if display_list.is_none()
            && composited_updates.is_none()
            && accessibility_tree.is_none()
            && !needs_commit
            && !layout_changed
        {
            return None;
        }

        let root = self.frame(self.root_window())?;
        let root = root.borrow();
        let state = self.state.borrow();
        Some(CommitData {
            url: root.url().clone(),
            scroll: root.scroll(),
            document_height: root.document_height(),
            viewport: root.viewport(),
            dark_mode: state.dark_mode,
            display_list,
            composited_updates,
            accessibility_tree,
            focus: state.focus,
            root_frame_focused: state.focused_frame == state.root,
        })
    }

    /// Paint the root frame (and through it every iframe) and remember
    /// the result.
    fn paint_root(&self) -> Vec<DisplayItem> {
        let Some(root) = self.frame(self.root_window()) else {
            return Vec::new();
        };
        let display_list = root.borrow().paint(self.fonts.as_ref(), self);
        for frame in self.all_frames() {
            frame.borrow_mut().needs_paint = false;
        }
        let mut state = self.state.borrow_mut();
        state.needs_paint = false;
        state.composited_updates.clear();
        state.display_list.clone_from(&display_list);
        display_list
    }

    /// [Compositing and Blending § 3.1 Group opacity](https://www.w3.org/TR/compositing-1/#groupopacity)
    ///
    /// Recompute the blend op of each key and substitute it in the stored
    /// display list. Returns `None` if some key does not already own a
    /// composited layer, or would stop needing one; the caller repaints.
    fn apply_composited_updates(&self, keys: &[EffectKey]) -> Option<BTreeMap<EffectKey, BlendOp>> {
        let mut ops = BTreeMap::new();
        for &key in keys {
            let op = self.with_frame(key.window, |frame| blend_op_for(frame.dom(), frame.graph(), key.node))?;
            if !op.should_save {
                return None;
            }
            let _ = ops.insert(key, op);
        }

        let mut state = self.state.borrow_mut();
        for (key, op) in &ops {
            if !substitute_blend(&mut state.display_list, *key, *op) {
                debug!("no composited layer for {key:?}, repainting");
                return None;
            }
        }
        Some(ops)
    }

    /// Build the accessibility tree of `window` and its iframes.
    fn build_accessibility(&self, window: WindowId) -> Option<AccessibilityNode> {
        let frame = self.frame(window)?;
        let frame = frame.borrow();
        if frame.needs_style || frame.needs_layout {
            return Some(AccessibilityNode::empty_document(window));
        }
        let child_tree = |child: WindowId| self.build_accessibility(child);
        Some(AccessibilityBuilder::new(&frame, &child_tree).build())
    }
}

/// Replace the op of the composited blend owned by `key`. Returns whether
/// one was found.
fn substitute_blend(items: &mut [DisplayItem], key: EffectKey, op: BlendOp) -> bool {
    for item in items {
        let DisplayItem::Effect(effect) = item else {
            continue;
        };
        if effect.node == Some(key) && effect.needs_compositing {
            if let EffectKind::Blend(_) = effect.kind {
                effect.kind = EffectKind::Blend(op);
                return true;
            }
        }
        if substitute_blend(&mut effect.children, key, op) {
            return true;
        }
    }
    false
}

impl EmbedHost for Tab {
    fn child_frame_loaded(&self, window: WindowId) -> bool {
        self.with_frame(window, Frame::is_loaded).unwrap_or(false)
    }

    fn resize_child_frame(&self, window: WindowId, width: f32, height: f32) {
        if let Some(frame) = self.frame(window) {
            if frame.borrow_mut().set_viewport(width, height) {
                debug!("window {} resized to {width}x{height}", window.0);
            }
        }
    }

    fn paint_child_frame(&self, window: WindowId) -> Vec<DisplayItem> {
        self.with_frame(window, |frame| {
            if frame.is_loaded() && !frame.needs_style && !frame.needs_layout {
                frame.paint(self.fonts.as_ref(), self)
            } else {
                Vec::new()
            }
        })
        .unwrap_or_default()
    }
}
