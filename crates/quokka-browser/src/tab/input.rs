//! Clicks, keys and scrolling.
//!
//! [UI Events § 3 DOM Event Architecture](https://www.w3.org/TR/uievents/#dom-event-architecture)
//!
//! Input is dispatched to script listeners first. A listener that calls
//! `preventDefault()` cancels the browser's default action.

use quokka_common::url::Url;
use quokka_dom::{NodeId, WindowId};

use super::Tab;
use crate::config::SCROLL_STEP;
use crate::frame::is_focusable;

/// What a click or Enter does to an element once its listeners have run.
#[derive(Debug)]
enum Activation {
    /// Follow a link.
    Link(Url),
    /// Focus a text input and clear it.
    Input,
    /// Submit the enclosing form.
    Button,
    /// Pass the click into a child frame at its content origin.
    Iframe(WindowId, (f32, f32)),
    /// Focus the element.
    Focus,
}

impl Tab {
    /// [UI Events § 3.5 click](https://www.w3.org/TR/uievents/#event-type-click)
    ///
    /// A click at viewport coordinates of the root frame.
    pub fn click(&self, x: f32, y: f32) {
        self.run_layout_passes();
        self.blur();
        let root = self.root_window();
        let scroll = self.with_frame(root, |frame| frame.scroll()).unwrap_or(0.0);
        self.click_in_frame(root, x, y + scroll);
    }

    /// A click at document coordinates of `window`.
    fn click_in_frame(&self, window: WindowId, x: f32, y: f32) {
        let Some(chain) = self
            .with_frame(window, |frame| {
                let hit = frame.hit_test(x, y)?;
                let dom = frame.dom();
                Some(
                    std::iter::once(hit)
                        .chain(dom.ancestors(hit))
                        .filter(|&node| dom.as_element(node).is_some())
                        .collect::<Vec<_>>(),
                )
            })
            .flatten()
        else {
            return;
        };
        self.state.borrow_mut().focused_frame = window;

        // STEP 1: Walk up from the hit element. Every element on the way
        // sees the click; the first with a default action takes it.
        for node in chain {
            if !self.dispatch(window, "click", node, None) {
                return;
            }
            let Some(activation) = self.activation(window, node) else {
                continue;
            };

            // STEP 2: Default action.
            match activation {
                Activation::Link(url) => self.navigate_frame(window, url, None),
                Activation::Input => {
                    if let Some(frame) = self.frame(window) {
                        frame.borrow_mut().clear_input(node);
                    }
                    self.focus_element(window, node);
                }
                Activation::Button => self.submit_form_of(window, node),
                Activation::Iframe(child, (left, top)) => self.click_in_frame(child, x - left, y - top),
                Activation::Focus => self.focus_element(window, node),
            }
            return;
        }
    }

    fn activation(&self, window: WindowId, node: NodeId) -> Option<Activation> {
        self.with_frame(window, |frame| {
            let element = frame.dom().as_element(node)?;
            match element.tag_name.as_str() {
                "a" if element.attr("href").is_some() => frame.link_target(node).map(Activation::Link),
                "input" => Some(Activation::Input),
                "button" => Some(Activation::Button),
                "iframe" => {
                    let child = element.frame?;
                    Some(Activation::Iframe(child, frame.iframe_content_origin(node)?))
                }
                _ if is_focusable(element) => Some(Activation::Focus),
                _ => None,
            }
        })
        .flatten()
    }

    /// Run `event` listeners on `node`. Returns whether the default action
    /// should still happen.
    fn dispatch(&self, window: WindowId, event: &str, node: NodeId, key: Option<&str>) -> bool {
        self.runtime(window)
            .is_none_or(|runtime| runtime.borrow_mut().dispatch_event(event, node, key))
    }

    /// [§ 4.10.21.3 Form submission algorithm](https://html.spec.whatwg.org/multipage/form-control-infrastructure.html#form-submission-algorithm)
    ///
    /// "Fire an event named submit at form", then POST its entries.
    fn submit_form_of(&self, window: WindowId, node: NodeId) {
        let Some(form) = self.with_frame(window, |frame| frame.form_of(node)).flatten() else {
            return;
        };
        if !self.dispatch(window, "submit", form, None) {
            return;
        }
        if let Some((url, body)) = self.with_frame(window, |frame| frame.form_submission(form)).flatten() {
            self.navigate_frame(window, url, Some(body));
        }
    }

    /// [§ 6.6.4 Focus update steps](https://html.spec.whatwg.org/multipage/interaction.html#focus-update-steps)
    fn focus_element(&self, window: WindowId, node: NodeId) {
        self.blur();
        if let Some(frame) = self.frame(window) {
            frame.borrow_mut().set_focused(node, true);
        }
        let mut state = self.state.borrow_mut();
        state.focus = Some((window, node));
        state.focused_frame = window;
        state.needs_paint = true;
        state.needs_accessibility = true;
    }

    /// Drop focus from whatever has it.
    fn blur(&self) {
        let previous = self.state.borrow_mut().focus.take();
        if let Some((window, node)) = previous {
            if let Some(frame) = self.frame(window) {
                frame.borrow_mut().set_focused(node, false);
            }
            let mut state = self.state.borrow_mut();
            state.needs_paint = true;
            state.needs_accessibility = true;
        }
    }

    /// [UI Events § 5.7.5 keydown](https://www.w3.org/TR/uievents/#event-type-keydown)
    ///
    /// Type a character into the focused element.
    pub fn keypress(&self, ch: char) {
        let Some((window, node)) = self.focus() else {
            return;
        };
        if !self.dispatch(window, "keydown", node, Some(&ch.to_string())) {
            return;
        }
        if let Some(frame) = self.frame(window) {
            frame.borrow_mut().insert_text(node, ch);
        }
        let mut state = self.state.borrow_mut();
        state.needs_paint = true;
        state.needs_accessibility = true;
    }

    /// The Enter key activates the focused element: links are followed,
    /// inputs and buttons submit their form.
    pub fn enter(&self) {
        let Some((window, node)) = self.focus() else {
            return;
        };
        if !self.dispatch(window, "keydown", node, Some("Enter")) {
            return;
        }
        match self.activation(window, node) {
            Some(Activation::Link(url)) => self.navigate_frame(window, url, None),
            Some(Activation::Input | Activation::Button) => self.submit_form_of(window, node),
            _ => {}
        }
    }

    /// [§ 6.6.3 Sequential focus navigation](https://html.spec.whatwg.org/multipage/interaction.html#sequential-focus-navigation)
    ///
    /// Move focus to the next element in the focused frame's tab order.
    /// Past the last one, focus is cleared.
    pub fn advance_tab(&self) {
        self.run_layout_passes();
        let window = self.state.borrow().focused_frame;
        let Some(order) = self.with_frame(window, |frame| frame.focus_order()) else {
            return;
        };
        let current = self
            .focus()
            .filter(|&(w, _)| w == window)
            .and_then(|(_, node)| order.iter().position(|&n| n == node));
        let next = current.map_or(0, |index| index + 1);

        let Some(&node) = order.get(next) else {
            self.blur();
            return;
        };
        self.focus_element(window, node);
        // Focus restyles the element; lay out before measuring it.
        self.run_layout_passes();
        if window == self.root_window() {
            if let Some(frame) = self.frame(window) {
                if frame.borrow_mut().scroll_into_view(node) {
                    self.state.borrow_mut().needs_commit = true;
                }
            }
        }
    }

    /// Scroll the root frame down one step.
    pub fn scroll_down(&self) {
        self.run_layout_passes();
        let Some(frame) = self.frame(self.root_window()) else {
            return;
        };
        if frame.borrow_mut().scroll_by(SCROLL_STEP) {
            self.state.borrow_mut().needs_commit = true;
        }
    }
}
