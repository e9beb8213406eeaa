//! The services the tab offers to scripts.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use quokka_common::net::Request;
use quokka_common::url::Origin;
use quokka_dom::{NodeId, WindowId};
use quokka_js::{BridgeError, ScriptHost, XhrRequest};

use super::Tab;
use crate::task::Task;

impl Tab {
    /// [§ 9.3.3 Posting messages](https://html.spec.whatwg.org/multipage/web-messaging.html#posting-messages)
    ///
    /// "If targetOrigin is not a single U+002A ASTERISK character (*) and
    /// targetWindow's associated Document's origin is not same origin with
    /// targetOrigin, then return."
    pub(super) fn deliver_message(&self, source: WindowId, target: WindowId, message: &str, target_origin: &str) {
        let Some(target_document_origin) = self.with_frame(target, |frame| frame.origin()) else {
            debug!("message from window {} to a closed window dropped", source.0);
            return;
        };
        if target_origin != "*" {
            let matches = Origin::parse(target_origin).is_ok_and(|origin| origin.same_origin(&target_document_origin));
            if !matches {
                warn!(
                    "message from window {} dropped: target origin {target_origin} does not match {target_document_origin}",
                    source.0
                );
                return;
            }
        }
        if let Some(runtime) = self.runtime(target) {
            runtime.borrow_mut().run_post_message(message);
        }
    }

    /// Run `f` on a frame mutably and flag the tab for a render.
    fn mutate_frame(&self, window: WindowId, f: impl FnOnce(&mut crate::frame::Frame)) {
        if let Some(frame) = self.frame(window) {
            f(&mut frame.borrow_mut());
            let mut state = self.state.borrow_mut();
            state.needs_paint = true;
            state.needs_accessibility = true;
        }
    }
}

impl ScriptHost for Tab {
    fn origin(&self, window: WindowId) -> Option<Origin> {
        self.with_frame(window, |frame| frame.origin())
    }

    fn parent(&self, window: WindowId) -> Option<WindowId> {
        self.with_frame(window, |frame| frame.parent()).flatten()
    }

    fn query_selector_all(&self, window: WindowId, selector: &str) -> Result<Vec<NodeId>, BridgeError> {
        self.with_frame(window, |frame| frame.query_selector_all(selector))
            .ok_or(BridgeError::UnknownWindow(window))?
    }

    fn get_attribute(&self, window: WindowId, node: NodeId, name: &str) -> Option<String> {
        self.with_frame(window, |frame| frame.get_attribute(node, name)).flatten()
    }

    fn set_attribute(&self, window: WindowId, node: NodeId, name: &str, value: &str) {
        self.mutate_frame(window, |frame| frame.set_attribute(node, name, value));
    }

    fn set_inner_html(&self, window: WindowId, node: NodeId, html: &str) {
        self.mutate_frame(window, |frame| frame.set_inner_html(node, html));
    }

    fn set_style(&self, window: WindowId, node: NodeId, css: &str) {
        self.mutate_frame(window, |frame| frame.set_style(node, css));
    }

    /// [XMLHttpRequest § 3.5.6 send()](https://xhr.spec.whatwg.org/#the-send()-method)
    ///
    /// Requests are resolved against the frame's URL, checked against its
    /// policy and restricted to its own origin.
    fn xhr_send(&self, window: WindowId, request: XhrRequest) -> Result<String, BridgeError> {
        let (url, referrer, flag) = self
            .with_frame(window, |frame| {
                // STEP 1: Resolve.
                let url = frame
                    .resolve(&request.url)
                    .ok_or_else(|| BridgeError::Network(format!("invalid URL '{}'", request.url)))?;
                // STEP 2: Content-Security-Policy.
                if !frame.csp().allows(&url) {
                    return Err(BridgeError::CspBlocked(url.to_string()));
                }
                // STEP 3: Same origin only.
                if !frame.origin().same_origin(&url.origin()) {
                    return Err(BridgeError::CrossOriginRequest(url.to_string()));
                }
                Ok((url, frame.url().clone(), frame.discard_flag()))
            })
            .ok_or(BridgeError::UnknownWindow(window))??;

        let outgoing = match request.body {
            Some(body) if request.method.eq_ignore_ascii_case("POST") => Request::post(url, body),
            _ => Request::get(url),
        }
        .with_referrer(Some(&referrer));

        // STEP 4: Synchronous requests block the main thread.
        if !request.is_async {
            return self
                .fetcher
                .fetch(&outgoing)
                .map(|response| response.text())
                .map_err(|e| BridgeError::Network(e.to_string()));
        }

        // STEP 5: Asynchronous requests complete as a task.
        let Some(flag) = flag else {
            return Ok(String::new());
        };
        let fetcher = Arc::clone(&self.fetcher);
        let tasks = Arc::clone(&self.tasks);
        let handle = request.handle;
        let _ = thread::spawn(move || match fetcher.fetch(&outgoing) {
            Ok(response) => tasks.schedule_task(Task::XhrLoad {
                window,
                handle,
                body: response.text(),
                flag,
            }),
            Err(e) => warn!("XHR to {} failed: {e}", outgoing.url),
        });
        Ok(String::new())
    }

    fn set_timeout(&self, window: WindowId, handle: u32, delay: Duration) {
        let Some(flag) = self.with_frame(window, |frame| frame.discard_flag()).flatten() else {
            return;
        };
        let task = Task::Timeout { window, handle, flag };
        if delay.is_zero() {
            self.tasks.schedule_task(task);
            return;
        }
        let tasks = Arc::clone(&self.tasks);
        let _ = thread::spawn(move || {
            thread::sleep(delay);
            tasks.schedule_task(task);
        });
    }

    fn request_animation_frame(&self, window: WindowId) {
        let mut state = self.state.borrow_mut();
        let _ = state.raf_windows.insert(window);
        state.needs_animation_frame = true;
    }

    fn post_message(&self, source: WindowId, target: WindowId, message: String, target_origin: String) {
        self.tasks.schedule_task(Task::PostMessage {
            source,
            target,
            message,
            target_origin,
        });
    }
}
