//! The boundary between scripts and the engine.
//!
//! Scripts never see DOM nodes. Every node they touch is an integer handle
//! into a per-runtime [`HandleMap`], and every DOM operation goes through a
//! [`ScriptHost`] supplied by the browser. Native functions cannot capture
//! Rust state, so they find their host through a thread-local registry
//! keyed by the window of the script currently running.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

use quokka_common::url::Origin;
use quokka_dom::{NodeId, WindowId};
use thiserror::Error;

/// Errors raised by bridge calls. They surface in the script as a thrown
/// `Error`; the engine keeps running.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// [§ 7.5.1 Cross-origin objects](https://html.spec.whatwg.org/multipage/nav-history-apis.html#cross-origin-objects)
    #[error("cross-origin access from window {caller:?} to window {target:?}")]
    CrossOrigin {
        /// Window of the running script.
        caller: WindowId,
        /// Window owning the node or document.
        target: WindowId,
    },
    /// The handle was never handed out by this runtime.
    #[error("unknown node handle {0}")]
    UnknownHandle(u32),
    /// No frame with this id exists, or its script context was replaced.
    #[error("unknown window {0:?}")]
    UnknownWindow(WindowId),
    /// A native was called while no script was running.
    #[error("no script is running")]
    NoActiveScript,
    /// The request URL is not in the frame's `default-src` list.
    #[error("request to {0} blocked by Content-Security-Policy")]
    CspBlocked(String),
    /// An XHR to another origin than the frame's own.
    #[error("cross-origin request to {0} not allowed")]
    CrossOriginRequest(String),
    /// The request failed.
    #[error("network error: {0}")]
    Network(String),
    /// The selector could not be parsed.
    #[error("invalid selector '{0}'")]
    BadSelector(String),
}

/// An `XMLHttpRequest.send()` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XhrRequest {
    /// `GET` or `POST`.
    pub method: String,
    /// URL as written, relative to the frame's URL.
    pub url: String,
    /// Request body, if any.
    pub body: Option<String>,
    /// When true the call returns at once and the response is delivered
    /// later through `__runXHROnload`.
    pub is_async: bool,
    /// Script-side id of the request object.
    pub handle: u32,
}

/// Engine services available to scripts.
///
/// All methods take `&self`: a call can arrive while the browser is in the
/// middle of running the script that made it. Origin checks are done by
/// the bridge before any node-level method is called.
pub trait ScriptHost {
    /// Origin of the document in `window`, if the window exists.
    fn origin(&self, window: WindowId) -> Option<Origin>;

    /// The window embedding `window`, if it is an iframe.
    fn parent(&self, window: WindowId) -> Option<WindowId>;

    /// [§ 4.2.6 querySelectorAll](https://dom.spec.whatwg.org/#dom-parentnode-queryselectorall)
    ///
    /// "Returns all element descendants of node that match selectors."
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::BadSelector`] if the selector does not parse.
    fn query_selector_all(&self, window: WindowId, selector: &str) -> Result<Vec<NodeId>, BridgeError>;

    /// Attribute value, `None` if absent.
    fn get_attribute(&self, window: WindowId, node: NodeId, name: &str) -> Option<String>;

    /// Set an attribute and invalidate whatever depends on it.
    fn set_attribute(&self, window: WindowId, node: NodeId, name: &str, value: &str);

    /// Replace the node's children with the parsed fragment.
    fn set_inner_html(&self, window: WindowId, node: NodeId, html: &str);

    /// Replace the node's `style` attribute.
    fn set_style(&self, window: WindowId, node: NodeId, css: &str);

    /// Send a request on behalf of a script in `window`. Synchronous
    /// requests return the body; asynchronous ones return an empty string.
    ///
    /// # Errors
    ///
    /// CSP violations and network failures of synchronous requests.
    fn xhr_send(&self, window: WindowId, request: XhrRequest) -> Result<String, BridgeError>;

    /// Run `__runSetTimeout(handle)` in `window` after `delay`.
    fn set_timeout(&self, window: WindowId, handle: u32, delay: Duration);

    /// Ask for an animation frame to be scheduled.
    fn request_animation_frame(&self, window: WindowId);

    /// [§ 9.3.3 Posting messages](https://html.spec.whatwg.org/multipage/web-messaging.html#posting-messages)
    ///
    /// Queue delivery of `message` to `target`.
    fn post_message(&self, source: WindowId, target: WindowId, message: String, target_origin: String);
}

/// Bidirectional map between script handles and `(window, node)` pairs.
///
/// Handles are allocated in order starting from zero and never reused.
#[derive(Debug, Default)]
pub struct HandleMap {
    nodes: Vec<(WindowId, NodeId)>,
    handles: HashMap<(WindowId, NodeId), u32>,
}

impl HandleMap {
    /// The handle for `node`, allocating one on first use.
    pub fn handle_for(&mut self, window: WindowId, node: NodeId) -> u32 {
        if let Some(handle) = self.handles.get(&(window, node)) {
            return *handle;
        }
        let handle = self.nodes.len() as u32;
        self.nodes.push((window, node));
        let _ = self.handles.insert((window, node), handle);
        handle
    }

    /// The handle for `node` if one was handed out.
    #[must_use]
    pub fn existing(&self, window: WindowId, node: NodeId) -> Option<u32> {
        self.handles.get(&(window, node)).copied()
    }

    /// The node a handle stands for.
    #[must_use]
    pub fn resolve(&self, handle: u32) -> Option<(WindowId, NodeId)> {
        self.nodes.get(handle as usize).copied()
    }

    /// Number of handles handed out.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no handle has been handed out.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

struct Binding {
    serial: u64,
    host: Weak<dyn ScriptHost>,
    handles: HandleMap,
}

thread_local! {
    static REGISTRY: RefCell<HashMap<WindowId, Binding>> = RefCell::new(HashMap::new());
    static ACTIVE: RefCell<Vec<WindowId>> = const { RefCell::new(Vec::new()) };
}

pub(crate) fn register(window: WindowId, serial: u64, host: Weak<dyn ScriptHost>) {
    REGISTRY.with(|registry| {
        let _ = registry.borrow_mut().insert(
            window,
            Binding {
                serial,
                host,
                handles: HandleMap::default(),
            },
        );
    });
}

/// Remove the binding, unless a newer runtime for the same window has
/// replaced it already.
pub(crate) fn unregister(window: WindowId, serial: u64) {
    REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        if registry.get(&window).is_some_and(|b| b.serial == serial) {
            let _ = registry.remove(&window);
        }
    });
}

/// Marks `window` as the caller of every native invoked until dropped.
pub(crate) struct ActiveScript;

impl ActiveScript {
    pub(crate) fn enter(window: WindowId) -> Self {
        ACTIVE.with(|active| active.borrow_mut().push(window));
        Self
    }
}

impl Drop for ActiveScript {
    fn drop(&mut self) {
        ACTIVE.with(|active| {
            let _ = active.borrow_mut().pop();
        });
    }
}

/// The window of the innermost running script.
pub(crate) fn caller() -> Result<WindowId, BridgeError> {
    ACTIVE
        .with(|active| active.borrow().last().copied())
        .ok_or(BridgeError::NoActiveScript)
}

pub(crate) fn host_of(window: WindowId) -> Result<Rc<dyn ScriptHost>, BridgeError> {
    REGISTRY
        .with(|registry| registry.borrow().get(&window).and_then(|b| b.host.upgrade()))
        .ok_or(BridgeError::UnknownWindow(window))
}

pub(crate) fn handle_for(caller: WindowId, window: WindowId, node: NodeId) -> Result<u32, BridgeError> {
    REGISTRY.with(|registry| {
        registry
            .borrow_mut()
            .get_mut(&caller)
            .map(|b| b.handles.handle_for(window, node))
            .ok_or(BridgeError::UnknownWindow(caller))
    })
}

pub(crate) fn existing_handle(caller: WindowId, window: WindowId, node: NodeId) -> Option<u32> {
    REGISTRY.with(|registry| {
        registry
            .borrow()
            .get(&caller)
            .and_then(|b| b.handles.existing(window, node))
    })
}

pub(crate) fn resolve(caller: WindowId, handle: u32) -> Result<(WindowId, NodeId), BridgeError> {
    REGISTRY.with(|registry| {
        registry
            .borrow()
            .get(&caller)
            .and_then(|b| b.handles.resolve(handle))
            .ok_or(BridgeError::UnknownHandle(handle))
    })
}

/// Scripts may touch their own window, and any window of the same origin.
pub(crate) fn check_access(host: &dyn ScriptHost, caller: WindowId, target: WindowId) -> Result<(), BridgeError> {
    if caller == target {
        return Ok(());
    }
    let allowed = match (host.origin(caller), host.origin(target)) {
        (Some(a), Some(b)) => a.same_origin(&b),
        (_, None) => return Err(BridgeError::UnknownWindow(target)),
        (None, _) => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(BridgeError::CrossOrigin { caller, target })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_stable_and_bidirectional() {
        let mut map = HandleMap::default();
        let window = WindowId(7);
        let a = map.handle_for(window, NodeId(3));
        let b = map.handle_for(window, NodeId(9));
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(map.handle_for(window, NodeId(3)), a);
        assert_eq!(map.resolve(b), Some((window, NodeId(9))));
        assert_eq!(map.existing(WindowId(8), NodeId(3)), None);
        assert_eq!(map.resolve(5), None);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_caller_requires_active_script() {
        assert_eq!(caller(), Err(BridgeError::NoActiveScript));
        {
            let _outer = ActiveScript::enter(WindowId(1));
            let _inner = ActiveScript::enter(WindowId(2));
            assert_eq!(caller(), Ok(WindowId(2)));
        }
        assert_eq!(caller(), Err(BridgeError::NoActiveScript));
    }
}
