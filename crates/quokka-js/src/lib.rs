//! JavaScript engine integration for the Quokka browser.
//!
//! Uses [Boa](https://boajs.dev/) as the JavaScript engine.
//!
//! Each frame gets its own [`JsRuntime`]. Scripts reach the DOM only
//! through the [`ScriptHost`] the browser registers for the frame's window:
//! nodes are integer handles, and every access across windows is checked
//! for origin first.
//!
//! # Example
//!
//! ```ignore
//! use quokka_js::JsRuntime;
//!
//! let host: Rc<dyn ScriptHost> = ...;
//! let mut runtime = JsRuntime::new(window, Rc::downgrade(&host))?;
//! runtime.run("inline script", "console.log('Hello from JS!');");
//! ```
//!
//! # Callbacks
//!
//! Timers, XHR completions, animation frames and messages never run inline.
//! The host queues a task, and the browser later calls the matching
//! `run_*` method on the target runtime.

pub mod bridge;
mod globals;

use std::rc::Weak;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use boa_engine::{Context, JsError, JsResult, JsValue, Source};
use quokka_dom::{NodeId, WindowId};

pub use bridge::{BridgeError, HandleMap, ScriptHost, XhrRequest};
pub use globals::JS_LOG_TARGET;

/// Upper bound on loop iterations per script, so a runaway page cannot
/// hang the main thread.
const LOOP_ITERATION_LIMIT: u64 = 10_000_000;

/// Upper bound on recursion depth.
const RECURSION_LIMIT: usize = 512;

/// JavaScript runtime for a document.
///
/// [§ 8.1.6 JavaScript execution context](https://html.spec.whatwg.org/multipage/webappapis.html)
///
/// Each document has its own JavaScript runtime with its own global object.
/// The runtime is created when the document is loaded and discarded when
/// the frame navigates away.
pub struct JsRuntime {
    /// The Boa JavaScript context.
    context: Context,
    window: WindowId,
    serial: u64,
    discarded: Arc<AtomicBool>,
}

impl JsRuntime {
    /// Create a runtime for `window`, backed by `host`.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the globals cannot be installed.
    pub fn new(window: WindowId, host: Weak<dyn ScriptHost>) -> JsResult<Self> {
        static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);
        let serial = NEXT_SERIAL.fetch_add(1, Ordering::Relaxed);

        let mut context = Context::default();
        context
            .runtime_limits_mut()
            .set_loop_iteration_limit(LOOP_ITERATION_LIMIT);
        context.runtime_limits_mut().set_recursion_limit(RECURSION_LIMIT);
        globals::register_globals(&mut context, window)?;

        bridge::register(window, serial, host);
        Ok(Self {
            context,
            window,
            serial,
            discarded: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The window this runtime belongs to.
    #[must_use]
    pub const fn window(&self) -> WindowId {
        self.window
    }

    /// Execute JavaScript source code.
    ///
    /// [§ 4.12.1.1 Processing model](https://html.spec.whatwg.org/multipage/scripting.html#script-processing-model)
    ///
    /// # Errors
    ///
    /// Returns `JsError` if the JavaScript code contains syntax errors or
    /// throws an uncaught exception.
    pub fn execute(&mut self, source: &str) -> Result<JsValue, JsError> {
        let _active = bridge::ActiveScript::enter(self.window);
        self.context.eval(Source::from_bytes(source))
    }

    /// Execute a script, logging instead of returning any error. Does
    /// nothing once the runtime is discarded.
    pub fn run(&mut self, label: &str, source: &str) {
        if self.is_discarded() {
            return;
        }
        if let Err(e) = self.execute(source) {
            log::warn!("script error in {label}: {e}");
        }
    }

    /// [§ 2.10 Dispatching events](https://dom.spec.whatwg.org/#concept-event-dispatch)
    ///
    /// Run the `event` listeners registered on `node`. Returns whether the
    /// default action should still happen, i.e. no listener called
    /// `preventDefault()`.
    pub fn dispatch_event(&mut self, event: &str, node: NodeId, key: Option<&str>) -> bool {
        if self.is_discarded() {
            return true;
        }
        let Some(handle) = bridge::existing_handle(self.window, self.window, node) else {
            return true;
        };
        let key = key.map_or_else(|| "undefined".to_string(), quote);
        let source = format!("__runListeners({handle}, {}, {key})", quote(event));
        match self.execute(&source) {
            Ok(value) => value.to_boolean(),
            Err(e) => {
                log::warn!("{event} listener failed: {e}");
                true
            }
        }
    }

    /// Run the callback registered by `setTimeout` under `handle`.
    pub fn run_timeout(&mut self, handle: u32) {
        self.run("setTimeout callback", &format!("__runSetTimeout({handle})"));
    }

    /// Deliver the body of an asynchronous XHR.
    pub fn run_xhr_onload(&mut self, handle: u32, body: &str) {
        self.run("XHR onload", &format!("__runXHROnload({}, {handle})", quote(body)));
    }

    /// Run and clear the pending `requestAnimationFrame` callbacks.
    pub fn run_animation_frame_callbacks(&mut self) {
        self.run("requestAnimationFrame callback", "__runRAFHandlers()");
    }

    /// Fire a `message` event on the window.
    pub fn run_post_message(&mut self, message: &str) {
        self.run("message listener", &format!("__runPostMessage({})", quote(message)));
    }

    /// Stop running callbacks. Tasks queued for this runtime check
    /// [`JsRuntime::discard_flag`] and drop themselves.
    pub fn discard(&self) {
        self.discarded.store(true, Ordering::Release);
    }

    /// Whether [`JsRuntime::discard`] was called.
    #[must_use]
    pub fn is_discarded(&self) -> bool {
        self.discarded.load(Ordering::Acquire)
    }

    /// Shared flag set when the runtime is discarded; safe to check from
    /// timer and XHR threads.
    #[must_use]
    pub fn discard_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.discarded)
    }
}

impl Drop for JsRuntime {
    fn drop(&mut self) {
        self.discard();
        bridge::unregister(self.window, self.serial);
    }
}

/// A JavaScript string literal for `value`.
fn quote(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}
