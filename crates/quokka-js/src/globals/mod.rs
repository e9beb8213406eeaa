//! JavaScript global objects.
//!
//! [§ 8.1.6.1 Realms and their counterparts](https://html.spec.whatwg.org/multipage/webappapis.html#realms-settings-objects-global-objects)
//!
//! "A global object is a JavaScript object that is the global object for
//! a JavaScript realm."
//!
//! # Implemented
//!
//! - `console` - [Console Standard](https://console.spec.whatwg.org/)
//! - `__native` - engine entry points used by the shim
//! - `window`, `document`, `Node`, `Event`, `setTimeout`,
//!   `XMLHttpRequest`, `requestAnimationFrame` - defined in `runtime.js`
//!   on top of `__native`
//!
//! # Not Yet Implemented
//!
//! - `clearTimeout`, `setInterval`
//! - `location`, `navigator`

mod console;
mod native;

use boa_engine::property::Attribute;
use boa_engine::{Context, JsResult, JsValue, Source, js_string};
use quokka_dom::WindowId;

pub use console::JS_LOG_TARGET;

/// The JavaScript half of the DOM bridge.
const RUNTIME_JS: &str = include_str!("../runtime.js");

/// Register all global objects on the context for a script running in
/// `window`.
///
/// This should be called once when creating a new `JsRuntime`.
///
/// # Errors
///
/// Fails if a global is already defined or the shim does not evaluate.
pub fn register_globals(context: &mut Context, window: WindowId) -> JsResult<()> {
    // STEP 1: Logging.
    console::register_console(context)?;

    // STEP 2: Engine entry points and the window id the shim binds to.
    native::register_natives(context)?;
    context.register_global_property(
        js_string!("__self"),
        JsValue::from(window.0 as f64),
        Attribute::READONLY,
    )?;

    // STEP 3: The page-facing API.
    let _ = context.eval(Source::from_bytes(RUNTIME_JS))?;
    Ok(())
}
