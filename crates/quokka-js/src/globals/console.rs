//! Console API implementation.
//!
//! [Console Standard](https://console.spec.whatwg.org/)
//!
//! Output goes to the `log` facade under the `[JS]` target, so page logging
//! interleaves with the engine's own.

use boa_engine::{
    Context, JsResult, JsValue, NativeFunction, js_string, object::ObjectInitializer,
    property::Attribute,
};

/// Log target for everything a page prints.
pub const JS_LOG_TARGET: &str = "[JS]";

/// Register the console global object on the context.
///
/// [§ 1.1 Logging](https://console.spec.whatwg.org/#logging)
///
/// Creates a `console` object with `log`, `info`, `warn` and `error`.
///
/// # Errors
///
/// Fails if `console` is already defined.
pub fn register_console(context: &mut Context) -> JsResult<()> {
    let console = ObjectInitializer::new(context)
        .function(NativeFunction::from_fn_ptr(console_log), js_string!("log"), 0)
        .function(NativeFunction::from_fn_ptr(console_log), js_string!("info"), 0)
        .function(NativeFunction::from_fn_ptr(console_warn), js_string!("warn"), 0)
        .function(NativeFunction::from_fn_ptr(console_error), js_string!("error"), 0)
        .build();

    context.register_global_property(js_string!("console"), console, Attribute::all())
}

/// [§ 1.1.1 log](https://console.spec.whatwg.org/#log)
///
/// "Perform Logger("log", data)."
fn console_log(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let output = format_console_args(args, context)?;
    log::info!(target: JS_LOG_TARGET, "{output}");
    Ok(JsValue::undefined())
}

/// [§ 1.1.3 warn](https://console.spec.whatwg.org/#warn)
///
/// "Perform Logger("warn", data)."
fn console_warn(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let output = format_console_args(args, context)?;
    log::warn!(target: JS_LOG_TARGET, "{output}");
    Ok(JsValue::undefined())
}

/// [§ 1.1.2 error](https://console.spec.whatwg.org/#error)
///
/// "Perform Logger("error", data)."
fn console_error(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let output = format_console_args(args, context)?;
    log::error!(target: JS_LOG_TARGET, "{output}");
    Ok(JsValue::undefined())
}

/// [§ 2.1 Formatter](https://console.spec.whatwg.org/#formatter)
///
/// Converts each argument to a string and joins them with spaces.
fn format_console_args(args: &[JsValue], context: &mut Context) -> JsResult<String> {
    let strings: Result<Vec<String>, _> = args
        .iter()
        .map(|arg| arg.to_string(context).map(|s| s.to_std_string_escaped()))
        .collect();

    Ok(strings?.join(" "))
}
