//! Native functions behind the page-facing DOM shim.
//!
//! Registered as the `__native` global. The shim in `runtime.js` wraps
//! them in `Node`, `Window`, `XMLHttpRequest` and friends; pages are not
//! expected to call them directly. Each one finds the calling window, its
//! host and the node behind a handle through [`crate::bridge`].

use std::rc::Rc;
use std::time::Duration;

use boa_engine::object::ObjectInitializer;
use boa_engine::object::builtins::JsArray;
use boa_engine::property::Attribute;
use boa_engine::{Context, JsError, JsNativeError, JsResult, JsString, JsValue, NativeFunction, js_string};
use quokka_dom::{NodeId, WindowId};

use crate::bridge::{self, BridgeError, ScriptHost, XhrRequest};

/// Register the `__native` object.
///
/// # Errors
///
/// Fails if `__native` is already defined.
pub fn register_natives(context: &mut Context) -> JsResult<()> {
    let native = ObjectInitializer::new(context)
        .function(NativeFunction::from_fn_ptr(query_selector_all), js_string!("querySelectorAll"), 2)
        .function(NativeFunction::from_fn_ptr(get_attribute), js_string!("getAttribute"), 2)
        .function(NativeFunction::from_fn_ptr(set_attribute), js_string!("setAttribute"), 3)
        .function(NativeFunction::from_fn_ptr(set_inner_html), js_string!("innerHTML"), 2)
        .function(NativeFunction::from_fn_ptr(set_style), js_string!("style"), 2)
        .function(NativeFunction::from_fn_ptr(xhr_send), js_string!("xhrSend"), 5)
        .function(NativeFunction::from_fn_ptr(set_timeout), js_string!("setTimeout"), 2)
        .function(
            NativeFunction::from_fn_ptr(request_animation_frame),
            js_string!("requestAnimationFrame"),
            0,
        )
        .function(NativeFunction::from_fn_ptr(parent), js_string!("parent"), 1)
        .function(NativeFunction::from_fn_ptr(post_message), js_string!("postMessage"), 3)
        .build();

    context.register_global_property(js_string!("__native"), native, Attribute::all())
}

fn throw(error: BridgeError) -> JsError {
    JsNativeError::error().with_message(error.to_string()).into()
}

fn arg(args: &[JsValue], index: usize) -> JsValue {
    args.get(index).cloned().unwrap_or_default()
}

fn string_arg(args: &[JsValue], index: usize, context: &mut Context) -> JsResult<String> {
    arg(args, index)
        .to_string(context)
        .map(|s| s.to_std_string_escaped())
}

fn u32_arg(args: &[JsValue], index: usize, context: &mut Context) -> JsResult<u32> {
    Ok(arg(args, index).to_number(context)? as u32)
}

fn window_arg(args: &[JsValue], index: usize, context: &mut Context) -> JsResult<WindowId> {
    Ok(WindowId(arg(args, index).to_number(context)? as u64))
}

fn optional_string_arg(args: &[JsValue], index: usize, context: &mut Context) -> JsResult<Option<String>> {
    let value = arg(args, index);
    if value.is_null() || value.is_undefined() {
        return Ok(None);
    }
    value
        .to_string(context)
        .map(|s| Some(s.to_std_string_escaped()))
}

/// The calling window and its host.
fn current() -> Result<(WindowId, Rc<dyn ScriptHost>), BridgeError> {
    let caller = bridge::caller()?;
    let host = bridge::host_of(caller)?;
    Ok((caller, host))
}

/// Resolve `handle` for the calling script and check it may touch the
/// node's window.
fn node_target(handle: u32) -> Result<(Rc<dyn ScriptHost>, WindowId, NodeId), BridgeError> {
    let (caller, host) = current()?;
    let (window, node) = bridge::resolve(caller, handle)?;
    bridge::check_access(host.as_ref(), caller, window)?;
    Ok((host, window, node))
}

fn select(target: WindowId, selector: &str) -> Result<Vec<u32>, BridgeError> {
    let (caller, host) = current()?;
    bridge::check_access(host.as_ref(), caller, target)?;
    host.query_selector_all(target, selector)?
        .into_iter()
        .map(|node| bridge::handle_for(caller, target, node))
        .collect()
}

/// `__native.querySelectorAll(windowId, selector)`: handles of the matches.
fn query_selector_all(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let target = window_arg(args, 0, context)?;
    let selector = string_arg(args, 1, context)?;
    let handles = select(target, &selector).map_err(throw)?;
    let values = handles.into_iter().map(|h| JsValue::from(f64::from(h)));
    Ok(JsArray::from_iter(values, context).into())
}

/// `__native.getAttribute(handle, name)`: the value or `null`.
fn get_attribute(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let handle = u32_arg(args, 0, context)?;
    let name = string_arg(args, 1, context)?;
    let (host, window, node) = node_target(handle).map_err(throw)?;
    Ok(host
        .get_attribute(window, node, &name)
        .map_or_else(JsValue::null, |value| JsValue::from(JsString::from(value))))
}

/// `__native.setAttribute(handle, name, value)`
fn set_attribute(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let handle = u32_arg(args, 0, context)?;
    let name = string_arg(args, 1, context)?;
    let value = string_arg(args, 2, context)?;
    let (host, window, node) = node_target(handle).map_err(throw)?;
    host.set_attribute(window, node, &name, &value);
    Ok(JsValue::undefined())
}

/// `__native.innerHTML(handle, html)`
fn set_inner_html(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let handle = u32_arg(args, 0, context)?;
    let html = string_arg(args, 1, context)?;
    let (host, window, node) = node_target(handle).map_err(throw)?;
    host.set_inner_html(window, node, &html);
    Ok(JsValue::undefined())
}

/// `__native.style(handle, css)`
fn set_style(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let handle = u32_arg(args, 0, context)?;
    let css = string_arg(args, 1, context)?;
    let (host, window, node) = node_target(handle).map_err(throw)?;
    host.set_style(window, node, &css);
    Ok(JsValue::undefined())
}

/// `__native.xhrSend(method, url, body, isAsync, handle)`: the response
/// text for synchronous requests, `""` otherwise.
fn xhr_send(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let request = XhrRequest {
        method: string_arg(args, 0, context)?.to_ascii_uppercase(),
        url: string_arg(args, 1, context)?,
        body: optional_string_arg(args, 2, context)?,
        is_async: arg(args, 3).to_boolean(),
        handle: u32_arg(args, 4, context)?,
    };
    let (caller, host) = current().map_err(throw)?;
    let body = host.xhr_send(caller, request).map_err(throw)?;
    Ok(JsValue::from(JsString::from(body)))
}

/// `__native.setTimeout(handle, ms)`
fn set_timeout(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let handle = u32_arg(args, 0, context)?;
    let millis = arg(args, 1).to_number(context)?;
    let delay = Duration::from_millis(if millis.is_finite() { millis.max(0.0) as u64 } else { 0 });
    let (caller, host) = current().map_err(throw)?;
    host.set_timeout(caller, handle, delay);
    Ok(JsValue::undefined())
}

/// `__native.requestAnimationFrame()`
fn request_animation_frame(_this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
    let (caller, host) = current().map_err(throw)?;
    host.request_animation_frame(caller);
    Ok(JsValue::undefined())
}

/// `__native.parent(windowId)`: the embedding window's id or `undefined`.
fn parent(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let window = window_arg(args, 0, context)?;
    let (_, host) = current().map_err(throw)?;
    Ok(host
        .parent(window)
        .map_or_else(JsValue::undefined, |p| JsValue::from(p.0 as f64)))
}

/// `__native.postMessage(targetWindowId, message, targetOrigin)`
fn post_message(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let target = window_arg(args, 0, context)?;
    let message = string_arg(args, 1, context)?;
    let target_origin = string_arg(args, 2, context)?;
    let (caller, host) = current().map_err(throw)?;
    host.post_message(caller, target, message, target_origin);
    Ok(JsValue::undefined())
}
