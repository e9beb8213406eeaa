//! Browser warnings with colored terminal output.
//!
//! Provides deduplication to avoid spamming the same warning multiple times.
//! Used by the HTML, CSS and script components to report unsupported input.

use std::collections::HashSet;
use std::sync::Mutex;

use owo_colors::OwoColorize;

/// Global set of warnings we've already emitted (to deduplicate)
static WARNED: Mutex<Option<HashSet<String>>> = Mutex::new(None);

/// Warn about an unsupported feature (emits once per unique message).
///
/// The warning goes through the `log` facade at `warn` level, so it shows up
/// wherever the embedding binary sends its logs.
///
/// # Example
/// ```ignore
/// warn_once("CSS", "unsupported selector '>'");
/// ```
pub fn warn_once(component: &str, message: &str) {
    let key = format!("[{component}] {message}");
    let first_time = WARNED
        .lock()
        .map(|mut guard| guard.get_or_insert_with(HashSet::new).insert(key))
        .unwrap_or(true);

    if first_time {
        log::warn!(target: "quokka", "{}", format!("[Quokka {component}] {message}").yellow());
    }
}

/// Clear all recorded warnings (call when loading a new page)
pub fn clear_warnings() {
    if let Ok(mut guard) = WARNED.lock() {
        if let Some(set) = guard.as_mut() {
            set.clear();
        }
    }
}

/// Whether `message` has already been reported for `component`.
#[must_use]
pub fn was_warned(component: &str, message: &str) -> bool {
    let key = format!("[{component}] {message}");
    WARNED
        .lock()
        .is_ok_and(|guard| guard.as_ref().is_some_and(|set| set.contains(&key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warn_once_records_message() {
        warn_once("TEST", "unique message for record test");
        assert!(was_warned("TEST", "unique message for record test"));
        assert!(!was_warned("TEST", "never emitted"));
    }
}
