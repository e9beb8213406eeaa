//! Frames, tabs and compositing for the Quokka browser.
//!
//! # Scope
//!
//! This crate provides:
//! - **Frames** - one document each: load, CSP, the style/layout/paint
//!   pipeline, focus and editing
//! - **Tabs** - a tree of frames sharing a task queue, script runtimes,
//!   input handling, history, zoom and dark mode
//! - **Task queue** - everything that mutates a tab runs as a task on its
//!   main thread
//! - **Commits** - immutable snapshots handed to the compositor
//! - **Compositor** - composited layers, raster, the final draw, screenshots
//! - **Accessibility** - a role tree built after every layout
//! - **Fonts and images** - system font metrics and glyphs via `fontdue`,
//!   raster and SVG decoding
//!
//! # Threads
//!
//! ```text
//! UI ── Task ──→ TaskRunner ──→ Tab (main thread) ── CommitData ──→ Compositor thread
//! ```
//!
//! # Not Yet Implemented
//!
//! - Scrolling inside iframes
//! - Cancelling timers

pub mod accessibility;
pub mod commit;
pub mod compositor;
pub mod config;
pub mod csp;
pub mod error;
pub mod fonts;
pub mod frame;
pub mod image_loader;
pub mod scheduler;
pub mod tab;
pub mod task;

pub use quokka_common as common;
pub use quokka_css as css;
pub use quokka_dom as dom;
pub use quokka_html as html;
pub use quokka_js as js;

pub use accessibility::{AccessibilityNode, Role};
pub use commit::CommitData;
pub use compositor::{Compositor, draw_display_list};
pub use config::{BrowserConfig, SCROLL_STEP, ZOOM_STEP, ZoomChange};
pub use csp::ContentSecurityPolicy;
pub use error::{CompositorError, ImageError, LoadError};
pub use fonts::SystemFontMetrics;
pub use frame::{Frame, LoadState};
pub use image_loader::ImageLoaderPipeline;
pub use scheduler::{CommitSender, CompositorThread, TabThread};
pub use tab::Tab;
pub use task::{Task, TaskRunner};
