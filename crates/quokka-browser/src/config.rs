//! Tunables for a tab.

use std::time::Duration;

use quokka_css::REFRESH_RATE_SEC;

/// Distance scrolled by one scroll-down step, in device pixels.
pub const SCROLL_STEP: f32 = 100.0;

/// Factor applied by one zoom-in step, and undone by one zoom-out step.
pub const ZOOM_STEP: f32 = 1.1;

/// Window and scheduling settings for a tab.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserConfig {
    /// Viewport width in device pixels.
    pub width: f32,
    /// Viewport height in device pixels.
    pub height: f32,
    /// Time between animation frames.
    pub refresh_interval: Duration,
    /// Start in dark mode.
    pub dark_mode: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            refresh_interval: Duration::from_secs_f64(REFRESH_RATE_SEC),
            dark_mode: false,
        }
    }
}

impl BrowserConfig {
    /// The default config with another viewport size.
    #[must_use]
    pub fn with_viewport(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }
}

/// A zoom request from the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomChange {
    /// Multiply the zoom by [`ZOOM_STEP`].
    In,
    /// Divide the zoom by [`ZOOM_STEP`].
    Out,
    /// Back to 1.
    Reset,
}

impl ZoomChange {
    /// The zoom after applying this change to `zoom`.
    #[must_use]
    pub fn apply(self, zoom: f32) -> f32 {
        match self {
            Self::In => zoom * ZOOM_STEP,
            Self::Out => zoom / ZOOM_STEP,
            Self::Reset => 1.0,
        }
    }
}
