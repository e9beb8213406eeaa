//! Errors raised by the browser crate.

use quokka_common::net::NetError;
use quokka_common::url::UrlError;
use thiserror::Error;

/// Failure to load a frame's main document.
///
/// Sub-resource failures never surface here: a missing stylesheet is
/// skipped, an image becomes the broken-image sentinel, a script is not run.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The address could not be parsed or resolved.
    #[error("invalid URL '{url}': {source}")]
    Url {
        /// The address as given.
        url: String,
        /// Why it was rejected.
        #[source]
        source: UrlError,
    },
    /// The document could not be fetched.
    #[error(transparent)]
    Net(#[from] NetError),
    /// The frame does not exist (it was removed while its load was queued).
    #[error("no frame {0}")]
    NoSuchFrame(u64),
}

/// Failure to decode an image resource.
#[derive(Debug, Error)]
pub enum ImageError {
    /// The bytes are not an SVG document `usvg` accepts.
    #[error("failed to parse SVG: {0}")]
    Svg(String),
    /// The bytes are not a raster format the `image` crate understands.
    #[error("could not decode image: {0}")]
    Raster(#[from] image::ImageError),
    /// The image has no pixels.
    #[error("image has zero-size dimensions")]
    Empty,
    /// The rasterisation surface could not be allocated.
    #[error("failed to allocate a {width}x{height} pixmap")]
    Allocation {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
}

/// Failure to composite a frame.
#[derive(Debug, Error)]
pub enum CompositorError {
    /// The output surface could not be allocated.
    #[error("failed to allocate a {width}x{height} surface")]
    Allocation {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
}
