//! Image loading pipeline: fetch, detect format, and decode.
//!
//! [§ 4.8.3 The img element](https://html.spec.whatwg.org/multipage/embedded-content.html#the-img-element)
//!
//! 1. **Fetch** through the tab's [`Fetcher`].
//! 2. **Detect** with [`detect_format()`]: SVG or raster, from the
//!    extension, the `data:` MIME type or magic bytes.
//! 3. **Decode** with an [`ImageDecoder`]: [`SvgDecoder`] or
//!    [`RasterDecoder`].
//!
//! Any failure yields the shared broken-image sentinel, so layout always
//! has intrinsic dimensions to work with.

use std::sync::Arc;

use quokka_common::image::LoadedImage;
use quokka_common::net::{Fetcher, Request};
use quokka_common::url::Url;
use quokka_common::warning::warn_once;

use crate::error::ImageError;

/// Detected image format.
///
/// Only two variants are needed: the `image` crate handles raster sub-format
/// detection (PNG/JPEG/GIF/WebP/…) internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// SVG vector image (decoded via usvg + resvg).
    Svg,
    /// Raster image (decoded via the `image` crate).
    Raster,
}

/// Strip query string (`?…`) and fragment identifier (`#…`) from a URL so
/// that the remaining path can be checked for a file extension.
///
/// [URL Standard § 4.1](https://url.spec.whatwg.org/#concept-url-path)
#[must_use]
pub fn strip_url_decorations(resolved: &str) -> &str {
    let without_fragment = resolved.split_once('#').map_or(resolved, |(b, _)| b);
    without_fragment
        .split_once('?')
        .map_or(without_fragment, |(b, _)| b)
}

/// Detect whether `bytes` represent an SVG or a raster image.
///
/// 1. **Extension check**: fast path for `.svg`.
/// 2. **Data URL MIME check**: `data:image/svg` prefix.
/// 3. **Magic-byte sniffing**: trims leading whitespace and checks the
///    first 256 bytes for `<?xml` or `<svg` prefixes.
/// 4. **Default**: [`ImageFormat::Raster`].
#[must_use]
pub fn detect_format(resolved_url: &str, bytes: &[u8]) -> ImageFormat {
    // STEP 1: Extension.
    if std::path::Path::new(strip_url_decorations(resolved_url))
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"))
    {
        return ImageFormat::Svg;
    }

    // STEP 2: Data URL MIME type.
    if resolved_url.starts_with("data:image/svg") {
        return ImageFormat::Svg;
    }

    // STEP 3: Magic bytes.
    let trimmed = bytes
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .take(256)
        .copied()
        .collect::<Vec<u8>>();
    if trimmed.starts_with(b"<?xml") || trimmed.starts_with(b"<svg") {
        return ImageFormat::Svg;
    }

    ImageFormat::Raster
}

/// A decoder that can turn raw bytes into a [`LoadedImage`].
pub trait ImageDecoder {
    /// Whether this decoder handles the given format.
    fn supports(&self, format: ImageFormat) -> bool;

    /// Decode `bytes`.
    ///
    /// # Errors
    ///
    /// Returns an [`ImageError`] if the bytes cannot be decoded.
    fn decode(&self, bytes: &[u8]) -> Result<LoadedImage, ImageError>;
}

/// Decodes SVG images via usvg → resvg rasterization.
pub struct SvgDecoder;

impl ImageDecoder for SvgDecoder {
    fn supports(&self, format: ImageFormat) -> bool {
        format == ImageFormat::Svg
    }

    fn decode(&self, bytes: &[u8]) -> Result<LoadedImage, ImageError> {
        let opts = usvg::Options::default();
        let tree = usvg::Tree::from_data(bytes, &opts).map_err(|e| ImageError::Svg(e.to_string()))?;

        let size = tree.size();
        let (width, height) = (size.width().ceil() as u32, size.height().ceil() as u32);
        if width == 0 || height == 0 {
            return Err(ImageError::Empty);
        }

        let mut pixmap =
            tiny_skia::Pixmap::new(width, height).ok_or(ImageError::Allocation { width, height })?;
        resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

        // tiny-skia stores premultiplied pixels; LoadedImage is straight alpha.
        let rgba = pixmap
            .pixels()
            .iter()
            .flat_map(|p| {
                let c = p.demultiply();
                [c.red(), c.green(), c.blue(), c.alpha()]
            })
            .collect();
        Ok(LoadedImage::new(width, height, rgba))
    }
}

/// Decodes raster images (PNG, JPEG, GIF, WebP, …) via the `image` crate.
pub struct RasterDecoder;

impl ImageDecoder for RasterDecoder {
    fn supports(&self, format: ImageFormat) -> bool {
        format == ImageFormat::Raster
    }

    fn decode(&self, bytes: &[u8]) -> Result<LoadedImage, ImageError> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(ImageError::Empty);
        }
        Ok(LoadedImage::new(width, height, rgba.into_raw()))
    }
}

/// Image loading pipeline that detects format and dispatches to the
/// appropriate decoder.
pub struct ImageLoaderPipeline {
    decoders: Vec<Box<dyn ImageDecoder>>,
}

impl ImageLoaderPipeline {
    /// Create a pipeline with the default decoders (SVG + raster).
    #[must_use]
    pub fn new() -> Self {
        Self {
            decoders: vec![Box::new(SvgDecoder), Box::new(RasterDecoder)],
        }
    }

    /// Detect the image format and decode `bytes`.
    ///
    /// # Errors
    ///
    /// Returns the decoder's error.
    pub fn decode(&self, bytes: &[u8], resolved_url: &str) -> Result<LoadedImage, ImageError> {
        let format = detect_format(resolved_url, bytes);
        self.decoders
            .iter()
            .find(|decoder| decoder.supports(format))
            .map_or(Err(ImageError::Empty), |decoder| decoder.decode(bytes))
    }

    /// Fetch and decode the image at `url`, or the broken-image sentinel.
    #[must_use]
    pub fn load(&self, fetcher: &dyn Fetcher, url: &Url, referrer: &Url) -> Arc<LoadedImage> {
        let request = Request::get(url.clone()).with_referrer(Some(referrer));
        let bytes = match fetcher.fetch(&request) {
            Ok(response) => response.body,
            Err(e) => {
                log::warn!("image {url} failed to load: {e}");
                return LoadedImage::broken();
            }
        };
        match self.decode(&bytes, &url.to_string()) {
            Ok(image) => Arc::new(image),
            Err(e) => {
                warn_once("image", &format!("{url}: {e}"));
                LoadedImage::broken()
            }
        }
    }
}

impl Default for ImageLoaderPipeline {
    fn default() -> Self {
        Self::new()
    }
}
