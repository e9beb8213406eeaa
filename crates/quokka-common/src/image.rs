//! Image data types shared across browser components.
//!
//! [§ 4.8.3 The img element](https://html.spec.whatwg.org/multipage/embedded-content.html#the-img-element)

use std::fmt;
use std::sync::{Arc, OnceLock};

/// Side length of the broken-image placeholder.
const BROKEN_IMAGE_SIZE: u32 = 16;

/// Decoded image data for a loaded image resource.
///
/// Contains the decoded RGBA pixel data (straight alpha) and intrinsic
/// dimensions.
#[derive(Clone, PartialEq, Eq)]
pub struct LoadedImage {
    /// Intrinsic width of the image in pixels.
    width: u32,
    /// Intrinsic height of the image in pixels.
    height: u32,
    /// Raw RGBA pixel data (width * height * 4 bytes).
    rgba_data: Vec<u8>,
    /// Set only on the shared placeholder.
    broken: bool,
}

impl LoadedImage {
    /// Create a new `LoadedImage` from decoded RGBA pixel data.
    ///
    /// # Arguments
    ///
    /// * `width` - Intrinsic width of the image in pixels
    /// * `height` - Intrinsic height of the image in pixels
    /// * `rgba_data` - Raw RGBA pixel data (must be `width * height * 4` bytes)
    #[must_use]
    pub const fn new(width: u32, height: u32, rgba_data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            rgba_data,
            broken: false,
        }
    }

    /// The `BROKEN_IMAGE` sentinel used when an image fails to load.
    ///
    /// A grey square crossed in red. Shared: every failed `<img>` points at
    /// the same allocation.
    #[must_use]
    pub fn broken() -> Arc<Self> {
        static BROKEN: OnceLock<Arc<LoadedImage>> = OnceLock::new();
        Arc::clone(BROKEN.get_or_init(|| {
            let size = BROKEN_IMAGE_SIZE;
            let mut rgba = Vec::with_capacity((size * size * 4) as usize);
            for y in 0..size {
                for x in 0..size {
                    let on_cross = x == y || x + y == size - 1;
                    let on_edge = x == 0 || y == 0 || x == size - 1 || y == size - 1;
                    let pixel = if on_cross {
                        [200, 30, 30, 255]
                    } else if on_edge {
                        [120, 120, 120, 255]
                    } else {
                        [220, 220, 220, 255]
                    };
                    rgba.extend_from_slice(&pixel);
                }
            }
            Arc::new(Self {
                width: size,
                height: size,
                rgba_data: rgba,
                broken: true,
            })
        }))
    }

    /// Whether this is the broken-image placeholder.
    #[must_use]
    pub const fn is_broken(&self) -> bool {
        self.broken
    }

    /// Intrinsic width of the image in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Intrinsic height of the image in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Intrinsic dimensions as `(width, height)` in `f32`, for layout.
    #[must_use]
    pub fn dimensions_f32(&self) -> (f32, f32) {
        (self.width as f32, self.height as f32)
    }

    /// Raw RGBA pixel data.
    #[must_use]
    pub fn rgba_data(&self) -> &[u8] {
        &self.rgba_data
    }
}

impl fmt::Debug for LoadedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broken_image_is_shared() {
        let a = LoadedImage::broken();
        let b = LoadedImage::broken();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_broken());
        assert_eq!(a.rgba_data().len(), (16 * 16 * 4) as usize);
    }
}
