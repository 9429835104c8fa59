//! Decoded page rasters and page geometry.

use image::{ImageBuffer, Rgba};
use std::fmt;
use std::sync::Arc;

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Size of a page or a render target in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageSize {
    pub width: u32,
    pub height: u32,
}

impl PageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Largest size with this page's aspect ratio that fits inside
    /// `max_width` x `max_height`.
    ///
    /// A page wider than the bounds is fitted to the width, anything else is
    /// fitted to the height.
    pub fn fit_within(&self, max_width: u32, max_height: u32) -> PageSize {
        if self.is_empty() || max_width == 0 || max_height == 0 {
            return PageSize::new(max_width, max_height);
        }

        let page_ratio = self.width as f32 / self.height as f32;
        let max_ratio = max_width as f32 / max_height as f32;

        if page_ratio > max_ratio {
            let height = (max_width as f32 / page_ratio) as u32;
            PageSize::new(max_width, height.max(1))
        } else {
            let width = (max_height as f32 * page_ratio) as u32;
            PageSize::new(width.max(1), max_height)
        }
    }
}

/// A fully decoded page raster.
///
/// Cheap to clone: clones share the same pixel buffer, which is released when
/// the last clone (cache entry or display slot) is dropped.
#[derive(Clone)]
pub struct Bitmap {
    page_index: u32,
    image: Arc<RgbaImage>,
}

impl Bitmap {
    pub fn new(page_index: u32, image: RgbaImage) -> Self {
        Self { page_index, image: Arc::new(image) }
    }

    /// Page this raster was decoded from.
    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn size(&self) -> PageSize {
        PageSize::new(self.width(), self.height())
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Memory held by the pixel buffer in bytes.
    pub fn memory_size(&self) -> usize {
        self.image.as_raw().len()
    }

    /// Whether both handles point at the same pixel buffer.
    pub fn ptr_eq(&self, other: &Bitmap) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("page_index", &self.page_index)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_within_wide_page_fits_width() {
        let page = PageSize::new(800, 400);
        assert_eq!(page.fit_within(400, 400), PageSize::new(400, 200));
    }

    #[test]
    fn test_fit_within_tall_page_fits_height() {
        let page = PageSize::new(612, 792);
        let fitted = page.fit_within(1000, 500);
        assert_eq!(fitted.height, 500);
        assert_eq!(fitted.width, 386);
    }

    #[test]
    fn test_fit_within_degenerate_page_returns_bounds() {
        let page = PageSize::new(0, 100);
        assert_eq!(page.fit_within(300, 200), PageSize::new(300, 200));
    }

    #[test]
    fn test_bitmap_clones_share_pixels() {
        let bitmap = Bitmap::new(3, RgbaImage::new(4, 2));
        let clone = bitmap.clone();

        assert!(bitmap.ptr_eq(&clone));
        assert_eq!(clone.page_index(), 3);
        assert_eq!(clone.size(), PageSize::new(4, 2));
        assert_eq!(clone.memory_size(), 4 * 2 * 4);
    }

    #[test]
    fn test_separately_decoded_bitmaps_are_distinct() {
        let a = Bitmap::new(0, RgbaImage::new(1, 1));
        let b = Bitmap::new(0, RgbaImage::new(1, 1));
        assert!(!a.ptr_eq(&b));
    }
}
