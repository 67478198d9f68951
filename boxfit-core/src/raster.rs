//! Value types for synthetic raster samples.
//!
//! A sample couples one normalised greyscale raster with the bounding box of
//! the rectangle drawn into it. Boxes use raster pixel coordinates with the
//! origin in the top-left corner.

/// Axis-aligned bounding box of a rectangle inside a raster.
///
/// # Examples
/// ```
/// use boxfit_core::BoundingBox;
///
/// let bounding_box = BoundingBox::new(3, 5, 8, 4);
/// assert_eq!(bounding_box.to_label(), [3.0, 5.0, 8.0, 4.0]);
/// assert!(bounding_box.fits_within(32));
/// assert!(!bounding_box.fits_within(8));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl BoundingBox {
    /// Number of scalar values a box contributes to a label row.
    pub const LABEL_VALUES: usize = 4;

    /// Creates a bounding box from its top-left corner and extent.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns the left edge in pixels.
    #[rustfmt::skip]
    #[must_use]
    pub const fn x(&self) -> u32 { self.x }

    /// Returns the top edge in pixels.
    #[rustfmt::skip]
    #[must_use]
    pub const fn y(&self) -> u32 { self.y }

    /// Returns the width in pixels.
    #[rustfmt::skip]
    #[must_use]
    pub const fn width(&self) -> u32 { self.width }

    /// Returns the height in pixels.
    #[rustfmt::skip]
    #[must_use]
    pub const fn height(&self) -> u32 { self.height }

    /// Reports whether the box lies fully inside a square raster of the given
    /// edge length.
    #[must_use]
    pub fn fits_within(&self, edge: u32) -> bool {
        let right = self.x.checked_add(self.width);
        let bottom = self.y.checked_add(self.height);
        matches!((right, bottom), (Some(r), Some(b)) if r <= edge && b <= edge)
    }

    /// Encodes the box as the four label values `[x, y, width, height]`.
    #[must_use]
    pub fn to_label(&self) -> [f32; Self::LABEL_VALUES] {
        [
            self.x as f32,
            self.y as f32,
            self.width as f32,
            self.height as f32,
        ]
    }
}

/// One synthetic sample: a normalised raster and its rectangle label.
///
/// Pixels are stored row-major with values in `[0.0, 1.0]`; for the
/// rectangle synthesiser every value is exactly `0.0` or `1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pixels: Vec<f32>,
    bounding_box: BoundingBox,
}

impl Sample {
    pub(crate) fn new(pixels: Vec<f32>, bounding_box: BoundingBox) -> Self {
        Self {
            pixels,
            bounding_box,
        }
    }

    /// Returns the normalised pixel intensities in row-major order.
    #[rustfmt::skip]
    #[must_use]
    pub fn pixels(&self) -> &[f32] { &self.pixels }

    /// Returns the bounding box of the rectangle drawn into the raster.
    #[rustfmt::skip]
    #[must_use]
    pub const fn bounding_box(&self) -> &BoundingBox { &self.bounding_box }

    /// Consumes the sample, yielding its pixels and bounding box.
    #[must_use]
    pub fn into_parts(self) -> (Vec<f32>, BoundingBox) {
        (self.pixels, self.bounding_box)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::snug(BoundingBox::new(0, 0, 32, 32), 32, true)]
    #[case::interior(BoundingBox::new(10, 20, 4, 12), 32, true)]
    #[case::right_overflow(BoundingBox::new(29, 0, 4, 4), 32, false)]
    #[case::bottom_overflow(BoundingBox::new(0, 30, 4, 4), 32, false)]
    #[case::coordinate_overflow(BoundingBox::new(u32::MAX, 0, 1, 1), u32::MAX, false)]
    fn fits_within_checks_both_axes(
        #[case] bounding_box: BoundingBox,
        #[case] edge: u32,
        #[case] expected: bool,
    ) {
        assert_eq!(bounding_box.fits_within(edge), expected);
    }

    #[rstest]
    fn label_encoding_preserves_field_order() {
        let bounding_box = BoundingBox::new(1, 2, 3, 4);
        assert_eq!(bounding_box.to_label(), [1.0, 2.0, 3.0, 4.0]);
    }
}
