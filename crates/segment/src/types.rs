use image::{GrayImage, ImageBuffer, Luma};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

use crate::error::{Result, SegmentError};

/// Single-band floating point raster (spectral index, band reflectance, class score).
pub type IndexRaster = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Value stored in a [`GrayImage`] mask for selected pixels.
pub const MASK_ON: u8 = 255;
/// Value stored in a [`GrayImage`] mask for unselected pixels.
pub const MASK_OFF: u8 = 0;

/// Pixel neighbourhood used by region growing and component labelling.
#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Connectivity {
    /// Horizontal and vertical neighbours only
    Four,
    /// Horizontal, vertical and diagonal neighbours
    #[default]
    Eight,
}

impl Connectivity {
    const FOUR: [(i64, i64); 4] = [(-1, 0), (0, -1), (0, 1), (1, 0)];
    const EIGHT: [(i64, i64); 8] = [
        (-1, -1), (-1, 0), (-1, 1),
        (0, -1), (0, 1),
        (1, -1), (1, 0), (1, 1),
    ];

    /// (row, col) offsets of the neighbourhood
    pub fn offsets(&self) -> &'static [(i64, i64)] {
        match self {
            Self::Four => &Self::FOUR,
            Self::Eight => &Self::EIGHT,
        }
    }

    pub(crate) fn to_imageproc(self) -> imageproc::region_labelling::Connectivity {
        match self {
            Self::Four => imageproc::region_labelling::Connectivity::Four,
            Self::Eight => imageproc::region_labelling::Connectivity::Eight,
        }
    }
}

/// A pixel position in raster space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct PixelCoord {
    pub row: i64,
    pub col: i64,
}

impl PixelCoord {
    pub fn new(row: i64, col: i64) -> Self {
        Self { row, col }
    }

    /// Round a pointer position (x = column, y = row, pixel centres on integers)
    /// to the nearest pixel. Halves round to even, so a click exactly between
    /// two pixels lands on the even index. Non-finite positions map to a
    /// coordinate outside every raster.
    pub fn from_point(x: f64, y: f64) -> Self {
        if !x.is_finite() || !y.is_finite() {
            return Self {
                row: i64::MIN,
                col: i64::MIN,
            };
        }
        Self {
            row: y.round_ties_even() as i64,
            col: x.round_ties_even() as i64,
        }
    }

    /// Returns `(x, y)` as unsigned indices when the coordinate lies inside the raster.
    pub fn checked(&self, width: u32, height: u32) -> Result<(u32, u32)> {
        if self.row < 0 || self.col < 0 || self.row >= height as i64 || self.col >= width as i64 {
            return Err(SegmentError::OutOfBounds {
                row: self.row,
                col: self.col,
                width,
                height,
            });
        }
        Ok((self.col as u32, self.row as u32))
    }
}

/// Boolean-mask helpers over the binary [`GrayImage`] convention.
pub trait MaskExt {
    /// All-false mask with the given dimensions
    fn empty_mask(width: u32, height: u32) -> Self;
    fn is_set(&self, x: u32, y: u32) -> bool;
    fn set(&mut self, x: u32, y: u32, on: bool);
    /// Number of selected pixels
    fn count(&self) -> usize;
    fn union_with(&mut self, other: &GrayImage) -> Result<()>;
    fn intersect_with(&mut self, other: &GrayImage) -> Result<()>;
    fn is_subset_of(&self, other: &GrayImage) -> bool;
}

impl MaskExt for GrayImage {
    fn empty_mask(width: u32, height: u32) -> Self {
        GrayImage::new(width, height)
    }

    fn is_set(&self, x: u32, y: u32) -> bool {
        self.get_pixel(x, y).0[0] != MASK_OFF
    }

    fn set(&mut self, x: u32, y: u32, on: bool) {
        let value = if on { MASK_ON } else { MASK_OFF };
        self.put_pixel(x, y, Luma([value]));
    }

    fn count(&self) -> usize {
        self.as_raw().iter().filter(|&&v| v != MASK_OFF).count()
    }

    fn union_with(&mut self, other: &GrayImage) -> Result<()> {
        ensure_same_shape(self.dimensions(), other.dimensions())?;
        for (a, b) in self.pixels_mut().zip(other.pixels()) {
            if b.0[0] != MASK_OFF {
                a.0[0] = MASK_ON;
            }
        }
        Ok(())
    }

    fn intersect_with(&mut self, other: &GrayImage) -> Result<()> {
        ensure_same_shape(self.dimensions(), other.dimensions())?;
        for (a, b) in self.pixels_mut().zip(other.pixels()) {
            if b.0[0] == MASK_OFF {
                a.0[0] = MASK_OFF;
            }
        }
        Ok(())
    }

    fn is_subset_of(&self, other: &GrayImage) -> bool {
        self.dimensions() == other.dimensions()
            && self
                .pixels()
                .zip(other.pixels())
                .all(|(a, b)| a.0[0] == MASK_OFF || b.0[0] != MASK_OFF)
    }
}

pub(crate) fn ensure_same_shape(expected: (u32, u32), found: (u32, u32)) -> Result<()> {
    if expected != found {
        return Err(SegmentError::ShapeMismatch { expected, found });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_rounding() {
        assert_eq!(PixelCoord::from_point(4.6, 2.4), PixelCoord::new(2, 5));
        assert_eq!(PixelCoord::from_point(-0.4, 0.0), PixelCoord::new(0, 0));
        assert_eq!(PixelCoord::from_point(2.5, 3.5), PixelCoord::new(4, 2));
        assert_eq!(PixelCoord::from_point(0.5, -0.5), PixelCoord::new(0, 0));
    }

    #[test]
    fn test_non_finite_pointer_is_out_of_bounds() {
        for (x, y) in [(f64::NAN, 1.0), (1.0, f64::INFINITY), (f64::NEG_INFINITY, f64::NAN)] {
            assert!(matches!(
                PixelCoord::from_point(x, y).checked(10, 10),
                Err(SegmentError::OutOfBounds { .. })
            ));
        }
    }

    #[test]
    fn test_checked_bounds() {
        assert_eq!(PixelCoord::new(2, 3).checked(4, 4).unwrap(), (3, 2));
        assert!(matches!(
            PixelCoord::new(4, 0).checked(4, 4),
            Err(SegmentError::OutOfBounds { row: 4, col: 0, .. })
        ));
        assert!(PixelCoord::new(0, -1).checked(4, 4).is_err());
    }

    #[test]
    fn test_mask_set_operations() {
        let mut a = GrayImage::empty_mask(3, 3);
        let mut b = GrayImage::empty_mask(3, 3);
        a.set(0, 0, true);
        a.set(1, 1, true);
        b.set(1, 1, true);
        b.set(2, 2, true);

        let mut union = a.clone();
        union.union_with(&b).unwrap();
        assert_eq!(union.count(), 3);

        a.intersect_with(&b).unwrap();
        assert_eq!(a.count(), 1);
        assert!(a.is_set(1, 1));
        assert!(a.is_subset_of(&b));
        assert!(!b.is_subset_of(&a));
    }

    #[test]
    fn test_mask_shape_mismatch() {
        let mut a = GrayImage::empty_mask(3, 3);
        let b = GrayImage::empty_mask(3, 4);
        assert!(matches!(
            a.union_with(&b),
            Err(SegmentError::ShapeMismatch { .. })
        ));
    }
}
