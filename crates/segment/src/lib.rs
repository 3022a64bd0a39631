//! # Shoreline Segmentation Primitives
//!
//! Pixel-level building blocks for labelling multispectral imagery:
//!
//! - **Region growing**: flood selection from a seed over one or more
//!   spectral index rasters, intersected across rasters
//! - **Lasso selection**: polygon to pixel-mask conversion
//! - **Classification clean-up**: disjoint class assignment followed by a
//!   minimum-area filter per class
//! - **GeoJSON export**: class masks vectorized into polygon features
//!
//! Masks use the [`image::GrayImage`] convention of `255` for selected and
//! `0` for unselected pixels.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use segment::{IndexRaster, PixelCoord, PolygonSelector, RegionGrower};
//!
//! let ndwi = IndexRaster::new(100, 100);
//! let mndwi = IndexRaster::new(100, 100);
//!
//! let grower = RegionGrower::new(0.05);
//! let water = grower.grow(&[&ndwi, &mndwi], PixelCoord::new(40, 60))?;
//!
//! let beach = PolygonSelector.select(&[[10.0, 10.0], [30.0, 12.0], [25.0, 40.0]], 100, 100)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod types;
pub mod traits;
pub mod algorithms;
pub mod classification;
pub mod io;

pub use error::{Result, SegmentError};
pub use types::{Connectivity, IndexRaster, MaskExt, PixelCoord, MASK_OFF, MASK_ON};
pub use traits::*;
pub use algorithms::*;
pub use classification::{
    render_composite, ClassMask, ClassScoreMap, ClassScores, ClassificationPostProcessor,
    FilteredClassMasks, Palette,
};

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma};

    use super::*;

    #[test]
    fn test_grown_and_lassoed_masks_combine() {
        let index = IndexRaster::from_fn(12, 12, |x, _| Luma([if x < 6 { 0.2 } else { 0.9 }]));
        let grown = RegionGrower::new(0.05)
            .grow(&[&index], PixelCoord::new(3, 2))
            .unwrap();
        assert_eq!(grown.count(), 72);

        let lasso = PolygonSelector
            .select(&[[6.0, 0.0], [11.0, 0.0], [11.0, 11.0], [6.0, 11.0]], 12, 12)
            .unwrap();
        let mut both = grown.clone();
        both.union_with(&lasso).unwrap();
        assert_eq!(both.count(), 144);

        let mut overlap: GrayImage = grown;
        overlap.intersect_with(&lasso).unwrap();
        assert_eq!(overlap.count(), 0);
    }
}
