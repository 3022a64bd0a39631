use image::{GrayImage, Luma};
use imageproc::region_labelling::connected_components;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    traits::MaskPostProcessor,
    types::{Connectivity, MASK_OFF, MASK_ON},
};

/// Drops connected components smaller than `min_area_pixels`.
///
/// A component of exactly `min_area_pixels` pixels is kept.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct MinimumAreaFilter {
    pub min_area_pixels: u32,
    #[serde(default)]
    pub connectivity: Connectivity,
}

impl Default for MinimumAreaFilter {
    fn default() -> Self {
        Self {
            min_area_pixels: 10,
            connectivity: Connectivity::Eight,
        }
    }
}

impl MinimumAreaFilter {
    pub fn new(min_area_pixels: u32, connectivity: Connectivity) -> Self {
        Self {
            min_area_pixels,
            connectivity,
        }
    }
}

impl MaskPostProcessor for MinimumAreaFilter {
    fn process(&self, mask: &mut GrayImage) -> Result<()> {
        // Labelling splits components by value, so normalize first
        for pixel in mask.pixels_mut() {
            if pixel.0[0] != MASK_OFF {
                pixel.0[0] = MASK_ON;
            }
        }

        if self.min_area_pixels <= 1 {
            return Ok(());
        }

        let (labels, sizes) = label_components(mask, self.connectivity);
        for (pixel, label) in mask.pixels_mut().zip(labels.pixels()) {
            let label = label.0[0] as usize;
            if label != 0 && sizes[label] < self.min_area_pixels {
                pixel.0[0] = MASK_OFF;
            }
        }

        Ok(())
    }
}

/// Label the components of a normalized mask; `sizes[label]` is the pixel
/// count of each component and `sizes[0]` counts the background.
pub fn label_components(
    mask: &GrayImage,
    connectivity: Connectivity,
) -> (image::ImageBuffer<Luma<u32>, Vec<u32>>, Vec<u32>) {
    let labels = connected_components(mask, connectivity.to_imageproc(), Luma([MASK_OFF]));
    let max_label = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0);

    let mut sizes = vec![0u32; max_label as usize + 1];
    for pixel in labels.pixels() {
        sizes[pixel.0[0] as usize] += 1;
    }

    (labels, sizes)
}
