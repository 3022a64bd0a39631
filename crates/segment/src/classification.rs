use std::collections::BTreeMap;

use image::{GrayImage, Luma, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    algorithms::MinimumAreaFilter,
    error::Result,
    traits::MaskPostProcessor,
    types::{ensure_same_shape, Connectivity, IndexRaster, MaskExt, MASK_OFF},
};

/// Display colour per class id
pub type Palette = BTreeMap<u8, Rgb<u8>>;

/// Raw per-pixel scores for one class, as produced by an external classifier.
#[derive(Debug, Clone)]
pub struct ClassScores {
    pub class_id: u8,
    pub name: String,
    /// Probability (or 0/1 for hard labels) per pixel
    pub scores: IndexRaster,
    /// Pixels scoring at least this much are candidates for the class
    pub threshold: f32,
}

/// Score layers for every class of one image, in priority order.
#[derive(Debug, Clone)]
pub struct ClassScoreMap {
    width: u32,
    height: u32,
    layers: Vec<ClassScores>,
}

impl ClassScoreMap {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            layers: Vec::new(),
        }
    }

    /// Append a layer with the lowest priority so far
    pub fn push(&mut self, layer: ClassScores) -> Result<()> {
        ensure_same_shape((self.width, self.height), layer.scores.dimensions())?;
        self.layers.push(layer);
        Ok(())
    }

    pub fn with_layer(mut self, layer: ClassScores) -> Result<Self> {
        self.push(layer)?;
        Ok(self)
    }

    /// Hard 0/1 score layers (threshold 0.5) from already assigned masks
    pub fn from_masks(masks: &FilteredClassMasks) -> Self {
        let layers = masks
            .classes
            .iter()
            .map(|class| ClassScores {
                class_id: class.class_id,
                name: class.name.clone(),
                scores: IndexRaster::from_fn(masks.width, masks.height, |x, y| {
                    Luma([if class.mask.is_set(x, y) { 1.0 } else { 0.0 }])
                }),
                threshold: 0.5,
            })
            .collect();

        Self {
            width: masks.width,
            height: masks.height,
            layers,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn layers(&self) -> &[ClassScores] {
        &self.layers
    }
}

/// Final boolean mask of one class
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMask {
    pub class_id: u8,
    pub name: String,
    pub mask: GrayImage,
}

/// Pairwise disjoint class masks after area filtering
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredClassMasks {
    pub width: u32,
    pub height: u32,
    pub classes: Vec<ClassMask>,
}

impl FilteredClassMasks {
    pub fn get(&self, class_id: u8) -> Option<&ClassMask> {
        self.classes.iter().find(|c| c.class_id == class_id)
    }

    /// Class assigned to a pixel, if any
    pub fn class_at(&self, x: u32, y: u32) -> Option<u8> {
        self.classes
            .iter()
            .find(|c| c.mask.is_set(x, y))
            .map(|c| c.class_id)
    }

    /// Single-band label raster with 0 for unassigned pixels
    pub fn to_label_raster(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([self.class_at(x, y).unwrap_or(MASK_OFF)])
        })
    }

    /// Pixel count per class id
    pub fn pixel_counts(&self) -> BTreeMap<u8, usize> {
        self.classes
            .iter()
            .map(|c| (c.class_id, c.mask.count()))
            .collect()
    }
}

/// Post-classification clean-up turning raw class scores into disjoint,
/// area-filtered class masks.
///
/// A pixel goes to the highest-scoring class among those reaching their
/// threshold; exact ties go to the layer that comes first in the
/// [`ClassScoreMap`]. Components smaller than the minimum area are then
/// removed from each class and their pixels stay unassigned.
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema, PartialEq)]
pub struct ClassificationPostProcessor {
    #[serde(default)]
    pub connectivity: Connectivity,
}

impl ClassificationPostProcessor {
    pub fn new(connectivity: Connectivity) -> Self {
        Self { connectivity }
    }

    pub fn filter(&self, scores: &ClassScoreMap, min_area_pixels: u32) -> Result<FilteredClassMasks> {
        let (width, height) = scores.dimensions();
        let layers = scores.layers();

        let mut classes: Vec<ClassMask> = layers
            .iter()
            .map(|layer| ClassMask {
                class_id: layer.class_id,
                name: layer.name.clone(),
                mask: GrayImage::empty_mask(width, height),
            })
            .collect();

        for y in 0..height {
            for x in 0..width {
                let mut best: Option<(usize, f32)> = None;
                for (i, layer) in layers.iter().enumerate() {
                    let score = layer.scores.get_pixel(x, y).0[0];
                    if !score.is_finite() || !(score >= layer.threshold) {
                        continue;
                    }
                    match best {
                        Some((_, best_score)) if score <= best_score => {}
                        _ => best = Some((i, score)),
                    }
                }
                if let Some((i, _)) = best {
                    classes[i].mask.set(x, y, true);
                }
            }
        }

        let area_filter = MinimumAreaFilter::new(min_area_pixels, self.connectivity);
        for class in &mut classes {
            let before = class.mask.count();
            area_filter.process(&mut class.mask)?;
            debug!(
                "Class '{}' ({}): kept {} of {} pixels (min area {} px)",
                class.name,
                class.class_id,
                class.mask.count(),
                before,
                min_area_pixels
            );
        }

        Ok(FilteredClassMasks {
            width,
            height,
            classes,
        })
    }
}

/// Paint every class mask over the base preview with its palette colour.
/// Classes without a palette entry are left unpainted.
pub fn render_composite(base: &RgbImage, masks: &FilteredClassMasks, palette: &Palette) -> Result<RgbImage> {
    ensure_same_shape(base.dimensions(), (masks.width, masks.height))?;

    let mut composite = base.clone();
    for class in &masks.classes {
        let Some(&colour) = palette.get(&class.class_id) else {
            continue;
        };
        for (x, y, pixel) in class.mask.enumerate_pixels() {
            if pixel.0[0] != MASK_OFF {
                composite.put_pixel(x, y, colour);
            }
        }
    }

    Ok(composite)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(class_id: u8, name: &str, scores: IndexRaster, threshold: f32) -> ClassScores {
        ClassScores {
            class_id,
            name: name.to_string(),
            scores,
            threshold,
        }
    }

    fn block_scores(width: u32, height: u32, block: (u32, u32, u32, u32), value: f32) -> IndexRaster {
        let (x0, y0, w, h) = block;
        IndexRaster::from_fn(width, height, |x, y| {
            let inside = x >= x0 && x < x0 + w && y >= y0 && y < y0 + h;
            Luma([if inside { value } else { 0.0 }])
        })
    }

    #[test]
    fn test_masks_are_disjoint_and_highest_score_wins() {
        let water = block_scores(10, 10, (0, 0, 6, 10), 0.6);
        let sand = block_scores(10, 10, (4, 0, 6, 10), 0.8);
        let scores = ClassScoreMap::new(10, 10)
            .with_layer(layer(1, "water", water, 0.5))
            .unwrap()
            .with_layer(layer(2, "sand", sand, 0.5))
            .unwrap();

        let masks = ClassificationPostProcessor::default().filter(&scores, 1).unwrap();

        assert_eq!(masks.class_at(5, 5), Some(2));
        assert_eq!(masks.class_at(1, 5), Some(1));
        for y in 0..10 {
            for x in 0..10 {
                let owners = masks.classes.iter().filter(|c| c.mask.is_set(x, y)).count();
                assert!(owners <= 1);
            }
        }
    }

    #[test]
    fn test_ties_go_to_earlier_layer() {
        let all = block_scores(4, 4, (0, 0, 4, 4), 1.0);
        let scores = ClassScoreMap::new(4, 4)
            .with_layer(layer(3, "first", all.clone(), 0.5))
            .unwrap()
            .with_layer(layer(7, "second", all, 0.5))
            .unwrap();

        let masks = ClassificationPostProcessor::default().filter(&scores, 1).unwrap();
        assert_eq!(masks.pixel_counts()[&3], 16);
        assert_eq!(masks.pixel_counts()[&7], 0);
    }

    #[test]
    fn test_small_components_dropped_and_left_unassigned() {
        let mut sand = block_scores(20, 20, (0, 0, 5, 5), 1.0);
        sand.put_pixel(15, 15, Luma([1.0]));
        let water = block_scores(20, 20, (15, 15, 1, 1), 0.7);

        let scores = ClassScoreMap::new(20, 20)
            .with_layer(layer(1, "sand", sand, 0.5))
            .unwrap()
            .with_layer(layer(2, "water", water, 0.5))
            .unwrap();

        let masks = ClassificationPostProcessor::default().filter(&scores, 25).unwrap();
        assert_eq!(masks.pixel_counts()[&1], 25);
        // The lone sand pixel is removed, not handed to the losing class
        assert_eq!(masks.class_at(15, 15), None);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let scores_a = IndexRaster::from_fn(16, 16, |x, y| Luma([((x * 3 + y * 5) % 7) as f32 / 7.0]));
        let scores_b = IndexRaster::from_fn(16, 16, |x, y| Luma([((x * 5 + y * 2) % 9) as f32 / 9.0]));
        let scores = ClassScoreMap::new(16, 16)
            .with_layer(layer(1, "a", scores_a, 0.4))
            .unwrap()
            .with_layer(layer(2, "b", scores_b, 0.4))
            .unwrap();

        let processor = ClassificationPostProcessor::default();
        let once = processor.filter(&scores, 4).unwrap();
        let twice = processor.filter(&ClassScoreMap::from_masks(&once), 4).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_nan_scores_never_qualify() {
        let scores_raster = IndexRaster::from_pixel(3, 3, Luma([f32::NAN]));
        let scores = ClassScoreMap::new(3, 3)
            .with_layer(layer(1, "a", scores_raster, 0.0))
            .unwrap();
        let masks = ClassificationPostProcessor::default().filter(&scores, 1).unwrap();
        assert_eq!(masks.pixel_counts()[&1], 0);
    }

    #[test]
    fn test_layer_shape_checked() {
        let mut scores = ClassScoreMap::new(4, 4);
        assert!(scores.push(layer(1, "a", IndexRaster::new(5, 4), 0.5)).is_err());
    }

    #[test]
    fn test_composite_uses_palette() {
        let base = RgbImage::from_pixel(4, 4, Rgb([10, 10, 10]));
        let scores = ClassScoreMap::new(4, 4)
            .with_layer(layer(1, "water", block_scores(4, 4, (0, 0, 2, 4), 1.0), 0.5))
            .unwrap();
        let masks = ClassificationPostProcessor::default().filter(&scores, 1).unwrap();

        let palette = Palette::from([(1, Rgb([0, 0, 255]))]);
        let composite = render_composite(&base, &masks, &palette).unwrap();
        assert_eq!(composite.get_pixel(0, 0), &Rgb([0, 0, 255]));
        assert_eq!(composite.get_pixel(3, 3), &Rgb([10, 10, 10]));

        let label_raster = masks.to_label_raster();
        assert_eq!(label_raster.get_pixel(1, 2).0[0], 1);
        assert_eq!(label_raster.get_pixel(2, 2).0[0], 0);
    }
}
