use std::collections::BTreeMap;

use image::GrayImage;
use schemars::JsonSchema;
use segment::{IndexRaster, MASK_OFF};
use serde::{Deserialize, Serialize};

use crate::{
    canvas::UNLABELED,
    class_spec::ClassSpec,
    error::{AnnotateError, Result},
    scene::Scene,
};

/// Name of the partition holding pixels no class claimed
pub const BACKGROUND_NAME: &str = "unlabeled";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BandStatistics {
    pub mean: f32,
    /// Population standard deviation
    pub std: f32,
    pub min: f32,
    pub max: f32,
}

impl BandStatistics {
    /// Statistics over the finite values, `None` when there are none
    pub fn from_values(values: impl IntoIterator<Item = f32>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;

        for v in values.into_iter().filter(|v| v.is_finite()) {
            count += 1;
            sum += v as f64;
            sum_sq += (v as f64) * (v as f64);
            min = min.min(v);
            max = max.max(v);
        }

        if count == 0 {
            return None;
        }
        let mean = sum / count as f64;
        let variance = (sum_sq / count as f64 - mean * mean).max(0.0);
        Some(Self {
            mean: mean as f32,
            std: variance.sqrt() as f32,
            min,
            max,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ClassFeatures {
    /// Cloud-free pixels carrying the class
    pub pixel_count: usize,
    /// Per band and index raster; `None` for an empty class
    pub statistics: Option<BTreeMap<String, BandStatistics>>,
}

/// Per-class feature summaries keyed by class name
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct FeatureSet {
    pub classes: BTreeMap<String, ClassFeatures>,
}

impl FeatureSet {
    pub fn get(&self, class_name: &str) -> Option<&ClassFeatures> {
        self.classes.get(class_name)
    }
}

/// Summarize every band and both index rasters over each class's
/// cloud-free pixels.
pub fn extract_features(
    scene: &Scene,
    labels: &GrayImage,
    classes: &ClassSpec,
    include_background: bool,
) -> Result<FeatureSet> {
    if labels.dimensions() != scene.dimensions() {
        return Err(AnnotateError::ShapeMismatch {
            expected: scene.dimensions(),
            found: labels.dimensions(),
        });
    }

    let mut rasters: Vec<(&str, &IndexRaster)> = scene.image().iter().collect();
    rasters.push(("ndvi", scene.ndvi()));
    rasters.push(("ndwi", scene.ndwi()));

    let mut partitions: Vec<(&str, u8)> = classes
        .classes()
        .iter()
        .map(|c| (c.name.as_str(), c.id))
        .collect();
    if include_background {
        partitions.push((BACKGROUND_NAME, UNLABELED));
    }

    let mut features = FeatureSet::default();
    for (name, label) in partitions {
        let pixels: Vec<(u32, u32)> = labels
            .enumerate_pixels()
            .filter(|(x, y, p)| p.0[0] == label && scene.cloud_mask().get_pixel(*x, *y).0[0] == MASK_OFF)
            .map(|(x, y, _)| (x, y))
            .collect();

        let statistics = if pixels.is_empty() {
            None
        } else {
            Some(
                rasters
                    .iter()
                    .filter_map(|(band, raster)| {
                        let values = pixels.iter().map(|&(x, y)| raster.get_pixel(x, y).0[0]);
                        BandStatistics::from_values(values).map(|s| (band.to_string(), s))
                    })
                    .collect(),
            )
        };

        features.classes.insert(
            name.to_string(),
            ClassFeatures {
                pixel_count: pixels.len(),
                statistics,
            },
        );
    }

    Ok(features)
}

#[cfg(test)]
mod tests {
    use image::{Luma, RgbImage};

    use super::*;
    use crate::{
        class_spec::{ClassDefinition, LabelMethod},
        scene::MultispectralImage,
    };

    fn scene(cloud_row: Option<u32>) -> Scene {
        let red = IndexRaster::from_fn(4, 4, |x, _| Luma([x as f32]));
        let mut cloud = GrayImage::new(4, 4);
        if let Some(row) = cloud_row {
            for x in 0..4 {
                cloud.put_pixel(x, row, Luma([255]));
            }
        }
        Scene::new(
            "site",
            "img",
            MultispectralImage::new(vec![("red".into(), red)]).unwrap(),
            cloud,
            IndexRaster::from_pixel(4, 4, Luma([0.5])),
            IndexRaster::from_pixel(4, 4, Luma([-0.25])),
            RgbImage::new(4, 4),
        )
        .unwrap()
    }

    fn spec() -> ClassSpec {
        ClassSpec::new(vec![
            ClassDefinition::new("sand", 1, [1, 1, 1], LabelMethod::FloodFill),
            ClassDefinition::new("water", 2, [2, 2, 2], LabelMethod::Lasso),
        ])
        .unwrap()
    }

    #[test]
    fn test_statistics_skip_cloudy_pixels() {
        // Columns 0 and 1 are sand
        let labels = GrayImage::from_fn(4, 4, |x, _| Luma([if x < 2 { 1 } else { 0 }]));
        let features = extract_features(&scene(Some(0)), &labels, &spec(), true).unwrap();

        let sand = features.get("sand").unwrap();
        assert_eq!(sand.pixel_count, 6);
        let stats = sand.statistics.as_ref().unwrap();
        assert_eq!(stats["red"], BandStatistics { mean: 0.5, std: 0.5, min: 0.0, max: 1.0 });
        assert_eq!(stats["ndvi"].mean, 0.5);
        assert_eq!(stats["ndwi"].max, -0.25);

        let water = features.get("water").unwrap();
        assert_eq!(water.pixel_count, 0);
        assert!(water.statistics.is_none());

        assert_eq!(features.get(BACKGROUND_NAME).unwrap().pixel_count, 6);
    }

    #[test]
    fn test_background_partition_optional() {
        let labels = GrayImage::new(4, 4);
        let features = extract_features(&scene(None), &labels, &spec(), false).unwrap();
        assert!(features.get(BACKGROUND_NAME).is_none());
        assert_eq!(features.classes.len(), 2);
    }

    #[test]
    fn test_nan_values_ignored() {
        let stats = BandStatistics::from_values([1.0, f32::NAN, 3.0]).unwrap();
        assert_eq!(stats.mean, 2.0);
        assert!(BandStatistics::from_values([f32::NAN]).is_none());
    }
}
