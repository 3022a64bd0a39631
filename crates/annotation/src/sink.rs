use image::{GrayImage, RgbImage};
use segment::FilteredClassMasks;
use serde::{Deserialize, Serialize};

use crate::{class_spec::ClassSpec, features::FeatureSet};

pub use crate::error::PersistenceError;

/// Receives the current visualization whenever it changes
pub trait DisplaySink {
    fn show(&mut self, visualization: &RgbImage);
}

/// Display for headless runs
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDisplay;

impl DisplaySink for NullDisplay {
    fn show(&mut self, _visualization: &RgbImage) {}
}

/// Row-major label raster in a serialization-friendly form
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabelGrid {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl LabelGrid {
    pub fn to_image(&self) -> Option<GrayImage> {
        GrayImage::from_raw(self.width, self.height, self.data.clone())
    }
}

impl From<&GrayImage> for LabelGrid {
    fn from(labels: &GrayImage) -> Self {
        Self {
            width: labels.width(),
            height: labels.height(),
            data: labels.as_raw().clone(),
        }
    }
}

/// Labels and features of one finished image
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingRecord {
    pub site_id: String,
    pub image_id: String,
    pub labels: LabelGrid,
    pub features: FeatureSet,
    pub classes: ClassSpec,
    /// Final label visualization, written as an image next to the record
    #[serde(skip)]
    pub visualization: Option<RgbImage>,
}

pub trait TrainingSink {
    fn save_training(&mut self, record: &TrainingRecord) -> Result<(), PersistenceError>;
}

impl TrainingSink for Vec<TrainingRecord> {
    fn save_training(&mut self, record: &TrainingRecord) -> Result<(), PersistenceError> {
        self.push(record.clone());
        Ok(())
    }
}

/// Cleaned classification of one image
#[derive(Debug, Clone)]
pub struct ClassificationRecord {
    pub site_id: String,
    pub image_id: String,
    pub masks: FilteredClassMasks,
    pub composite: RgbImage,
}

pub trait ClassificationSink {
    fn save_classification(&mut self, record: &ClassificationRecord) -> Result<(), PersistenceError>;
}

impl ClassificationSink for Vec<ClassificationRecord> {
    fn save_classification(&mut self, record: &ClassificationRecord) -> Result<(), PersistenceError> {
        self.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use image::Luma;

    use super::*;

    #[test]
    fn test_label_grid_round_trip() {
        let labels = GrayImage::from_fn(3, 2, |x, y| Luma([(x + y) as u8]));
        let grid = LabelGrid::from(&labels);
        assert_eq!(grid.data, vec![0, 1, 2, 1, 2, 3]);
        assert_eq!(grid.to_image().unwrap(), labels);

        let broken = LabelGrid { width: 4, height: 4, data: vec![0; 3] };
        assert!(broken.to_image().is_none());
    }
}
