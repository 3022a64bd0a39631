use segment::ClassScoreMap;

use crate::{error::Result, scene::Scene};

/// Pixel classifier producing one score layer per class, in class priority
/// order. Training and the model itself live outside this crate.
pub trait Classifier: Send + Sync {
    fn classify(&self, scene: &Scene, min_area_pixels: u32) -> Result<ClassScoreMap>;
}
