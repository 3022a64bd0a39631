use image::GrayImage;
use crate::{error::Result, algorithms::OutlineShape};

/// Trait for in-place clean-up steps applied to a binary mask
pub trait MaskPostProcessor: Send + Sync {
    /// Post-process the mask (e.g. drop small components)
    fn process(&self, mask: &mut GrayImage) -> Result<()>;
}

/// Trait for turning a binary mask into polygon outlines
pub trait OutlineExtractor: Send + Sync {
    /// Extract outer boundaries and their holes from a binary mask
    fn extract_outlines(&self, mask: &GrayImage) -> Result<Vec<OutlineShape>>;
}
