use std::collections::BTreeMap;

use image::{GrayImage, Luma, Rgb, RgbImage};
use segment::{MaskExt, Palette};

use crate::{
    class_spec::ClassSpec,
    error::{AnnotateError, Result},
};

/// Label value of pixels no stroke has claimed
pub const UNLABELED: u8 = 0;

/// Record of one paint call, enough to invert it.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeHandle {
    class_id: u8,
    /// `(x, y, label before the stroke)` for every touched pixel
    changes: Vec<(u32, u32, u8)>,
}

impl StrokeHandle {
    pub fn class_id(&self) -> u8 {
        self.class_id
    }

    /// Number of pixels the stroke touched
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanvasSnapshot {
    labels: GrayImage,
    visualization: RgbImage,
}

/// Label raster and its colour visualization for one image.
///
/// The visualization always equals the base preview with every labelled
/// pixel replaced by its class colour. Paint follows last-writer-wins, and
/// undoing strokes in reverse order restores the exact earlier labels.
#[derive(Debug, Clone)]
pub struct LabelCanvas {
    base: RgbImage,
    labels: GrayImage,
    visualization: RgbImage,
    palette: Palette,
}

impl LabelCanvas {
    pub fn new(base: RgbImage, classes: &ClassSpec) -> Self {
        let (width, height) = base.dimensions();
        Self {
            labels: GrayImage::new(width, height),
            visualization: base.clone(),
            base,
            palette: classes.palette(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.labels.dimensions()
    }

    pub fn paint(&mut self, mask: &GrayImage, class_id: u8) -> Result<StrokeHandle> {
        let colour = *self
            .palette
            .get(&class_id)
            .ok_or(AnnotateError::InvalidClassId(class_id))?;
        if mask.dimensions() != self.dimensions() {
            return Err(AnnotateError::ShapeMismatch {
                expected: self.dimensions(),
                found: mask.dimensions(),
            });
        }

        let mut changes = Vec::new();
        for (x, y, pixel) in mask.enumerate_pixels() {
            if pixel.0[0] == segment::MASK_OFF {
                continue;
            }
            let prior = self.labels.get_pixel(x, y).0[0];
            changes.push((x, y, prior));
            self.labels.put_pixel(x, y, Luma([class_id]));
            self.visualization.put_pixel(x, y, colour);
        }

        Ok(StrokeHandle { class_id, changes })
    }

    /// Revert a stroke. Exact when strokes are undone most recent first.
    pub fn undo(&mut self, handle: &StrokeHandle) {
        for &(x, y, prior) in handle.changes.iter().rev() {
            self.labels.put_pixel(x, y, Luma([prior]));
            let colour = self.colour_of(x, y, prior);
            self.visualization.put_pixel(x, y, colour);
        }
    }

    pub fn snapshot(&self) -> CanvasSnapshot {
        CanvasSnapshot {
            labels: self.labels.clone(),
            visualization: self.visualization.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: &CanvasSnapshot) {
        self.labels.clone_from(&snapshot.labels);
        self.visualization.clone_from(&snapshot.visualization);
    }

    pub fn labels(&self) -> &GrayImage {
        &self.labels
    }

    pub fn visualization(&self) -> &RgbImage {
        &self.visualization
    }

    pub fn class_mask(&self, class_id: u8) -> GrayImage {
        let (width, height) = self.dimensions();
        let mut mask = GrayImage::empty_mask(width, height);
        for (x, y, pixel) in self.labels.enumerate_pixels() {
            if pixel.0[0] == class_id {
                mask.set(x, y, true);
            }
        }
        mask
    }

    /// Pixel count per label value, [`UNLABELED`] included
    pub fn label_counts(&self) -> BTreeMap<u8, usize> {
        let mut counts: BTreeMap<u8, usize> = self.palette.keys().map(|&id| (id, 0)).collect();
        counts.insert(UNLABELED, 0);
        for pixel in self.labels.pixels() {
            *counts.entry(pixel.0[0]).or_default() += 1;
        }
        counts
    }

    fn colour_of(&self, x: u32, y: u32, label: u8) -> Rgb<u8> {
        match self.palette.get(&label) {
            Some(&colour) if label != UNLABELED => colour,
            _ => *self.base.get_pixel(x, y),
        }
    }
}
