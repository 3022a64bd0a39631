use std::path::{Path, PathBuf};

use annotation::{AnnotateError, ClassSpec, Classifier, Scene};
use segment::{ClassScoreMap, ClassScores, IndexRaster};
use tracing::debug;

/// Reads class probabilities written by an external model, one 8-bit image
/// per class at `<root>/<image_id>/<class name>.png` (255 = certain).
#[derive(Debug, Clone)]
pub struct ScoreFileClassifier {
    root: PathBuf,
    classes: ClassSpec,
    threshold: f32,
}

impl ScoreFileClassifier {
    pub fn new<P: AsRef<Path>>(root: P, classes: ClassSpec, threshold: f32) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            classes,
            threshold,
        }
    }

    fn read_scores(&self, path: &Path) -> annotation::Result<IndexRaster> {
        let scores = image::open(path)
            .map_err(|err| AnnotateError::Classifier(format!("{}: {}", path.display(), err)))?;
        Ok(scores.to_luma32f())
    }
}

impl Classifier for ScoreFileClassifier {
    fn classify(&self, scene: &Scene, min_area_pixels: u32) -> annotation::Result<ClassScoreMap> {
        let (width, height) = scene.dimensions();
        let dir = self.root.join(&scene.image_id);
        debug!(
            "Reading class scores for {} from {} (min area {} px)",
            scene.image_id,
            dir.display(),
            min_area_pixels
        );

        let mut scores = ClassScoreMap::new(width, height);
        for class in self.classes.classes() {
            let layer = self.read_scores(&dir.join(format!("{}.png", class.name)))?;
            scores.push(ClassScores {
                class_id: class.id,
                name: class.name.clone(),
                scores: layer,
                threshold: self.threshold,
            })?;
        }
        Ok(scores)
    }
}
