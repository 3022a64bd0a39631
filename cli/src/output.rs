use std::fs;
use std::path::{Path, PathBuf};

use annotation::{
    ClassificationRecord, ClassificationSink, DisplaySink, PersistenceError, TrainingRecord,
    TrainingSink,
};
use image::RgbImage;
use tracing::{debug, warn};

/// Writes training records and classifications under one output directory:
///
/// - `<site>/<image_id>.json` and `<site>/<image_id>.png` (label visualization)
/// - `<site>/classified/<image_id>.png` (composite), `<image_id>_<class>.png`
///   (class masks) and `<image_id>.geojson` (class outlines)
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn training_dir(&self, site_id: &str) -> PathBuf {
        self.root.join(site_id)
    }

    pub fn classification_dir(&self, site_id: &str) -> PathBuf {
        self.root.join(site_id).join("classified")
    }
}

impl TrainingSink for DirectorySink {
    fn save_training(&mut self, record: &TrainingRecord) -> Result<(), PersistenceError> {
        let dir = self.training_dir(&record.site_id);
        fs::create_dir_all(&dir)?;

        let json_path = dir.join(format!("{}.json", record.image_id));
        fs::write(&json_path, serde_json::to_string_pretty(record)?)?;
        if let Some(visualization) = &record.visualization {
            visualization.save(dir.join(format!("{}.png", record.image_id)))?;
        }

        debug!("Wrote training record {}", json_path.display());
        Ok(())
    }
}

impl ClassificationSink for DirectorySink {
    fn save_classification(&mut self, record: &ClassificationRecord) -> Result<(), PersistenceError> {
        let dir = self.classification_dir(&record.site_id);
        fs::create_dir_all(&dir)?;

        record
            .composite
            .save(dir.join(format!("{}.png", record.image_id)))?;
        for class in &record.masks.classes {
            class
                .mask
                .save(dir.join(format!("{}_{}.png", record.image_id, class.name)))?;
        }

        let outlines = record
            .masks
            .to_geojson_string()
            .map_err(|err| PersistenceError::Rejected(err.to_string()))?;
        fs::write(dir.join(format!("{}.geojson", record.image_id)), outlines)?;

        debug!("Wrote classification of {} to {}", record.image_id, dir.display());
        Ok(())
    }
}

/// Keeps the latest visualization in an image file a viewer can watch
#[derive(Debug, Clone)]
pub struct FileDisplay {
    path: PathBuf,
}

impl FileDisplay {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl DisplaySink for FileDisplay {
    fn show(&mut self, visualization: &RgbImage) {
        if let Err(err) = visualization.save(&self.path) {
            warn!("Could not update preview {}: {}", self.path.display(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use annotation::{ClassSpec, FeatureSet, LabelGrid};
    use image::{GrayImage, Rgb};
    use segment::{ClassMask, FilteredClassMasks, MaskExt};

    use super::*;

    #[test]
    fn test_training_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path());
        let record = TrainingRecord {
            site_id: "NARRA".into(),
            image_id: "2021-01-01-S2".into(),
            labels: LabelGrid { width: 2, height: 1, data: vec![0, 3] },
            features: FeatureSet::default(),
            classes: ClassSpec::default(),
            visualization: Some(RgbImage::from_pixel(2, 1, Rgb([1, 2, 3]))),
        };

        sink.save_training(&record).unwrap();

        let json = fs::read_to_string(dir.path().join("NARRA/2021-01-01-S2.json")).unwrap();
        let loaded: TrainingRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.labels, record.labels);
        assert!(loaded.visualization.is_none());
        assert!(dir.path().join("NARRA/2021-01-01-S2.png").exists());
    }

    #[test]
    fn test_classification_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path());
        let mut water = GrayImage::empty_mask(4, 4);
        water.set(1, 1, true);
        water.set(2, 1, true);
        water.set(1, 2, true);

        let record = ClassificationRecord {
            site_id: "NARRA".into(),
            image_id: "img".into(),
            masks: FilteredClassMasks {
                width: 4,
                height: 4,
                classes: vec![ClassMask { class_id: 2, name: "water".into(), mask: water }],
            },
            composite: RgbImage::new(4, 4),
        };
        sink.save_classification(&record).unwrap();

        let out = dir.path().join("NARRA/classified");
        assert!(out.join("img.png").exists());
        assert_eq!(image::open(out.join("img_water.png")).unwrap().to_luma8().count(), 3);
        let geojson = fs::read_to_string(out.join("img.geojson")).unwrap();
        assert!(geojson.contains("\"class_name\": \"water\""));
    }

    #[test]
    fn test_unwritable_directory_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("NARRA");
        fs::write(&blocker, "not a directory").unwrap();

        let mut sink = DirectorySink::new(dir.path());
        let record = TrainingRecord {
            site_id: "NARRA".into(),
            image_id: "img".into(),
            labels: LabelGrid { width: 0, height: 0, data: vec![] },
            features: FeatureSet::default(),
            classes: ClassSpec::default(),
            visualization: None,
        };
        assert!(matches!(sink.save_training(&record), Err(PersistenceError::Io(_))));
    }
}
