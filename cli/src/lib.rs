use annotation::{AnnotateError, EvaluationSettings, LabellingSettings};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub mod events;
pub mod output;
pub mod scenes;
pub mod scores;

pub use events::{parse_event_script, spawn_event_feed};
pub use output::{DirectorySink, FileDisplay};
pub use scenes::{nd_index, stretch_preview, SceneDirectory, SceneEntry, SceneManifest};
pub use scores::ScoreFileClassifier;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    ImageError(#[from] image::ImageError),
    #[error(transparent)]
    Annotate(#[from] AnnotateError),
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
    #[error("Invalid scene manifest: {0}")]
    InvalidManifest(String),
    #[error("Scene '{image_id}' has no '{band}' band")]
    MissingBand { image_id: String, band: String },
    #[error("Invalid event on line {line}: {source}")]
    InvalidEvent {
        line: usize,
        source: serde_json::Error,
    },
    #[error("No pixel size known for satellite '{0}'; set evaluation.pixel_size_m")]
    UnknownPixelSize(String),
}

/// Ground pixel size in metres of the supported missions
pub fn satellite_pixel_size(satellite: &str) -> Option<f64> {
    match satellite {
        "L5" | "L7" | "L8" | "L9" => Some(15.0),
        "S2" => Some(10.0),
        _ => None,
    }
}

/// Smallest patch in pixels covering at least `area_m2`
pub fn min_area_pixels(area_m2: f64, pixel_size_m: f64) -> u32 {
    if !(area_m2 > 0.0) || !(pixel_size_m > 0.0) {
        return 0;
    }
    (area_m2 / (pixel_size_m * pixel_size_m)).ceil() as u32
}

/// Labelling / evaluation project
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ProjectConfig {
    /// Directory holding `manifest.json` and the band files
    pub scenes_dir: String,
    /// Where training records and classifications are written
    pub output_dir: String,
    /// Per-class score images for evaluation, `<scores_dir>/<image_id>/<class>.png`
    #[serde(default)]
    pub scores_dir: Option<String>,
    /// Score a pixel needs to become a class candidate
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    #[serde(default)]
    pub labelling: LabellingSettings,
    #[serde(default)]
    pub evaluation: EvaluationSettings,
}

fn default_score_threshold() -> f32 {
    0.5
}

impl ProjectConfig {
    pub fn new(scenes_dir: impl Into<String>, output_dir: impl Into<String>) -> Self {
        Self {
            scenes_dir: scenes_dir.into(),
            output_dir: output_dir.into(),
            scores_dir: None,
            score_threshold: default_score_threshold(),
            labelling: LabellingSettings::default(),
            evaluation: EvaluationSettings::default(),
        }
    }

    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ProjectConfig)
    }

    /// Load ProjectConfig from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        let config: ProjectConfig = toml::from_str(content)?;
        config.labelling.validate()?;
        Ok(config)
    }

    /// Load ProjectConfig from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, CliError> {
        let config: ProjectConfig = serde_json::from_str(content)?;
        config.labelling.validate()?;
        Ok(config)
    }

    /// Auto-detect file format and load configuration
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(CliError::UnsupportedFileFormat),
        }
    }

    /// Save configuration, format chosen by extension
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CliError> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => self.to_toml_file(path),
            Some("json") => self.to_json_file(path),
            _ => Err(CliError::UnsupportedFileFormat),
        }
    }

    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CliError> {
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, CliError> {
        Ok(toml::to_string_pretty(&self)?)
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CliError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, CliError> {
        Ok(serde_json::to_string_pretty(&self)?)
    }

    /// Minimum class patch in pixels for one satellite
    pub fn min_area_pixels_for(&self, satellite: &str) -> Result<u32, CliError> {
        let pixel_size = match self.evaluation.pixel_size_m {
            Some(size) => size,
            None => satellite_pixel_size(satellite)
                .ok_or_else(|| CliError::UnknownPixelSize(satellite.to_string()))?,
        };
        Ok(min_area_pixels(self.evaluation.min_area_m2, pixel_size))
    }
}
