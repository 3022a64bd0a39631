use schemars::JsonSchema;
use segment::{Connectivity, GrowthRule, RegionGrower};
use serde::{Deserialize, Serialize};

use crate::{
    class_spec::ClassSpec,
    error::{AnnotateError, Result},
};

/// Top-right corner of the image where a click undoes the last stroke
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct EraseZone {
    /// Clicks with `x > x_frac * width` ...
    #[schemars(range(min = 0.0, max = 1.0))]
    pub x_frac: f64,
    /// ... and `y < y_frac * height` fall in the zone
    #[schemars(range(min = 0.0, max = 1.0))]
    pub y_frac: f64,
}

impl Default for EraseZone {
    fn default() -> Self {
        Self {
            x_frac: 0.95,
            y_frac: 0.05,
        }
    }
}

impl EraseZone {
    pub fn contains(&self, x: f64, y: f64, width: u32, height: u32) -> bool {
        x > self.x_frac * width as f64 && y < self.y_frac * height as f64
    }
}

fn default_cloud_threshold() -> f32 {
    0.5
}

fn default_tolerance() -> f32 {
    0.05
}

fn default_save_attempts() -> u32 {
    3
}

fn default_min_area_m2() -> f64 {
    4500.0
}

/// Settings of the interactive labelling loop
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct LabellingSettings {
    /// Images with a larger cloudy fraction are skipped
    #[serde(default = "default_cloud_threshold")]
    #[schemars(range(min = 0.0, max = 1.0))]
    pub cloud_threshold: f32,
    /// Region growing tolerance in index units
    #[serde(default = "default_tolerance")]
    pub tolerance: f32,
    #[serde(default)]
    pub growth_rule: GrowthRule,
    #[serde(default)]
    pub connectivity: Connectivity,
    #[serde(default)]
    pub erase_zone: EraseZone,
    /// Also summarize the pixels no class claimed
    #[serde(default)]
    pub include_background: bool,
    /// Sink attempts per save before giving up
    #[serde(default = "default_save_attempts")]
    #[schemars(range(min = 1))]
    pub save_attempts: u32,
    #[serde(default)]
    pub classes: ClassSpec,
}

impl Default for LabellingSettings {
    fn default() -> Self {
        Self {
            cloud_threshold: default_cloud_threshold(),
            tolerance: default_tolerance(),
            growth_rule: GrowthRule::default(),
            connectivity: Connectivity::default(),
            erase_zone: EraseZone::default(),
            include_background: false,
            save_attempts: default_save_attempts(),
            classes: ClassSpec::default(),
        }
    }
}

impl LabellingSettings {
    pub fn validate(&self) -> Result<()> {
        self.classes.validate()?;
        if !(self.tolerance >= 0.0) || !self.tolerance.is_finite() {
            return Err(AnnotateError::Segment(
                segment::SegmentError::InvalidTolerance(self.tolerance),
            ));
        }
        if self.save_attempts == 0 {
            return Err(AnnotateError::InvalidState(
                "save_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn region_grower(&self) -> RegionGrower {
        RegionGrower::new(self.tolerance)
            .with_connectivity(self.connectivity)
            .with_rule(self.growth_rule)
    }
}

/// Settings of the classifier evaluation run
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct EvaluationSettings {
    /// Images with a larger cloudy fraction are not classified
    #[serde(default = "default_cloud_threshold")]
    #[schemars(range(min = 0.0, max = 1.0))]
    pub cloud_threshold: f32,
    /// Smallest class patch kept, in square metres
    #[serde(default = "default_min_area_m2")]
    pub min_area_m2: f64,
    /// Ground size of one pixel; derived from the satellite when absent
    #[serde(default)]
    pub pixel_size_m: Option<f64>,
    #[serde(default)]
    pub connectivity: Connectivity,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            cloud_threshold: default_cloud_threshold(),
            min_area_m2: default_min_area_m2(),
            pixel_size_m: None,
            connectivity: Connectivity::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_erase_zone_corner() {
        let zone = EraseZone::default();
        assert!(zone.contains(96.0, 4.0, 100, 100));
        assert!(!zone.contains(95.0, 4.0, 100, 100));
        assert!(!zone.contains(96.0, 5.0, 100, 100));
        assert!(!zone.contains(10.0, 1.0, 100, 100));
    }

    #[test]
    fn test_defaults_from_empty_json() {
        let settings: LabellingSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, LabellingSettings::default());
        settings.validate().unwrap();
        assert_eq!(settings.classes.len(), 5);

        let eval: EvaluationSettings = serde_json::from_str(r#"{"pixel_size_m": 10.0}"#).unwrap();
        assert_eq!(eval.min_area_m2, 4500.0);
        assert_eq!(eval.pixel_size_m, Some(10.0));
    }

    #[test]
    fn test_validation() {
        let settings = LabellingSettings {
            tolerance: -1.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = LabellingSettings {
            save_attempts: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
