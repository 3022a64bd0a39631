use std::collections::HashSet;

use image::Rgb;
use schemars::JsonSchema;
use segment::Palette;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

use crate::error::{AnnotateError, Result};

/// How pixels of a class are selected during its painting stage
#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LabelMethod {
    /// Click seeds region growing over the index rasters
    FloodFill,
    /// Free-hand polygons
    Lasso,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ClassDefinition {
    pub name: String,
    /// Label value written to the label raster, never 0
    #[schemars(range(min = 1, max = 255))]
    pub id: u8,
    /// Display colour, RGB
    pub color: [u8; 3],
    pub method: LabelMethod,
}

impl ClassDefinition {
    pub fn new(name: impl Into<String>, id: u8, color: [u8; 3], method: LabelMethod) -> Self {
        Self {
            name: name.into(),
            id,
            color,
            method,
        }
    }
}

/// Ordered class list. The order is both the painting-stage sequence and
/// the priority order used when classifier outputs compete for a pixel.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(transparent)]
pub struct ClassSpec {
    classes: Vec<ClassDefinition>,
}

impl ClassSpec {
    pub fn new(classes: Vec<ClassDefinition>) -> Result<Self> {
        let spec = Self { classes };
        spec.validate()?;
        Ok(spec)
    }

    /// Non-empty, ids unique and non-zero, names unique
    pub fn validate(&self) -> Result<()> {
        if self.classes.is_empty() {
            return Err(AnnotateError::InvalidClassSpec(
                "at least one class is required".to_string(),
            ));
        }

        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for class in &self.classes {
            if class.id == 0 {
                return Err(AnnotateError::InvalidClassSpec(format!(
                    "class '{}' uses the reserved id 0",
                    class.name
                )));
            }
            if !ids.insert(class.id) {
                return Err(AnnotateError::InvalidClassSpec(format!(
                    "duplicate class id {}",
                    class.id
                )));
            }
            if !names.insert(class.name.as_str()) {
                return Err(AnnotateError::InvalidClassSpec(format!(
                    "duplicate class name '{}'",
                    class.name
                )));
            }
        }
        Ok(())
    }

    pub fn classes(&self) -> &[ClassDefinition] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn get(&self, id: u8) -> Option<&ClassDefinition> {
        self.classes.iter().find(|c| c.id == id)
    }

    pub fn stage(&self, index: usize) -> Option<&ClassDefinition> {
        self.classes.get(index)
    }

    pub fn palette(&self) -> Palette {
        self.classes
            .iter()
            .map(|c| (c.id, Rgb(c.color)))
            .collect()
    }

    /// The five-stage shoreline sequence
    pub fn shoreline() -> Self {
        Self {
            classes: vec![
                ClassDefinition::new("white-water", 1, [255, 0, 0], LabelMethod::FloodFill),
                ClassDefinition::new("water", 2, [0, 91, 255], LabelMethod::Lasso),
                ClassDefinition::new("land_1", 3, [255, 255, 0], LabelMethod::FloodFill),
                ClassDefinition::new("land_2", 4, [255, 0, 255], LabelMethod::Lasso),
                ClassDefinition::new("land_3", 5, [0, 255, 0], LabelMethod::Lasso),
            ],
        }
    }
}

impl Default for ClassSpec {
    fn default() -> Self {
        Self::shoreline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_spec_is_valid() {
        let spec = ClassSpec::default();
        spec.validate().unwrap();
        assert_eq!(spec.len(), 5);
        assert_eq!(spec.stage(1).unwrap().method, LabelMethod::Lasso);
        assert_eq!(spec.palette()[&3], Rgb([255, 255, 0]));
    }

    #[test]
    fn test_validation_rejects_bad_specs() {
        assert!(ClassSpec::new(vec![]).is_err());
        assert!(ClassSpec::new(vec![ClassDefinition::new("a", 0, [0; 3], LabelMethod::Lasso)]).is_err());
        assert!(ClassSpec::new(vec![
            ClassDefinition::new("a", 1, [0; 3], LabelMethod::Lasso),
            ClassDefinition::new("b", 1, [0; 3], LabelMethod::Lasso),
        ])
        .is_err());
        assert!(ClassSpec::new(vec![
            ClassDefinition::new("a", 1, [0; 3], LabelMethod::Lasso),
            ClassDefinition::new("a", 2, [0; 3], LabelMethod::Lasso),
        ])
        .is_err());
    }

    #[test]
    fn test_method_names() {
        assert_eq!(LabelMethod::FloodFill.to_string(), "flood_fill");
        assert_eq!("lasso".parse::<LabelMethod>().unwrap(), LabelMethod::Lasso);
        let json = serde_json::to_string(&ClassSpec::shoreline()).unwrap();
        assert!(json.starts_with('['));
        assert!(json.contains("\"flood_fill\""));
    }
}
