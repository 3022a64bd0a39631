use std::path::Path;

use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde_json::{Map, Number};

use crate::{
    algorithms::{ImageprocOutlineExtractor, OutlineShape},
    classification::FilteredClassMasks,
    error::Result,
    traits::OutlineExtractor,
    types::MaskExt,
};

fn ring_coordinates(ring: &[[f32; 2]]) -> Vec<Vec<f64>> {
    let mut coords: Vec<Vec<f64>> = ring.iter().map(|&[x, y]| vec![x as f64, y as f64]).collect();
    // GeoJSON rings are closed
    if let (Some(first), Some(last)) = (coords.first().cloned(), coords.last()) {
        if &first != last {
            coords.push(first);
        }
    }
    coords
}

fn shape_geometry(shape: &OutlineShape) -> Geometry {
    let mut rings = vec![ring_coordinates(&shape.exterior)];
    rings.extend(shape.holes.iter().map(|hole| ring_coordinates(hole)));
    Geometry::new(Value::Polygon(rings))
}

fn number_f64(value: f64) -> serde_json::Value {
    serde_json::Value::Number(Number::from_f64(value).unwrap_or_else(|| Number::from(0)))
}

impl FilteredClassMasks {
    /// Vectorize every class into polygon features, one per connected outline.
    ///
    /// Coordinates are pixel-centre `[x, y]`. Each feature carries the class id
    /// and name, the class pixel count, the outline area and its hole count.
    pub fn to_geojson(&self) -> Result<FeatureCollection> {
        let extractor = ImageprocOutlineExtractor;
        let mut features = Vec::new();

        for class in &self.classes {
            let pixel_count = class.mask.count();
            for shape in extractor.extract_outlines(&class.mask)? {
                let mut properties = Map::new();
                properties.insert("class_id".to_string(), serde_json::Value::from(class.class_id));
                properties.insert("class_name".to_string(), class.name.clone().into());
                properties.insert("pixel_count".to_string(), serde_json::Value::from(pixel_count));
                properties.insert("area".to_string(), number_f64(shape.area() as f64));
                properties.insert("hole_count".to_string(), serde_json::Value::from(shape.holes.len()));

                features.push(Feature {
                    bbox: None,
                    geometry: Some(shape_geometry(&shape)),
                    id: Some(geojson::feature::Id::Number(Number::from(features.len()))),
                    properties: Some(properties),
                    foreign_members: None,
                });
            }
        }

        let mut foreign_members = Map::new();
        foreign_members.insert("image_width".to_string(), serde_json::Value::from(self.width));
        foreign_members.insert("image_height".to_string(), serde_json::Value::from(self.height));

        Ok(FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(foreign_members),
        })
    }

    pub fn to_geojson_string(&self) -> Result<String> {
        let geojson = self.to_geojson()?;
        Ok(serde_json::to_string_pretty(&geojson)?)
    }

    pub fn save_geojson(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_geojson_string()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use image::GrayImage;

    use crate::classification::ClassMask;

    use super::*;

    fn masks() -> FilteredClassMasks {
        let mut water = GrayImage::empty_mask(12, 12);
        for y in 1..6 {
            for x in 1..6 {
                water.set(x, y, true);
            }
        }
        let mut sand = GrayImage::empty_mask(12, 12);
        for y in 7..11 {
            for x in 0..12 {
                sand.set(x, y, true);
            }
        }

        FilteredClassMasks {
            width: 12,
            height: 12,
            classes: vec![
                ClassMask { class_id: 2, name: "water".into(), mask: water },
                ClassMask { class_id: 3, name: "sand".into(), mask: sand },
            ],
        }
    }

    #[test]
    fn test_features_per_class() {
        let collection = masks().to_geojson().unwrap();
        assert_eq!(collection.features.len(), 2);

        let water = &collection.features[0];
        let props = water.properties.as_ref().unwrap();
        assert_eq!(props["class_id"], 2);
        assert_eq!(props["class_name"], "water");
        assert_eq!(props["pixel_count"], 25);
        assert_eq!(props["hole_count"], 0);

        let Some(Value::Polygon(rings)) = water.geometry.as_ref().map(|g| &g.value) else {
            panic!("expected polygon geometry");
        };
        assert_eq!(rings[0].first(), rings[0].last());

        let foreign = collection.foreign_members.unwrap();
        assert_eq!(foreign["image_width"], 12);
    }

    #[test]
    fn test_save_geojson() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classes.geojson");
        masks().save_geojson(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: FeatureCollection = text.parse().unwrap();
        assert_eq!(parsed.features.len(), 2);
    }
}
