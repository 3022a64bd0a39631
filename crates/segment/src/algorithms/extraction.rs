use std::collections::HashMap;

use geo_types::{Coord, LineString, Polygon};
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use serde::{Deserialize, Serialize};

use crate::{error::Result, traits::OutlineExtractor};

/// Polygon outline of one connected mask region
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutlineShape {
    /// Outer boundary, pixel coordinates `[x, y]`
    pub exterior: Vec<[f32; 2]>,
    /// Boundaries of holes inside the region
    pub holes: Vec<Vec<[f32; 2]>>,
}

impl OutlineShape {
    /// Convert to geo-types Polygon for geometric operations
    pub fn to_geo_polygon(&self) -> Polygon<f32> {
        let ring = |points: &[[f32; 2]]| -> LineString<f32> {
            points
                .iter()
                .map(|&[x, y]| Coord { x, y })
                .collect::<Vec<_>>()
                .into()
        };
        Polygon::new(
            ring(&self.exterior),
            self.holes.iter().map(|hole| ring(hole)).collect(),
        )
    }

    /// Area enclosed by the boundary traced through pixel centres, minus holes
    pub fn area(&self) -> f32 {
        use geo::Area;
        self.to_geo_polygon().unsigned_area()
    }
}

/// Contour tracing through imageproc, using its border hierarchy to attach
/// hole borders to the outer border that encloses them.
#[derive(Debug, Clone, Default)]
pub struct ImageprocOutlineExtractor;

impl OutlineExtractor for ImageprocOutlineExtractor {
    fn extract_outlines(&self, mask: &GrayImage) -> Result<Vec<OutlineShape>> {
        let contours = find_contours::<i32>(mask);
        let to_points = |points: &[imageproc::point::Point<i32>]| -> Vec<[f32; 2]> {
            points.iter().map(|p| [p.x as f32, p.y as f32]).collect()
        };

        let mut shapes = Vec::new();
        let mut shape_of_contour = HashMap::new();
        for (i, contour) in contours.iter().enumerate() {
            if contour.border_type == BorderType::Outer {
                shape_of_contour.insert(i, shapes.len());
                shapes.push(OutlineShape {
                    exterior: to_points(&contour.points),
                    holes: Vec::new(),
                });
            }
        }

        for contour in contours.iter().filter(|c| c.border_type == BorderType::Hole) {
            if let Some(&shape) = contour.parent.and_then(|p| shape_of_contour.get(&p)) {
                shapes[shape].holes.push(to_points(&contour.points));
            }
        }

        Ok(shapes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MaskExt;

    #[test]
    fn test_ring_has_one_hole() {
        let mut mask = GrayImage::empty_mask(12, 12);
        for y in 2..10 {
            for x in 2..10 {
                let inner = (4..8).contains(&x) && (4..8).contains(&y);
                mask.set(x, y, !inner);
            }
        }

        let shapes = ImageprocOutlineExtractor.extract_outlines(&mask).unwrap();
        assert_eq!(shapes.len(), 1);
        assert_eq!(shapes[0].holes.len(), 1);
        assert!(shapes[0].area() > 0.0);
    }

    #[test]
    fn test_separate_blobs() {
        let mut mask = GrayImage::empty_mask(12, 12);
        for y in 1..4 {
            for x in 1..4 {
                mask.set(x, y, true);
                mask.set(x + 6, y + 6, true);
            }
        }
        let shapes = ImageprocOutlineExtractor.extract_outlines(&mask).unwrap();
        assert_eq!(shapes.len(), 2);
        assert!(shapes.iter().all(|s| s.holes.is_empty()));
    }
}
