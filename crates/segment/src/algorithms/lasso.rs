use geo::{
    coordinate_position::{CoordPos, CoordinatePosition},
    BoundingRect,
};
use geo_types::{Coord, LineString, Polygon};
use image::GrayImage;
use tracing::debug;

use crate::{
    error::{Result, SegmentError},
    types::MaskExt,
};

/// Offset used to test the winding number just beside an edge
const EDGE_SIDE_OFFSET: f64 = 1e-6;

/// Free-hand polygon ("lasso") to pixel-mask conversion.
///
/// Vertices are `[x, y]` in pixel-centre coordinates: pixel (row r, col c)
/// has its centre at `(c, r)`. A pixel is selected when its centre has a
/// nonzero winding number or lies on an edge, so a rectangle drawn through
/// pixel centres selects its border pixels too. A lasso enclosing no area
/// selects nothing, even where its edges pass through pixel centres.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolygonSelector;

impl PolygonSelector {
    /// Rasterize one lasso over a `width` x `height` grid.
    ///
    /// Degenerate lassos (fewer than three distinct vertices, non-finite
    /// coordinates, no enclosed area) yield an empty mask. A lasso whose
    /// bounding box misses the grid entirely is an `OutOfBounds` error.
    pub fn select(&self, vertices: &[[f64; 2]], width: u32, height: u32) -> Result<GrayImage> {
        let mut mask = GrayImage::empty_mask(width, height);

        if is_degenerate(vertices) {
            debug!("Ignoring degenerate lasso with {} vertices", vertices.len());
            return Ok(mask);
        }

        let ring: LineString<f64> = vertices
            .iter()
            .map(|&[x, y]| Coord { x, y })
            .collect::<Vec<_>>()
            .into();
        let polygon = Polygon::new(ring, vec![]);
        let has_area = encloses_area(&polygon);

        let Some(bounds) = polygon.bounding_rect() else {
            return Ok(mask);
        };
        let (min, max) = (bounds.min(), bounds.max());

        // Pixel footprints cover [-0.5, width - 0.5] x [-0.5, height - 0.5]
        let misses_grid = max.x < -0.5
            || max.y < -0.5
            || min.x > width as f64 - 0.5
            || min.y > height as f64 - 0.5;
        if (width == 0 || height == 0 || misses_grid) && has_area {
            return Err(SegmentError::OutOfBounds {
                row: min.y.round() as i64,
                col: min.x.round() as i64,
                width,
                height,
            });
        }

        let first_col = min.x.ceil().max(0.0) as u32;
        let first_row = min.y.ceil().max(0.0) as u32;
        let last_col = max.x.floor().min(width as f64 - 1.0);
        let last_row = max.y.floor().min(height as f64 - 1.0);
        if last_col < first_col as f64 || last_row < first_row as f64 {
            return Ok(mask);
        }

        let mut interior_centre = false;
        for row in first_row..=last_row as u32 {
            for col in first_col..=last_col as u32 {
                let centre = Coord {
                    x: col as f64,
                    y: row as f64,
                };
                match polygon.coordinate_position(&centre) {
                    CoordPos::Outside => {}
                    CoordPos::Inside => {
                        interior_centre = true;
                        mask.set(col, row, true);
                    }
                    CoordPos::OnBoundary => mask.set(col, row, true),
                }
            }
        }

        if !interior_centre && !has_area {
            debug!("Ignoring lasso with no enclosed area ({} vertices)", vertices.len());
            return Ok(GrayImage::empty_mask(width, height));
        }

        debug!(
            "Lasso with {} vertices selected {} pixels",
            vertices.len(),
            mask.count()
        );

        Ok(mask)
    }
}

fn is_degenerate(vertices: &[[f64; 2]]) -> bool {
    if vertices.iter().flatten().any(|v| !v.is_finite()) {
        return true;
    }

    let mut distinct: Vec<[f64; 2]> = Vec::with_capacity(vertices.len());
    for &v in vertices {
        if !distinct.contains(&v) {
            distinct.push(v);
        }
    }
    distinct.len() < 3
}

/// Whether some point off the ring has a nonzero winding number.
///
/// Every region of nonzero winding is bordered by an edge that is not
/// cancelled by a reverse traversal, so it suffices to look just beside the
/// midpoint of each edge. Out-and-back strokes and collinear rings fail.
fn encloses_area(polygon: &Polygon<f64>) -> bool {
    polygon.exterior().lines().any(|line| {
        let delta = line.delta();
        let length = delta.x.hypot(delta.y);
        if length == 0.0 {
            return false;
        }
        let mid = Coord {
            x: line.start.x + delta.x / 2.0,
            y: line.start.y + delta.y / 2.0,
        };
        let normal = Coord {
            x: -delta.y / length * EDGE_SIDE_OFFSET,
            y: delta.x / length * EDGE_SIDE_OFFSET,
        };
        [mid + normal, mid - normal]
            .iter()
            .any(|side| polygon.coordinate_position(side) == CoordPos::Inside)
    })
}
