use std::collections::VecDeque;

use image::GrayImage;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};
use tracing::debug;

use crate::{
    error::{Result, SegmentError},
    types::{ensure_same_shape, Connectivity, IndexRaster, MaskExt, PixelCoord},
};

/// Acceptance test applied to a neighbour of the growing region.
#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GrowthRule {
    /// Value within `tolerance` of the `[min, max]` range of the region grown so far
    #[default]
    RegionRange,
    /// Value within `tolerance` of the seed value
    SeedValue,
}

/// Seeded, tolerance-bounded flood fill over one or more scalar rasters.
///
/// Each raster is grown independently from the same seed and the resulting
/// masks are intersected, so a pixel is selected only when it is reachable
/// in every raster.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RegionGrower {
    #[schemars(range(min = 0.0))]
    pub tolerance: f32,
    #[serde(default)]
    pub connectivity: Connectivity,
    #[serde(default)]
    pub rule: GrowthRule,
}

impl Default for RegionGrower {
    fn default() -> Self {
        Self {
            tolerance: 0.05,
            connectivity: Connectivity::Eight,
            rule: GrowthRule::RegionRange,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unseen,
    Accepted,
    Pending,
}

#[derive(Debug, Clone, Copy)]
struct ValueRange {
    min: f32,
    max: f32,
}

impl ValueRange {
    /// Returns true when the range widened
    fn include(&mut self, value: f32) -> bool {
        if value < self.min {
            self.min = value;
            true
        } else if value > self.max {
            self.max = value;
            true
        } else {
            false
        }
    }
}

impl RegionGrower {
    pub fn new(tolerance: f32) -> Self {
        Self {
            tolerance,
            ..Default::default()
        }
    }

    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn with_rule(mut self, rule: GrowthRule) -> Self {
        self.rule = rule;
        self
    }

    /// Grow a region from `seed` in every raster and return the intersection.
    pub fn grow(&self, rasters: &[&IndexRaster], seed: PixelCoord) -> Result<GrayImage> {
        if !(self.tolerance >= 0.0) {
            return Err(SegmentError::InvalidTolerance(self.tolerance));
        }

        let (first, rest) = rasters.split_first().ok_or(SegmentError::NoRasters)?;
        let (width, height) = first.dimensions();
        for raster in rest {
            ensure_same_shape((width, height), raster.dimensions())?;
        }

        let (x, y) = seed.checked(width, height)?;
        if rasters.iter().any(|r| !r.get_pixel(x, y).0[0].is_finite()) {
            return Err(SegmentError::InvalidSeed {
                row: seed.row,
                col: seed.col,
            });
        }

        let mut combined = self.grow_single(first, x, y);
        for raster in rest {
            combined.intersect_with(&self.grow_single(raster, x, y))?;
        }

        debug!(
            "Grew region from (row {}, col {}) over {} raster(s): {} pixels (tolerance {}, {})",
            seed.row,
            seed.col,
            rasters.len(),
            combined.count(),
            self.tolerance,
            self.rule
        );

        Ok(combined)
    }

    fn accepts(&self, value: f32, seed_value: f32, range: &ValueRange) -> bool {
        if !value.is_finite() {
            return false;
        }
        match self.rule {
            GrowthRule::SeedValue => (value - seed_value).abs() <= self.tolerance,
            GrowthRule::RegionRange => {
                value >= range.min - self.tolerance && value <= range.max + self.tolerance
            }
        }
    }

    /// Breadth-first growth in a single raster. Every pixel is accepted and
    /// expanded at most once. Under `RegionRange`, neighbours rejected earlier
    /// are parked and re-tested only after the region's range widened, which
    /// yields the least fixpoint independently of traversal order.
    fn grow_single(&self, raster: &IndexRaster, x: u32, y: u32) -> GrayImage {
        let (width, height) = raster.dimensions();
        let index = |x: u32, y: u32| y as usize * width as usize + x as usize;

        let mut visits = vec![Visit::Unseen; width as usize * height as usize];
        let mut mask = GrayImage::empty_mask(width, height);

        let seed_value = raster.get_pixel(x, y).0[0];
        let mut range = ValueRange {
            min: seed_value,
            max: seed_value,
        };
        let mut widened = false;

        visits[index(x, y)] = Visit::Accepted;
        mask.set(x, y, true);

        let mut queue = VecDeque::from([(x, y)]);
        let mut pending: Vec<(u32, u32)> = Vec::new();

        loop {
            while let Some((cx, cy)) = queue.pop_front() {
                for &(dr, dc) in self.connectivity.offsets() {
                    let nx = cx as i64 + dc;
                    let ny = cy as i64 + dr;
                    if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                        continue;
                    }
                    let (nx, ny) = (nx as u32, ny as u32);
                    let i = index(nx, ny);
                    if visits[i] != Visit::Unseen {
                        continue;
                    }

                    let value = raster.get_pixel(nx, ny).0[0];
                    if self.accepts(value, seed_value, &range) {
                        visits[i] = Visit::Accepted;
                        mask.set(nx, ny, true);
                        if self.rule == GrowthRule::RegionRange {
                            widened |= range.include(value);
                        }
                        queue.push_back((nx, ny));
                    } else {
                        visits[i] = Visit::Pending;
                        pending.push((nx, ny));
                    }
                }
            }

            if !widened || pending.is_empty() {
                break;
            }
            widened = false;

            let mut still_pending = Vec::with_capacity(pending.len());
            for (px, py) in pending.drain(..) {
                let value = raster.get_pixel(px, py).0[0];
                if self.accepts(value, seed_value, &range) {
                    visits[index(px, py)] = Visit::Accepted;
                    mask.set(px, py, true);
                    widened |= range.include(value);
                    queue.push_back((px, py));
                } else {
                    still_pending.push((px, py));
                }
            }
            pending = still_pending;

            if queue.is_empty() {
                break;
            }
        }

        mask
    }
}
