use image::{GrayImage, RgbImage};
use segment::{IndexRaster, MaskExt};

use crate::error::{AnnotateError, Result};

/// Ordered, named band planes sharing one grid
#[derive(Debug, Clone)]
pub struct MultispectralImage {
    names: Vec<String>,
    bands: Vec<IndexRaster>,
}

impl MultispectralImage {
    pub fn new(bands: Vec<(String, IndexRaster)>) -> Result<Self> {
        let (names, bands): (Vec<_>, Vec<_>) = bands.into_iter().unzip();
        if let Some(first) = bands.first() {
            let expected = first.dimensions();
            for band in &bands[1..] {
                check_shape(expected, band.dimensions())?;
            }
        }
        Ok(Self { names, bands })
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.bands.first().map(|b| b.dimensions())
    }

    pub fn band(&self, name: &str) -> Option<&IndexRaster> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.bands[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &IndexRaster)> {
        self.names.iter().map(String::as_str).zip(self.bands.iter())
    }
}

/// One image handed to the labelling or evaluation loop.
#[derive(Debug, Clone)]
pub struct Scene {
    pub site_id: String,
    pub image_id: String,
    image: MultispectralImage,
    /// 255 marks cloudy or invalid pixels
    cloud_mask: GrayImage,
    ndvi: IndexRaster,
    ndwi: IndexRaster,
    preview: RgbImage,
}

impl Scene {
    pub fn new(
        site_id: impl Into<String>,
        image_id: impl Into<String>,
        image: MultispectralImage,
        cloud_mask: GrayImage,
        ndvi: IndexRaster,
        ndwi: IndexRaster,
        preview: RgbImage,
    ) -> Result<Self> {
        let expected = preview.dimensions();
        check_shape(expected, cloud_mask.dimensions())?;
        check_shape(expected, ndvi.dimensions())?;
        check_shape(expected, ndwi.dimensions())?;
        if let Some(found) = image.dimensions() {
            check_shape(expected, found)?;
        }

        Ok(Self {
            site_id: site_id.into(),
            image_id: image_id.into(),
            image,
            cloud_mask,
            ndvi,
            ndwi,
            preview,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.preview.dimensions()
    }

    pub fn image(&self) -> &MultispectralImage {
        &self.image
    }

    pub fn cloud_mask(&self) -> &GrayImage {
        &self.cloud_mask
    }

    pub fn ndvi(&self) -> &IndexRaster {
        &self.ndvi
    }

    pub fn ndwi(&self) -> &IndexRaster {
        &self.ndwi
    }

    pub fn preview(&self) -> &RgbImage {
        &self.preview
    }

    /// Fraction of cloudy pixels; an empty grid counts as fully cloudy.
    pub fn cloud_cover(&self) -> f32 {
        let (width, height) = self.dimensions();
        let total = width as usize * height as usize;
        if total == 0 {
            return 1.0;
        }
        self.cloud_mask.count() as f32 / total as f32
    }
}

fn check_shape(expected: (u32, u32), found: (u32, u32)) -> Result<()> {
    if expected != found {
        return Err(AnnotateError::ShapeMismatch { expected, found });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use image::Luma;

    use super::*;

    #[test]
    fn test_cloud_cover() {
        let mut cloud = GrayImage::new(4, 5);
        for x in 0..4 {
            cloud.put_pixel(x, 0, Luma([255]));
        }
        let scene = Scene::new(
            "site",
            "img",
            MultispectralImage::new(vec![("red".into(), IndexRaster::new(4, 5))]).unwrap(),
            cloud,
            IndexRaster::new(4, 5),
            IndexRaster::new(4, 5),
            RgbImage::new(4, 5),
        )
        .unwrap();
        assert!((scene.cloud_cover() - 0.2).abs() < 1e-6);
        assert!(scene.image().band("red").is_some());
        assert!(scene.image().band("nir").is_none());
    }

    #[test]
    fn test_shapes_checked() {
        let err = Scene::new(
            "site",
            "img",
            MultispectralImage::new(vec![]).unwrap(),
            GrayImage::new(4, 4),
            IndexRaster::new(4, 4),
            IndexRaster::new(3, 4),
            RgbImage::new(4, 4),
        )
        .unwrap_err();
        assert!(matches!(err, AnnotateError::ShapeMismatch { found: (3, 4), .. }));

        assert!(MultispectralImage::new(vec![
            ("a".into(), IndexRaster::new(2, 2)),
            ("b".into(), IndexRaster::new(2, 3)),
        ])
        .is_err());
    }
}
