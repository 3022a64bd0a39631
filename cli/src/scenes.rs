use std::path::{Path, PathBuf};

use annotation::{AnnotateError, MultispectralImage, Scene};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use schemars::JsonSchema;
use segment::{IndexRaster, MASK_OFF};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::CliError;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BandFile {
    pub name: String,
    /// Relative to the scene directory
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SceneEntry {
    pub image_id: String,
    /// Mission code such as `S2` or `L8`
    pub satellite: String,
    pub bands: Vec<BandFile>,
    /// Nonzero pixels are cloudy; no file means a clear image
    #[serde(default)]
    pub cloud_mask: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SceneManifest {
    pub site_id: String,
    /// 16-bit band values are divided by this to get reflectance
    #[serde(default = "default_reflectance_scale")]
    pub reflectance_scale: f32,
    pub scenes: Vec<SceneEntry>,
}

fn default_reflectance_scale() -> f32 {
    10_000.0
}

/// Normalized difference `(a - b) / (a + b)`, NaN on cloudy pixels and
/// where the sum vanishes.
pub fn nd_index(a: &IndexRaster, b: &IndexRaster, cloud_mask: &GrayImage) -> IndexRaster {
    IndexRaster::from_fn(a.width(), a.height(), |x, y| {
        let (va, vb) = (a.get_pixel(x, y).0[0], b.get_pixel(x, y).0[0]);
        let sum = va + vb;
        if cloud_mask.get_pixel(x, y).0[0] != MASK_OFF || sum == 0.0 {
            Luma([f32::NAN])
        } else {
            Luma([(va - vb) / sum])
        }
    })
}

/// RGB preview stretched per channel between the min and max over clear pixels
pub fn stretch_preview(red: &IndexRaster, green: &IndexRaster, blue: &IndexRaster, cloud_mask: &GrayImage) -> RgbImage {
    let range = |band: &IndexRaster| {
        band.enumerate_pixels()
            .filter(|(x, y, p)| cloud_mask.get_pixel(*x, *y).0[0] == MASK_OFF && p.0[0].is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), (_, _, p)| {
                (lo.min(p.0[0]), hi.max(p.0[0]))
            })
    };
    let ranges = [range(red), range(green), range(blue)];

    let scale = |v: f32, (lo, hi): (f32, f32)| -> u8 {
        if !(hi > lo) || !v.is_finite() {
            return 0;
        }
        (((v - lo) / (hi - lo)).clamp(0.0, 1.0) * 255.0).round() as u8
    };

    RgbImage::from_fn(red.width(), red.height(), |x, y| {
        Rgb([
            scale(red.get_pixel(x, y).0[0], ranges[0]),
            scale(green.get_pixel(x, y).0[0], ranges[1]),
            scale(blue.get_pixel(x, y).0[0], ranges[2]),
        ])
    })
}

/// Scene provider backed by a directory with a `manifest.json` and
/// single-band image files.
#[derive(Debug, Clone)]
pub struct SceneDirectory {
    root: PathBuf,
    manifest: SceneManifest,
}

impl SceneDirectory {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, CliError> {
        let root = root.as_ref().to_path_buf();
        let content = std::fs::read_to_string(root.join(MANIFEST_FILE))?;
        let manifest: SceneManifest = serde_json::from_str(&content)?;
        if !(manifest.reflectance_scale > 0.0) {
            return Err(CliError::InvalidManifest(format!(
                "reflectance_scale must be positive, got {}",
                manifest.reflectance_scale
            )));
        }
        Ok(Self { root, manifest })
    }

    pub fn manifest(&self) -> &SceneManifest {
        &self.manifest
    }

    /// Distinct satellites in manifest order
    pub fn satellites(&self) -> Vec<String> {
        let mut satellites: Vec<String> = Vec::new();
        for entry in &self.manifest.scenes {
            if !satellites.contains(&entry.satellite) {
                satellites.push(entry.satellite.clone());
            }
        }
        satellites
    }

    /// Only the scenes of one satellite
    pub fn for_satellite(&self, satellite: &str) -> Self {
        let mut manifest = self.manifest.clone();
        manifest.scenes.retain(|s| s.satellite == satellite);
        Self {
            root: self.root.clone(),
            manifest,
        }
    }

    /// Lazily loaded scenes, in manifest order
    pub fn scenes(&self) -> impl Iterator<Item = annotation::Result<Scene>> + '_ {
        self.manifest.scenes.iter().map(move |entry| {
            self.load(entry)
                .map_err(|err| AnnotateError::SceneUnavailable(format!("{}: {}", entry.image_id, err)))
        })
    }

    pub fn load(&self, entry: &SceneEntry) -> Result<Scene, CliError> {
        let mut bands = Vec::with_capacity(entry.bands.len());
        for band in &entry.bands {
            bands.push((band.name.clone(), self.read_band(&band.path)?));
        }
        let multispectral = MultispectralImage::new(bands)?;
        let (width, height) = multispectral.dimensions().ok_or_else(|| {
            CliError::InvalidManifest(format!("scene '{}' lists no bands", entry.image_id))
        })?;

        let cloud_mask = match &entry.cloud_mask {
            Some(path) => image::open(self.root.join(path))?.to_luma8(),
            None => GrayImage::new(width, height),
        };

        let band = |name: &str| {
            multispectral.band(name).ok_or_else(|| CliError::MissingBand {
                image_id: entry.image_id.clone(),
                band: name.to_string(),
            })
        };
        let (blue, green, red, nir) = (band("blue")?, band("green")?, band("red")?, band("nir")?);

        if cloud_mask.dimensions() != (width, height) {
            return Err(AnnotateError::ShapeMismatch {
                expected: (width, height),
                found: cloud_mask.dimensions(),
            }
            .into());
        }
        let ndvi = nd_index(nir, red, &cloud_mask);
        let ndwi = nd_index(nir, green, &cloud_mask);
        let preview = stretch_preview(red, green, blue, &cloud_mask);

        debug!("Loaded {} ({}x{}, {} bands)", entry.image_id, width, height, multispectral.len());
        Ok(Scene::new(
            self.manifest.site_id.clone(),
            entry.image_id.clone(),
            multispectral,
            cloud_mask,
            ndvi,
            ndwi,
            preview,
        )?)
    }

    fn read_band(&self, path: &str) -> Result<IndexRaster, CliError> {
        let scale = self.manifest.reflectance_scale;
        Ok(match image::open(self.root.join(path))? {
            DynamicImage::ImageLuma16(raw) => IndexRaster::from_fn(raw.width(), raw.height(), |x, y| {
                Luma([raw.get_pixel(x, y).0[0] as f32 / scale])
            }),
            other => other.to_luma32f(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use image::ImageBuffer;

    use super::*;

    /// Writes a two-scene site: S2 scene clear, L8 scene half cloudy.
    pub(crate) fn write_site(root: &Path) {
        let band = |value: u16| -> ImageBuffer<Luma<u16>, Vec<u16>> {
            ImageBuffer::from_fn(6, 4, |x, _| Luma([if x < 3 { value } else { value / 2 }]))
        };
        for (name, value) in [("blue", 1000u16), ("green", 2000), ("red", 3000), ("nir", 6000)] {
            band(value).save(root.join(format!("{name}.png"))).unwrap();
        }
        GrayImage::from_fn(6, 4, |_, y| Luma([if y < 2 { 255 } else { 0 }]))
            .save(root.join("cloud.png"))
            .unwrap();

        let bands: Vec<BandFile> = ["blue", "green", "red", "nir"]
            .iter()
            .map(|name| BandFile {
                name: name.to_string(),
                path: format!("{name}.png"),
            })
            .collect();
        let manifest = SceneManifest {
            site_id: "NARRA".into(),
            reflectance_scale: 10_000.0,
            scenes: vec![
                SceneEntry {
                    image_id: "2021-01-01-S2".into(),
                    satellite: "S2".into(),
                    bands: bands.clone(),
                    cloud_mask: None,
                },
                SceneEntry {
                    image_id: "2021-02-01-L8".into(),
                    satellite: "L8".into(),
                    bands,
                    cloud_mask: Some("cloud.png".into()),
                },
            ],
        };
        std::fs::write(
            root.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn test_nd_index() {
        let a = IndexRaster::from_vec(3, 1, vec![0.6, 0.0, 0.5]).unwrap();
        let b = IndexRaster::from_vec(3, 1, vec![0.2, 0.0, 0.5]).unwrap();
        let mut cloud = GrayImage::new(3, 1);
        let nd = nd_index(&a, &b, &cloud);
        assert!((nd.get_pixel(0, 0).0[0] - 0.5).abs() < 1e-6);
        assert!(nd.get_pixel(1, 0).0[0].is_nan());
        assert_eq!(nd.get_pixel(2, 0).0[0], 0.0);

        cloud.put_pixel(0, 0, Luma([255]));
        assert!(nd_index(&a, &b, &cloud).get_pixel(0, 0).0[0].is_nan());
    }

    #[test]
    fn test_stretch_ignores_cloudy_pixels() {
        let band = IndexRaster::from_vec(3, 1, vec![0.1, 0.3, 5.0]).unwrap();
        let mut cloud = GrayImage::new(3, 1);
        cloud.put_pixel(2, 0, Luma([255]));
        let preview = stretch_preview(&band, &band, &band, &cloud);
        assert_eq!(preview.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(preview.get_pixel(1, 0), &Rgb([255, 255, 255]));
        assert_eq!(preview.get_pixel(2, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_scene_directory_loads_scenes() {
        let dir = tempfile::tempdir().unwrap();
        write_site(dir.path());

        let site = SceneDirectory::open(dir.path()).unwrap();
        assert_eq!(site.satellites(), vec!["S2".to_string(), "L8".to_string()]);

        let scenes: Vec<Scene> = site.scenes().collect::<annotation::Result<_>>().unwrap();
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[0].site_id, "NARRA");
        assert_eq!(scenes[0].dimensions(), (6, 4));
        assert_eq!(scenes[0].cloud_cover(), 0.0);
        assert_eq!(scenes[1].cloud_cover(), 0.5);

        let red = scenes[0].image().band("red").unwrap();
        assert!((red.get_pixel(0, 0).0[0] - 0.3).abs() < 1e-6);
        // (0.6 - 0.3) / 0.9
        assert!((scenes[0].ndvi().get_pixel(0, 3).0[0] - 1.0 / 3.0).abs() < 1e-5);
        assert!(scenes[1].ndvi().get_pixel(0, 0).0[0].is_nan());

        let landsat = site.for_satellite("L8");
        assert_eq!(landsat.scenes().count(), 1);
    }

    #[test]
    fn test_missing_band_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_site(dir.path());
        let mut site = SceneDirectory::open(dir.path()).unwrap();
        site.manifest.scenes[0].bands.retain(|b| b.name != "nir");

        let entry = site.manifest.scenes[0].clone();
        assert!(matches!(
            site.load(&entry),
            Err(CliError::MissingBand { band, .. }) if band == "nir"
        ));
        assert!(matches!(
            site.scenes().next(),
            Some(Err(AnnotateError::SceneUnavailable(_)))
        ));
    }
}
