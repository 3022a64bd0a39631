use thiserror::Error;

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("Pixel (row {row}, col {col}) is outside the {width}x{height} raster")]
    OutOfBounds {
        row: i64,
        col: i64,
        width: u32,
        height: u32,
    },

    #[error("Raster shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },

    #[error("Region growing needs at least one raster")]
    NoRasters,

    #[error("Seed value at (row {row}, col {col}) is not finite")]
    InvalidSeed { row: i64, col: i64 },

    #[error("Tolerance must be a non-negative number, got {0}")]
    InvalidTolerance(f32),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
}

impl SegmentError {
    /// Errors caused by a single bad gesture rather than by broken inputs.
    pub fn is_gesture_error(&self) -> bool {
        matches!(
            self,
            Self::OutOfBounds { .. } | Self::InvalidSeed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SegmentError>;
