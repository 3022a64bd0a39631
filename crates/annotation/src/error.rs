use segment::SegmentError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("Segmentation error: {0}")]
    Segment(#[from] SegmentError),

    #[error("Class id {0} is not defined in the class spec")]
    InvalidClassId(u8),

    #[error("Invalid class spec: {0}")]
    InvalidClassSpec(String),

    #[error("Shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },

    #[error("Labelling batch aborted by the annotator")]
    SessionAborted,

    #[error("Event stream closed before the image was finished")]
    EventStreamClosed,

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Scene unavailable: {0}")]
    SceneUnavailable(String),
}

impl AnnotateError {
    /// Errors caused by one rejected gesture; the session carries on after them.
    pub fn is_gesture_error(&self) -> bool {
        match self {
            Self::Segment(err) => {
                err.is_gesture_error() || matches!(err, SegmentError::ShapeMismatch { .. })
            }
            Self::ShapeMismatch { .. } => true,
            _ => false,
        }
    }
}

/// Failures reported by training and classification sinks
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Record rejected: {0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, AnnotateError>;
