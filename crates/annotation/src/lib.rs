//! # Shoreline Annotation
//!
//! Interactive labelling of multispectral scenes and clean-up of classifier
//! output, built on the `segment` primitives.
//!
//! An [`AnnotationSession`] walks one [`Scene`] through the keep/skip
//! decision and one painting stage per class of the [`ClassSpec`], driven
//! by [`AnnotationEvent`]s. The finished labels and per-class features are
//! handed to a [`TrainingSink`]. [`run_evaluation`] applies a
//! [`Classifier`] and the classification post-processor to new scenes.
//!
//! ```rust,no_run
//! use std::collections::VecDeque;
//! use annotation::{run_labelling, AnnotationEvent, LabellingSettings, NullDisplay, Scene, TrainingRecord};
//!
//! # fn scenes() -> Vec<annotation::Result<Scene>> { Vec::new() }
//! let settings = LabellingSettings::default();
//! let mut events = VecDeque::from([AnnotationEvent::Keep, AnnotationEvent::Confirm]);
//! let mut records: Vec<TrainingRecord> = Vec::new();
//!
//! let summary = run_labelling(scenes(), &settings, &mut events, &mut NullDisplay, &mut records)?;
//! println!("saved {} images", summary.saved);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod class_spec;
pub mod canvas;
pub mod scene;
pub mod features;
pub mod event;
pub mod sink;
pub mod classifier;
pub mod config;
pub mod session;
pub mod batch;

pub use error::{AnnotateError, PersistenceError, Result};
pub use class_spec::{ClassDefinition, ClassSpec, LabelMethod};
pub use canvas::{CanvasSnapshot, LabelCanvas, StrokeHandle, UNLABELED};
pub use scene::{MultispectralImage, Scene};
pub use features::{extract_features, BandStatistics, ClassFeatures, FeatureSet, BACKGROUND_NAME};
pub use event::{AnnotationEvent, EventSource};
pub use sink::{
    ClassificationRecord, ClassificationSink, DisplaySink, LabelGrid, NullDisplay, TrainingRecord,
    TrainingSink,
};
pub use classifier::Classifier;
pub use config::{EraseZone, EvaluationSettings, LabellingSettings};
pub use session::{AnnotationSession, Outcome, SessionState, SkipReason};
pub use batch::{run_evaluation, run_labelling, BatchSummary};
