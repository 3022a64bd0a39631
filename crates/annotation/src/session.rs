use segment::{MaskExt, PixelCoord, PolygonSelector, RegionGrower};
use strum::{Display, IntoStaticStr};
use tracing::{debug, info, warn};

use crate::{
    canvas::{CanvasSnapshot, LabelCanvas, StrokeHandle},
    class_spec::{ClassDefinition, LabelMethod},
    config::LabellingSettings,
    error::{AnnotateError, Result},
    event::{AnnotationEvent, EventSource},
    features::extract_features,
    scene::Scene,
    sink::{DisplaySink, LabelGrid, TrainingRecord, TrainingSink},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    /// Too cloudy to label
    CloudCover,
    /// The annotator chose to skip
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingDecision,
    /// Painting the class at this index of the class spec
    Painting { stage: usize },
    /// All stages confirmed, record waiting to be saved
    Finalizing,
    Saved,
    Skipped(SkipReason),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Saved | Self::Skipped(_))
    }

    /// Whether the event is meaningful in this state
    pub fn accepts(&self, event: &AnnotationEvent) -> bool {
        use AnnotationEvent::*;
        match self {
            Self::AwaitingDecision => matches!(event, Keep | Skip | AbortBatch),
            Self::Painting { .. } => matches!(
                event,
                PointerClick { .. } | PolygonComplete { .. } | Confirm | CancelStage | AbortBatch
            ),
            Self::Finalizing => matches!(event, AbortBatch),
            Self::Saved | Self::Skipped(_) => false,
        }
    }
}

/// What a single event did to the session
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Not meaningful in the current state or stage, or selected no pixels
    Ignored,
    Kept,
    Skipped,
    Painted { class_id: u8, pixels: usize },
    StrokeUndone { class_id: u8 },
    StageCancelled { stage: usize },
    StageConfirmed { stage: usize },
    /// Last stage confirmed, record ready to save
    Finalized,
    /// A segmentation call failed; nothing changed
    GestureRejected(String),
}

/// Labelling of one image, driven one event at a time.
pub struct AnnotationSession<'a> {
    scene: Scene,
    settings: &'a LabellingSettings,
    grower: RegionGrower,
    state: SessionState,
    canvas: Option<LabelCanvas>,
    stage_entry: Option<CanvasSnapshot>,
    strokes: Vec<StrokeHandle>,
    record: Option<TrainingRecord>,
}

impl<'a> AnnotationSession<'a> {
    /// Start a session, skipping the scene right away when it is too cloudy.
    pub fn new(scene: Scene, settings: &'a LabellingSettings) -> Result<Self> {
        settings.validate()?;

        let cover = scene.cloud_cover();
        let too_cloudy = cover > settings.cloud_threshold || cover >= 1.0;
        let (state, canvas) = if too_cloudy {
            info!(
                "Skipping {} ({:.1}% cloud cover)",
                scene.image_id,
                cover * 100.0
            );
            (SessionState::Skipped(SkipReason::CloudCover), None)
        } else {
            let canvas = LabelCanvas::new(scene.preview().clone(), &settings.classes);
            (SessionState::AwaitingDecision, Some(canvas))
        };

        Ok(Self {
            scene,
            settings,
            grower: settings.region_grower(),
            state,
            canvas,
            stage_entry: None,
            strokes: Vec::new(),
            record: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn canvas(&self) -> Option<&LabelCanvas> {
        self.canvas.as_ref()
    }

    /// Record built when the last stage was confirmed
    pub fn record(&self) -> Option<&TrainingRecord> {
        self.record.as_ref()
    }

    /// Give up the session, keeping the finished record if there is one
    pub fn into_record(self) -> Option<TrainingRecord> {
        self.record
    }

    /// Strokes painted in the current stage, oldest first
    pub fn stage_strokes(&self) -> &[StrokeHandle] {
        &self.strokes
    }

    /// Consume events until the image is finished, skipped or aborted.
    ///
    /// Returns with the session either terminal or in
    /// [`SessionState::Finalizing`].
    pub fn run<E, D>(&mut self, events: &mut E, display: &mut D) -> Result<()>
    where
        E: EventSource + ?Sized,
        D: DisplaySink + ?Sized,
    {
        while !self.state.is_terminal() && self.state != SessionState::Finalizing {
            let event = events
                .next_event()
                .ok_or(AnnotateError::EventStreamClosed)?;
            self.handle_event(event, display)?;
        }
        Ok(())
    }

    pub fn handle_event<D>(&mut self, event: AnnotationEvent, display: &mut D) -> Result<Outcome>
    where
        D: DisplaySink + ?Sized,
    {
        if !self.state.accepts(&event) {
            debug!("Ignoring '{}' in state {:?}", event.name(), self.state);
            return Ok(Outcome::Ignored);
        }
        if event == AnnotationEvent::AbortBatch {
            info!("Labelling aborted on {}", self.scene.image_id);
            return Err(AnnotateError::SessionAborted);
        }

        match self.state {
            SessionState::AwaitingDecision => self.decide(event, display),
            SessionState::Painting { stage } => self.paint_stage(stage, event, display),
            _ => Ok(Outcome::Ignored),
        }
    }

    /// Hand the record to the sink, retrying up to `save_attempts` times.
    /// On failure the session stays in `Finalizing` and `save` may be called again.
    pub fn save<S>(&mut self, sink: &mut S) -> Result<()>
    where
        S: TrainingSink + ?Sized,
    {
        let record = match (&self.state, &self.record) {
            (SessionState::Finalizing, Some(record)) => record,
            _ => {
                return Err(AnnotateError::InvalidState(format!(
                    "cannot save in state {:?}",
                    self.state
                )))
            }
        };

        let attempts = self.settings.save_attempts.max(1);
        let mut attempt = 1;
        loop {
            match sink.save_training(record) {
                Ok(()) => break,
                Err(err) if attempt < attempts => {
                    warn!(
                        "Saving {} failed (attempt {}/{}): {}",
                        record.image_id, attempt, attempts, err
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }

        info!("Saved labels for {}", record.image_id);
        self.state = SessionState::Saved;
        Ok(())
    }

    fn decide<D>(&mut self, event: AnnotationEvent, display: &mut D) -> Result<Outcome>
    where
        D: DisplaySink + ?Sized,
    {
        match event {
            AnnotationEvent::Keep => {
                let canvas = self.canvas_mut()?;
                display.show(canvas.visualization());
                let snapshot = canvas.snapshot();
                self.enter_stage(0, snapshot);
                Ok(Outcome::Kept)
            }
            AnnotationEvent::Skip => {
                info!("Skipping {} on request", self.scene.image_id);
                self.canvas = None;
                self.state = SessionState::Skipped(SkipReason::User);
                Ok(Outcome::Skipped)
            }
            _ => Ok(Outcome::Ignored),
        }
    }

    fn paint_stage<D>(&mut self, stage: usize, event: AnnotationEvent, display: &mut D) -> Result<Outcome>
    where
        D: DisplaySink + ?Sized,
    {
        let settings = self.settings;
        let class = settings
            .classes
            .stage(stage)
            .ok_or_else(|| AnnotateError::InvalidState(format!("no painting stage {stage}")))?;
        let (width, height) = self.scene.dimensions();

        match event {
            AnnotationEvent::PointerClick { x, y } if settings.erase_zone.contains(x, y, width, height) => {
                let Some(stroke) = self.strokes.pop() else {
                    debug!("Erase requested with no strokes in stage {}", class.name);
                    return Ok(Outcome::Ignored);
                };
                let canvas = self.canvas_mut()?;
                canvas.undo(&stroke);
                display.show(canvas.visualization());
                Ok(Outcome::StrokeUndone {
                    class_id: stroke.class_id(),
                })
            }
            AnnotationEvent::PointerClick { x, y } if class.method == LabelMethod::FloodFill => {
                let seed = PixelCoord::from_point(x, y);
                let grown = self
                    .grower
                    .grow(&[self.scene.ndvi(), self.scene.ndwi()], seed);
                self.apply_gesture(class, grown.map_err(AnnotateError::from), display)
            }
            AnnotationEvent::PolygonComplete { vertices } if class.method == LabelMethod::Lasso => {
                let selected = PolygonSelector.select(&vertices, width, height);
                self.apply_gesture(class, selected.map_err(AnnotateError::from), display)
            }
            AnnotationEvent::PointerClick { .. } | AnnotationEvent::PolygonComplete { .. } => {
                debug!("Ignoring '{}' in {} stage '{}'", event.name(), class.method, class.name);
                Ok(Outcome::Ignored)
            }
            AnnotationEvent::CancelStage => {
                let snapshot = self.stage_entry.clone();
                let canvas = self.canvas_mut()?;
                if let Some(snapshot) = &snapshot {
                    canvas.restore(snapshot);
                }
                display.show(canvas.visualization());
                self.strokes.clear();
                info!("Cancelled stage '{}'", class.name);
                Ok(Outcome::StageCancelled { stage })
            }
            AnnotationEvent::Confirm => {
                info!("Confirmed stage '{}' with {} strokes", class.name, self.strokes.len());
                if stage + 1 < settings.classes.len() {
                    let snapshot = self.canvas_mut()?.snapshot();
                    self.enter_stage(stage + 1, snapshot);
                    Ok(Outcome::StageConfirmed { stage })
                } else {
                    self.finalize()?;
                    Ok(Outcome::Finalized)
                }
            }
            _ => Ok(Outcome::Ignored),
        }
    }

    fn apply_gesture<D>(
        &mut self,
        class: &ClassDefinition,
        mask: Result<image::GrayImage>,
        display: &mut D,
    ) -> Result<Outcome>
    where
        D: DisplaySink + ?Sized,
    {
        let mask = match mask {
            Ok(mask) => mask,
            Err(err) if err.is_gesture_error() => {
                warn!("Rejected gesture in stage '{}': {}", class.name, err);
                return Ok(Outcome::GestureRejected(err.to_string()));
            }
            Err(err) => return Err(err),
        };
        if mask.count() == 0 {
            debug!("Empty selection in stage '{}', nothing painted", class.name);
            return Ok(Outcome::Ignored);
        }

        let canvas = self.canvas_mut()?;
        let stroke = canvas.paint(&mask, class.id)?;
        display.show(canvas.visualization());

        let outcome = Outcome::Painted {
            class_id: class.id,
            pixels: stroke.len(),
        };
        self.strokes.push(stroke);
        Ok(outcome)
    }

    fn enter_stage(&mut self, stage: usize, snapshot: CanvasSnapshot) {
        if let Some(class) = self.settings.classes.stage(stage) {
            info!(
                "Stage {}/{}: '{}' ({})",
                stage + 1,
                self.settings.classes.len(),
                class.name,
                class.method
            );
        }
        self.stage_entry = Some(snapshot);
        self.strokes.clear();
        self.state = SessionState::Painting { stage };
    }

    fn finalize(&mut self) -> Result<()> {
        let canvas = self
            .canvas
            .as_ref()
            .ok_or_else(|| AnnotateError::InvalidState("no canvas to finalize".to_string()))?;

        let features = extract_features(
            &self.scene,
            canvas.labels(),
            &self.settings.classes,
            self.settings.include_background,
        )?;

        self.record = Some(TrainingRecord {
            site_id: self.scene.site_id.clone(),
            image_id: self.scene.image_id.clone(),
            labels: LabelGrid::from(canvas.labels()),
            features,
            classes: self.settings.classes.clone(),
            visualization: Some(canvas.visualization().clone()),
        });
        self.stage_entry = None;
        self.strokes.clear();
        self.state = SessionState::Finalizing;
        Ok(())
    }

    fn canvas_mut(&mut self) -> Result<&mut LabelCanvas> {
        self.canvas
            .as_mut()
            .ok_or_else(|| AnnotateError::InvalidState("session has no canvas".to_string()))
    }
}
