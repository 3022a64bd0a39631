use segment::{render_composite, ClassificationPostProcessor};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{
    class_spec::ClassSpec,
    classifier::Classifier,
    config::{EvaluationSettings, LabellingSettings},
    error::{AnnotateError, PersistenceError, Result},
    event::EventSource,
    scene::Scene,
    session::{AnnotationSession, SessionState, SkipReason},
    sink::{ClassificationRecord, ClassificationSink, DisplaySink, TrainingRecord, TrainingSink},
};

/// Per-batch tallies
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub saved: usize,
    pub skipped_cloud: usize,
    pub skipped_user: usize,
    /// Finished records the sink refused, kept for another attempt
    #[serde(skip)]
    pub unsaved: Vec<TrainingRecord>,
}

impl BatchSummary {
    /// Offer every unsaved record to `sink` once more. Records that still
    /// fail stay in `unsaved` and the last failure is returned.
    pub fn retry_unsaved<S>(&mut self, sink: &mut S) -> std::result::Result<(), PersistenceError>
    where
        S: TrainingSink + ?Sized,
    {
        let mut last_error = None;
        for record in std::mem::take(&mut self.unsaved) {
            match sink.save_training(&record) {
                Ok(()) => {
                    info!("Saved labels for {} on retry", record.image_id);
                    self.saved += 1;
                }
                Err(err) => {
                    warn!("Retry for {} failed: {}", record.image_id, err);
                    last_error = Some(err);
                    self.unsaved.push(record);
                }
            }
        }
        last_error.map_or(Ok(()), Err)
    }
}

/// Label every scene in turn, one session at a time.
///
/// A record the sink still refuses after `save_attempts` is kept in
/// [`BatchSummary::unsaved`] and the batch moves on. An abort or a closed
/// event stream ends the batch with an error; scenes saved before that stay
/// saved, and pending unsaved records get one last attempt first.
pub fn run_labelling<I, E, D, S>(
    scenes: I,
    settings: &LabellingSettings,
    events: &mut E,
    display: &mut D,
    sink: &mut S,
) -> Result<BatchSummary>
where
    I: IntoIterator<Item = Result<Scene>>,
    E: EventSource + ?Sized,
    D: DisplaySink + ?Sized,
    S: TrainingSink + ?Sized,
{
    settings.validate()?;
    let mut summary = BatchSummary::default();

    for scene in scenes {
        let scene = scene?;
        summary.processed += 1;
        info!("Labelling {} / {}", scene.site_id, scene.image_id);

        let mut session = AnnotationSession::new(scene, settings)?;
        if let Err(err) = session.run(events, display) {
            warn!("Stopping after {} saved images: {}", summary.saved, err);
            if !summary.unsaved.is_empty() && summary.retry_unsaved(sink).is_err() {
                for record in &summary.unsaved {
                    error!("Labels for {} could not be saved and are lost", record.image_id);
                }
            }
            return Err(err);
        }

        match session.state() {
            SessionState::Finalizing => match session.save(sink) {
                Ok(()) => summary.saved += 1,
                Err(AnnotateError::Persistence(err)) => {
                    warn!("Keeping labels for {} to retry later: {}", session.scene().image_id, err);
                    summary.unsaved.extend(session.into_record());
                }
                Err(err) => return Err(err),
            },
            SessionState::Skipped(SkipReason::CloudCover) => summary.skipped_cloud += 1,
            SessionState::Skipped(SkipReason::User) => summary.skipped_user += 1,
            _ => {}
        }
    }

    info!(
        "Labelling finished: {} saved, {} unsaved, {} skipped (cloud), {} skipped (user)",
        summary.saved,
        summary.unsaved.len(),
        summary.skipped_cloud,
        summary.skipped_user
    );
    Ok(summary)
}

/// Classify every scene, clean the result and hand it to the sink.
pub fn run_evaluation<I, C, S>(
    scenes: I,
    classifier: &C,
    settings: &EvaluationSettings,
    classes: &ClassSpec,
    min_area_pixels: u32,
    sink: &mut S,
) -> Result<BatchSummary>
where
    I: IntoIterator<Item = Result<Scene>>,
    C: Classifier + ?Sized,
    S: ClassificationSink + ?Sized,
{
    classes.validate()?;
    let processor = ClassificationPostProcessor::new(settings.connectivity);
    let palette = classes.palette();
    let mut summary = BatchSummary::default();

    for scene in scenes {
        let scene = scene?;
        summary.processed += 1;

        let cover = scene.cloud_cover();
        if cover > settings.cloud_threshold {
            info!(
                "Skipping {} ({:.1}% cloud cover)",
                scene.image_id,
                cover * 100.0
            );
            summary.skipped_cloud += 1;
            continue;
        }

        let scores = classifier.classify(&scene, min_area_pixels)?;
        let masks = processor.filter(&scores, min_area_pixels)?;
        let composite = render_composite(scene.preview(), &masks, &palette)?;

        sink.save_classification(&ClassificationRecord {
            site_id: scene.site_id.clone(),
            image_id: scene.image_id.clone(),
            masks,
            composite,
        })?;
        info!("Classified {}", scene.image_id);
        summary.saved += 1;
    }

    info!(
        "Evaluation finished: {} classified, {} skipped (cloud)",
        summary.saved, summary.skipped_cloud
    );
    Ok(summary)
}
