use std::collections::VecDeque;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

/// Discrete annotator input consumed by an [`AnnotationSession`](crate::session::AnnotationSession).
#[derive(
    Debug, Clone,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq
)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnnotationEvent {
    /// Pointer click; `x` is the column and `y` the row, pixel centres on integers
    PointerClick { x: f64, y: f64 },

    /// A finished lasso, vertices as `[x, y]`
    PolygonComplete { vertices: Vec<[f64; 2]> },

    /// Finish the current painting stage
    Confirm,

    /// Drop every stroke of the current stage
    CancelStage,

    /// Label this image
    Keep,

    /// Move on without labelling this image
    Skip,

    /// Stop the whole labelling batch
    AbortBatch,
}

impl AnnotationEvent {
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AnnotationEvent)
    }

    pub fn event_names() -> &'static [&'static str] {
        <Self as VariantNames>::VARIANTS
    }

    pub fn name(&self) -> &'static str {
        self.into()
    }
}

/// Blocking, one-at-a-time supply of annotator events.
///
/// `None` means the source is exhausted.
pub trait EventSource {
    fn next_event(&mut self) -> Option<AnnotationEvent>;
}

impl EventSource for VecDeque<AnnotationEvent> {
    fn next_event(&mut self) -> Option<AnnotationEvent> {
        self.pop_front()
    }
}

/// Blocks the current thread, so it must not be polled from inside an
/// async context; run the session with `tokio::task::spawn_blocking`.
impl EventSource for tokio::sync::mpsc::Receiver<AnnotationEvent> {
    fn next_event(&mut self) -> Option<AnnotationEvent> {
        self.blocking_recv()
    }
}

impl<T: EventSource + ?Sized> EventSource for &mut T {
    fn next_event(&mut self) -> Option<AnnotationEvent> {
        (**self).next_event()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_form() {
        let click: AnnotationEvent =
            serde_json::from_str(r#"{"type": "pointer_click", "params": {"x": 3.0, "y": 4.5}}"#).unwrap();
        assert_eq!(click, AnnotationEvent::PointerClick { x: 3.0, y: 4.5 });

        let keep: AnnotationEvent = serde_json::from_str(r#"{"type": "keep"}"#).unwrap();
        assert_eq!(keep, AnnotationEvent::Keep);

        let json = serde_json::to_value(AnnotationEvent::PolygonComplete {
            vertices: vec![[0.0, 0.0], [2.0, 0.0], [0.0, 2.0]],
        })
        .unwrap();
        assert_eq!(json["type"], "polygon_complete");
        assert_eq!(json["params"]["vertices"][1][0], 2.0);
    }

    #[test]
    fn test_names() {
        assert_eq!(AnnotationEvent::AbortBatch.name(), "abort_batch");
        assert_eq!(AnnotationEvent::CancelStage.to_string(), "cancel_stage");
        assert_eq!(AnnotationEvent::event_names().len(), 7);
    }

    #[test]
    fn test_channel_source() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        tx.blocking_send(AnnotationEvent::Keep).unwrap();
        drop(tx);
        assert_eq!(rx.next_event(), Some(AnnotationEvent::Keep));
        assert_eq!(rx.next_event(), None);
    }

    #[test]
    fn test_queue_source() {
        let mut queue = VecDeque::from([AnnotationEvent::Skip, AnnotationEvent::Confirm]);
        let source = &mut queue;
        assert_eq!(source.next_event(), Some(AnnotationEvent::Skip));
        assert_eq!(queue.len(), 1);
    }
}
