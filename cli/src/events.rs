use annotation::AnnotationEvent;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::CliError;

fn parse_line(line: &str, number: usize) -> Option<Result<AnnotationEvent, CliError>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    Some(
        serde_json::from_str(trimmed).map_err(|source| CliError::InvalidEvent {
            line: number,
            source,
        }),
    )
}

/// Events from a JSON-lines script; blank lines and `#` comments are skipped.
pub fn parse_event_script(content: &str) -> Result<Vec<AnnotationEvent>, CliError> {
    content
        .lines()
        .enumerate()
        .filter_map(|(i, line)| parse_line(line, i + 1))
        .collect()
}

/// Stream events from a JSON-lines reader into the session channel.
///
/// Stops at end of input, at the first malformed line, or when the session
/// side hangs up. Resolves to the number of events forwarded.
pub fn spawn_event_feed<R>(reader: R, events: Sender<AnnotationEvent>) -> JoinHandle<Result<usize, CliError>>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = reader.lines();
        let mut number = 0;
        let mut forwarded = 0;

        while let Some(line) = lines.next_line().await? {
            number += 1;
            let Some(event) = parse_line(&line, number) else {
                continue;
            };
            let event = event?;
            debug!("Event {}: {}", number, event.name());
            if events.send(event).await.is_err() {
                warn!("Session stopped listening after {} events", forwarded);
                break;
            }
            forwarded += 1;
        }

        Ok(forwarded)
    })
}
