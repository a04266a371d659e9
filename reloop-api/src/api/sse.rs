//! Server-Sent Events for verification progress
//!
//! Clients following a single teardown pass `?session_id=<uuid>`; without
//! it every event is forwarded.

use crate::AppState;
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use reloop_common::events::ReloopEvent;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

const HEARTBEAT: Duration = Duration::from_secs(15);

#[derive(Debug, Default, Deserialize)]
pub struct EventFilter {
    pub session_id: Option<Uuid>,
}

impl EventFilter {
    fn admits(&self, event: &ReloopEvent) -> bool {
        match self.session_id {
            Some(wanted) => event.session_id() == Some(wanted),
            None => true,
        }
    }
}

/// GET /api/events
///
/// Streams:
/// - ComponentStatusChanged
/// - XpAwarded (unfiltered streams only)
/// - ValuationRefined
/// - SessionCompleted
pub async fn event_stream(
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(session_id = ?filter.session_id, "New SSE client connected");

    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(HEARTBEAT) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = rx.recv() => {
                    let event = match received {
                        Ok(event) => event,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("SSE: Client lagged, {} events dropped", skipped);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };
                    if !filter.admits(&event) {
                        continue;
                    }

                    let event_type = event.event_type();
                    match serde_json::to_string(&event) {
                        Ok(event_json) => {
                            debug!("SSE: Broadcasting {}", event_type);
                            yield Ok(Event::default().event(event_type).data(event_json));
                        }
                        Err(e) => {
                            warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                        }
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT).text("heartbeat"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_filter_by_session() {
        let session_id = Uuid::new_v4();
        let event = ReloopEvent::ValuationRefined {
            session_id,
            total_inr: 3200,
            timestamp: Utc::now(),
        };

        assert!(EventFilter::default().admits(&event));
        assert!(EventFilter { session_id: Some(session_id) }.admits(&event));
        assert!(!EventFilter { session_id: Some(Uuid::new_v4()) }.admits(&event));
    }
}
