//! `GET /events` server-sent event stream

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use tokio_stream::wrappers::WatchStream;

use super::AppState;
use crate::progress::ProgressEvent;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// The current status is sent on connect, then every later change.
pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    log::debug!("Event stream opened");
    let updates = WatchStream::new(state.installer.progress().subscribe())
        .map(|event| Ok(to_sse(&event)));

    Sse::new(updates).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

fn to_sse(event: &ProgressEvent) -> Event {
    let sse = Event::default().event(event.stage.as_str());
    match serde_json::to_string(event) {
        Ok(json) => sse.data(json),
        Err(e) => {
            log::warn!("Failed to serialise progress event: {e}");
            sse.data(event.message.clone())
        }
    }
}
