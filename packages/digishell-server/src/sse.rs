use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use digishell_core::LinkEvent;
use futures_util::stream::Stream;
use std::convert::Infallible;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::state::{envelope, AppState};

pub async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let conn_id = state.next_conn_id.fetch_add(1, Ordering::SeqCst);
    let (subscriber, mut events) = state.broadcaster.subscribe();
    let initial = LinkEvent::Connection(state.current_connection().await);
    info!(conn_id, subscriber, "sse client connected");

    // axum drops the stream while it is parked on `events.recv()` when the
    // client goes away, so cleanup cannot run inside it. The oneshot sender
    // lives in the stream and its drop wakes the cleanup task.
    let (drop_tx, drop_rx) = tokio::sync::oneshot::channel::<()>();
    {
        let broadcaster = state.broadcaster.clone();
        tokio::spawn(async move {
            let _ = drop_rx.await;
            broadcaster.unsubscribe(subscriber);
            info!(conn_id, "sse client disconnected");
        });
    }

    let stream = async_stream::stream! {
        let _drop_guard = drop_tx;

        if let Some(event) = to_sse(&initial) {
            yield Ok(event);
        }
        while let Some(event) = events.recv().await {
            if let Some(event) = to_sse(&event) {
                yield Ok(event);
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default().interval(Duration::from_secs(15)))
}

fn to_sse(event: &LinkEvent) -> Option<Event> {
    match envelope(event) {
        Ok(json) => Some(Event::default().event(event.type_name()).data(json)),
        Err(e) => {
            warn!(event = event.type_name(), "failed to encode event: {}", e);
            None
        }
    }
}
