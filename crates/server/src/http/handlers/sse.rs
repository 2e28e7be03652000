use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use domain::CommentEvent;
use futures::stream::Stream;
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    StreamExt,
};

use super::comments::parse_fine_id;
use crate::http::error::ApiResult;
use crate::state::AppState;

pub const RESYNC_EVENT: &str = "resync";

pub async fn sse_handler(
    State(state): State<AppState>,
    Path(fine_id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let fine_id = parse_fine_id(fine_id)?;
    let rx = state.events.subscribe();
    tracing::info!("SSE Connected: fine={}", fine_id);

    let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) if event.fine_id() == &fine_id => Some(to_sse(&event)),
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(n)) => {
            // 客户端错过的事件需要重新拉取列表
            tracing::warn!("SSE client for fine {} lagged by {} events", fine_id, n);
            Some(Ok(Event::default().event(RESYNC_EVENT).data(n.to_string())))
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(state.settings.comments.sse_keep_alive())))
}

fn to_sse(event: &CommentEvent) -> Result<Event, axum::Error> {
    Event::default()
        .event(event.name())
        .id(event.comment().id.clone())
        .json_data(event.comment())
        .map_err(|e| {
            tracing::error!("SSE serialization error: {}", e);
            axum::Error::new(e)
        })
}
