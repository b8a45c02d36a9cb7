//! Wire encoding of a relayed turn: a chunked `text/plain` body of raw
//! fragments, closed by one in-band marker line.

use std::convert::Infallible;

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc;

use crate::interview::relay::RelayEvent;

/// Sent last when the reply was relayed and saved.
pub const END_OF_STREAM: &str = "<<END_OF_STREAM>>";
/// Sent last when the stream was aborted; the reply was not saved.
pub const STREAM_ERROR: &str = "<<STREAM_ERROR>>";
/// Sent just before `END_OF_STREAM` when this reply closed the interview.
pub const INTERVIEW_COMPLETE: &str = "<<INTERVIEW_COMPLETE>>";

/// Drains the relay channel into body chunks. Dropping the stream (client
/// disconnect) drops the receiver, which the pump observes as cancellation.
pub fn relay_body_stream(
    mut rx: mpsc::Receiver<RelayEvent>,
) -> impl Stream<Item = Result<Bytes, Infallible>> {
    async_stream::stream! {
        while let Some(event) = rx.recv().await {
            match event {
                RelayEvent::Fragment(text) => yield Ok(Bytes::from(text)),
                RelayEvent::Done { interview_completed } => {
                    if interview_completed {
                        yield Ok(Bytes::from(format!("\n{INTERVIEW_COMPLETE}")));
                    }
                    yield Ok(Bytes::from(format!("\n{END_OF_STREAM}")));
                    return;
                }
                RelayEvent::Failed(_) => {
                    yield Ok(Bytes::from(format!("\n{STREAM_ERROR}")));
                    return;
                }
            }
        }
        // Pump exited without a terminal event.
        yield Ok(Bytes::from(format!("\n{STREAM_ERROR}")));
    }
}

pub fn relay_response(rx: mpsc::Receiver<RelayEvent>) -> Response {
    (
        [
            (CONTENT_TYPE, "text/plain; charset=utf-8"),
            (CACHE_CONTROL, "no-cache"),
        ],
        [("x-accel-buffering", "no")],
        Body::from_stream(relay_body_stream(rx)),
    )
        .into_response()
}
