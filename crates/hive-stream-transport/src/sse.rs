//! Server-Sent-Events decoding into stream frames.

use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use hive_stream_core::{FrameStream, StreamFrame, TransportError};

/// Event name assumed when the server omits one.
const DEFAULT_EVENT: &str = "message";

/// Decode an SSE byte stream into frames.
///
/// Undecodable payloads surface as [`TransportError::Decode`] items; the
/// stream continues past them.
pub fn frame_stream<S, E>(byte_stream: S) -> FrameStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + 'static,
{
    byte_stream
        .map(|result| result.map_err(|e| std::io::Error::other(e.to_string())))
        .eventsource()
        .map(|result| match result {
            Ok(event) => {
                let name = if event.event.is_empty() {
                    DEFAULT_EVENT
                } else {
                    event.event.as_str()
                };
                StreamFrame::from_sse(name, &event.data).map_err(|e| {
                    tracing::warn!(event = name, "undecodable frame: {e}");
                    TransportError::Decode(e.to_string())
                })
            }
            Err(e) => Err(TransportError::Stream(e.to_string())),
        })
        .boxed()
}
