//! HTTP + SSE transport for streaming agent runs.
//!
//! Provides:
//! - Wire bodies for the agent server API
//! - SSE decoding into stream frames
//! - `HttpTransport`, the default transport of managed sessions

pub mod http;
pub mod protocol;
pub mod sse;

pub use http::HttpTransport;
pub use protocol::{CreateRunBody, RunResponse, ThreadResponse, ThreadStateResponse};
pub use sse::frame_stream;
