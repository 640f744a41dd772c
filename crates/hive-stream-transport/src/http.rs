//! HTTP + SSE transport against the agent server API.

use async_trait::async_trait;
use hive_stream_core::{
    ClientConfig, FrameStream, RunTicket, StreamTransport, SubmitRequest, ThreadSnapshot,
    TransportError,
};
use reqwest::{
    Client, RequestBuilder, Response,
    header::{self, HeaderMap, HeaderName, HeaderValue},
};
use serde::de::DeserializeOwned;

use crate::{
    protocol::{CreateRunBody, RunResponse, ThreadResponse, ThreadStateResponse},
    sse::frame_stream,
};

/// Transport that talks to the agent server over HTTP.
///
/// Managed sessions construct one from their client config; it can also be
/// handed to a custom session directly.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    config: ClientConfig,
    assistant_id: String,
}

impl HttpTransport {
    /// Build a transport for `assistant_id`.
    ///
    /// # Errors
    /// Returns error if a header in the config is invalid or the client
    /// cannot be built.
    pub fn new(config: ClientConfig, assistant_id: impl Into<String>) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        if let Some(key) = &config.api_key {
            headers.insert("x-api-key", header_value(key)?);
        }
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Request(format!("invalid header name {name}: {e}")))?;
            headers.insert(name, header_value(value)?);
        }

        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = config.timeout {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self {
            http,
            config,
            assistant_id: assistant_id.into(),
        })
    }

    #[must_use]
    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.config.endpoint(path));
        match self.config.timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value).map_err(|e| TransportError::Request(format!("invalid header value: {e}")))
}

async fn send(builder: RequestBuilder) -> Result<Response, TransportError> {
    let response = builder
        .send()
        .await
        .map_err(|e| TransportError::Request(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Http {
        status: status.as_u16(),
        body,
    })
}

async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, TransportError> {
    send(builder)
        .await?
        .json()
        .await
        .map_err(|e| TransportError::Decode(e.to_string()))
}

#[async_trait]
impl StreamTransport for HttpTransport {
    async fn connect(&self, thread_id: Option<&str>) -> Result<ThreadSnapshot, TransportError> {
        if let Some(id) = thread_id {
            let path = format!("threads/{id}/state");
            let state: ThreadStateResponse =
                send_json(self.request(reqwest::Method::GET, &path))
                    .await
                    .map_err(|e| match e {
                        TransportError::Http { status: 404, .. } => {
                            TransportError::NoThread(id.to_string())
                        }
                        other => other,
                    })?;
            tracing::debug!(thread_id = id, "loaded thread state");
            return Ok(state.into_snapshot(id));
        }

        let thread: ThreadResponse = send_json(
            self.request(reqwest::Method::POST, "threads")
                .json(&serde_json::json!({})),
        )
        .await?;
        tracing::debug!(thread_id = %thread.thread_id, "created thread");
        Ok(ThreadSnapshot {
            thread_id: thread.thread_id,
            ..ThreadSnapshot::default()
        })
    }

    async fn submit(&self, request: SubmitRequest) -> Result<RunTicket, TransportError> {
        let path = format!("threads/{}/runs", request.thread_id);
        let body = CreateRunBody::new(&self.assistant_id, request);
        let run: RunResponse =
            send_json(self.request(reqwest::Method::POST, &path).json(&body)).await?;
        tracing::debug!(run_id = %run.run_id, thread_id = %run.thread_id, "run created");
        Ok(RunTicket {
            run_id: run.run_id,
            thread_id: run.thread_id,
        })
    }

    async fn stream(&self, run: &RunTicket) -> Result<FrameStream, TransportError> {
        let path = format!("threads/{}/runs/{}/stream", run.thread_id, run.run_id);
        // Streams outlive the per-request timeout, so it is not applied here.
        let builder = self
            .http
            .get(self.config.endpoint(&path))
            .header(header::ACCEPT, "text/event-stream");
        let response = send(builder).await?;
        Ok(frame_stream(response.bytes_stream()))
    }

    async fn cancel(&self, run: &RunTicket) -> Result<(), TransportError> {
        let path = format!("threads/{}/runs/{}/cancel", run.thread_id, run.run_id);
        send(self.request(reqwest::Method::POST, &path)).await?;
        tracing::debug!(run_id = %run.run_id, "run cancelled");
        Ok(())
    }
}
