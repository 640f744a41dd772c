//! Managed sessions end to end against an in-process agent server.

mod support;

use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    routing::{get, post},
};
use futures::Stream;
use hive_stream_session::{
    ClientConfig, HiveStream, ManagedOptions, ManagedSession, StreamError, StreamOptions,
    SubmitOptions,
};
use serde_json::{Value, json};
use support::Recorder;
use tokio_test::assert_ok;

#[derive(Clone, Default)]
struct Server {
    runs: Arc<Mutex<Vec<Value>>>,
    streams: Arc<Mutex<u32>>,
}

async fn create_thread() -> Json<Value> {
    Json(json!({ "thread_id": "t-new" }))
}

async fn thread_state(Path(thread_id): Path<String>) -> Json<Value> {
    Json(json!({
        "thread_id": thread_id,
        "values": { "count": 10 },
        "tasks": []
    }))
}

async fn create_run(
    State(server): State<Server>,
    Path(thread_id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    server.runs.lock().unwrap().push(body);
    Json(json!({ "run_id": "r1", "thread_id": thread_id, "status": "pending" }))
}

async fn stream_run(
    State(server): State<Server>,
    Path((_thread_id, run_id)): Path<(String, String)>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let count = {
        let mut streams = server.streams.lock().unwrap();
        *streams += 1;
        *streams
    };
    let events = vec![
        Event::default()
            .event("metadata")
            .data(json!({ "run_id": run_id }).to_string()),
        Event::default()
            .event("values")
            .data(json!({ "count": count }).to_string()),
        Event::default()
            .event("custom|child:1")
            .data(json!({ "progress": 50 }).to_string()),
        Event::default().event("end").data("null"),
    ];
    Sse::new(futures::stream::iter(events.into_iter().map(Ok)))
}

async fn cancel_run() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn serve() -> (SocketAddr, Server) {
    let server = Server::default();
    let app = Router::new()
        .route("/threads", post(create_thread))
        .route("/threads/{thread_id}/state", get(thread_state))
        .route("/threads/{thread_id}/runs", post(create_run))
        .route("/threads/{thread_id}/runs/{run_id}/stream", get(stream_run))
        .route("/threads/{thread_id}/runs/{run_id}/cancel", post(cancel_run))
        .with_state(server.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, server)
}

#[tokio::test]
async fn test_managed_run_streams_from_server() {
    let (addr, server) = serve().await;
    let events = Recorder::<Value>::new();

    let options: StreamOptions = StreamOptions::new();
    let options = options
        .assistant_id("agent")
        .client(ClientConfig::new(format!("http://{addr}")))
        .on_custom_event({
            let events = events.clone();
            move |event: &Value| events.push(event.clone())
        });
    let mut slot: HiveStream = HiveStream::new();
    let handle = slot.evaluate(options).unwrap();
    let managed = handle.as_managed().expect("managed handle");

    let run = managed
        .submit(Some(json!({ "messages": ["hi"] })), SubmitOptions::new())
        .await
        .unwrap();
    assert_eq!(run.thread_id, "t-new");
    managed.wait().await;

    assert_eq!(managed.raw_values(), json!({ "count": 1 }));
    assert_eq!(events.take(), vec![json!({ "progress": 50 })]);
    assert!(managed.error().is_none());

    let runs = server.runs.lock().unwrap().clone();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["assistant_id"], json!("agent"));
    assert_eq!(runs[0]["input"], json!({ "messages": ["hi"] }));
}

#[tokio::test]
async fn test_join_stream_rejoins_run() {
    let (addr, _) = serve().await;
    let mut options: ManagedOptions = ManagedOptions::new("agent");
    options.client = ClientConfig::new(format!("http://{addr}"));
    let session = ManagedSession::attach(options).unwrap();
    let stream = session.stream();

    let err = stream.join_stream("r1").await.err();
    assert!(matches!(err, Some(StreamError::NoThread)));

    assert_eq!(assert_ok!(stream.connect().await), "t-new");
    assert_ok!(stream.join_stream("r1").await);
    stream.wait().await;
    assert_eq!(stream.raw_values(), json!({ "count": 1 }));
    assert_eq!(stream.history().len(), 4);
}

#[tokio::test]
async fn test_existing_thread_loads_state() {
    let (addr, _) = serve().await;
    let options = StreamOptions::new()
        .assistant_id("agent")
        .client(ClientConfig::new(format!("http://{addr}")))
        .thread_id("t1");
    let mut slot: HiveStream = HiveStream::new();
    let handle = slot.evaluate(options).unwrap();

    assert_eq!(assert_ok!(handle.connect().await), "t1");
    assert_eq!(handle.raw_values(), json!({ "count": 10 }));
}
