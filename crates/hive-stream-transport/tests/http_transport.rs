//! HTTP transport against an in-process agent server.

use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::sse::{Event, Sse},
    routing::{get, post},
};
use futures::{Stream, StreamExt};
use hive_stream_core::{
    ClientConfig, Command, RunTicket, StreamEvent, StreamTransport, SubmitRequest, TransportError,
};
use hive_stream_transport::HttpTransport;
use serde_json::{Value, json};

#[derive(Clone, Default)]
struct Recorded {
    bodies: Arc<Mutex<Vec<Value>>>,
    api_keys: Arc<Mutex<Vec<String>>>,
    cancelled: Arc<Mutex<Vec<String>>>,
}

async fn create_thread() -> Json<Value> {
    Json(json!({ "thread_id": "t-new" }))
}

async fn thread_state(Path(thread_id): Path<String>) -> Result<Json<Value>, StatusCode> {
    if thread_id != "t1" {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(json!({
        "values": { "messages": ["hello"] },
        "tasks": [{ "id": "x", "interrupts": [{ "value": "approve?", "id": "i1" }] }]
    })))
}

async fn create_run(
    State(recorded): State<Recorded>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    if thread_id == "broken" {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        recorded.api_keys.lock().unwrap().push(key.to_string());
    }
    recorded.bodies.lock().unwrap().push(body);
    Ok(Json(json!({ "run_id": "r1", "thread_id": thread_id, "status": "pending" })))
}

async fn stream_run(
    Path((_thread_id, run_id)): Path<(String, String)>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = vec![
        Event::default()
            .event("metadata")
            .data(json!({ "run_id": run_id }).to_string()),
        Event::default()
            .event("values")
            .data(json!({ "count": 1 }).to_string()),
        Event::default()
            .event("custom|child:1")
            .data(json!({ "progress": 50 }).to_string()),
        Event::default().event("end").data("null"),
    ];
    Sse::new(futures::stream::iter(events.into_iter().map(Ok)))
}

async fn cancel_run(
    State(recorded): State<Recorded>,
    Path((_thread_id, run_id)): Path<(String, String)>,
) -> StatusCode {
    recorded.cancelled.lock().unwrap().push(run_id);
    StatusCode::NO_CONTENT
}

async fn serve() -> (SocketAddr, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/threads", post(create_thread))
        .route("/threads/{thread_id}/state", get(thread_state))
        .route("/threads/{thread_id}/runs", post(create_run))
        .route("/threads/{thread_id}/runs/{run_id}/stream", get(stream_run))
        .route("/threads/{thread_id}/runs/{run_id}/cancel", post(cancel_run))
        .with_state(recorded.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, recorded)
}

fn transport(addr: SocketAddr) -> HttpTransport {
    let config = ClientConfig::new(format!("http://{addr}")).with_api_key("secret");
    HttpTransport::new(config, "agent").unwrap()
}

#[tokio::test]
async fn test_connect_creates_thread() {
    let (addr, _) = serve().await;
    let snapshot = transport(addr).connect(None).await.unwrap();
    assert_eq!(snapshot.thread_id, "t-new");
    assert!(snapshot.interrupts.is_empty());
}

#[tokio::test]
async fn test_connect_loads_existing_thread() {
    let (addr, _) = serve().await;
    let snapshot = transport(addr).connect(Some("t1")).await.unwrap();
    assert_eq!(snapshot.thread_id, "t1");
    assert_eq!(snapshot.values, json!({ "messages": ["hello"] }));
    assert_eq!(
        snapshot.interrupts,
        vec![json!({ "value": "approve?", "id": "i1" })]
    );
}

#[tokio::test]
async fn test_connect_unknown_thread() {
    let (addr, _) = serve().await;
    let err = transport(addr).connect(Some("nope")).await.unwrap_err();
    assert_eq!(err, TransportError::NoThread("nope".into()));
}

#[tokio::test]
async fn test_submit_sends_run_body() {
    let (addr, recorded) = serve().await;
    let mut request = SubmitRequest::new("t1");
    request.command = Some(Command::resume(true));

    let ticket = transport(addr).submit(request).await.unwrap();
    assert_eq!(
        ticket,
        RunTicket {
            run_id: "r1".into(),
            thread_id: "t1".into(),
        }
    );

    let bodies = recorded.bodies.lock().unwrap().clone();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["assistant_id"], "agent");
    assert_eq!(bodies[0]["command"], json!({ "resume": true }));
    assert_eq!(
        bodies[0]["stream_mode"],
        json!(["values", "updates", "custom"])
    );
    assert_eq!(recorded.api_keys.lock().unwrap().as_slice(), ["secret"]);
}

#[tokio::test]
async fn test_submit_maps_server_error() {
    let (addr, _) = serve().await;
    let err = transport(addr)
        .submit(SubmitRequest::new("broken"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Http { status: 500, .. }));
}

#[tokio::test]
async fn test_stream_decodes_frames() {
    let (addr, _) = serve().await;
    let ticket = RunTicket {
        run_id: "r9".into(),
        thread_id: "t1".into(),
    };

    let frames: Vec<_> = transport(addr)
        .stream(&ticket)
        .await
        .unwrap()
        .map(Result::unwrap)
        .collect()
        .await;

    assert_eq!(frames.len(), 4);
    assert!(matches!(frames[0].event, StreamEvent::Metadata(ref m) if m.run_id == "r9"));
    assert_eq!(frames[1].event, StreamEvent::Values(json!({ "count": 1 })));
    assert_eq!(frames[2].namespace, vec!["child:1"]);
    assert_eq!(frames[3].event, StreamEvent::End);
}

#[tokio::test]
async fn test_stream_is_restartable() {
    let (addr, _) = serve().await;
    let transport = transport(addr);
    let ticket = RunTicket {
        run_id: "r1".into(),
        thread_id: "t1".into(),
    };

    for _ in 0..2 {
        let count = transport.stream(&ticket).await.unwrap().count().await;
        assert_eq!(count, 4);
    }
}

#[tokio::test]
async fn test_cancel_hits_endpoint() {
    let (addr, recorded) = serve().await;
    let ticket = RunTicket {
        run_id: "r1".into(),
        thread_id: "t1".into(),
    };
    transport(addr).cancel(&ticket).await.unwrap();
    assert_eq!(recorded.cancelled.lock().unwrap().as_slice(), ["r1"]);
}
