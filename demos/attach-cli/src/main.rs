//! Stream one run of a remote agent to the terminal.
//!
//! Run with: cargo run -p attach-cli -- <assistant-id> "<prompt>" [thread-id]
//!
//! The server is taken from `HIVE_API_URL` / `HIVE_API_KEY`. Ctrl-C stops
//! the run.

use anyhow::{Context, bail};
use futures::StreamExt;
use hive_stream_session::{
    ClientConfig, HiveStream, StreamEvent, StreamOptions, SubmitOptions,
};
use serde_json::{Value, json};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(assistant_id) = args.next() else {
        bail!("usage: attach-cli <assistant-id> <prompt> [thread-id]");
    };
    let prompt = args.next().context("missing prompt")?;
    let thread_id = args.next();

    let client = ClientConfig::from_env();
    tracing::info!(api_url = %client.api_url, %assistant_id, "attaching");

    let options: StreamOptions = StreamOptions::new();
    let mut options = options
        .assistant_id(assistant_id)
        .client(client)
        .on_thread_id(|id: &String| tracing::info!(thread_id = %id, "thread ready"))
        .on_custom_event(|event: &Value| println!("custom: {event}"))
        .on_error(|message: &String| tracing::error!("run failed: {message}"));
    if let Some(id) = thread_id {
        options = options.thread_id(id);
    }

    let mut slot: HiveStream = HiveStream::new();
    let handle = slot.evaluate(options)?;

    let input = json!({ "messages": [{ "role": "user", "content": prompt }] });
    let run = handle.submit(Some(input), SubmitOptions::new()).await?;
    tracing::info!(run_id = %run.run_id, thread_id = %run.thread_id, "run started");

    let mut frames = handle.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(frame) = frames.next().await {
            match &frame.event {
                StreamEvent::Values(values) if frame.is_root() => println!("values: {values}"),
                StreamEvent::Updates(update) => println!("update: {update}"),
                StreamEvent::End => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        () = handle.wait() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("stopping run");
            handle.stop().await?;
        }
    }
    printer.abort();

    if let Some(interrupt) = handle.interrupt() {
        println!("interrupted: {}", interrupt.value);
    }
    if let Some(error) = handle.error() {
        bail!(error);
    }
    Ok(())
}
