//! Broadcast + history frame store for late subscribers.

use std::{
    collections::VecDeque,
    sync::{PoisonError, RwLock},
};

use futures::{StreamExt, stream::BoxStream};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::StreamFrame;

/// Default history size limit (16 MiB).
const HISTORY_BYTES: usize = 16 * 1024 * 1024;

/// Live channel capacity; slow subscribers skip ahead past this.
const CHANNEL_CAPACITY: usize = 1024;

struct StoredFrame {
    frame: StreamFrame,
    bytes: usize,
}

#[derive(Default)]
struct History {
    frames: VecDeque<StoredFrame>,
    total_bytes: usize,
}

/// Frame store with broadcast and bounded history.
///
/// A view that subscribes after a run started receives the history first,
/// then live frames.
pub struct FrameStore {
    history: RwLock<History>,
    limit: usize,
    sender: broadcast::Sender<StreamFrame>,
}

impl Default for FrameStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameStore {
    /// Create a store with the default history limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(HISTORY_BYTES)
    }

    /// Create a store whose history keeps at most `limit` approximate bytes.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            history: RwLock::new(History::default()),
            limit,
            sender,
        }
    }

    /// Push a frame to live subscribers and history.
    pub fn push(&self, frame: StreamFrame) {
        let _ = self.sender.send(frame.clone());
        let bytes = frame.approx_bytes();

        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        while history.total_bytes.saturating_add(bytes) > self.limit {
            let Some(front) = history.frames.pop_front() else {
                break;
            };
            history.total_bytes = history.total_bytes.saturating_sub(front.bytes);
        }
        history.frames.push_back(StoredFrame { frame, bytes });
        history.total_bytes = history.total_bytes.saturating_add(bytes);
    }

    /// Drop all history. Live subscribers are unaffected.
    pub fn clear(&self) {
        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        history.frames.clear();
        history.total_bytes = 0;
    }

    /// Receiver for live frames only.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StreamFrame> {
        self.sender.subscribe()
    }

    /// Snapshot of the history.
    #[must_use]
    pub fn history(&self) -> Vec<StreamFrame> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .frames
            .iter()
            .map(|s| s.frame.clone())
            .collect()
    }

    /// Stream that yields history first, then live frames.
    ///
    /// Frames dropped by a lagging subscriber are skipped.
    #[must_use]
    pub fn replay(&self) -> BoxStream<'static, StreamFrame> {
        let rx = self.subscribe();
        let history = self.history();

        let live = BroadcastStream::new(rx).filter_map(|res| async move {
            if let Err(e) = &res {
                tracing::warn!("frame subscriber lagged: {e}");
            }
            res.ok()
        });

        futures::stream::iter(history).chain(live).boxed()
    }
}
