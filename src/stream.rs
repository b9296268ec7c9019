//! Stream session controller
//!
//! Owns the single live chat stream. Each stream is read by a background task
//! that forwards what it sees to the UI loop as [`StreamEvent`]s tagged with a
//! session id. Closing a stream aborts its reader and retires the id, so
//! anything the stale reader already queued is dropped on arrival.

use anyhow::Result;
use futures_util::stream::{BoxStream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::sse::SseEvent;

pub type SessionId = u64;

/// Anything that can open a chat stream for a message
pub trait ChatBackend {
    fn chat_stream(&self, message: &str) -> BoxStream<'static, Result<SseEvent>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventKind {
    /// Raw `data` of one SSE message
    Data(String),
    /// Connect, status or read failure
    Failed(String),
    /// Server closed the body
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub session: SessionId,
    pub kind: StreamEventKind,
}

/// JSON body of a chat stream message
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamPayload {
    Content {
        content: String,
    },
    Done,
    Error {
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Other,
}

struct ActiveStream {
    session: SessionId,
    reader: JoinHandle<()>,
}

pub struct StreamController {
    events: UnboundedSender<StreamEvent>,
    next_session: SessionId,
    active: Option<ActiveStream>,
    accumulated: String,
}

impl StreamController {
    pub fn new(events: UnboundedSender<StreamEvent>) -> Self {
        Self {
            events,
            next_session: 0,
            active: None,
            accumulated: String::new(),
        }
    }

    /// Close whatever is open, then start streaming the answer to `message`.
    pub fn open<B: ChatBackend + ?Sized>(&mut self, backend: &B, message: &str) -> SessionId {
        self.close();

        self.next_session += 1;
        let session = self.next_session;
        self.accumulated.clear();

        let stream = backend.chat_stream(message);
        let reader = tokio::spawn(read_stream(session, stream, self.events.clone()));
        self.active = Some(ActiveStream { session, reader });

        debug!(session, "stream opened");
        session
    }

    /// Returns true if a stream was open.
    pub fn close(&mut self) -> bool {
        match self.active.take() {
            Some(active) => {
                active.reader.abort();
                debug!(session = active.session, "stream closed");
                true
            }
            None => false,
        }
    }

    pub fn is_current(&self, session: SessionId) -> bool {
        self.active.as_ref().is_some_and(|a| a.session == session)
    }

    /// Add a fragment to the running answer and return the whole answer so far
    pub fn append(&mut self, fragment: &str) -> &str {
        self.accumulated.push_str(fragment);
        &self.accumulated
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        self.close();
    }
}

async fn read_stream(
    session: SessionId,
    mut stream: BoxStream<'static, Result<SseEvent>>,
    events: UnboundedSender<StreamEvent>,
) {
    while let Some(item) = stream.next().await {
        let kind = match item {
            Ok(event) => StreamEventKind::Data(event.data),
            Err(e) => {
                warn!(session, "stream failed: {e:#}");
                let _ = events.send(StreamEvent {
                    session,
                    kind: StreamEventKind::Failed(format!("{e:#}")),
                });
                return;
            }
        };

        if events.send(StreamEvent { session, kind }).is_err() {
            return;
        }
    }

    let _ = events.send(StreamEvent {
        session,
        kind: StreamEventKind::Ended,
    });
}
