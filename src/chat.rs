//! Chat session: transcript plus the visible session state, driven by user
//! actions (send, upload, clear) and by events from the stream controller.

use std::path::Path;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, trace, warn};

use crate::stream::{ChatBackend, StreamController, StreamEvent, StreamEventKind, StreamPayload};
use crate::transcript::{ChatMessage, Transcript};
use crate::upload::{PdfFile, UploadError, UploadReceipt};

/// Shown in place of the answer when the stream breaks
pub const STREAM_ERROR_MARKER: &str = "[❌ Error receiving response]";

pub struct Chat {
    pub input: String,
    transcript: Transcript,
    pdf_name: Option<String>,
    loading: bool,
    error_text: Option<String>,
    stream: StreamController,
}

impl Chat {
    pub fn new(stream_events: UnboundedSender<StreamEvent>) -> Self {
        Self {
            input: String::new(),
            transcript: Transcript::new(),
            pdf_name: None,
            loading: false,
            error_text: None,
            stream: StreamController::new(stream_events),
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn pdf_name(&self) -> Option<&str> {
        self.pdf_name.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error_text(&self) -> Option<&str> {
        self.error_text.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.error_text = None;
    }

    /// Send the current input. Returns false (and does nothing) if the input
    /// is blank.
    pub fn send<B: ChatBackend + ?Sized>(&mut self, backend: &B) -> bool {
        if self.input.trim().is_empty() {
            return false;
        }

        self.error_text = None;
        let message = std::mem::take(&mut self.input);
        self.transcript.push(ChatMessage::user(message.clone()));
        self.loading = true;

        let session = self.stream.open(backend, &message);
        self.transcript.push(ChatMessage::assistant(""));

        info!(session, chars = message.chars().count(), "message sent");
        true
    }

    /// Apply one event from the stream reader. Returns true if anything
    /// visible changed.
    pub fn handle_stream_event(&mut self, event: StreamEvent) -> bool {
        if !self.stream.is_current(event.session) {
            trace!(session = event.session, "dropping event from closed stream");
            return false;
        }

        match event.kind {
            StreamEventKind::Data(data) => self.apply_payload(&data),
            StreamEventKind::Failed(reason) => {
                warn!(%reason, "error receiving response");
                self.fail_stream();
                true
            }
            StreamEventKind::Ended => {
                warn!("stream ended before done");
                self.fail_stream();
                true
            }
        }
    }

    fn apply_payload(&mut self, data: &str) -> bool {
        match serde_json::from_str::<StreamPayload>(data) {
            Ok(StreamPayload::Content { content }) => {
                let answer = self.stream.append(&content).to_string();
                self.transcript.replace_last(ChatMessage::assistant(answer));
                true
            }
            Ok(StreamPayload::Done) => {
                self.stream.close();
                self.loading = false;
                debug!("response complete");
                true
            }
            Ok(StreamPayload::Error { message }) => {
                warn!(%message, "backend reported stream error");
                self.fail_stream();
                true
            }
            Ok(StreamPayload::Other) => {
                debug!(data, "ignoring unknown payload type");
                false
            }
            Err(e) => {
                warn!("JSON parse error: {e}, data: {data}");
                false
            }
        }
    }

    fn fail_stream(&mut self) {
        self.transcript.replace_last(ChatMessage::assistant(STREAM_ERROR_MARKER));
        self.stream.close();
        self.loading = false;
    }

    /// Validate a picked file. On success the file is ready to hand to the
    /// backend; on failure the banner shows why and nothing is sent.
    pub fn begin_upload(&mut self, path: &Path) -> Option<PdfFile> {
        match PdfFile::open(path) {
            Ok(file) => {
                self.error_text = None;
                self.pdf_name = Some(file.name.clone());
                Some(file)
            }
            Err(e) => {
                warn!(path = %path.display(), "{e}");
                self.error_text = Some(e.to_string());
                None
            }
        }
    }

    pub fn finish_upload(&mut self, result: Result<UploadReceipt, UploadError>) {
        match result {
            Ok(receipt) => {
                // The placeholder being streamed into is about to disappear
                if self.stream.close() {
                    self.loading = false;
                }
                self.transcript.reset_to(ChatMessage::system(receipt.summary()));
            }
            Err(e) => {
                warn!("{e}");
                self.error_text = Some(e.to_string());
            }
        }
    }

    pub fn clear(&mut self) {
        self.stream.close();
        self.transcript.clear();
        self.input.clear();
        self.pdf_name = None;
        self.error_text = None;
        self.loading = false;
    }
}
