use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::chat::Chat;
use crate::client::BackendClient;
use crate::stream::StreamEvent;
use crate::tui::AppEvent;
use crate::upload::{UploadError, UploadReceipt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Typing a chat message
    Message,
    /// Typing the path of a PDF to upload
    FilePath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendStatus {
    Checking,
    Online,
    Offline(String),
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    pub chat: Chat,
    pub cursor: usize, // cursor position in chat.input, in chars

    pub path_input: String,
    pub path_cursor: usize,
    pub uploading: bool,

    // Transcript view
    pub scroll: u16,
    pub follow: bool, // stick to the bottom as messages arrive
    pub chat_height: u16,
    pub content_lines: u16, // wrapped height of the last rendered transcript

    pub animation_frame: u8, // 0-2 for ellipsis animation
    pub backend_status: BackendStatus,

    pub backend: BackendClient,
    events: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(
        backend: BackendClient,
        events: UnboundedSender<AppEvent>,
        stream_events: UnboundedSender<StreamEvent>,
    ) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Message,

            chat: Chat::new(stream_events),
            cursor: 0,

            path_input: String::new(),
            path_cursor: 0,
            uploading: false,

            scroll: 0,
            follow: true,
            chat_height: 0,
            content_lines: 0,

            animation_frame: 0,
            backend_status: BackendStatus::Checking,

            backend,
            events,
        }
    }

    pub fn check_health(&self) {
        let backend = self.backend.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = backend.health().await.map_err(|e| format!("{e:#}"));
            let _ = events.send(AppEvent::Health(result));
        });
    }

    pub fn set_health(&mut self, result: Result<(), String>) {
        self.backend_status = match result {
            Ok(()) => {
                info!(url = self.backend.base_url(), "backend online");
                BackendStatus::Online
            }
            Err(reason) => {
                warn!(url = self.backend.base_url(), %reason, "backend unreachable");
                BackendStatus::Offline(reason)
            }
        };
    }

    pub fn send_message(&mut self) {
        // Mirrors a disabled Send button while an answer is streaming
        if self.chat.is_loading() {
            return;
        }
        if self.chat.send(&self.backend) {
            self.cursor = 0;
            self.follow = true;
        }
    }

    /// Validate the typed path and upload it in the background.
    pub fn start_upload(&mut self) {
        let path = PathBuf::from(self.path_input.trim());
        self.input_mode = InputMode::Message;
        self.path_input.clear();
        self.path_cursor = 0;

        let Some(file) = self.chat.begin_upload(&path) else {
            return;
        };

        self.uploading = true;
        let backend = self.backend.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = backend.upload_pdf(&file).await;
            let _ = events.send(AppEvent::Upload(result));
        });
    }

    pub fn on_stream_event(&mut self, event: StreamEvent) {
        if self.chat.handle_stream_event(event) {
            self.follow = true;
        }
    }

    pub fn on_upload_finished(&mut self, result: Result<UploadReceipt, UploadError>) {
        self.uploading = false;
        let succeeded = result.is_ok();
        self.chat.finish_upload(result);
        if succeeded {
            self.scroll = 0;
            self.follow = true;
        }
    }

    pub fn clear(&mut self) {
        self.chat.clear();
        self.cursor = 0;
        self.scroll = 0;
        self.follow = true;
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.chat.is_loading() || self.uploading {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    fn max_scroll(&self) -> u16 {
        self.content_lines.saturating_sub(self.visible_height())
    }

    fn visible_height(&self) -> u16 {
        if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        }
    }

    /// Called by the renderer once the transcript has been measured
    pub fn scroll_to_bottom(&mut self) {
        self.scroll = self.max_scroll();
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.follow = false;
        self.scroll = self.scroll.min(self.max_scroll()).saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max = self.max_scroll();
        self.scroll = (self.scroll + lines).min(max);
        if self.scroll == max {
            self.follow = true;
        }
    }

    pub fn page(&self) -> u16 {
        (self.visible_height() / 2).max(1)
    }
}
