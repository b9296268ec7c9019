use std::io::{self, Stderr};
use anyhow::Result;
use crossterm::{
    cursor,
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEvent, KeyEventKind, MouseEvent},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::stream::StreamEvent;
use crate::upload::{UploadError, UploadReceipt};

pub type Tui = Terminal<CrosstermBackend<Stderr>>;

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Resize(u16, u16),
    Tick,
    Stream(StreamEvent),
    Upload(Result<UploadReceipt, UploadError>),
    Health(Result<(), String>),
}

/// Single queue the UI loop drains: terminal input, animation ticks, and
/// results from background network tasks.
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<AppEvent>,
    tx: mpsc::UnboundedSender<AppEvent>,
    stream_tx: mpsc::UnboundedSender<StreamEvent>,
}

impl EventHandler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        // Terminal input
        let tx_events = tx.clone();
        tokio::spawn(async move {
            let mut reader = event::EventStream::new();
            while let Some(evt) = reader.next().await {
                let Ok(evt) = evt else { continue };
                let app_event = match evt {
                    // Only handle key press events, not release
                    Event::Key(key) if key.kind == KeyEventKind::Press => Some(AppEvent::Key(key)),
                    Event::Mouse(mouse) => Some(AppEvent::Mouse(mouse)),
                    Event::Resize(w, h) => Some(AppEvent::Resize(w, h)),
                    _ => None,
                };

                if let Some(event) = app_event {
                    if tx_events.send(event).is_err() {
                        break;
                    }
                }
            }
        });

        // Typing indicator animation (300ms)
        let tx_tick = tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(300));
            loop {
                interval.tick().await;
                if tx_tick.send(AppEvent::Tick).is_err() {
                    break;
                }
            }
        });

        // Stream readers get their own sender; forward in arrival order
        let (stream_tx, mut stream_rx) = mpsc::unbounded_channel();
        let tx_stream = tx.clone();
        tokio::spawn(async move {
            while let Some(event) = stream_rx.recv().await {
                if tx_stream.send(AppEvent::Stream(event)).is_err() {
                    break;
                }
            }
        });

        Self { rx, tx, stream_tx }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<AppEvent> {
        self.tx.clone()
    }

    pub fn stream_sender(&self) -> mpsc::UnboundedSender<StreamEvent> {
        self.stream_tx.clone()
    }

    pub async fn next(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }
}

/// Take over stderr: raw mode, alternate screen, mouse capture for wheel
/// scrolling. A panic anywhere afterwards hands the terminal back first.
pub fn init() -> Result<Tui> {
    restore_on_panic();

    enable_raw_mode()?;
    let mut stderr = io::stderr();
    if let Err(e) = execute!(stderr, EnterAlternateScreen, EnableMouseCapture) {
        let _ = disable_raw_mode();
        return Err(e.into());
    }

    Ok(Terminal::new(CrosstermBackend::new(stderr))?)
}

/// Undo `init`. Raw mode is always left, even if the screen reset fails.
pub fn restore() -> Result<()> {
    let screen = execute!(
        io::stderr(),
        DisableMouseCapture,
        LeaveAlternateScreen,
        cursor::Show
    );
    disable_raw_mode()?;
    Ok(screen?)
}

fn restore_on_panic() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if let Err(e) = restore() {
            eprintln!("failed to restore terminal: {e:#}");
        }
        previous(info);
    }));
}
