use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

mod app;
mod chat;
mod client;
mod config;
mod handler;
mod logging;
mod sse;
mod stream;
#[cfg(test)]
mod test_support;
mod transcript;
mod tui;
mod ui;
mod upload;

use app::App;
use chat::{Chat, STREAM_ERROR_MARKER};
use client::BackendClient;
use config::Config;
use logging::LogTarget;
use tui::{EventHandler, Tui};
use upload::PdfFile;

#[derive(Parser)]
#[command(name = "pdfchat", version)]
#[command(about = "Chat with a PDF through a streaming AI backend")]
struct Cli {
    /// Backend base URL (overrides the config file)
    #[arg(short, long, global = true)]
    backend: Option<String>,

    /// Verbosity level (use -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Runs the interactive chat when omitted
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a PDF and print how much text the backend extracted
    Upload {
        file: PathBuf,
    },
    /// Ask one question and stream the answer to stdout
    Ask {
        question: String,
        /// Upload this PDF first
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Check that the backend is reachable
    Health,
    /// Save the backend URL to the config file
    SetBackend {
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let target = if cli.command.is_none() { LogTarget::File } else { LogTarget::Stderr };
    logging::init(cli.verbose, target)?;

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("{e:#}; using defaults");
        Config::new()
    });
    let backend_url = cli.backend.as_deref().unwrap_or_else(|| config.backend_url());
    let backend = BackendClient::new(backend_url);

    match cli.command {
        None => run_tui(backend).await,
        Some(Commands::Upload { file }) => upload(&backend, &file).await,
        Some(Commands::Ask { question, file }) => ask(&backend, question, file.as_deref()).await,
        Some(Commands::Health) => health(&backend).await,
        Some(Commands::SetBackend { url }) => {
            let path = Config::save_backend_url(&url)?;
            println!("Backend set to {} ({})", url, path.display());
            Ok(())
        }
    }
}

async fn run_tui(backend: BackendClient) -> Result<()> {
    let mut terminal = tui::init()?;

    let mut events = EventHandler::new();
    let mut app = App::new(backend, events.sender(), events.stream_sender());
    app.check_health();
    tracing::info!(url = app.backend.base_url(), "chat started");

    let result = event_loop(&mut terminal, &mut app, &mut events).await;

    // Closes any open stream before the terminal goes back
    drop(app);
    tui::restore()?;
    result
}

async fn event_loop(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event)?,
            None => break,
        }
    }
    Ok(())
}

async fn upload(backend: &BackendClient, path: &Path) -> Result<()> {
    let file = PdfFile::open(path)?;
    let receipt = backend.upload_pdf(&file).await?;
    println!("{}", receipt.summary());
    Ok(())
}

async fn ask(backend: &BackendClient, question: String, file: Option<&Path>) -> Result<()> {
    if let Some(path) = file {
        upload(backend, path).await?;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut chat = Chat::new(tx);
    chat.input = question;
    if !chat.send(backend) {
        bail!("Question is empty");
    }

    let mut stdout = std::io::stdout();
    let mut printed = 0;
    while chat.is_loading() {
        let Some(event) = rx.recv().await else { break };
        if !chat.handle_stream_event(event) {
            continue;
        }

        let answer = chat.transcript().last().map(|m| m.content.as_str()).unwrap_or_default();
        if !chat.is_loading() && answer == STREAM_ERROR_MARKER {
            writeln!(stdout)?;
            bail!("{STREAM_ERROR_MARKER}");
        }
        if let Some(fresh) = answer.get(printed..) {
            write!(stdout, "{fresh}")?;
            stdout.flush()?;
            printed = answer.len();
        }
    }

    writeln!(stdout)?;
    Ok(())
}

async fn health(backend: &BackendClient) -> Result<()> {
    backend.health().await?;
    println!("Backend at {} is healthy", backend.base_url());
    Ok(())
}
