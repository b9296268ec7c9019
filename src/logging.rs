use anyhow::{Result, anyhow};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt};

/// Where log lines go. The TUI owns the terminal, so it logs to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    File,
    Stderr,
}

/// Install the global subscriber. `RUST_LOG` wins over `verbose`.
pub fn init(verbose: u8, target: LogTarget) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive(verbose)));

    match target {
        LogTarget::File => {
            let path = log_path()?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(&path)?;

            fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|e| anyhow!("Failed to initialise logging: {e}"))
        }
        LogTarget::Stderr => fmt()
            .without_time()
            .with_env_filter(filter)
            .with_target(verbose != 0)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| anyhow!("Failed to initialise logging: {e}")),
    }
}

fn directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "pdfchat=debug",
        2 => "pdfchat=trace",
        _ => "trace",
    }
}

pub fn log_path() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir()
        .ok_or_else(|| anyhow!("Could not determine data directory"))?;

    Ok(data_dir.join("pdfchat").join("pdfchat.log"))
}
