mod deck;
mod player;
mod renderer;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use scrollgate_core::ScrollLockConfig;

use crate::deck::Deck;

/// Play a deck of full-screen sections; a section holds the scroll until
/// everything in it has been revealed.
#[derive(Parser)]
#[command(name = "scrollgate")]
#[command(about = "Terminal player for viewport-driven scroll locks", long_about = None)]
struct Cli {
    /// Deck JSON (`{"sections":[{"id","title","items"}]}`); built-in deck if omitted
    deck: Option<PathBuf>,

    /// Scroll-lock configuration JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write tracing output to this file (filter with RUST_LOG)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

/// Restore terminal state - called on panic
fn restore_terminal() {
    use crossterm::{
        event::DisableMouseCapture,
        execute,
        terminal::{LeaveAlternateScreen, disable_raw_mode},
    };
    let _ = disable_raw_mode();
    let _ = execute!(std::io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
}

fn init_logging(path: &Path) -> Result<()> {
    let log_file = std::fs::File::create(path)
        .with_context(|| format!("creating log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Never log to the terminal the player draws on.
    if let Some(path) = &cli.log_file {
        init_logging(path)?;
    }

    let deck = match &cli.deck {
        Some(path) => {
            let data =
                std::fs::read(path).with_context(|| format!("reading deck {}", path.display()))?;
            Deck::from_json(&data).with_context(|| format!("loading deck {}", path.display()))?
        }
        None => Deck::builtin(),
    };

    let config = match &cli.config {
        Some(path) => {
            let data = std::fs::read(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            ScrollLockConfig::from_json(&data)
                .with_context(|| format!("loading config {}", path.display()))?
        }
        None => ScrollLockConfig::default(),
    };

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        restore_terminal();
        original_hook(panic_info);
    }));

    renderer::run(&deck, config)
}
