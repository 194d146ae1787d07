//! NeoBoy headless runner
//!
//! Runs a core without a window, driving the frame pacer with synthetic display refreshes,
//! and optionally captures the last frame and the audio stream.
//!
//! # Usage
//!
//! ```bash
//! neoboy-headless --core gb --module gb_core.wasm --rom game.gb --frames 600
//! neoboy-headless --core gba --module gba_core.wasm --rom game.gba --display-hz 144 \
//!     --screenshot last.png --wav out.wav
//! neoboy-headless --core gbc --module gbc_core.wasm --rom game.gbc --save
//! ```

mod capture;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;

use neoboy_core::{BridgeConfig, BridgeEngine, CoreKind, FileSaveStore, Session};

use crate::capture::{PngCapture, WavCapture};

#[derive(Parser, Debug)]
#[command(name = "neoboy-headless")]
#[command(author, version, about = "Run a NeoBoy core headless")]
struct Args {
    /// Core variant: gb, gbc or gba
    #[arg(long)]
    core: CoreKind,

    /// Core module (.wasm or .wat)
    #[arg(long, value_name = "FILE")]
    module: PathBuf,

    /// ROM image to load
    #[arg(long, value_name = "FILE")]
    rom: Option<PathBuf>,

    /// Number of logical frames to run
    #[arg(long, default_value = "600")]
    frames: u64,

    /// Simulated display refresh rate in Hz
    #[arg(long, default_value = "60")]
    display_hz: f64,

    /// Write the last frame to this PNG file
    #[arg(long, value_name = "FILE")]
    screenshot: Option<PathBuf>,

    /// Capture audio to this WAV file
    #[arg(long, value_name = "FILE")]
    wav: Option<PathBuf>,

    /// Save the core's state to the save directory when done
    #[arg(long)]
    save: bool,

    /// Restore the core's state from the save directory before running
    #[arg(long)]
    load: bool,

    /// Configuration file (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

type HeadlessSession = Session<WavCapture, PngCapture>;

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if args.display_hz.is_nan() || args.display_hz <= 0.0 {
        bail!("--display-hz must be positive");
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .context("failed to start the async runtime")?;
    runtime.block_on(run(args))
}

async fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => BridgeConfig::default(),
    };

    let module = tokio::fs::read(&args.module)
        .await
        .with_context(|| format!("failed to read core module {}", args.module.display()))?;
    let engine = BridgeEngine::new(&config)?;
    let handle = engine
        .load(&module, args.core)
        .with_context(|| format!("failed to instantiate {}", args.module.display()))?;

    let missing = handle.exports().missing();
    if !missing.is_empty() {
        info!(?missing, "core omits optional exports");
    }

    let mut session: HeadlessSession = Session::new(&config, PngCapture::default());
    session.select_core(handle)?;
    if args.wav.is_some() {
        session.enable_audio(|rate| Ok(WavCapture::new(rate)));
    }

    if let Some(rom) = &args.rom {
        if !session.load_rom_file(rom).await? {
            bail!("core rejected ROM {}", rom.display());
        }
    }

    let mut store = save_store(&config, args.save || args.load)?;
    if args.load {
        if let Some(store) = &store {
            session.load_from(store).await?;
        }
    }

    session.set_rate_observer(|rate: u32| info!(rate, "logical frames per second"));
    run_frames(&mut session, args.frames, args.display_hz)?;

    if args.save {
        if let Some(store) = store.as_mut() {
            if session.save_to(store).await? {
                info!(dir = %store.dir().display(), "state saved");
            }
        }
    }

    if let Some(path) = &args.screenshot {
        session.display().write_png(path)?;
        info!(path = %path.display(), "screenshot written");
    }
    if let Some(path) = &args.wav {
        write_audio(&session, path)?;
    }

    session.shutdown();
    Ok(())
}

fn save_store(config: &BridgeConfig, needed: bool) -> Result<Option<FileSaveStore>> {
    if !needed {
        return Ok(None);
    }
    let dir = config
        .storage
        .resolved_save_dir()
        .context("no save directory configured and no platform data directory available")?;
    Ok(Some(FileSaveStore::new(dir)))
}

/// Feed refreshes at `display_hz` until `frames` logical frames have run.
fn run_frames(session: &mut HeadlessSession, frames: u64, display_hz: f64) -> Result<()> {
    let refresh_ms = 1000.0 / display_hz;
    let mut t_ms = 0.0;
    let mut stepped = 0;
    let mut refreshes = 0u64;

    session.start()?;
    while stepped < frames {
        if let Some(output) = session.audio_mut().output_mut() {
            output.set_time(t_ms / 1000.0);
        }
        if session.on_repaint(t_ms)?.ticked() {
            stepped += 1;
        }
        refreshes += 1;
        t_ms = refreshes as f64 * refresh_ms;
    }
    session.stop();

    info!(
        frames = stepped,
        refreshes,
        presented = session.display().presented(),
        simulated_ms = t_ms,
        "run finished"
    );
    Ok(())
}

fn write_audio(session: &HeadlessSession, path: &Path) -> Result<()> {
    let Some(output) = session.audio().output() else {
        bail!("audio capture was not initialised");
    };
    output.write_wav(path)?;
    info!(path = %path.display(), samples = output.samples().len(), "audio written");
    Ok(())
}
