//! # Ciallo
//!
//! Headless demo of the floating-text field.
//!
//! Usage: `ciallo [config.toml] [seconds] [out.png]`
//!
//! Runs a stage for the given number of seconds, presses the pointer at a
//! random point every 250ms, logs the score and frame counts, and writes the
//! last frame to `out.png` when given.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use ciallo_engine::{Frame, Stage, StageConfig, StageEvent};
use ciallo_kernel::{DrawSurface, FrameBlob, RasterSurface};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default run time in seconds.
const DEFAULT_SECONDS: u64 = 5;

/// Time between simulated pointer presses.
const CLICK_INTERVAL: Duration = Duration::from_millis(250);

/// Longest sleep between pumps.
const MAX_SLEEP: Duration = Duration::from_millis(5);

/// Main entry point.
fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("ciallo=info".parse()?))
        .init();

    info!("Ciallo starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => StageConfig::load_from(path),
        None => StageConfig::default(),
    };
    let seconds = match args.next() {
        Some(s) => s.parse().with_context(|| format!("invalid duration: {s}"))?,
        None => DEFAULT_SECONDS,
    };
    let output = args.next().map(PathBuf::from);

    let last = run(config, Duration::from_secs(seconds))?;

    if let Some(path) = output {
        match last {
            Some(blob) => {
                std::fs::write(&path, &blob.png).with_context(|| format!("writing {}", path.display()))?;
                info!("Wrote last frame to {}", path.display());
            },
            None => warn!("No frame rendered, nothing written"),
        }
    }

    info!("Ciallo shutdown complete");
    Ok(())
}

/// Runs the stage and returns the last frame as PNG.
fn run(config: StageConfig, duration: Duration) -> Result<Option<FrameBlob>> {
    let width = config.surface_width;
    let height = config.surface_height;
    let mut rng = fastrand::Rng::new();
    let mut stage = Stage::new(config);
    info!(offloaded = stage.is_offloaded(), "Stage running for {duration:?}");

    // Draws layout frames the way a display context would
    let mut display: Option<RasterSurface> = None;
    let mut last = None;
    let mut hits = 0u64;

    let start = Instant::now();
    let mut next_click = start + CLICK_INTERVAL;
    loop {
        let now = Instant::now();
        if now >= start + duration {
            break;
        }
        if now >= next_click {
            let (x, y) = (rng.f32() * width as f32, rng.f32() * height as f32);
            stage.pointer_down(x, y, now);
            next_click += CLICK_INTERVAL;
        }
        stage.pump(now);

        for event in stage.drain_events() {
            match event {
                StageEvent::FrameRendered(Frame::Encoded(blob)) => last = Some(blob),
                StageEvent::FrameRendered(Frame::Layout(views)) => {
                    if display.is_none() {
                        display = Some(RasterSurface::new(width, height)?);
                    }
                    if let Some(surface) = display.as_mut() {
                        surface.clear();
                        for view in &views {
                            surface.fill_text(&view.content, &view.font, view.size, &view.color, view.x, view.y);
                        }
                        last = Some(surface.encode_frame()?);
                    }
                },
                StageEvent::Hit { id, .. } => {
                    hits += 1;
                    debug!("Hit {id}");
                },
                StageEvent::Click(_) => {},
                StageEvent::BackendFallback { reason } => warn!("Stage fell back to local rendering: {reason}"),
            }
        }

        let wake = stage.next_due().unwrap_or(now + MAX_SLEEP).min(next_click);
        let sleep = wake.saturating_duration_since(Instant::now()).min(MAX_SLEEP);
        thread::sleep(sleep);
    }

    info!(
        score = stage.score(),
        hits,
        frames = stage.frames_rendered(),
        offloaded = stage.is_offloaded(),
        "Run finished"
    );
    Ok(last)
}
