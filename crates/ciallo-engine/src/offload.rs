//! Render offload worker.
//!
//! The worker thread owns its own [`ParticleField`], [`RenderLoop`] and
//! off-screen [`RasterSurface`]. The display context talks to it only through
//! channels:
//!
//! - inbound [`WorkerCommand`]s (unbounded, order preserving)
//! - outbound frames (bounded; a frame is dropped when the display context
//!   falls behind)
//! - outbound [`WorkerHit`]s (unbounded)
//!
//! No mutable state is shared. The worker sleeps on its command channel until
//! the next cadence is due, so commands are applied between a tick and a
//! frame, never during one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ciallo_common::{OffloadError, ParticleId};
use ciallo_kernel::{ContentSource, HitStrategy, ParticleField, RasterSurface};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::StageConfig;
use crate::render_loop::{Frame, RenderLoop};

/// Frames buffered before the worker starts dropping them.
const FRAME_QUEUE: usize = 4;

/// How long the worker waits for a command while its loop is stopped.
const IDLE_WAIT: Duration = Duration::from_millis(250);

/// Messages from the display context to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkerCommand {
    /// Create the off-screen surface and start rendering
    Init {
        /// Surface width
        width: u32,
        /// Surface height
        height: u32,
    },
    /// Resize the off-screen surface and spawn area
    Resize {
        /// Surface width
        width: u32,
        /// Surface height
        height: u32,
    },
    /// Change capacity and batch size
    UpdateSettings {
        /// Field capacity
        capacity: usize,
        /// Particles per tick
        batch: usize,
    },
    /// Page visibility changed
    VisibilityChange {
        /// New visibility
        visible: bool,
    },
    /// Pointer press to hit-test
    Pointer {
        /// Pointer X
        x: f32,
        /// Pointer Y
        y: f32,
    },
    /// Stop and exit the worker
    Shutdown,
}

/// A particle removed by a forwarded pointer press.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkerHit {
    /// Removed particle
    pub id: ParticleId,
    /// Pointer X
    pub x: f32,
    /// Pointer Y
    pub y: f32,
}

/// Display-side end of the render worker.
pub struct OffloadChannel {
    commands: Sender<WorkerCommand>,
    frames: Receiver<Frame>,
    hits: Receiver<WorkerHit>,
    alive: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl OffloadChannel {
    /// Spawns the worker thread.
    ///
    /// The worker has no surface until it receives [`WorkerCommand::Init`].
    pub fn spawn(config: &StageConfig) -> Result<Self, OffloadError> {
        let (command_tx, command_rx) = unbounded();
        let (frame_tx, frame_rx) = bounded(FRAME_QUEUE);
        let (hit_tx, hit_rx) = unbounded();
        let alive = Arc::new(AtomicBool::new(true));

        let worker = Worker {
            render: configured_loop(config),
            commands: command_rx,
            frames: frame_tx,
            hits: hit_tx,
        };
        let worker_alive = Arc::clone(&alive);
        let thread = thread::Builder::new()
            .name("ciallo-render".into())
            .spawn(move || {
                worker.run();
                worker_alive.store(false, Ordering::Release);
            })
            .map_err(|e| OffloadError::SpawnFailed(e.to_string()))?;

        info!("Render worker spawned");
        Ok(Self {
            commands: command_tx,
            frames: frame_rx,
            hits: hit_rx,
            alive,
            thread: Some(thread),
        })
    }

    /// Sends a command to the worker.
    pub fn send(&self, command: WorkerCommand) -> Result<(), OffloadError> {
        if !self.is_alive() {
            return Err(OffloadError::Disconnected);
        }
        self.commands.send(command).map_err(|_| OffloadError::Disconnected)
    }

    /// Creates the worker's surface.
    pub fn init(&self, width: u32, height: u32) -> Result<(), OffloadError> {
        self.send(WorkerCommand::Init { width, height })
    }

    /// Resizes the worker's surface.
    pub fn resize(&self, width: u32, height: u32) -> Result<(), OffloadError> {
        self.send(WorkerCommand::Resize { width, height })
    }

    /// Updates capacity and batch size.
    pub fn update_settings(&self, capacity: usize, batch: usize) -> Result<(), OffloadError> {
        self.send(WorkerCommand::UpdateSettings { capacity, batch })
    }

    /// Forwards a visibility change.
    pub fn set_visible(&self, visible: bool) -> Result<(), OffloadError> {
        self.send(WorkerCommand::VisibilityChange { visible })
    }

    /// Forwards a pointer press.
    pub fn pointer(&self, x: f32, y: f32) -> Result<(), OffloadError> {
        self.send(WorkerCommand::Pointer { x, y })
    }

    /// Takes every frame received so far.
    ///
    /// Fails once the worker is gone and nothing is left to read.
    pub fn drain_frames(&self) -> Result<Vec<Frame>, OffloadError> {
        drain(&self.frames)
    }

    /// Takes every hit received so far.
    pub fn drain_hits(&self) -> Result<Vec<WorkerHit>, OffloadError> {
        drain(&self.hits)
    }

    /// Returns true while the worker thread is running.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Stops the worker and waits for it to exit. Safe to call twice.
    pub fn shutdown(&mut self) {
        let _ = self.commands.send(WorkerCommand::Shutdown);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("Render worker panicked");
            }
            self.alive.store(false, Ordering::Release);
            info!("Render worker joined");
        }
    }
}

impl Drop for OffloadChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for OffloadChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OffloadChannel")
            .field("alive", &self.is_alive())
            .field("pending_frames", &self.frames.len())
            .field("pending_hits", &self.hits.len())
            .finish_non_exhaustive()
    }
}

fn drain<T>(receiver: &Receiver<T>) -> Result<Vec<T>, OffloadError> {
    let mut items = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(item) => items.push(item),
            Err(TryRecvError::Empty) => return Ok(items),
            Err(TryRecvError::Disconnected) if items.is_empty() => return Err(OffloadError::Disconnected),
            Err(TryRecvError::Disconnected) => return Ok(items),
        }
    }
}

/// Builds a surfaceless render loop from the stage configuration.
pub(crate) fn configured_loop(config: &StageConfig) -> RenderLoop<RasterSurface> {
    let content = config.seed.map_or_else(ContentSource::new, ContentSource::with_seed);
    let field = ParticleField::new(
        config.max_texts,
        config.max_texts_per_draw,
        config.surface_width as f32,
        config.surface_height as f32,
    )
    .with_content_source(content)
    .with_hit_strategy(HitStrategy::Auto {
        threshold: config.index_threshold,
    });
    RenderLoop::new(field, None, config.spawn_interval(), config.frame_interval()).with_frame_mode(config.frame_mode)
}

/// Worker-side state.
struct Worker {
    render: RenderLoop<RasterSurface>,
    commands: Receiver<WorkerCommand>,
    frames: Sender<Frame>,
    hits: Sender<WorkerHit>,
}

impl Worker {
    fn run(mut self) {
        debug!("Render worker running");
        let mut visible = true;

        loop {
            let wait = self
                .render
                .next_due()
                .map_or(IDLE_WAIT, |due| due.saturating_duration_since(Instant::now()));

            match self.commands.recv_timeout(wait) {
                Ok(WorkerCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(command) => {
                    if !self.apply(command, &mut visible) {
                        break;
                    }
                },
                Err(RecvTimeoutError::Timeout) => {},
            }

            if let Some(frame) = self.render.pump(Instant::now()) {
                match self.frames.try_send(frame) {
                    Ok(()) | Err(TrySendError::Full(_)) => {},
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
        }

        self.render.stop();
        debug!(frames = self.render.stats().frames, "Render worker exiting");
    }

    /// Applies one command. Returns false when the display side is gone.
    fn apply(&mut self, command: WorkerCommand, visible: &mut bool) -> bool {
        let now = Instant::now();
        match command {
            WorkerCommand::Init { width, height } => match RasterSurface::new(width, height) {
                Ok(surface) => {
                    self.render.attach_surface(surface);
                    if *visible {
                        self.render.start(now);
                    }
                },
                Err(e) => warn!("Render worker has no surface: {e}"),
            },
            WorkerCommand::Resize { width, height } => {
                if let Err(e) = self.render.resize(width, height) {
                    warn!("Ignoring resize: {e}");
                }
            },
            WorkerCommand::UpdateSettings { capacity, batch } => {
                self.render.reconfigure(capacity, batch);
            },
            WorkerCommand::VisibilityChange { visible: now_visible } => {
                *visible = now_visible;
                self.render.set_visible(now_visible, now);
            },
            WorkerCommand::Pointer { x, y } => {
                if let Some(id) = self.render.hit_test(x, y) {
                    return self.hits.send(WorkerHit { id, x, y }).is_ok();
                }
            },
            WorkerCommand::Shutdown => return false,
        }
        true
    }
}
