//! The render loop.
//!
//! A [`RenderLoop`] exclusively owns one [`ParticleField`] and one drawing
//! surface, and drives the field with two independent cadences:
//! - the spawn cadence runs `tick` (every `spawn_interval`)
//! - the frame cadence draws a snapshot, then runs `advance`
//!
//! Both run from [`RenderLoop::pump`] on the owner's thread, so a tick and a
//! frame never interleave.
//!
//! Without a surface the loop stays idle: `start` does nothing and no error
//! escapes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ciallo_common::{ParticleId, SurfaceError};
use ciallo_kernel::{DrawSurface, FrameBlob, ParticleField, ParticleView};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::config::FrameMode;
use crate::timing::Cadence;

/// One frame leaving the render loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    /// Fully drawn frame.
    Encoded(FrameBlob),
    /// Particle layout for the display context to draw.
    Layout(Vec<ParticleView>),
}

/// Counters kept by a render loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopStats {
    /// Frames drawn
    pub frames: u64,
    /// Spawn ticks run
    pub ticks: u64,
    /// Particles spawned
    pub spawned: u64,
    /// Frames that failed to encode
    pub encode_failures: u64,
}

/// Shared liveness flag of a render loop.
///
/// Clearing it stops the loop at its next pump, from any thread.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    alive: Arc<AtomicBool>,
}

impl LoopHandle {
    /// Returns true while the loop is running.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Asks the loop to stop.
    pub fn cancel(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

/// Drives a particle field on a drawing surface.
pub struct RenderLoop<S> {
    field: ParticleField,
    surface: Option<S>,
    spawn: Cadence,
    frame: Cadence,
    mode: FrameMode,
    alive: Arc<AtomicBool>,
    stats: LoopStats,
}

impl<S: DrawSurface> RenderLoop<S> {
    /// Creates a stopped loop.
    #[must_use]
    pub fn new(field: ParticleField, surface: Option<S>, spawn_interval: Duration, frame_interval: Duration) -> Self {
        Self {
            field,
            surface,
            spawn: Cadence::new(spawn_interval),
            frame: Cadence::new(frame_interval),
            mode: FrameMode::Encoded,
            alive: Arc::new(AtomicBool::new(false)),
            stats: LoopStats::default(),
        }
    }

    /// Sets the frame payload.
    #[must_use]
    pub fn with_frame_mode(mut self, mode: FrameMode) -> Self {
        self.mode = mode;
        self
    }

    /// Starts both cadences.
    ///
    /// The first frame is drawn on the next pump, the first spawn tick one
    /// interval later. Starting a running loop does nothing. Returns whether
    /// the loop is running afterwards.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.surface.is_none() {
            debug!("No drawing surface, render loop stays idle");
            return false;
        }
        if self.is_running() {
            return true;
        }
        self.spawn.arm(now);
        self.frame.arm_immediate(now);
        self.alive.store(true, Ordering::Release);
        info!(live = self.field.len(), "Render loop started");
        true
    }

    /// Cancels both cadences. Safe when already stopped.
    pub fn stop(&mut self) {
        let was_running = self.alive.swap(false, Ordering::AcqRel);
        self.spawn.cancel();
        self.frame.cancel();
        if was_running {
            info!(frames = self.stats.frames, ticks = self.stats.ticks, "Render loop stopped");
        }
    }

    /// Returns true while the cadences are armed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Handle on the liveness flag.
    #[must_use]
    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            alive: Arc::clone(&self.alive),
        }
    }

    /// Visibility change: hidden stops the loop, visible starts it.
    pub fn set_visible(&mut self, visible: bool, now: Instant) {
        debug!(visible, "Visibility changed");
        if visible {
            self.start(now);
        } else {
            self.stop();
        }
    }

    /// Updates capacity and batch size in place.
    ///
    /// Returns `false` if a value was rejected; the last valid value is kept.
    pub fn reconfigure(&mut self, capacity: usize, spawn_batch_size: usize) -> bool {
        self.field.configure(capacity, spawn_batch_size)
    }

    /// Installs a drawing surface, replacing the current one.
    pub fn attach_surface(&mut self, surface: S) {
        self.field.resize(surface.width() as f32, surface.height() as f32);
        self.surface = Some(surface);
    }

    /// Resizes the surface and the field's spawn area.
    ///
    /// Without a surface only the field is updated.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        if let Some(surface) = &mut self.surface {
            surface.resize(width, height)?;
        }
        self.field.resize(width as f32, height as f32);
        Ok(())
    }

    /// Runs whatever is due at `now`.
    ///
    /// Returns the frame drawn by this call, if any.
    pub fn pump(&mut self, now: Instant) -> Option<Frame> {
        if !self.is_running() {
            if self.spawn.is_armed() || self.frame.is_armed() {
                // Cancelled through a handle
                self.stop();
            }
            return None;
        }
        let surface = self.surface.as_mut()?;

        if self.spawn.poll(now) {
            let spawned = self.field.tick(&*surface);
            self.stats.ticks += 1;
            self.stats.spawned += spawned as u64;
        }

        if !self.frame.poll(now) {
            return None;
        }
        let views = self.field.snapshot();
        let frame = match self.mode {
            FrameMode::Encoded => {
                surface.clear();
                for view in &views {
                    surface.fill_text(&view.content, &view.font, view.size, &view.color, view.x, view.y);
                }
                match surface.encode_frame() {
                    Ok(blob) => Some(Frame::Encoded(blob)),
                    Err(e) => {
                        warn!("Dropping frame: {e}");
                        self.stats.encode_failures += 1;
                        None
                    },
                }
            },
            FrameMode::Layout => Some(Frame::Layout(views)),
        };
        self.field.advance();
        self.stats.frames += 1;
        trace!(frame = self.stats.frames, live = self.field.len(), "Frame drawn");
        frame
    }

    /// Earliest time at which `pump` has work, `None` while stopped.
    #[must_use]
    pub fn next_due(&self) -> Option<Instant> {
        match (self.spawn.next_due(), self.frame.next_due()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Removes the first particle under the pointer.
    pub fn hit_test(&mut self, px: f32, py: f32) -> Option<ParticleId> {
        self.field.hit_test(px, py)
    }

    /// The owned field.
    #[must_use]
    pub const fn field(&self) -> &ParticleField {
        &self.field
    }

    /// The owned surface, if any.
    #[must_use]
    pub const fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    /// Loop counters.
    #[must_use]
    pub const fn stats(&self) -> LoopStats {
        self.stats
    }
}

impl<S> Drop for RenderLoop<S> {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
    }
}
