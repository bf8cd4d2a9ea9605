//! The display-context facade.
//!
//! A [`Stage`] is what an embedding display talks to. It renders either on
//! the offload worker or, when the worker cannot be spawned or goes away, on
//! a local [`RenderLoop`]. Both backends behave the same from the outside:
//! the same settings, visibility and pointer calls, and the same
//! [`StageEvent`]s on the stage's [`EventBus`].

use std::time::Instant;

use ciallo_common::{OffloadError, ParticleId};
use ciallo_kernel::{ContentSource, RasterSurface, MAX_SURFACE_DIM};
use tracing::{debug, info, warn};

use crate::config::StageConfig;
use crate::events::{ClickEffect, EventBus, StageEvent};
use crate::offload::{configured_loop, OffloadChannel};
use crate::render_loop::{Frame, RenderLoop};

/// Where frames are rendered.
enum Backend {
    /// On the worker thread
    Offload(OffloadChannel),
    /// On the caller's thread
    Local(RenderLoop<RasterSurface>),
}

/// Owns one particle field display, whichever context renders it.
pub struct Stage {
    config: StageConfig,
    backend: Backend,
    events: EventBus,
    /// Flourish content for click effects
    content: ContentSource,
    visible: bool,
    score: u64,
    frames: u64,
}

impl Stage {
    /// Creates a stage and starts rendering.
    ///
    /// With `config.offload` the worker is tried first; if it cannot be
    /// spawned the stage renders locally and publishes
    /// [`StageEvent::BackendFallback`].
    pub fn new(mut config: StageConfig) -> Self {
        config.validate();
        let now = Instant::now();
        let events = EventBus::default();

        let backend = if config.offload {
            match spawn_worker(&config) {
                Ok(channel) => Backend::Offload(channel),
                Err(e) => {
                    warn!("Render worker unavailable, rendering locally: {e}");
                    events.publish(StageEvent::BackendFallback { reason: e.to_string() });
                    Backend::Local(local_loop(&config, true, now))
                },
            }
        } else {
            Backend::Local(local_loop(&config, true, now))
        };

        let content = config
            .seed
            .map_or_else(ContentSource::new, |seed| ContentSource::with_seed(seed.wrapping_add(1)));

        info!(
            offload = matches!(backend, Backend::Offload(_)),
            width = config.surface_width,
            height = config.surface_height,
            "Stage created"
        );
        Self {
            config,
            backend,
            events,
            content,
            visible: true,
            score: 0,
            frames: 0,
        }
    }

    /// Current configuration.
    #[must_use]
    pub const fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Returns true while frames are rendered on the worker.
    #[must_use]
    pub const fn is_offloaded(&self) -> bool {
        matches!(self.backend, Backend::Offload(_))
    }

    /// Events published so far.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Takes every pending event.
    pub fn drain_events(&self) -> Vec<StageEvent> {
        self.events.drain()
    }

    /// Particles hit since the stage was created.
    #[must_use]
    pub const fn score(&self) -> u64 {
        self.score
    }

    /// Frames published since the stage was created.
    #[must_use]
    pub const fn frames_rendered(&self) -> u64 {
        self.frames
    }

    /// Resizes the surface. Unusable sizes are ignored.
    pub fn resize(&mut self, width: u32, height: u32, now: Instant) {
        if width == 0 || height == 0 || width > MAX_SURFACE_DIM || height > MAX_SURFACE_DIM {
            warn!("Ignoring surface size {width}x{height}");
            return;
        }
        self.config.surface_width = width;
        self.config.surface_height = height;

        match &mut self.backend {
            Backend::Offload(channel) => {
                if let Err(e) = channel.resize(width, height) {
                    self.fall_back(&e, now);
                }
            },
            Backend::Local(render) => {
                if let Err(e) = render.resize(width, height) {
                    warn!("Resize failed: {e}");
                }
            },
        }
    }

    /// Updates capacity and batch size.
    ///
    /// A zero value is ignored and the last valid one kept.
    pub fn update_settings(&mut self, capacity: usize, batch: usize, now: Instant) {
        if capacity == 0 || batch == 0 {
            warn!(capacity, batch, "Ignoring non-positive text settings");
        }
        if capacity > 0 {
            self.config.max_texts = capacity;
        }
        if batch > 0 {
            self.config.max_texts_per_draw = batch;
        }
        let (capacity, batch) = (self.config.max_texts, self.config.max_texts_per_draw);
        debug!(capacity, batch, "Text settings updated");

        match &mut self.backend {
            Backend::Offload(channel) => {
                if let Err(e) = channel.update_settings(capacity, batch) {
                    self.fall_back(&e, now);
                }
            },
            Backend::Local(render) => {
                render.reconfigure(capacity, batch);
            },
        }
    }

    /// Visibility change: a hidden stage stops both cadences.
    pub fn set_visible(&mut self, visible: bool, now: Instant) {
        self.visible = visible;
        match &mut self.backend {
            Backend::Offload(channel) => {
                if let Err(e) = channel.set_visible(visible) {
                    self.fall_back(&e, now);
                }
            },
            Backend::Local(render) => render.set_visible(visible, now),
        }
    }

    /// Pointer press.
    ///
    /// Always publishes a [`StageEvent::Click`]. With `allow_game` the press
    /// also hit-tests the field; a local hit is resolved immediately and
    /// returned, a worker hit arrives on a later [`Stage::pump`].
    pub fn pointer_down(&mut self, x: f32, y: f32, now: Instant) -> Option<ParticleId> {
        let effect = ClickEffect::at(
            x,
            y,
            self.config.surface_width as f32,
            self.config.surface_height as f32,
            self.config.random_audio,
            self.content.next_flourish(),
        );
        self.events.publish(StageEvent::Click(effect));

        if !self.config.allow_game {
            return None;
        }

        if let Backend::Offload(channel) = &self.backend {
            match channel.pointer(x, y) {
                Ok(()) => return None,
                Err(e) => self.fall_back(&e, now),
            }
        }
        let Backend::Local(render) = &mut self.backend else {
            return None;
        };
        let id = render.hit_test(x, y)?;
        self.record_hit(id, x, y);
        Some(id)
    }

    /// Runs due cadences and collects worker output.
    ///
    /// Returns the number of frames published by this call.
    pub fn pump(&mut self, now: Instant) -> usize {
        let mut published = 0;
        match &mut self.backend {
            Backend::Offload(channel) => {
                let hits = channel.drain_hits();
                let frames = channel.drain_frames();
                let alive = channel.is_alive();

                for hit in hits.unwrap_or_default() {
                    self.record_hit(hit.id, hit.x, hit.y);
                }
                match frames {
                    Ok(frames) => {
                        for frame in frames {
                            self.publish_frame(frame);
                            published += 1;
                        }
                    },
                    Err(e) => {
                        self.fall_back(&e, now);
                        return published;
                    },
                }
                if !alive {
                    self.fall_back(&OffloadError::Disconnected, now);
                }
            },
            Backend::Local(render) => {
                if let Some(frame) = render.pump(now) {
                    self.publish_frame(frame);
                    published += 1;
                }
            },
        }
        published
    }

    /// Earliest time at which a local backend has work.
    ///
    /// `None` while stopped or when the worker renders.
    #[must_use]
    pub fn next_due(&self) -> Option<Instant> {
        match &self.backend {
            Backend::Offload(_) => None,
            Backend::Local(render) => render.next_due(),
        }
    }

    fn publish_frame(&mut self, frame: Frame) {
        self.frames += 1;
        self.events.publish(StageEvent::FrameRendered(frame));
    }

    fn record_hit(&mut self, id: ParticleId, x: f32, y: f32) {
        self.score += 1;
        debug!(%id, score = self.score, "Hit");
        self.events.publish(StageEvent::Hit {
            id,
            x,
            y,
            random_audio: self.config.random_audio,
        });
    }

    /// Replaces the worker with a local loop built from the current config.
    fn fall_back(&mut self, reason: &OffloadError, now: Instant) {
        warn!("Render worker lost, rendering locally: {reason}");
        self.backend = Backend::Local(local_loop(&self.config, self.visible, now));
        self.events.publish(StageEvent::BackendFallback {
            reason: reason.to_string(),
        });
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("offloaded", &self.is_offloaded())
            .field("visible", &self.visible)
            .field("score", &self.score)
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}

fn spawn_worker(config: &StageConfig) -> Result<OffloadChannel, OffloadError> {
    let channel = OffloadChannel::spawn(config)?;
    channel.init(config.surface_width, config.surface_height)?;
    Ok(channel)
}

/// Builds a started local loop. A surface that cannot be created leaves it idle.
fn local_loop(config: &StageConfig, visible: bool, now: Instant) -> RenderLoop<RasterSurface> {
    let mut render = configured_loop(config);
    match RasterSurface::new(config.surface_width, config.surface_height) {
        Ok(surface) => render.attach_surface(surface),
        Err(e) => warn!("No drawing surface, stage stays idle: {e}"),
    }
    if visible {
        render.start(now);
    }
    render
}
