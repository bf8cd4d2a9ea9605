//! Stage events.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use ciallo_common::ParticleId;
use ciallo_kernel::Flourish;

use crate::render_loop::Frame;

/// How long a click flourish stays on screen, in milliseconds.
pub const FLOURISH_LIFETIME_MS: u64 = 2000;

/// Horizontal room kept for a flourish at the right edge.
pub const FLOURISH_MAX_WIDTH: f32 = 162.0;

/// Vertical room kept for a flourish at the bottom edge.
pub const FLOURISH_MAX_HEIGHT: f32 = 22.0;

/// A pointer press flourish, for whoever shows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickEffect {
    /// Left edge, clamped to the surface
    pub x: f32,
    /// Top edge, clamped to the surface
    pub y: f32,
    /// Random voice requested
    pub random_audio: bool,
    /// Text, font and color
    pub flourish: Flourish,
    /// Time on screen in milliseconds
    pub lifetime_ms: u64,
}

impl ClickEffect {
    /// Places a flourish at the pointer, kept inside a `width` x `height` surface.
    #[must_use]
    pub fn at(x: f32, y: f32, width: f32, height: f32, random_audio: bool, flourish: Flourish) -> Self {
        Self {
            x: x.min(width - FLOURISH_MAX_WIDTH),
            y: y.min(height - FLOURISH_MAX_HEIGHT),
            random_audio,
            flourish,
            lifetime_ms: FLOURISH_LIFETIME_MS,
        }
    }
}

/// Events emitted by a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageEvent {
    /// A pointer press removed a particle
    Hit {
        /// Removed particle
        id: ParticleId,
        /// Pointer X
        x: f32,
        /// Pointer Y
        y: f32,
        /// Random voice requested
        random_audio: bool,
    },
    /// A pointer press happened
    Click(ClickEffect),
    /// The render loop produced a frame
    FrameRendered(Frame),
    /// The offload worker is gone and the stage now renders locally
    BackendFallback {
        /// Why the worker could not be used
        reason: String,
    },
}

/// Frame events kept before the oldest is dropped.
pub const DEFAULT_FRAME_CAPACITY: usize = 64;

/// Event bus for stage events.
///
/// Frames travel on a bounded lane: when it is full the oldest frame is
/// dropped to make room. Every other event travels on an unbounded lane and
/// is never dropped, so a slow reader cannot lose hits behind a backlog of
/// frames.
#[derive(Debug)]
pub struct EventBus {
    /// Hits, clicks and fallbacks
    events: (Sender<StageEvent>, Receiver<StageEvent>),
    /// Rendered frames
    frames: (Sender<StageEvent>, Receiver<StageEvent>),
    /// Frame lane capacity
    frame_capacity: usize,
    /// Frames dropped so far
    dropped_frames: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_CAPACITY)
    }
}

impl EventBus {
    /// Creates a new event bus keeping at most `frame_capacity` frames.
    #[must_use]
    pub fn new(frame_capacity: usize) -> Self {
        let frame_capacity = frame_capacity.max(1);
        Self {
            events: unbounded(),
            frames: bounded(frame_capacity),
            frame_capacity,
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Publishes an event to the bus.
    ///
    /// Returns false if an older frame had to be dropped to make room.
    pub fn publish(&self, event: StageEvent) -> bool {
        if !matches!(event, StageEvent::FrameRendered(_)) {
            // Unbounded, and the receiver lives as long as self
            let _ = self.events.0.send(event);
            return true;
        }

        let mut event = event;
        let mut displaced = false;
        loop {
            match self.frames.0.try_send(event) {
                Ok(()) => break,
                Err(TrySendError::Full(back)) => {
                    event = back;
                    if self.frames.1.try_recv().is_ok() {
                        displaced = true;
                        let dropped = self.dropped_frames.fetch_add(1, Ordering::Relaxed) + 1;
                        debug!(dropped, "Frame bus full, dropped the oldest frame");
                    }
                },
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
        !displaced
    }

    /// Drains all pending events.
    ///
    /// Non-frame events come first, then frames, each in publish order.
    pub fn drain(&self) -> Vec<StageEvent> {
        let mut events: Vec<StageEvent> = self.events.1.try_iter().collect();
        events.extend(self.frames.1.try_iter());
        events
    }

    /// Returns the number of pending events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.events.1.len() + self.frames.1.len()
    }

    /// Returns the frame lane capacity.
    #[must_use]
    pub const fn frame_capacity(&self) -> usize {
        self.frame_capacity
    }

    /// Frames dropped because nobody drained them in time.
    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flourish() -> Flourish {
        Flourish {
            text: "Ciallo".into(),
            font: "Arial, sans-serif".into(),
            color: "#112233".into(),
        }
    }

    #[test]
    fn test_event_bus() {
        let bus = EventBus::new(10);

        assert!(bus.publish(StageEvent::BackendFallback { reason: "gone".into() }));
        assert!(bus.publish(StageEvent::Hit {
            id: ParticleId::from_raw(7),
            x: 1.0,
            y: 2.0,
            random_audio: true,
        }));

        assert_eq!(bus.pending_count(), 2);
        let events = bus.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], StageEvent::BackendFallback { .. }));
        assert_eq!(bus.pending_count(), 0);
    }

    fn frame() -> StageEvent {
        StageEvent::FrameRendered(Frame::Layout(Vec::new()))
    }

    #[test]
    fn test_full_frame_lane_drops_oldest() {
        let bus = EventBus::new(2);
        assert!(bus.publish(frame()));
        assert!(bus.publish(frame()));
        assert!(!bus.publish(frame()));
        assert!(!bus.publish(frame()));

        assert_eq!(bus.pending_count(), 2);
        assert_eq!(bus.dropped_frames(), 2);
        assert_eq!(bus.drain().len(), 2);
        assert_eq!(bus.frame_capacity(), 2);
    }

    #[test]
    fn test_hits_survive_a_frame_backlog() {
        let bus = EventBus::new(4);
        for _ in 0..100 {
            bus.publish(frame());
        }
        assert!(bus.publish(StageEvent::Hit {
            id: ParticleId::from_raw(3),
            x: 0.0,
            y: 0.0,
            random_audio: false,
        }));
        for _ in 0..100 {
            bus.publish(frame());
        }

        let events = bus.drain();
        assert_eq!(events.len(), 5);
        assert!(matches!(events[0], StageEvent::Hit { .. }));
        assert_eq!(bus.dropped_frames(), 196);
    }

    #[test]
    fn test_click_effect_is_clamped() {
        let inside = ClickEffect::at(10.0, 10.0, 800.0, 600.0, false, flourish());
        assert_eq!((inside.x, inside.y), (10.0, 10.0));
        assert_eq!(inside.lifetime_ms, 2000);

        let corner = ClickEffect::at(790.0, 595.0, 800.0, 600.0, true, flourish());
        assert_eq!((corner.x, corner.y), (638.0, 578.0));
        assert!(corner.random_audio);
    }

    #[test]
    fn test_events_serialize() {
        let event = StageEvent::Click(ClickEffect::at(5.0, 5.0, 100.0, 100.0, true, flourish()));
        let json = serde_json::to_string(&event).expect("serialize");
        let back: StageEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, event);
    }
}
