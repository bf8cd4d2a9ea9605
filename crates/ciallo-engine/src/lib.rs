//! Ciallo Engine - render loop, offload worker and stage for the text field.
//!
//! This crate drives the kernel's particle field: cooperative cadences, the
//! render loop, the worker thread that renders off the display context, and
//! the [`Stage`] facade that falls back to local rendering when the worker is
//! unavailable.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod events;
pub mod offload;
pub mod render_loop;
pub mod stage;
pub mod timing;

pub use config::{FrameMode, StageConfig};
pub use events::{ClickEffect, EventBus, StageEvent};
pub use offload::{OffloadChannel, WorkerCommand, WorkerHit};
pub use render_loop::{Frame, LoopHandle, LoopStats, RenderLoop};
pub use stage::Stage;
pub use timing::Cadence;
