//! # Ciallo Kernel
//!
//! Simulation core for the floating-text field.
//!
//! This crate provides:
//! - Random particle content (phrase, font, color, size, speed)
//! - Particles and the bounded [`ParticleField`] that spawns, moves and
//!   expires them
//! - A quadtree [`SpatialIndex`] for pointer hit tests on dense fields
//! - Font lookup and shaping through a [`FontBook`]
//! - Drawing surface traits and a software [`RasterSurface`]
//!
//! ## Field lifecycle
//!
//! The field has two inputs, both driven by the engine's render loop:
//! - **Spawn ticks** add up to one batch of particles at the right edge
//! - **Frames** move every particle left and drop the ones that scrolled out
//!
//! Pointer presses remove at most one particle per press.
//!
//! ## Surfaces
//!
//! Nothing in the kernel draws directly. Measurement goes through
//! [`TextMeasure`] and drawing through [`DrawSurface`], so the same field can
//! be rendered on the caller's thread or inside the offload worker.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod content;
pub mod field;
pub mod fonts;
pub mod particle;
pub mod quadtree;
pub mod surface;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::content::*;
    pub use crate::field::*;
    pub use crate::fonts::*;
    pub use crate::particle::*;
    pub use crate::quadtree::*;
    pub use crate::surface::*;
}

pub use prelude::*;
