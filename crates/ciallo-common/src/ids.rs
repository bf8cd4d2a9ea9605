//! ID types for particles.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for particle IDs.
static PARTICLE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a particle.
///
/// IDs are never reused, so a removed particle can never be confused with a
/// later one that happens to occupy the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticleId(u64);

impl ParticleId {
    /// Creates a new unique particle ID.
    #[must_use]
    pub fn new() -> Self {
        Self(PARTICLE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates a particle ID from a raw value (for deserialization).
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Null/invalid particle ID.
    pub const NULL: Self = Self(0);

    /// Checks if this is a valid (non-null) particle ID.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl Default for ParticleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ParticleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "p{}", self.0)
    }
}
