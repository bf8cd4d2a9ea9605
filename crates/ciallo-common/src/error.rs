//! Error types for ciallo.

use thiserror::Error;

/// Top-level error type for ciallo operations.
#[derive(Debug, Error)]
pub enum CialloError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Drawing surface errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    /// No drawing context could be obtained
    #[error("Drawing context unavailable: {0}")]
    Unavailable(String),

    /// The context was lost while in use
    #[error("Drawing context lost")]
    ContextLost,

    /// Requested surface dimensions are unusable
    #[error("Invalid surface size {width}x{height}")]
    InvalidSize {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
    },

    /// Frame encoding failed
    #[error("Frame encoding failed: {0}")]
    Encode(String),
}

/// Offload worker errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OffloadError {
    /// The worker thread could not be started
    #[error("Failed to spawn render worker: {0}")]
    SpawnFailed(String),

    /// The worker is gone (terminated or panicked)
    #[error("Render worker disconnected")]
    Disconnected,
}

/// Result type alias for ciallo operations.
pub type CialloResult<T> = Result<T, CialloError>;
