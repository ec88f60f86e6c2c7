//! Engine error taxonomy.
//!
//! Errors fall into a small number of categories with sharply different
//! handling policies (see the per-variant docs). Only measurement failures
//! terminate an optimization run; everything else is either recovered
//! locally or rejected before any state is touched.

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A landmark set did not contain the expected 468 points.
    #[error("invalid landmark set: expected {expected} points, got {got}")]
    InvalidLandmarks { expected: usize, got: usize },

    /// Frame capture or analysis failed mid-run. Terminal for the current
    /// optimization: the optimizer cannot safely guess a render state it
    /// could not observe.
    #[error("measurement failed at iteration {iteration}: {reason}")]
    Measurement { iteration: usize, reason: String },

    /// The render surface was not ready when a capture was requested.
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// Applying a morph configuration to the render target failed.
    #[error("render target rejected morph configuration: {0}")]
    RenderTarget(String),

    /// A second optimization was requested while one is in flight.
    /// Rejected synchronously; nothing is queued.
    #[error("optimization already in progress for this controller")]
    Busy,

    /// An in-flight optimization was cancelled at an iteration boundary.
    #[error("optimization cancelled after {completed_iterations} iterations")]
    Cancelled { completed_iterations: usize },

    /// Learning-state blob could not be parsed at all (a parseable blob
    /// with a mismatched version is a warning, not an error).
    #[error("malformed learning data: {0}")]
    MalformedLearningData(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
