//! Error types.
//!
//! Every runtime failure kind is local and self-healing: the next pose sample
//! or poll tick retries. Only [`ConfigError`] is surfaced to the host, once,
//! when a session starts.

use thiserror::Error;

/// Invalid session configuration. Prevents the session from starting.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Map label is empty or contains characters outside `[A-Za-z0-9._-]`.
    #[error("malformed map label: {0:?}")]
    MalformedMapLabel(String),

    /// Release environment is not one of the known environments.
    #[error("unknown release environment: {0:?}")]
    UnknownEnvironment(String),

    /// Structured map configuration could not be parsed.
    #[error("malformed map configuration: {0}")]
    MalformedMapConfig(String),

    /// A numeric configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidValue(String),
}

/// Transport or service failure from the relocalization backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RelocalizationError {
    /// The request never reached the service or the connection dropped.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The service answered but could not localize the image.
    #[error("service failure: {0}")]
    Service(String),

    /// The service did not answer in time.
    #[error("request timed out after {0:.1} s")]
    Timeout(f64),

    /// Object and image point arrays differ in length.
    #[error("malformed response: {object_points} object points, {image_points} image points")]
    MalformedResponse {
        object_points: usize,
        image_points: usize,
    },
}

/// The anchor/world alignment could not be computed; the previous transform is kept.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum AlignmentError {
    /// No anchor poses have been registered.
    #[error("anchor pose history is empty")]
    EmptyHistory,

    /// Point configuration is coincident or collinear.
    #[error("degenerate point configuration (singular value ratio {0:.2e})")]
    DegenerateConfiguration(f64),

    /// Fitted scale is not strictly positive and finite.
    #[error("non-positive scale {0:.3e}")]
    NonPositiveScale(f64),
}

/// The frame-to-frame bridge lost track; the session falls back to relocalization only.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum BridgeError {
    /// No valid anchor/world transform exists.
    #[error("no anchor transform available")]
    NoTransform,

    /// Too few points survived optical-flow tracking.
    #[error("tracking loss: {surviving} points survived, {required} required")]
    TrackingLoss { surviving: usize, required: usize },

    /// Robust pose solve found too few inliers.
    #[error("insufficient consensus: {inliers} inliers, {required} required")]
    InsufficientConsensus { inliers: usize, required: usize },

    /// No new frame was available.
    #[error("no new frame available")]
    NoFrame,
}
