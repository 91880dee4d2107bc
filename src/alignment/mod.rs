//! Anchor/world alignment: estimation and time-smoothed storage.

pub mod estimator;
pub mod store;

pub use estimator::{AnchorWorldEstimator, AnchorWorldTransform};
pub use store::SmoothedTransformStore;
