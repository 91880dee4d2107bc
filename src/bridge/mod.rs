//! Frame-to-frame tracking between relocalizations.

pub mod klt;
pub mod session;

pub use klt::{KltTracker, TrackStatus, TrackedPoint};
pub use session::{check_survivors, BridgeUpdate, FrameBridge};
