//! Session orchestration and thread management.
//!
//! This module contains the top-level `AnchorAlignmentController`, the
//! relocalization worker it spawns, the shared session state, and the
//! interfaces of every external collaborator.

pub mod clock;
mod controller;
pub mod events;
pub mod interfaces;
pub mod shared_state;
pub mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::AnchorAlignmentController;
pub use events::EventRelay;
pub use interfaces::{
    AnchorEvent, AnchorEventKind, AnchorSample, Collaborators, DownstreamConsumer, Frame,
    FrameSource, GpsSource, ObjectId, PoseUpdate, TrackingEvent, WorldTracker,
    WorldTrackerListener,
};
pub use shared_state::{ResetScope, SessionStats, SharedState};
pub use worker::{RelocalizationStep, RelocalizationWorker, TickOutcome};
