//! Deterministic simulated collaborators.
//!
//! A textured plane seen by a moving camera stands in for the real world:
//! the world tracker, frame source, GPS and relocalization service all
//! answer from the same ground truth. Used by the demo binary and the
//! end-to-end tests.

pub mod collaborators;
pub mod scenario;
pub mod scene;

pub use collaborators::{
    RecordingConsumer, ScriptedFrameSource, ServiceReply, SimulatedRelocalizationService,
    SimulatedTracker, StaticGps,
};
pub use scenario::Scenario;
pub use scene::PlanarScene;
