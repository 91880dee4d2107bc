//! Collaborator interfaces.
//!
//! Every external dependency of the controller is injected as a trait object
//! at construction. The world tracker exposes a single capability set: it
//! pushes pose samples and object lifecycle events to a listener, and
//! accepts the frame source it should read from.

use std::sync::Arc;

use nalgebra::{UnitQuaternion, Vector3};

use crate::geometry::SE3;
use crate::image::{CameraModel, GrayImage};
use crate::relocalization::{GpsFix, RelocalizationService};

use super::clock::Clock;
use super::shared_state::SessionStats;

/// Identifier of an object tracked by the world tracker.
pub type ObjectId = u32;

/// A decoded camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub timestamp: f64,
    pub image: GrayImage,
    pub camera: CameraModel,
}

pub trait FrameSource: Send + Sync {
    /// Most recent frame, or the earliest at/after `at_or_after` when given
    /// and available.
    fn latest_frame(&self, at_or_after: Option<f64>) -> Option<Frame>;
}

pub trait GpsSource: Send + Sync {
    fn latest_fix(&self) -> Option<GpsFix>;
}

/// Pose pushed by the world tracker on every callback.
#[derive(Debug, Clone)]
pub struct PoseUpdate {
    pub timestamp: f64,
    pub world_t_camera: SE3,
    /// Identifies the tracker's world frame; a change invalidates the session.
    pub reference_system: u64,
}

/// Object lifecycle event from the world tracker.
#[derive(Debug, Clone)]
pub struct TrackingEvent {
    pub found: bool,
    pub object_ids: Vec<ObjectId>,
    pub timestamp: f64,
}

/// Receives the world tracker's pushes.
pub trait WorldTrackerListener: Send + Sync {
    fn on_pose(&self, update: PoseUpdate);
    fn on_tracking_event(&self, event: TrackingEvent);
}

pub trait WorldTracker: Send + Sync {
    fn attach_frame_source(&self, source: Arc<dyn FrameSource>);
    fn subscribe(&self, listener: Arc<dyn WorldTrackerListener>);
}

/// Anchor-relative output for one tracker callback.
///
/// Each tracked object carries the camera pose in the anchor frame. All
/// arrays are empty while no anchor transform is available.
#[derive(Debug, Clone)]
pub struct AnchorSample {
    pub timestamp: f64,
    pub object_ids: Vec<ObjectId>,
    pub orientations: Vec<UnitQuaternion<f64>>,
    pub positions: Vec<Vector3<f64>>,
    pub metadata: SessionStats,
}

impl AnchorSample {
    pub fn len(&self) -> usize {
        self.object_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.object_ids.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorEventKind {
    Found,
    Lost,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnchorEvent {
    pub kind: AnchorEventKind,
    pub timestamp: f64,
    pub object_ids: Vec<ObjectId>,
}

pub trait DownstreamConsumer: Send + Sync {
    fn on_sample(&self, sample: &AnchorSample);
    fn on_event(&self, event: &AnchorEvent);
}

/// Everything the controller talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub tracker: Arc<dyn WorldTracker>,
    pub frames: Arc<dyn FrameSource>,
    pub gps: Arc<dyn GpsSource>,
    pub service: Arc<dyn RelocalizationService>,
    pub consumer: Arc<dyn DownstreamConsumer>,
    pub clock: Arc<dyn Clock>,
}
