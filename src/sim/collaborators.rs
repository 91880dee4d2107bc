//! In-process stand-ins for the controller's external collaborators.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::RelocalizationError;
use crate::geometry::SE3;
use crate::relocalization::{
    GpsFix, RelocalizationRequest, RelocalizationResponse, RelocalizationService,
};
use crate::system::{
    AnchorEvent, AnchorSample, DownstreamConsumer, Frame, FrameSource, GpsSource, ObjectId,
    PoseUpdate, TrackingEvent, WorldTracker, WorldTrackerListener,
};

use super::Scenario;

/// Frames kept for `at_or_after` lookups.
const FRAME_BUFFER: usize = 8;

/// World tracker whose pushes are triggered by the caller.
#[derive(Default)]
pub struct SimulatedTracker {
    listener: Mutex<Option<Arc<dyn WorldTrackerListener>>>,
    frames: Mutex<Option<Arc<dyn FrameSource>>>,
}

impl SimulatedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit_pose(&self, timestamp: f64, world_t_camera: SE3, reference_system: u64) {
        if let Some(listener) = self.listener.lock().clone() {
            listener.on_pose(PoseUpdate {
                timestamp,
                world_t_camera,
                reference_system,
            });
        }
    }

    pub fn emit_found(&self, timestamp: f64, object_ids: Vec<ObjectId>) {
        self.emit_event(TrackingEvent {
            found: true,
            object_ids,
            timestamp,
        });
    }

    pub fn emit_lost(&self, timestamp: f64) {
        self.emit_event(TrackingEvent {
            found: false,
            object_ids: Vec::new(),
            timestamp,
        });
    }

    pub fn has_frame_source(&self) -> bool {
        self.frames.lock().is_some()
    }

    fn emit_event(&self, event: TrackingEvent) {
        if let Some(listener) = self.listener.lock().clone() {
            listener.on_tracking_event(event);
        }
    }
}

impl WorldTracker for SimulatedTracker {
    fn attach_frame_source(&self, source: Arc<dyn FrameSource>) {
        *self.frames.lock() = Some(source);
    }

    fn subscribe(&self, listener: Arc<dyn WorldTrackerListener>) {
        *self.listener.lock() = Some(listener);
    }
}

/// Frame source fed by the caller.
#[derive(Default)]
pub struct ScriptedFrameSource {
    frames: Mutex<VecDeque<Frame>>,
}

impl ScriptedFrameSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, frame: Frame) {
        let mut frames = self.frames.lock();
        frames.push_back(frame);
        while frames.len() > FRAME_BUFFER {
            frames.pop_front();
        }
    }
}

impl FrameSource for ScriptedFrameSource {
    fn latest_frame(&self, at_or_after: Option<f64>) -> Option<Frame> {
        let frames = self.frames.lock();
        at_or_after
            .and_then(|t| frames.iter().find(|f| f.timestamp >= t))
            .or_else(|| frames.back())
            .cloned()
    }
}

/// GPS with a fix set by the caller.
#[derive(Default)]
pub struct StaticGps {
    fix: Mutex<Option<GpsFix>>,
}

impl StaticGps {
    pub fn new(fix: Option<GpsFix>) -> Self {
        Self {
            fix: Mutex::new(fix),
        }
    }

    pub fn set(&self, fix: Option<GpsFix>) {
        *self.fix.lock() = fix;
    }
}

impl GpsSource for StaticGps {
    fn latest_fix(&self) -> Option<GpsFix> {
        *self.fix.lock()
    }
}

/// How the simulated service answers the next request.
#[derive(Debug, Clone)]
pub enum ServiceReply {
    /// Succeed with at most this many correspondences.
    Correspondences(usize),
    Fail(RelocalizationError),
}

/// Relocalization service answering from the scenario's ground truth.
///
/// Replies are taken from a queue; once it is empty every request succeeds
/// with the full correspondence grid.
pub struct SimulatedRelocalizationService {
    scenario: Scenario,
    grid: (usize, usize),
    replies: Mutex<VecDeque<ServiceReply>>,
    requests: Mutex<Vec<f64>>,
}

impl SimulatedRelocalizationService {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            grid: (12, 16),
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue(&self, reply: ServiceReply) {
        self.replies.lock().push_back(reply);
    }

    /// Timestamps of all requests received.
    pub fn requests(&self) -> Vec<f64> {
        self.requests.lock().clone()
    }
}

impl RelocalizationService for SimulatedRelocalizationService {
    fn relocalize(
        &self,
        request: &RelocalizationRequest,
    ) -> Result<RelocalizationResponse, RelocalizationError> {
        self.requests.lock().push(request.timestamp);

        let limit = match self.replies.lock().pop_front() {
            Some(ServiceReply::Fail(err)) => return Err(err),
            Some(ServiceReply::Correspondences(n)) => n,
            None => usize::MAX,
        };

        let anchor_t_camera = self.scenario.anchor_t_camera(request.timestamp);
        let (mut object_points, mut image_points) = self.scenario.scene.correspondences(
            &request.camera,
            &anchor_t_camera,
            self.grid.0,
            self.grid.1,
        );
        object_points.truncate(limit);
        image_points.truncate(limit);

        Ok(RelocalizationResponse {
            anchor_t_camera,
            object_points,
            image_points,
        })
    }
}

/// Consumer that records everything it receives.
#[derive(Default)]
pub struct RecordingConsumer {
    samples: Mutex<Vec<AnchorSample>>,
    events: Mutex<Vec<AnchorEvent>>,
}

impl RecordingConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> Vec<AnchorSample> {
        self.samples.lock().clone()
    }

    pub fn events(&self) -> Vec<AnchorEvent> {
        self.events.lock().clone()
    }
}

impl DownstreamConsumer for RecordingConsumer {
    fn on_sample(&self, sample: &AnchorSample) {
        self.samples.lock().push(sample.clone());
    }

    fn on_event(&self, event: &AnchorEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_source_lookup() {
        let scenario = Scenario::default();
        let source = ScriptedFrameSource::new();
        assert!(source.latest_frame(None).is_none());

        for t in [1.0, 2.0, 3.0] {
            let mut frame = scenario.frame(0.0);
            frame.timestamp = t;
            source.push(frame);
        }

        assert_eq!(source.latest_frame(None).map(|f| f.timestamp), Some(3.0));
        assert_eq!(source.latest_frame(Some(1.5)).map(|f| f.timestamp), Some(2.0));
        assert_eq!(source.latest_frame(Some(9.0)).map(|f| f.timestamp), Some(3.0));
    }

    #[test]
    fn test_service_replies() {
        let scenario = Scenario::default();
        let service = SimulatedRelocalizationService::new(scenario.clone());
        service.queue(ServiceReply::Fail(RelocalizationError::Transport("offline".into())));
        service.queue(ServiceReply::Correspondences(10));

        let frame = scenario.frame(1.0);
        let request = RelocalizationRequest {
            timestamp: 1.0,
            image: frame.image,
            camera: frame.camera,
            gps: GpsFix {
                latitude: 0.0,
                longitude: 0.0,
            },
            gravity: nalgebra::Vector3::y(),
            map: crate::relocalization::MapSpec::default().resolve().unwrap(),
        };

        assert!(service.relocalize(&request).is_err());
        assert_eq!(service.relocalize(&request).unwrap().correspondence_count(), 10);
        assert_eq!(service.relocalize(&request).unwrap().correspondence_count(), 192);
        assert_eq!(service.requests(), vec![1.0, 1.0, 1.0]);
    }
}
