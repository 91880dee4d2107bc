//! Relocalization worker: the single background thread that owns the
//! relocalization loop and the frame-to-frame bridge.
//!
//! Each tick polls GPS, advances an active bridge session by one frame, then
//! runs the relocalization loop. Requests are synchronous, so at most one is
//! ever in flight. Shutdown and session resets are checked between steps.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use nalgebra::Vector3;
use tracing::{debug, info, warn};

use crate::alignment::AnchorWorldEstimator;
use crate::bridge::{BridgeUpdate, FrameBridge};
use crate::config::ControllerConfig;
use crate::error::{AlignmentError, BridgeError};
use crate::geometry::{gravity_in_camera, SE3};
use crate::history::PairedPose;
use crate::image::buffer::downsample_factor;
use crate::relocalization::{
    Classification, GpsFix, MapConfiguration, RelocalizationLoop, RelocalizationRequest,
    RelocalizationResponse, ThrottleReason,
};

use super::interfaces::{Collaborators, Frame};
use super::shared_state::SharedState;

/// What the relocalization loop did during one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum RelocalizationStep {
    Throttled(ThrottleReason),
    Completed(Classification),
    /// The session was reset or shut down while the request was in flight.
    Discarded,
}

#[derive(Debug, Clone)]
pub struct TickOutcome {
    /// `None` when no bridge session was active.
    pub bridge: Option<Result<BridgeUpdate, BridgeError>>,
    pub relocalization: RelocalizationStep,
}

pub struct RelocalizationWorker {
    config: ControllerConfig,
    map: MapConfiguration,
    shared: Arc<SharedState>,
    collaborators: Collaborators,
    reloc: RelocalizationLoop,
    bridge: FrameBridge,
    estimator: AnchorWorldEstimator,
    epoch: u64,
    gps_fix: Option<GpsFix>,
}

impl RelocalizationWorker {
    pub fn new(
        config: ControllerConfig,
        map: MapConfiguration,
        shared: Arc<SharedState>,
        collaborators: Collaborators,
        estimator: AnchorWorldEstimator,
    ) -> Self {
        Self {
            reloc: RelocalizationLoop::new(config.relocalization.clone()),
            bridge: FrameBridge::new(config.bridge.clone()),
            epoch: shared.epoch(),
            config,
            map,
            shared,
            collaborators,
            estimator,
            gps_fix: None,
        }
    }

    /// Main loop. Runs until shutdown is requested or `stop` fires.
    pub fn run(&mut self, stop: Receiver<()>) {
        info!("relocalization worker started");

        loop {
            if self.shared.is_shutdown_requested() {
                break;
            }

            self.tick();

            let period = if self.bridge.is_active() {
                self.config.bridge_interval
            } else {
                self.config.poll_interval
            };
            match stop.recv_timeout(Duration::from_secs_f64(period)) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }

        info!("relocalization worker stopped");
    }

    pub fn is_bridging(&self) -> bool {
        self.bridge.is_active()
    }

    /// One iteration of the worker loop.
    pub fn tick(&mut self) -> TickOutcome {
        self.sync_epoch();

        if let Some(fix) = self.collaborators.gps.latest_fix() {
            self.gps_fix = Some(fix);
        }

        let bridge = self.bridge_step();
        let relocalization = self.relocalization_step();
        TickOutcome {
            bridge,
            relocalization,
        }
    }

    /// Drop per-session worker state after a reset.
    fn sync_epoch(&mut self) {
        let epoch = self.shared.epoch();
        if epoch != self.epoch {
            debug!(epoch, "session reset observed by worker");
            self.epoch = epoch;
            self.bridge.stop();
            self.reloc.reset();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.shared.is_shutdown_requested() || self.shared.epoch() != self.epoch
    }

    /// Reduce a frame to the request resolution. The bridge tracks on the
    /// same resolution so service image points and tracked observations
    /// share one pixel frame.
    fn prepare(&self, frame: Frame) -> Frame {
        let factor = downsample_factor(
            frame.image.width(),
            frame.image.height(),
            self.config.relocalization.max_image_dimension,
        );
        Frame {
            timestamp: frame.timestamp,
            image: frame.image.downsample(factor),
            camera: frame.camera.downsampled(factor),
        }
    }

    fn relocalization_step(&mut self) -> RelocalizationStep {
        let now = self.collaborators.clock.now();
        let latest = {
            let session = self.shared.session.lock();
            session.pose_history.most_recent().cloned()
        };

        if let Err(reason) = self.reloc.poll(now, latest.is_none(), self.gps_fix.is_some()) {
            return RelocalizationStep::Throttled(reason);
        }
        let (Some(latest), Some(gps)) = (latest, self.gps_fix) else {
            return RelocalizationStep::Throttled(self.reloc.throttle(ThrottleReason::EmptyHistory));
        };

        let Some(frame) = self.collaborators.frames.latest_frame(Some(latest.timestamp)) else {
            return RelocalizationStep::Throttled(self.reloc.throttle(ThrottleReason::NoFrame));
        };
        let world_t_camera = {
            let session = self.shared.session.lock();
            session
                .pose_history
                .query_at_or_after(frame.timestamp)
                .map(|s| s.world_t_camera.clone())
        };
        if self.is_cancelled() {
            return RelocalizationStep::Throttled(self.reloc.throttle(ThrottleReason::Cancelled));
        }
        // The frame may be newer than every pose sample.
        let Some(world_t_camera) = world_t_camera else {
            return RelocalizationStep::Throttled(self.reloc.throttle(ThrottleReason::EmptyHistory));
        };

        let prepared = self.prepare(frame);
        if self.is_cancelled() {
            return RelocalizationStep::Throttled(self.reloc.throttle(ThrottleReason::Cancelled));
        }

        let gravity = gravity_in_camera(&world_t_camera, &self.config.world_up)
            .unwrap_or_else(|| -Vector3::y());
        let request = RelocalizationRequest {
            timestamp: prepared.timestamp,
            image: prepared.image,
            camera: prepared.camera,
            gps,
            gravity,
            map: self.map.clone(),
        };

        self.reloc.begin_request(now);
        self.shared.session.lock().stats.requests_sent += 1;
        debug!(
            timestamp = request.timestamp,
            width = request.image.width(),
            height = request.image.height(),
            "sending relocalization request"
        );

        let result = self.collaborators.service.relocalize(&request);
        if self.is_cancelled() {
            debug!("discarding relocalization result from a stale session");
            return RelocalizationStep::Discarded;
        }

        let classification = self.reloc.classify(result.as_ref().map_err(Clone::clone));
        match (&classification, &result) {
            (Classification::Succeeded { correspondences }, Ok(response)) => {
                info!(correspondences, "relocalization succeeded");
                self.shared.session.lock().stats.record_success(now);
                self.apply_relocalization(&request, &world_t_camera, response);
            }
            (Classification::Insufficient { correspondences, required }, Ok(response)) => {
                info!(correspondences, required, "relocalization below correspondence minimum");
                let has_transform = {
                    let mut session = self.shared.session.lock();
                    session.stats.insufficient_results += 1;
                    session.stats.record_failure(now);
                    session.store.is_valid()
                };
                if self.config.relocalization.seed_bridge_from_insufficient && has_transform {
                    self.start_bridge(&request, response);
                }
            }
            (Classification::Failed(err), _) => {
                warn!("relocalization failed: {}", err);
                let mut session = self.shared.session.lock();
                session.stats.failed_requests += 1;
                session.stats.record_failure(now);
            }
            _ => {}
        }

        RelocalizationStep::Completed(classification)
    }

    fn apply_relocalization(
        &mut self,
        request: &RelocalizationRequest,
        world_t_camera: &SE3,
        response: &RelocalizationResponse,
    ) {
        let pair = PairedPose {
            timestamp: request.timestamp,
            world_t_camera: world_t_camera.clone(),
            anchor_t_camera: response.anchor_t_camera.clone(),
        };
        if let Err(err) = self.register_pair(pair) {
            warn!("keeping previous anchor transform: {}", err);
        }
        self.start_bridge(request, response);
    }

    fn start_bridge(&mut self, request: &RelocalizationRequest, response: &RelocalizationResponse) {
        if !self.config.bridge.enabled {
            return;
        }
        let started = self.bridge.start(
            &request.image,
            request.timestamp,
            &response.object_points,
            &response.image_points,
        );
        let feature_count = started.unwrap_or(0);
        self.shared.session.lock().stats.bridge_feature_count = feature_count;
        match started {
            Some(n) => info!(feature_count = n, "bridge session started"),
            None => debug!("too few correspondences to start a bridge session"),
        }
    }

    /// Add a pair to the anchor history and refresh the transform store.
    ///
    /// The estimate runs on a snapshot outside the lock; results from a
    /// stale session are dropped.
    fn register_pair(&mut self, pair: PairedPose) -> Result<(), AlignmentError> {
        let snapshot = {
            let mut session = self.shared.session.lock();
            if self.shared.epoch() != self.epoch {
                return Ok(());
            }
            session.anchor_history.insert(pair);
            session.anchor_history.prune(
                self.config.anchor_history.max_age,
                self.config.anchor_history.max_count,
            );
            session.anchor_history.clone()
        };

        let estimate = self.estimator.estimate(&snapshot)?;

        let mut session = self.shared.session.lock();
        if self.shared.epoch() != self.epoch {
            return Ok(());
        }
        session.stats.recovered_scale = Some(estimate.scale());
        session.store.update(estimate);
        Ok(())
    }

    fn bridge_step(&mut self) -> Option<Result<BridgeUpdate, BridgeError>> {
        let last = self.bridge.last_timestamp()?;

        let frame = match self.collaborators.frames.latest_frame(None) {
            Some(frame) if frame.timestamp > last => frame,
            _ => return Some(Err(BridgeError::NoFrame)),
        };

        let (world_t_camera, transform) = {
            let session = self.shared.session.lock();
            (
                session
                    .pose_history
                    .query_at_or_after(frame.timestamp)
                    .map(|s| s.world_t_camera.clone()),
                session.store.latest().cloned(),
            )
        };
        let (Some(world_t_camera), Some(transform)) = (world_t_camera, transform) else {
            self.end_bridge(BridgeError::NoTransform);
            return Some(Err(BridgeError::NoTransform));
        };

        let prepared = self.prepare(frame);
        if self.is_cancelled() {
            self.bridge.stop();
            return None;
        }

        let result = self.bridge.track(
            &prepared.image,
            &prepared.camera,
            prepared.timestamp,
            &world_t_camera,
            &transform.anchor_t_world,
        );
        if self.is_cancelled() {
            self.bridge.stop();
            return None;
        }

        match &result {
            Ok(update) => {
                let pair = PairedPose {
                    timestamp: update.anchor_pose.timestamp,
                    world_t_camera,
                    anchor_t_camera: update.anchor_pose.anchor_t_camera.clone(),
                };
                if let Err(err) = self.register_pair(pair) {
                    debug!("bridge pose not used for alignment: {}", err);
                }
                let mut session = self.shared.session.lock();
                session.stats.bridge_feature_count = update.feature_count;
                session.stats.bridge_frames += 1;
            }
            Err(err) => self.end_bridge(*err),
        }
        Some(result)
    }

    fn end_bridge(&mut self, reason: BridgeError) {
        self.bridge.stop();
        info!("bridge session ended: {}", reason);
        let mut session = self.shared.session.lock();
        session.stats.bridge_feature_count = 0;
        session.stats.bridge_aborts += 1;
    }
}
