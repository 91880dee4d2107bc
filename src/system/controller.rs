//! Anchor Alignment Controller: session lifecycle and the tracker-facing API.
//!
//! The controller owns the shared state and the relocalization worker. Pose
//! samples and lifecycle events arrive on the world tracker's callback
//! thread and are handled with short critical sections; consumers query the
//! smoothed transform from any thread.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{bail, Context, Result};
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::alignment::AnchorWorldEstimator;
use crate::config::ControllerConfig;
use crate::geometry::{Sim3, SE3};

use super::interfaces::{
    AnchorEvent, AnchorSample, Collaborators, DownstreamConsumer, PoseUpdate,
    TrackingEvent, WorldTrackerListener,
};
use super::shared_state::{ResetScope, SessionState, SessionStats, SharedState};
use super::worker::{RelocalizationWorker, TickOutcome};

/// Tracker-facing half of the controller, registered as the world
/// tracker's listener.
struct ControllerCore {
    config: ControllerConfig,
    shared: Arc<SharedState>,
    consumer: Arc<dyn DownstreamConsumer>,
}

impl ControllerCore {
    fn handle_pose(&self, update: PoseUpdate) {
        let mut events = Vec::new();
        let sample = {
            let mut session = self.shared.session.lock();

            if session
                .reference_system
                .is_some_and(|current| current != update.reference_system)
            {
                info!(
                    reference_system = update.reference_system,
                    "world reference system changed, resetting session"
                );
                events.extend(self.reset_locked(
                    &mut session,
                    ResetScope::WorldFrame,
                    update.timestamp,
                ));
            }
            session.reference_system = Some(update.reference_system);

            if !session
                .pose_history
                .append(update.timestamp, update.world_t_camera.clone())
            {
                debug!(timestamp = update.timestamp, "ignoring out-of-order pose sample");
            }
            session
                .pose_history
                .prune(self.config.pose_history.max_age, self.config.pose_history.max_count);

            let sample = build_sample(&session, update.timestamp, &update.world_t_camera);
            if let Some(kind) = session.relay.observe(sample.len()) {
                events.push(AnchorEvent {
                    kind,
                    timestamp: update.timestamp,
                    object_ids: sample.object_ids.clone(),
                });
            }
            sample
        };

        for event in &events {
            self.consumer.on_event(event);
        }
        self.consumer.on_sample(&sample);
    }

    fn handle_tracking_event(&self, event: TrackingEvent) {
        let lost = {
            let mut session = self.shared.session.lock();
            if event.found {
                session.tracked_ids.extend(event.object_ids.iter().copied());
                None
            } else {
                info!("world tracking lost, resetting session");
                self.reset_locked(&mut session, ResetScope::Full, event.timestamp)
            }
        };

        if let Some(lost) = lost {
            self.consumer.on_event(&lost);
        }
    }

    /// Reset under the held lock; returns the `Lost` event if output was present.
    fn reset_locked(
        &self,
        session: &mut SessionState,
        scope: ResetScope,
        timestamp: f64,
    ) -> Option<AnchorEvent> {
        let object_ids = session.tracked_ids.iter().copied().collect();
        self.shared.reset_locked(session, scope);
        session.relay.observe(0).map(|kind| AnchorEvent {
            kind,
            timestamp,
            object_ids,
        })
    }
}

impl WorldTrackerListener for ControllerCore {
    fn on_pose(&self, update: PoseUpdate) {
        self.handle_pose(update);
    }

    fn on_tracking_event(&self, event: TrackingEvent) {
        self.handle_tracking_event(event);
    }
}

/// Anchor-relative output for one tracker sample.
fn build_sample(session: &SessionState, timestamp: f64, world_t_camera: &SE3) -> AnchorSample {
    let mut sample = AnchorSample {
        timestamp,
        object_ids: Vec::new(),
        orientations: Vec::new(),
        positions: Vec::new(),
        metadata: session.stats.clone(),
    };
    let Some(anchor_t_world) = session.store.query(timestamp) else {
        return sample;
    };

    let anchor_t_camera = anchor_t_world.transform_pose(world_t_camera);
    for &id in &session.tracked_ids {
        sample.object_ids.push(id);
        sample.orientations.push(anchor_t_camera.rotation);
        sample.positions.push(anchor_t_camera.translation);
    }
    sample
}

enum Worker {
    Threaded {
        stop: Sender<()>,
        handle: Option<JoinHandle<()>>,
    },
    /// Driven by explicit [`AnchorAlignmentController::step`] calls.
    Manual(Mutex<RelocalizationWorker>),
}

pub struct AnchorAlignmentController {
    core: Arc<ControllerCore>,
    worker: Worker,
}

impl AnchorAlignmentController {
    /// Validate the configuration, wire the collaborators and spawn the
    /// relocalization worker.
    pub fn start(config: ControllerConfig, collaborators: Collaborators) -> Result<Self> {
        let (core, worker) = Self::build(config, collaborators)?;
        let (stop, stop_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("relocalization".into())
            .spawn(move || {
                let mut worker = worker;
                worker.run(stop_rx);
            })
            .context("failed to spawn relocalization worker")?;

        Ok(Self {
            core,
            worker: Worker::Threaded {
                stop,
                handle: Some(handle),
            },
        })
    }

    /// Like [`start`](Self::start), but without a worker thread; the host
    /// advances the worker with [`step`](Self::step).
    pub fn start_manual(config: ControllerConfig, collaborators: Collaborators) -> Result<Self> {
        let (core, worker) = Self::build(config, collaborators)?;
        Ok(Self {
            core,
            worker: Worker::Manual(Mutex::new(worker)),
        })
    }

    fn build(
        config: ControllerConfig,
        collaborators: Collaborators,
    ) -> Result<(Arc<ControllerCore>, RelocalizationWorker)> {
        config
            .validate()
            .context("invalid controller configuration")?;
        let map = config
            .map
            .resolve()
            .context("invalid map configuration")?;
        info!(
            selection = ?map.selection,
            environment = %map.environment,
            "starting anchor alignment session"
        );

        let shared = SharedState::new(&config);
        let core = Arc::new(ControllerCore {
            config: config.clone(),
            shared: shared.clone(),
            consumer: collaborators.consumer.clone(),
        });

        collaborators
            .tracker
            .attach_frame_source(collaborators.frames.clone());
        collaborators.tracker.subscribe(core.clone());

        let worker = RelocalizationWorker::new(
            config,
            map,
            shared,
            collaborators,
            AnchorWorldEstimator::new(),
        );
        Ok((core, worker))
    }

    /// Run one worker iteration. Only available without a worker thread.
    pub fn step(&self) -> Result<TickOutcome> {
        match &self.worker {
            Worker::Manual(worker) => Ok(worker.lock().tick()),
            Worker::Threaded { .. } => bail!("controller runs a worker thread; step() is unavailable"),
        }
    }

    /// Feed a pose sample directly, bypassing the tracker subscription.
    pub fn on_pose(&self, update: PoseUpdate) {
        self.core.handle_pose(update);
    }

    /// Feed a lifecycle event directly, bypassing the tracker subscription.
    pub fn on_tracking_event(&self, event: TrackingEvent) {
        self.core.handle_tracking_event(event);
    }

    /// Discard all session state, as if world tracking had been lost.
    pub fn reset(&self, timestamp: f64) {
        let lost = {
            let mut session = self.core.shared.session.lock();
            self.core
                .reset_locked(&mut session, ResetScope::Full, timestamp)
        };
        if let Some(lost) = lost {
            self.core.consumer.on_event(&lost);
        }
    }

    /// Smoothed `anchor_T_world` at `timestamp`.
    pub fn query(&self, timestamp: f64) -> Option<Sim3> {
        self.core.shared.session.lock().store.query(timestamp)
    }

    /// Camera pose in the anchor frame for a world-tracker pose.
    pub fn anchor_pose(&self, timestamp: f64, world_t_camera: &SE3) -> Option<SE3> {
        self.query(timestamp)
            .map(|anchor_t_world| anchor_t_world.transform_pose(world_t_camera))
    }

    pub fn stats(&self) -> SessionStats {
        self.core.shared.session.lock().stats.clone()
    }

    pub fn is_anchored(&self) -> bool {
        self.core.shared.session.lock().store.is_valid()
    }

    /// Stop the worker and wait for it to exit.
    pub fn shutdown(&mut self) {
        self.core.shared.request_shutdown();
        if let Worker::Threaded { stop, handle } = &mut self.worker {
            let _ = stop.try_send(());
            if let Some(handle) = handle.take() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for AnchorAlignmentController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
