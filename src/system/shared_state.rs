//! State shared between the tracker callback thread, the relocalization
//! worker and consumer threads.
//!
//! All mutable session data sits behind one mutex. Critical sections only
//! mutate data; network calls, optical flow and pose solving run outside.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::alignment::SmoothedTransformStore;
use crate::config::ControllerConfig;
use crate::history::{AnchorPoseHistory, PoseHistory};

use super::events::EventRelay;
use super::interfaces::ObjectId;

/// Session diagnostics, forwarded with every consumer sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    pub requests_sent: u64,
    pub successful_requests: u64,
    /// Answers below the correspondence minimum.
    pub insufficient_results: u64,
    /// Transport or service failures.
    pub failed_requests: u64,
    pub first_success: Option<f64>,
    pub last_success: Option<f64>,
    pub first_failure: Option<f64>,
    pub last_failure: Option<f64>,
    /// Correspondences in the active bridge session, 0 when inactive.
    pub bridge_feature_count: usize,
    pub bridge_frames: u64,
    pub bridge_aborts: u64,
    pub recovered_scale: Option<f64>,
}

impl SessionStats {
    pub fn record_success(&mut self, now: f64) {
        self.successful_requests += 1;
        self.first_success.get_or_insert(now);
        self.last_success = Some(now);
    }

    pub fn record_failure(&mut self, now: f64) {
        self.first_failure.get_or_insert(now);
        self.last_failure = Some(now);
    }
}

/// Everything a full reset discards.
pub struct SessionState {
    pub pose_history: PoseHistory,
    pub anchor_history: AnchorPoseHistory,
    pub store: SmoothedTransformStore,
    pub tracked_ids: BTreeSet<ObjectId>,
    /// World frame the pose history is expressed in.
    pub reference_system: Option<u64>,
    pub stats: SessionStats,
    pub relay: EventRelay,
}

impl SessionState {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            pose_history: PoseHistory::new(),
            anchor_history: AnchorPoseHistory::new(),
            store: SmoothedTransformStore::new(config.smoothing),
            tracked_ids: BTreeSet::new(),
            reference_system: None,
            stats: SessionStats::default(),
            relay: EventRelay::new(),
        }
    }

    /// Drop all session data. The relay keeps its state so the caller can
    /// observe the now-empty output and emit `Lost`.
    fn clear(&mut self, scope: ResetScope) {
        self.pose_history.clear();
        self.anchor_history.clear();
        self.store.clear();
        if scope == ResetScope::Full {
            self.tracked_ids.clear();
        }
        self.reference_system = None;
        self.stats = SessionStats::default();
    }
}

/// What a session reset discards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetScope {
    /// World tracking lost or an explicit reset: everything goes.
    Full,
    /// The tracker switched world frames. Poses and the alignment are stale,
    /// but the tracked objects are still tracked and no `found` event will
    /// announce them again.
    WorldFrame,
}

pub struct SharedState {
    pub session: Mutex<SessionState>,

    /// Incremented on every reset. Worker results computed under an older
    /// epoch are discarded.
    epoch: AtomicU64,

    /// Request the worker to exit.
    shutdown_requested: AtomicBool,
}

impl SharedState {
    pub fn new(config: &ControllerConfig) -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(SessionState::new(config)),
            epoch: AtomicU64::new(0),
            shutdown_requested: AtomicBool::new(false),
        })
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Reset the session. Takes the held session lock so the epoch and the
    /// cleared data change together.
    pub fn reset_locked(&self, session: &mut SessionState, scope: ResetScope) {
        session.clear(scope);
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }
}
