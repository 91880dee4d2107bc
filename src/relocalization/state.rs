//! Relocalization loop state machine.
//!
//! `Idle → Throttled → Requesting → {Succeeded, Insufficient, Failed} → Idle`
//!
//! Holds only policy: throttling, the adaptive correspondence minimum and
//! result classification. The worker performs the I/O around it.

use crate::config::RelocalizationConfig;
use crate::error::RelocalizationError;

use super::RelocalizationResponse;

/// Why a tick did not issue a request. Not an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThrottleReason {
    EmptyHistory,
    /// The last attempt was too recent.
    MinInterval { remaining: f64 },
    NoGpsFix,
    NoFrame,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoopState {
    Idle,
    Throttled(ThrottleReason),
    Requesting,
    Succeeded,
    Insufficient,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Succeeded { correspondences: usize },
    /// The service answered but with fewer correspondences than required.
    Insufficient { correspondences: usize, required: usize },
    Failed(RelocalizationError),
}

pub struct RelocalizationLoop {
    config: RelocalizationConfig,
    state: LoopState,
    last_attempt: Option<f64>,
    has_succeeded: bool,
}

impl RelocalizationLoop {
    pub fn new(config: RelocalizationConfig) -> Self {
        Self {
            config,
            state: LoopState::Idle,
            last_attempt: None,
            has_succeeded: false,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn has_succeeded(&self) -> bool {
        self.has_succeeded
    }

    /// Correspondences required for a result to count as a success.
    pub fn min_correspondences(&self) -> usize {
        if self.has_succeeded {
            self.config.min_correspondences
        } else {
            self.config.min_correspondences_initial
        }
    }

    /// Check the preconditions for leaving `Idle`.
    pub fn poll(&mut self, now: f64, history_empty: bool, has_gps_fix: bool) -> Result<(), ThrottleReason> {
        self.state = LoopState::Idle;

        if history_empty {
            return Err(self.throttle(ThrottleReason::EmptyHistory));
        }
        if let Some(last) = self.last_attempt {
            let elapsed = now - last;
            if elapsed < self.config.min_request_interval {
                return Err(self.throttle(ThrottleReason::MinInterval {
                    remaining: self.config.min_request_interval - elapsed,
                }));
            }
        }
        if !has_gps_fix {
            return Err(self.throttle(ThrottleReason::NoGpsFix));
        }
        Ok(())
    }

    /// Defer the current tick.
    pub fn throttle(&mut self, reason: ThrottleReason) -> ThrottleReason {
        self.state = LoopState::Throttled(reason);
        reason
    }

    pub fn begin_request(&mut self, now: f64) {
        self.state = LoopState::Requesting;
        self.last_attempt = Some(now);
    }

    /// Classify the service's answer.
    ///
    /// A transport or service failure leaves no trace in the throttle, so
    /// the next tick retries.
    pub fn classify(
        &mut self,
        result: Result<&RelocalizationResponse, RelocalizationError>,
    ) -> Classification {
        let response = match result.and_then(|r| r.validate().map(|()| r)) {
            Ok(response) => response,
            Err(err) => {
                self.state = LoopState::Failed;
                self.last_attempt = None;
                return Classification::Failed(err);
            }
        };

        let correspondences = response.correspondence_count();
        let required = self.min_correspondences();
        if correspondences < required {
            self.state = LoopState::Insufficient;
            return Classification::Insufficient {
                correspondences,
                required,
            };
        }

        self.state = LoopState::Succeeded;
        self.has_succeeded = true;
        Classification::Succeeded { correspondences }
    }

    pub fn reset(&mut self) {
        self.state = LoopState::Idle;
        self.last_attempt = None;
        self.has_succeeded = false;
    }
}
