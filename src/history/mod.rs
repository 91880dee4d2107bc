//! Time-bounded pose histories.
//!
//! Both histories are bounded by age and by count so that sustained
//! operation cannot grow memory without limit.

pub mod anchor_history;
pub mod pose_history;

pub use anchor_history::{AnchorPose, AnchorPoseHistory, PairedPose};
pub use pose_history::{PoseHistory, PoseSample};
