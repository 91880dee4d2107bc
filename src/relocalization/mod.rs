//! Relocalization: map selection, service interface and the throttled loop policy.

pub mod map_config;
pub mod service;
pub mod state;

pub use map_config::{MapConfiguration, MapSelection, MapSpec, ReleaseEnvironment};
pub use service::{GpsFix, RelocalizationRequest, RelocalizationResponse, RelocalizationService};
pub use state::{Classification, LoopState, RelocalizationLoop, ThrottleReason};
