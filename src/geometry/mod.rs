//! Geometry: rigid and similarity transforms, absolute orientation, P3P and PnP.

pub mod absolute_orientation;
pub mod frames;
pub mod p3p;
pub mod pnp;
pub mod se3;
pub mod sim3;
pub mod so3;

pub use absolute_orientation::{solve_absolute_orientation, HornSolver, ScaleSolver};
pub use frames::gravity_in_camera;
pub use pnp::{solve_pnp_ransac, PnPConfig, PnPResult};
pub use se3::SE3;
pub use sim3::Sim3;
