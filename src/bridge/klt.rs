//! Pyramidal Lucas-Kanade optical flow with a predicted initial displacement.
//!
//! Forward-additive formulation: the template patch is sampled once per level
//! in the previous frame, gradients are taken at the warped position in the
//! current frame, and the 2x2 normal equations are re-solved every iteration.
//! Tracking starts from the displacement towards a predicted location, scaled
//! down to the coarsest level, and is refined level by level.
//!
//! Bidirectional tracking runs the same solver from the current frame back to
//! the previous one and rejects points whose round trip does not close.

use nalgebra::Vector2;

use crate::config::BridgeConfig;
use crate::image::{interpolate_bilinear, Image, Pyramid};

/// Normal-equation determinant below which a patch is treated as textureless.
const MIN_DETERMINANT: f32 = 1e-6;

/// Outcome of tracking one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackStatus {
    Tracked,
    /// Singular normal equations (textureless patch).
    Lost,
    OutOfBounds,
    /// Converged further than the search radius from the predicted location.
    OutsideSearchRadius,
    /// Backward track did not return to the starting point.
    Inconsistent,
}

#[derive(Debug, Clone, Copy)]
pub struct TrackedPoint {
    pub position: Vector2<f64>,
    pub status: TrackStatus,
}

impl TrackedPoint {
    pub fn is_tracked(&self) -> bool {
        self.status == TrackStatus::Tracked
    }
}

enum LkResult {
    Converged(f32, f32),
    MaxIter(f32, f32),
    Singular,
}

pub struct KltTracker {
    /// Patch half-size; the patch is (2r + 1)².
    pub window_radius: usize,
    pub max_iterations: usize,
    /// Convergence threshold on the update, pixels.
    pub epsilon: f32,
    pub max_levels: usize,
}

impl KltTracker {
    pub fn new(window_radius: usize, max_iterations: usize, epsilon: f32, max_levels: usize) -> Self {
        Self {
            window_radius,
            max_iterations,
            epsilon,
            max_levels,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(
            config.window_radius,
            config.max_flow_iterations,
            config.flow_epsilon,
            config.pyramid_levels,
        )
    }

    /// Track `points` from `prev` to `curr`, starting each search at the
    /// matching entry of `predicted`.
    ///
    /// A point is kept only if it converges inside the image, within
    /// `search_radius` of its prediction, and tracks back to within
    /// `fb_tolerance` of where it started.
    pub fn track_bidirectional(
        &self,
        prev: &Pyramid,
        curr: &Pyramid,
        points: &[Vector2<f64>],
        predicted: &[Vector2<f64>],
        search_radius: f64,
        fb_tolerance: f64,
    ) -> Vec<TrackedPoint> {
        let num_levels = self.max_levels.min(prev.num_levels()).min(curr.num_levels()).max(1);
        let width = curr.base().width() as f64;
        let height = curr.base().height() as f64;

        points
            .iter()
            .zip(predicted.iter())
            .map(|(start, guess)| {
                let Some(forward) = self.track_point(prev, curr, start, guess, num_levels) else {
                    return TrackedPoint {
                        position: *start,
                        status: TrackStatus::Lost,
                    };
                };
                let status = if forward.x < 0.0 || forward.y < 0.0 || forward.x > width - 1.0 || forward.y > height - 1.0 {
                    TrackStatus::OutOfBounds
                } else if (forward - guess).norm() > search_radius {
                    TrackStatus::OutsideSearchRadius
                } else {
                    match self.track_point(curr, prev, &forward, start, num_levels) {
                        None => TrackStatus::Lost,
                        Some(back) if (back - start).norm() > fb_tolerance => TrackStatus::Inconsistent,
                        Some(_) => TrackStatus::Tracked,
                    }
                };
                TrackedPoint {
                    position: forward,
                    status,
                }
            })
            .collect()
    }

    /// Coarse-to-fine track of one point; `None` if any level is singular.
    fn track_point(
        &self,
        from: &Pyramid,
        to: &Pyramid,
        start: &Vector2<f64>,
        guess: &Vector2<f64>,
        num_levels: usize,
    ) -> Option<Vector2<f64>> {
        let coarsest = num_levels - 1;
        let coarse_scale = 1.0 / (1u32 << coarsest) as f32;
        let mut dx = (guess.x - start.x) as f32 * coarse_scale;
        let mut dy = (guess.y - start.y) as f32 * coarse_scale;

        for level in (0..num_levels).rev() {
            let scale = 1.0 / (1u32 << level) as f32;
            let x = start.x as f32 * scale;
            let y = start.y as f32 * scale;

            match self.lk_forward_additive(&from.levels[level], &to.levels[level], x, y, dx, dy) {
                LkResult::Converged(ndx, ndy) | LkResult::MaxIter(ndx, ndy) => {
                    dx = ndx;
                    dy = ndy;
                }
                LkResult::Singular => return None,
            }

            if level > 0 {
                dx *= 2.0;
                dy *= 2.0;
            }
        }

        Some(Vector2::new(start.x + dx as f64, start.y + dy as f64))
    }

    fn lk_forward_additive(
        &self,
        prev_img: &Image<f32>,
        curr_img: &Image<f32>,
        x: f32,
        y: f32,
        mut dx: f32,
        mut dy: f32,
    ) -> LkResult {
        let r = self.window_radius as isize;

        let template: Vec<f32> = (-r..=r)
            .flat_map(|py| (-r..=r).map(move |px| (px as f32, py as f32)))
            .map(|(px, py)| interpolate_bilinear(prev_img, x + px, y + py))
            .collect();

        for _ in 0..self.max_iterations {
            let mut h00 = 0.0f32;
            let mut h01 = 0.0f32;
            let mut h11 = 0.0f32;
            let mut b0 = 0.0f32;
            let mut b1 = 0.0f32;

            let mut k = 0;
            for py in -r..=r {
                for px in -r..=r {
                    let wx = x + dx + px as f32;
                    let wy = y + dy + py as f32;

                    let e = template[k] - interpolate_bilinear(curr_img, wx, wy);
                    k += 1;

                    let gx = 0.5
                        * (interpolate_bilinear(curr_img, wx + 1.0, wy)
                            - interpolate_bilinear(curr_img, wx - 1.0, wy));
                    let gy = 0.5
                        * (interpolate_bilinear(curr_img, wx, wy + 1.0)
                            - interpolate_bilinear(curr_img, wx, wy - 1.0));

                    h00 += gx * gx;
                    h01 += gx * gy;
                    h11 += gy * gy;
                    b0 += gx * e;
                    b1 += gy * e;
                }
            }

            let det = h00 * h11 - h01 * h01;
            if det.abs() < MIN_DETERMINANT {
                return LkResult::Singular;
            }
            let inv_det = 1.0 / det;
            let step_x = inv_det * (h11 * b0 - h01 * b1);
            let step_y = inv_det * (h00 * b1 - h01 * b0);

            dx += step_x;
            dy += step_y;

            if step_x * step_x + step_y * step_y < self.epsilon * self.epsilon {
                return LkResult::Converged(dx, dy);
            }
        }

        LkResult::MaxIter(dx, dy)
    }
}
