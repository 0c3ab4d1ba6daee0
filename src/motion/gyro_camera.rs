//! Gyro to 2D camera delta mapping with tightening and tiered smoothing.

use nalgebra::{Vector2, Vector3};
use tracing::trace;

use super::smoothing::SmoothingBuffer;
use crate::config::MotionSettings;

/// Camera rate `(yaw, pitch)` taken straight from controller space.
pub fn gyro_camera_local(gyro: &Vector3<f32>) -> Vector2<f32> {
    Vector2::new(gyro.y, gyro.x)
}

/// Camera rate `(yaw, pitch)` relative to gravity, so tilting the controller
/// does not change which physical motion turns the camera.
///
/// Yaw is the rotation around the gravity axis, relaxed by `yaw_relax_factor`
/// and capped by the magnitude of the non-pitch gyro components. Pitch is the
/// x component of the gyro projected onto the plane orthogonal to gravity.
pub fn gyro_camera_world(
    gyro: &Vector3<f32>,
    gravity: &Vector3<f32>,
    yaw_relax_factor: f32,
) -> Vector2<f32> {
    let Some(grav_norm) = gravity.try_normalize(f32::EPSILON) else {
        return gyro_camera_local(gyro);
    };

    let world_yaw = -grav_norm.dot(gyro);
    let yaw_cap = Vector2::new(gyro.y, gyro.z).norm();
    let yaw = world_yaw.signum() * (world_yaw.abs() * yaw_relax_factor).min(yaw_cap);

    let projected = gyro - grav_norm * grav_norm.dot(gyro);
    Vector2::new(yaw, projected.x)
}

pub fn direct_input(input: Vector2<f32>) -> Vector2<f32> {
    input
}

/// Scale inputs below `threshold` toward zero by `|input| / threshold`.
pub fn tightened_input(input: Vector2<f32>, threshold: f32) -> Vector2<f32> {
    let magnitude = input.norm();
    if magnitude < threshold {
        return input * (magnitude / threshold);
    }
    input
}

/// Turns gyro readings into per-tick camera deltas for one slot.
#[derive(Debug, Clone)]
pub struct GyroCameraSensor {
    id: usize,
    use_world_space: bool,
    tightening_threshold: f32,
    smoothing_lower_threshold: f32,
    smoothing_upper_threshold: f32,
    yaw_relax_factor: f32,
    buffer: SmoothingBuffer,
    last_delta: Vector2<f32>,
}

impl GyroCameraSensor {
    pub fn new(settings: &MotionSettings) -> Self {
        Self {
            id: 0,
            use_world_space: settings.use_world_space,
            tightening_threshold: settings.tightening_threshold,
            smoothing_lower_threshold: settings.smoothing_lower_threshold,
            smoothing_upper_threshold: settings.smoothing_upper_threshold,
            yaw_relax_factor: settings.yaw_relax_factor,
            buffer: SmoothingBuffer::new(settings.smoothing_buffer_size),
            last_delta: Vector2::zeros(),
        }
    }

    pub fn init(&mut self, id: usize) {
        self.id = id;
        self.reset();
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.last_delta = Vector2::zeros();
    }

    /// Map `gyro` (deg/s) to a camera delta in degrees for this tick.
    /// `gravity` is only passed when the estimate can be trusted.
    pub fn update(
        &mut self,
        gyro: &Vector3<f32>,
        gravity: Option<&Vector3<f32>>,
        delta_time: f32,
    ) -> Vector2<f32> {
        let rate = match gravity {
            Some(gravity) if self.use_world_space => {
                gyro_camera_world(gyro, gravity, self.yaw_relax_factor)
            }
            _ => gyro_camera_local(gyro),
        };

        let tightened = tightened_input(rate, self.tightening_threshold);
        let smoothed = self.tiered_smoothed_input(
            tightened,
            self.smoothing_lower_threshold,
            self.smoothing_upper_threshold,
        );

        self.last_delta = smoothed * delta_time.max(0.0);
        trace!("Gyro camera slot {} delta {:?}", self.id, self.last_delta);
        self.last_delta
    }

    pub fn smoothed_input(&mut self, input: Vector2<f32>) -> Vector2<f32> {
        self.buffer.push(input)
    }

    /// Blend direct and smoothed input by magnitude between `threshold1` and `threshold2`.
    pub fn tiered_smoothed_input(
        &mut self,
        input: Vector2<f32>,
        threshold1: f32,
        threshold2: f32,
    ) -> Vector2<f32> {
        let magnitude = input.norm();
        let range = threshold2 - threshold1;
        let direct_weight = if range.abs() <= f32::EPSILON {
            1.0
        } else {
            ((magnitude - threshold1) / range).clamp(0.0, 1.0)
        };

        direct_input(input * direct_weight) + self.smoothed_input(input * (1.0 - direct_weight))
    }

    pub fn last_delta(&self) -> &Vector2<f32> {
        &self.last_delta
    }
}
