//! Gyroscope/accelerometer integrator.
//!
//! Keeps a unit quaternion mapping controller space to world space, a gravity
//! estimate in controller space and a continuously updated gyro bias. The
//! world frame is Y-up; a controller lying flat and still reads gravity as
//! `(0, -1, 0)` g.

use nalgebra::{UnitQuaternion, Vector3};
use tracing::{debug, trace};

use crate::config::MotionSettings;

const DEG_TO_RAD: f32 = std::f32::consts::PI / 180.0;

/// Accelerometer magnitudes this far from 1 g are not used for tilt correction.
const GRAVITY_CORRECTION_BAND: f32 = 0.25;

pub fn world_down() -> Vector3<f32> {
    Vector3::new(0.0, -1.0, 0.0)
}

/// Running estimate of the gyro's resting bias.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GyroCalibration {
    bias: Vector3<f32>,
    samples: u32,
}

impl GyroCalibration {
    /// Fold a resting sample into the bias. Up to `window` samples form a plain
    /// mean, after that the estimate follows an exponential average.
    pub fn add_sample(&mut self, gyro: &Vector3<f32>, window: u32) {
        let window = window.max(1);
        if self.samples < window {
            self.samples += 1;
        }
        self.bias += (gyro - self.bias) / self.samples as f32;
    }

    pub fn bias(&self) -> &Vector3<f32> {
        &self.bias
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn reset(&mut self) {
        self.bias = Vector3::zeros();
        self.samples = 0;
    }
}

#[derive(Debug, Clone)]
pub struct MotionFusion {
    settings: MotionSettings,
    calibration: GyroCalibration,
    raw_gyro: Vector3<f32>,
    raw_accel: Vector3<f32>,
    calibrated_gyro: Vector3<f32>,
    orientation: UnitQuaternion<f32>,
    gravity: Vector3<f32>,
    processed_acceleration: Vector3<f32>,
    gravity_corrections: u32,
}

impl MotionFusion {
    pub fn new(settings: &MotionSettings) -> Self {
        Self {
            settings: settings.clone(),
            calibration: GyroCalibration::default(),
            raw_gyro: Vector3::zeros(),
            raw_accel: Vector3::zeros(),
            calibrated_gyro: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            gravity: world_down(),
            processed_acceleration: Vector3::zeros(),
            gravity_corrections: 0,
        }
    }

    /// Back to identity orientation with an empty calibration history.
    pub fn reset(&mut self) {
        *self = Self::new(&self.settings);
    }

    /// Forget the accumulated gyro bias. Orientation is kept.
    pub fn reset_continuous_calibration(&mut self) {
        debug!(
            "Resetting continuous calibration after {} samples",
            self.calibration.samples()
        );
        self.calibration.reset();
    }

    /// Integrate one sample. `gyro` is in deg/s, `accel` in g, `delta_time` in seconds.
    pub fn process_motion(&mut self, gyro: Vector3<f32>, accel: Vector3<f32>, delta_time: f32) {
        self.raw_gyro = gyro;
        self.raw_accel = accel;

        let accel_norm = accel.norm();
        if self.settings.continuous_calibration && self.is_still(&gyro, accel_norm) {
            self.calibration
                .add_sample(&gyro, self.settings.calibration_window);
        }
        self.calibrated_gyro = gyro - self.calibration.bias();

        let dt = if delta_time.is_finite() { delta_time } else { 0.0 };
        if dt > 0.0 {
            let step = UnitQuaternion::from_scaled_axis(self.calibrated_gyro * DEG_TO_RAD * dt);
            self.orientation *= step;
            self.orientation.renormalize();
        }

        self.correct_tilt(&accel, accel_norm, dt);

        self.gravity = self.orientation.inverse() * world_down();
        self.processed_acceleration = accel - self.gravity;

        trace!(
            "Motion step dt={:.4} gyro={:?} gravity={:?}",
            dt,
            self.calibrated_gyro,
            self.gravity
        );
    }

    fn is_still(&self, gyro: &Vector3<f32>, accel_norm: f32) -> bool {
        gyro.norm() < self.settings.stillness_gyro_threshold
            && (accel_norm - 1.0).abs() <= self.settings.stillness_accel_tolerance
    }

    // Pull the predicted gravity toward the measured one. The first usable
    // sample snaps the tilt fully.
    fn correct_tilt(&mut self, accel: &Vector3<f32>, accel_norm: f32, dt: f32) {
        if accel_norm <= f32::EPSILON || (accel_norm - 1.0).abs() > GRAVITY_CORRECTION_BAND {
            return;
        }

        let factor = if self.gravity_corrections == 0 {
            1.0
        } else {
            (self.settings.gravity_correction_rate * dt).clamp(0.0, 1.0)
        };
        if factor <= 0.0 {
            return;
        }

        let predicted = self.orientation.inverse() * world_down();
        let measured = accel / accel_norm;
        if let Some(error) = UnitQuaternion::rotation_between(&predicted, &measured) {
            let partial = error.powf(factor);
            self.orientation *= partial.inverse();
            self.orientation.renormalize();
            self.gravity_corrections = self.gravity_corrections.saturating_add(1);
        }
    }

    pub fn gravity_trusted(&self) -> bool {
        self.gravity_corrections > 0
    }

    pub fn raw_gyro(&self) -> &Vector3<f32> {
        &self.raw_gyro
    }

    pub fn raw_accel(&self) -> &Vector3<f32> {
        &self.raw_accel
    }

    pub fn calibrated_gyro(&self) -> &Vector3<f32> {
        &self.calibrated_gyro
    }

    pub fn calibration(&self) -> &GyroCalibration {
        &self.calibration
    }

    pub fn orientation(&self) -> &UnitQuaternion<f32> {
        &self.orientation
    }

    pub fn gravity(&self) -> &Vector3<f32> {
        &self.gravity
    }

    pub fn processed_acceleration(&self) -> &Vector3<f32> {
        &self.processed_acceleration
    }
}
