use chrono::{DateTime, Local};
use nalgebra::{UnitQuaternion, Vector2, Vector3};
use tracing::{debug, info};

use super::fusion::MotionFusion;
use super::gyro_camera::GyroCameraSensor;
use crate::config::MotionSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionPhase {
    Uninitialized,
    Tracking,
}

/// Per-slot motion tracking: fusion, camera mapping and sample timing.
#[derive(Debug, Clone)]
pub struct MotionState {
    id: usize,
    phase: MotionPhase,
    fusion: MotionFusion,
    camera: GyroCameraSensor,
    last_measurement: Option<DateTime<Local>>,
    delta_time: f32,
    max_delta_time: f32,
}

impl MotionState {
    pub fn new(settings: &MotionSettings) -> Self {
        Self {
            id: 0,
            phase: MotionPhase::Uninitialized,
            fusion: MotionFusion::new(settings),
            camera: GyroCameraSensor::new(settings),
            last_measurement: None,
            delta_time: 0.0,
            max_delta_time: settings.max_delta_time.max(0.0),
        }
    }

    /// Start tracking with zeroed history.
    pub fn init(&mut self, id: usize) {
        info!("Motion tracking started for slot {}", id);
        self.id = id;
        self.phase = MotionPhase::Tracking;
        self.fusion.reset();
        self.camera.init(id);
        self.last_measurement = None;
        self.delta_time = 0.0;
    }

    /// Drop all motion history and stop tracking.
    pub fn reset(&mut self) {
        if self.phase == MotionPhase::Tracking {
            debug!("Motion tracking stopped for slot {}", self.id);
        }
        self.phase = MotionPhase::Uninitialized;
        self.fusion.reset();
        self.camera.reset();
        self.last_measurement = None;
        self.delta_time = 0.0;
    }

    pub fn reset_continuous_calibration(&mut self) {
        self.fusion.reset_continuous_calibration();
    }

    /// Feed a sample taken at `now`. The delta time is measured from the
    /// previous sample; the first sample after `init` has a delta of zero.
    /// Gaps longer than `max_delta_time` (or a clock going backwards) are
    /// clamped.
    /// Returns the camera delta, or `None` while not tracking.
    pub fn update(
        &mut self,
        gyro: Vector3<f32>,
        accel: Vector3<f32>,
        now: DateTime<Local>,
    ) -> Option<Vector2<f32>> {
        if self.phase != MotionPhase::Tracking {
            return None;
        }

        let delta_time = match self.last_measurement {
            Some(last) => (now - last)
                .num_microseconds()
                .map(|us| us as f32 / 1_000_000.0)
                .unwrap_or(0.0),
            None => 0.0,
        };
        self.last_measurement = Some(now);

        Some(self.process_motion(gyro, accel, delta_time))
    }

    pub fn process_motion(
        &mut self,
        gyro: Vector3<f32>,
        accel: Vector3<f32>,
        delta_time: f32,
    ) -> Vector2<f32> {
        let clamped = delta_time.max(0.0).min(self.max_delta_time);
        if clamped < delta_time {
            debug!(
                "Slot {} motion gap of {:.3}s clamped to {:.3}s",
                self.id, delta_time, clamped
            );
        }
        self.delta_time = clamped;
        self.fusion.process_motion(gyro, accel, self.delta_time);

        let gravity = self
            .fusion
            .gravity_trusted()
            .then(|| *self.fusion.gravity());
        self.camera.update(
            self.fusion.calibrated_gyro(),
            gravity.as_ref(),
            self.delta_time,
        )
    }

    pub fn phase(&self) -> MotionPhase {
        self.phase
    }

    pub fn is_tracking(&self) -> bool {
        self.phase == MotionPhase::Tracking
    }

    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    pub fn last_measurement(&self) -> Option<DateTime<Local>> {
        self.last_measurement
    }

    pub fn orientation(&self) -> &UnitQuaternion<f32> {
        self.fusion.orientation()
    }

    pub fn gravity(&self) -> &Vector3<f32> {
        self.fusion.gravity()
    }

    pub fn calibrated_gyro(&self) -> &Vector3<f32> {
        self.fusion.calibrated_gyro()
    }

    pub fn processed_acceleration(&self) -> &Vector3<f32> {
        self.fusion.processed_acceleration()
    }

    pub fn raw_gyro(&self) -> &Vector3<f32> {
        self.fusion.raw_gyro()
    }

    pub fn raw_accel(&self) -> &Vector3<f32> {
        self.fusion.raw_accel()
    }

    pub fn last_delta(&self) -> &Vector2<f32> {
        self.camera.last_delta()
    }

    pub fn fusion(&self) -> &MotionFusion {
        &self.fusion
    }
}
