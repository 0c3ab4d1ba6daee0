//! Motion subsystem for gyro aiming
//!
//! Raw gyroscope and accelerometer samples flow through three stages:
//!
//! 1. [`fusion`] - bias removal, orientation integration and gravity estimate
//! 2. [`gyro_camera`] - mapping to a 2D camera rate, tightening, tiered smoothing
//! 3. [`state`] - per-slot lifecycle and sample timing
//!
//! ```text
//! gyro/accel ──► MotionFusion ──► GyroCameraSensor ──► camera delta
//!                (orientation,     (SmoothingBuffer)
//!                 gravity)
//! ```

pub mod fusion;
pub mod gyro_camera;
pub mod smoothing;
pub mod state;

pub use fusion::{world_down, GyroCalibration, MotionFusion};
pub use gyro_camera::{
    direct_input, gyro_camera_local, gyro_camera_world, tightened_input, GyroCameraSensor,
};
pub use smoothing::SmoothingBuffer;
pub use state::{MotionPhase, MotionState};
