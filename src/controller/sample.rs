//! Raw controller sample as delivered by the transport, one per slot per tick.

use bitflags::bitflags;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Gyro counts per degree per second (±2000 dps over 16 bits)
pub const GYRO_COUNTS_PER_DPS: f32 = 16.384;
/// Accelerometer counts per g
pub const ACCEL_COUNTS_PER_G: f32 = 8192.0;

bitflags! {
    /// Face buttons and d-pad byte
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DpadFaceButtons: u8 {
        const DPAD_LEFT  = 0x01;
        const DPAD_DOWN  = 0x02;
        const DPAD_RIGHT = 0x04;
        const DPAD_UP    = 0x08;
        const SQUARE     = 0x10;
        const CROSS      = 0x20;
        const CIRCLE     = 0x40;
        const TRIANGLE   = 0x80;
    }
}

bitflags! {
    /// Shoulder, menu and stick-click byte
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ButtonsA: u8 {
        const LEFT_BUMPER  = 0x01;
        const RIGHT_BUMPER = 0x02;
        const LEFT_TRIGGER = 0x04;
        const RIGHT_TRIGGER = 0x08;
        const SELECT       = 0x10;
        const MENU         = 0x20;
        const LEFT_STICK   = 0x40;
        const RIGHT_STICK  = 0x80;
    }
}

bitflags! {
    /// System button byte
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ButtonsB: u8 {
        const PLAYSTATION_LOGO = 0x01;
        const PAD_BUTTON       = 0x02;
        const MIC_BUTTON       = 0x04;
    }
}

/// Centered stick position, each axis in [-128, 127] with +y up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StickSample {
    pub x: i8,
    pub y: i8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisTriple {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

/// One raw input report. Button bytes keep the device's bit layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawControllerSample {
    pub buttons_and_dpad: u8,
    pub buttons_a: u8,
    pub buttons_b: u8,
    pub left_stick: StickSample,
    pub right_stick: StickSample,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub gyroscope: AxisTriple,
    pub accelerometer: AxisTriple,
}

impl RawControllerSample {
    pub fn dpad_face(&self) -> DpadFaceButtons {
        DpadFaceButtons::from_bits_truncate(self.buttons_and_dpad)
    }

    pub fn buttons_a(&self) -> ButtonsA {
        ButtonsA::from_bits_truncate(self.buttons_a)
    }

    pub fn buttons_b(&self) -> ButtonsB {
        ButtonsB::from_bits_truncate(self.buttons_b)
    }

    /// Angular rate in degrees per second.
    pub fn gyro_dps(&self) -> Vector3<f32> {
        Vector3::new(
            self.gyroscope.x as f32,
            self.gyroscope.y as f32,
            self.gyroscope.z as f32,
        ) / GYRO_COUNTS_PER_DPS
    }

    /// Acceleration in g, sign flipped so a resting controller reads the
    /// direction of gravity rather than the reaction force.
    pub fn accel_g(&self) -> Vector3<f32> {
        -Vector3::new(
            self.accelerometer.x as f32,
            self.accelerometer.y as f32,
            self.accelerometer.z as f32,
        ) / ACCEL_COUNTS_PER_G
    }
}
