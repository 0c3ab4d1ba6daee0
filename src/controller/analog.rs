//! Analog axis caches with change-or-deflection reporting.

use serde::{Deserialize, Serialize};

use super::sample::RawControllerSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisKind {
    LeftX,
    LeftY,
    RightX,
    RightY,
    LeftTrigger,
    RightTrigger,
    GyroX,
    GyroY,
}

impl AxisKind {
    /// Stick and trigger axes in emission order.
    pub const ANALOG: [AxisKind; 6] = [
        AxisKind::LeftX,
        AxisKind::LeftY,
        AxisKind::RightX,
        AxisKind::RightY,
        AxisKind::LeftTrigger,
        AxisKind::RightTrigger,
    ];

    pub const GYRO: [AxisKind; 2] = [AxisKind::GyroX, AxisKind::GyroY];

    pub fn key_name(self) -> &'static str {
        match self {
            AxisKind::LeftX => "Gamepad_LeftX",
            AxisKind::LeftY => "Gamepad_LeftY",
            AxisKind::RightX => "Gamepad_RightX",
            AxisKind::RightY => "Gamepad_RightY",
            AxisKind::LeftTrigger => "Gamepad_LeftTriggerAxis",
            AxisKind::RightTrigger => "Gamepad_RightTriggerAxis",
            AxisKind::GyroX => "DS5W_GyroAxis_X",
            AxisKind::GyroY => "DS5W_GyroAxis_Y",
        }
    }

    pub fn is_trigger(self) -> bool {
        matches!(self, AxisKind::LeftTrigger | AxisKind::RightTrigger)
    }

    /// Raw value of this axis in `sample`. Gyro axes are not part of the raw
    /// report and read as zero.
    pub fn raw_from(self, sample: &RawControllerSample) -> i16 {
        match self {
            AxisKind::LeftX => sample.left_stick.x.into(),
            AxisKind::LeftY => sample.left_stick.y.into(),
            AxisKind::RightX => sample.right_stick.x.into(),
            AxisKind::RightY => sample.right_stick.y.into(),
            AxisKind::LeftTrigger => sample.left_trigger.into(),
            AxisKind::RightTrigger => sample.right_trigger.into(),
            AxisKind::GyroX | AxisKind::GyroY => 0,
        }
    }
}

/// Stick raw [-127, 127] to [-1, 1]. -128 clamps to -1.
pub fn normalize_stick(raw: i16) -> f32 {
    (raw as f32 / 127.0).clamp(-1.0, 1.0)
}

/// Trigger raw [0, 255] to [0, 1].
pub fn normalize_trigger(raw: i16) -> f32 {
    (raw as f32 / 255.0).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalogAxis {
    kind: AxisKind,
    last_raw: i16,
    deadzone: i16,
}

impl AnalogAxis {
    pub fn new(kind: AxisKind, deadzone: i16) -> Self {
        Self {
            kind,
            last_raw: 0,
            deadzone,
        }
    }

    pub fn kind(&self) -> AxisKind {
        self.kind
    }

    pub fn last_raw(&self) -> i16 {
        self.last_raw
    }

    pub fn deadzone(&self) -> i16 {
        self.deadzone
    }

    pub fn is_neutral(&self) -> bool {
        self.last_raw == 0
    }

    pub fn normalize(&self, raw: i16) -> f32 {
        if self.kind.is_trigger() {
            normalize_trigger(raw)
        } else {
            normalize_stick(raw)
        }
    }

    /// Store `raw` and return the normalized value if it should be reported.
    pub fn update(&mut self, raw: i16) -> Option<f32> {
        let report = raw != self.last_raw || raw.unsigned_abs() > self.deadzone.unsigned_abs();
        self.last_raw = raw;
        report.then(|| self.normalize(raw))
    }

    pub fn reset(&mut self) {
        self.last_raw = 0;
    }
}

/// Float axis fed from the motion pipeline, same reporting rule with no deadzone.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GyroAxis {
    last: f32,
}

impl GyroAxis {
    pub fn update(&mut self, value: f32) -> Option<f32> {
        let report = value != self.last || value != 0.0;
        self.last = value;
        report.then_some(value)
    }

    pub fn last(&self) -> f32 {
        self.last
    }

    pub fn is_neutral(&self) -> bool {
        self.last == 0.0
    }

    pub fn reset(&mut self) {
        self.last = 0.0;
    }
}
