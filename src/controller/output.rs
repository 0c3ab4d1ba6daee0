//! Output state (rumble, player LEDs, lightbar) and packet composition.
//!
//! The host writes into [`OutputState`] through the engine's setters at any
//! time; once per tick [`compose`] turns the accumulated state into the
//! [`OutputPacket`] the transport sends to the device.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::OutputSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForceFeedbackChannel {
    LeftLarge,
    LeftSmall,
    RightLarge,
    RightSmall,
}

/// Rumble magnitudes, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ForceFeedbackValues {
    pub left_large: f32,
    pub left_small: f32,
    pub right_large: f32,
    pub right_small: f32,
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

impl ForceFeedbackValues {
    pub fn clamped(self) -> Self {
        Self {
            left_large: clamp_unit(self.left_large),
            left_small: clamp_unit(self.left_small),
            right_large: clamp_unit(self.right_large),
            right_small: clamp_unit(self.right_small),
        }
    }

    pub fn set(&mut self, channel: ForceFeedbackChannel, value: f32) {
        let value = clamp_unit(value);
        match channel {
            ForceFeedbackChannel::LeftLarge => self.left_large = value,
            ForceFeedbackChannel::LeftSmall => self.left_small = value,
            ForceFeedbackChannel::RightLarge => self.right_large = value,
            ForceFeedbackChannel::RightSmall => self.right_small = value,
        }
    }

    pub fn large(&self) -> f32 {
        self.left_large.max(self.right_large)
    }

    pub fn small(&self) -> f32 {
        self.left_small.max(self.right_small)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedPosition {
    #[default]
    None,
    Left,
    MiddleLeft,
    Middle,
    MiddleRight,
    Right,
}

impl LedPosition {
    /// Host integer protocol: 1..=5 from the left, anything else is off.
    pub fn from_index(index: i32) -> Self {
        match index {
            1 => LedPosition::Left,
            2 => LedPosition::MiddleLeft,
            3 => LedPosition::Middle,
            4 => LedPosition::MiddleRight,
            5 => LedPosition::Right,
            _ => LedPosition::None,
        }
    }

    pub fn mask(self) -> PlayerLedMask {
        match self {
            LedPosition::None => PlayerLedMask::empty(),
            LedPosition::Left => PlayerLedMask::LEFT,
            LedPosition::MiddleLeft => PlayerLedMask::MIDDLE_LEFT,
            LedPosition::Middle => PlayerLedMask::MIDDLE,
            LedPosition::MiddleRight => PlayerLedMask::MIDDLE_RIGHT,
            LedPosition::Right => PlayerLedMask::RIGHT,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedBrightness {
    #[default]
    Low,
    Medium,
    High,
}

impl LedBrightness {
    /// Host integer protocol: 1 is high, 2 is medium, anything else low.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => LedBrightness::High,
            2 => LedBrightness::Medium,
            _ => LedBrightness::Low,
        }
    }

    /// Device encoding
    pub fn device_code(self) -> u8 {
        match self {
            LedBrightness::High => 0x00,
            LedBrightness::Medium => 0x01,
            LedBrightness::Low => 0x02,
        }
    }
}

bitflags! {
    /// Player indicator LEDs, left to right
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PlayerLedMask: u8 {
        const LEFT         = 0x01;
        const MIDDLE_LEFT  = 0x02;
        const MIDDLE       = 0x04;
        const MIDDLE_RIGHT = 0x08;
        const RIGHT        = 0x10;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerLedState {
    pub fade: bool,
    pub position: LedPosition,
    pub brightness: LedBrightness,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LightBarState {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub intensity: f32,
}

impl LightBarState {
    pub fn clamped(self) -> Self {
        Self {
            intensity: clamp_unit(self.intensity),
            ..self
        }
    }
}

/// Everything the host asked the device to show or do.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OutputState {
    pub force_feedback: ForceFeedbackValues,
    pub player_leds: PlayerLedState,
    pub light_bar: LightBarState,
}

impl OutputState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayerLedPacket {
    pub fade: bool,
    pub bitmask: u8,
    pub brightness: u8,
}

/// Outbound report for one slot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OutputPacket {
    /// Large motor byte as transmitted
    pub left_rumble: u8,
    /// Small motor byte as transmitted
    pub right_rumble: u8,
    pub large_magnitude: f32,
    pub small_magnitude: f32,
    pub player_leds: PlayerLedPacket,
    pub light_bar: LightBarState,
}

fn magnitude_byte(magnitude: f32) -> u8 {
    (clamp_unit(magnitude) * 255.0).round() as u8
}

pub fn compose(state: &OutputState, settings: &OutputSettings) -> OutputPacket {
    let large = state.force_feedback.large();
    let small = state.force_feedback.small();

    let (left_rumble, right_rumble) = if settings.transmit_rumble {
        (magnitude_byte(large), magnitude_byte(small))
    } else {
        (0, 0)
    };

    let packet = OutputPacket {
        left_rumble,
        right_rumble,
        large_magnitude: large,
        small_magnitude: small,
        player_leds: PlayerLedPacket {
            fade: state.player_leds.fade,
            bitmask: state.player_leds.position.mask().bits(),
            brightness: state.player_leds.brightness.device_code(),
        },
        light_bar: state.light_bar,
    };
    trace!("Composed output packet: {:?}", packet);
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rumble_state() -> OutputState {
        let mut state = OutputState::default();
        state.force_feedback.set(ForceFeedbackChannel::LeftLarge, 0.3);
        state.force_feedback.set(ForceFeedbackChannel::RightLarge, 0.8);
        state.force_feedback.set(ForceFeedbackChannel::LeftSmall, 1.5);
        state.force_feedback.set(ForceFeedbackChannel::RightSmall, -1.0);
        state
    }

    #[test]
    fn magnitudes_take_the_max_per_motor() {
        let packet = compose(&rumble_state(), &OutputSettings::default());
        assert_eq!(packet.large_magnitude, 0.8);
        assert_eq!(packet.small_magnitude, 1.0);
        // not transmitted unless enabled
        assert_eq!(packet.left_rumble, 0);
        assert_eq!(packet.right_rumble, 0);
    }

    #[test]
    fn rumble_bytes_when_enabled() {
        let settings = OutputSettings {
            transmit_rumble: true,
        };
        let packet = compose(&rumble_state(), &settings);
        assert_eq!(packet.left_rumble, 204);
        assert_eq!(packet.right_rumble, 255);
    }

    #[test]
    fn led_tables() {
        let expected = [(0, 0x00), (1, 0x01), (2, 0x02), (3, 0x04), (4, 0x08), (5, 0x10), (6, 0x00)];
        for (index, mask) in expected {
            assert_eq!(LedPosition::from_index(index).mask().bits(), mask);
        }

        assert_eq!(LedBrightness::from_code(1).device_code(), 0x00);
        assert_eq!(LedBrightness::from_code(2).device_code(), 0x01);
        assert_eq!(LedBrightness::from_code(0).device_code(), 0x02);
        assert_eq!(LedBrightness::from_code(7), LedBrightness::Low);
    }

    #[test]
    fn leds_and_lightbar_pass_through() {
        let state = OutputState {
            player_leds: PlayerLedState {
                fade: true,
                position: LedPosition::Middle,
                brightness: LedBrightness::Medium,
            },
            light_bar: LightBarState {
                r: 10,
                g: 20,
                b: 30,
                intensity: 0.5,
            },
            ..Default::default()
        };
        let packet = compose(&state, &OutputSettings::default());
        assert_eq!(
            packet.player_leds,
            PlayerLedPacket {
                fade: true,
                bitmask: 0x04,
                brightness: 0x01
            }
        );
        assert_eq!(packet.light_bar, state.light_bar);
    }

    #[test]
    fn reset_clears_everything() {
        let mut state = rumble_state();
        state.light_bar.r = 255;
        state.reset();
        assert_eq!(state, OutputState::default());
    }
}
