//! Logical buttons, their extraction rules and the per-slot repeat state.

use chrono::{DateTime, Duration, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::sample::{ButtonsA, ButtonsB, DpadFaceButtons, RawControllerSample};
use crate::config::InputSettings;

pub const BUTTON_COUNT: usize = 27;

// Logical buttons in host order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalButton {
    FaceButtonBottom,
    FaceButtonRight,
    FaceButtonLeft,
    FaceButtonTop,
    LeftShoulder,
    RightShoulder,
    SpecialLeft,
    SpecialRight,
    LeftThumb,
    RightThumb,
    LeftTriggerThreshold,
    RightTriggerThreshold,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
    LeftStickUp,
    LeftStickDown,
    LeftStickLeft,
    LeftStickRight,
    RightStickUp,
    RightStickDown,
    RightStickLeft,
    RightStickRight,
    PlaystationLogo,
    TouchpadButton,
    MicrophoneButton,
}

impl LogicalButton {
    pub const ALL: [LogicalButton; BUTTON_COUNT] = [
        LogicalButton::FaceButtonBottom,
        LogicalButton::FaceButtonRight,
        LogicalButton::FaceButtonLeft,
        LogicalButton::FaceButtonTop,
        LogicalButton::LeftShoulder,
        LogicalButton::RightShoulder,
        LogicalButton::SpecialLeft,
        LogicalButton::SpecialRight,
        LogicalButton::LeftThumb,
        LogicalButton::RightThumb,
        LogicalButton::LeftTriggerThreshold,
        LogicalButton::RightTriggerThreshold,
        LogicalButton::DPadUp,
        LogicalButton::DPadDown,
        LogicalButton::DPadLeft,
        LogicalButton::DPadRight,
        LogicalButton::LeftStickUp,
        LogicalButton::LeftStickDown,
        LogicalButton::LeftStickLeft,
        LogicalButton::LeftStickRight,
        LogicalButton::RightStickUp,
        LogicalButton::RightStickDown,
        LogicalButton::RightStickLeft,
        LogicalButton::RightStickRight,
        LogicalButton::PlaystationLogo,
        LogicalButton::TouchpadButton,
        LogicalButton::MicrophoneButton,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Key name the host binds input actions to.
    pub fn key_name(self) -> &'static str {
        match self {
            LogicalButton::FaceButtonBottom => "Gamepad_FaceButton_Bottom",
            LogicalButton::FaceButtonRight => "Gamepad_FaceButton_Right",
            LogicalButton::FaceButtonLeft => "Gamepad_FaceButton_Left",
            LogicalButton::FaceButtonTop => "Gamepad_FaceButton_Top",
            LogicalButton::LeftShoulder => "Gamepad_LeftShoulder",
            LogicalButton::RightShoulder => "Gamepad_RightShoulder",
            LogicalButton::SpecialLeft => "Gamepad_Special_Left",
            LogicalButton::SpecialRight => "Gamepad_Special_Right",
            LogicalButton::LeftThumb => "Gamepad_LeftThumbstick",
            LogicalButton::RightThumb => "Gamepad_RightThumbstick",
            LogicalButton::LeftTriggerThreshold => "Gamepad_LeftTrigger",
            LogicalButton::RightTriggerThreshold => "Gamepad_RightTrigger",
            LogicalButton::DPadUp => "Gamepad_DPad_Up",
            LogicalButton::DPadDown => "Gamepad_DPad_Down",
            LogicalButton::DPadLeft => "Gamepad_DPad_Left",
            LogicalButton::DPadRight => "Gamepad_DPad_Right",
            LogicalButton::LeftStickUp => "Gamepad_LeftStick_Up",
            LogicalButton::LeftStickDown => "Gamepad_LeftStick_Down",
            LogicalButton::LeftStickLeft => "Gamepad_LeftStick_Left",
            LogicalButton::LeftStickRight => "Gamepad_LeftStick_Right",
            LogicalButton::RightStickUp => "Gamepad_RightStick_Up",
            LogicalButton::RightStickDown => "Gamepad_RightStick_Down",
            LogicalButton::RightStickLeft => "Gamepad_RightStick_Left",
            LogicalButton::RightStickRight => "Gamepad_RightStick_Right",
            LogicalButton::PlaystationLogo => "DS5W_PlaystationLogo",
            LogicalButton::TouchpadButton => "DS5W_TouchpadButton",
            LogicalButton::MicrophoneButton => "DS5W_MicrophoneButton",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StickAxis {
    X,
    Y,
}

/// How one logical button is derived from a raw sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonRule {
    DpadFace(DpadFaceButtons),
    A(ButtonsA),
    B(ButtonsB),
    /// Trigger value above the trigger threshold
    Trigger(Side),
    /// Stick tilted past its deadzone in the given direction
    StickTilt {
        stick: Side,
        axis: StickAxis,
        positive: bool,
    },
}

const fn tilt(stick: Side, axis: StickAxis, positive: bool) -> ButtonRule {
    ButtonRule::StickTilt {
        stick,
        axis,
        positive,
    }
}

/// Extraction table, indexed like [`LogicalButton::ALL`].
/// Back and start are swapped relative to the device's own order.
pub const BUTTON_RULES: [ButtonRule; BUTTON_COUNT] = [
    ButtonRule::DpadFace(DpadFaceButtons::CROSS),
    ButtonRule::DpadFace(DpadFaceButtons::CIRCLE),
    ButtonRule::DpadFace(DpadFaceButtons::SQUARE),
    ButtonRule::DpadFace(DpadFaceButtons::TRIANGLE),
    ButtonRule::A(ButtonsA::LEFT_BUMPER),
    ButtonRule::A(ButtonsA::RIGHT_BUMPER),
    ButtonRule::A(ButtonsA::SELECT),
    ButtonRule::A(ButtonsA::MENU),
    ButtonRule::A(ButtonsA::LEFT_STICK),
    ButtonRule::A(ButtonsA::RIGHT_STICK),
    ButtonRule::Trigger(Side::Left),
    ButtonRule::Trigger(Side::Right),
    ButtonRule::DpadFace(DpadFaceButtons::DPAD_UP),
    ButtonRule::DpadFace(DpadFaceButtons::DPAD_DOWN),
    ButtonRule::DpadFace(DpadFaceButtons::DPAD_LEFT),
    ButtonRule::DpadFace(DpadFaceButtons::DPAD_RIGHT),
    tilt(Side::Left, StickAxis::Y, true),
    tilt(Side::Left, StickAxis::Y, false),
    tilt(Side::Left, StickAxis::X, false),
    tilt(Side::Left, StickAxis::X, true),
    tilt(Side::Right, StickAxis::Y, true),
    tilt(Side::Right, StickAxis::Y, false),
    tilt(Side::Right, StickAxis::X, false),
    tilt(Side::Right, StickAxis::X, true),
    ButtonRule::B(ButtonsB::PLAYSTATION_LOGO),
    ButtonRule::B(ButtonsB::PAD_BUTTON),
    ButtonRule::B(ButtonsB::MIC_BUTTON),
];

/// Turns a raw sample into the logical pressed state of every button.
#[derive(Debug, Clone)]
pub struct ButtonExtractor {
    rules: [ButtonRule; BUTTON_COUNT],
    left_deadzone: i16,
    right_deadzone: i16,
    trigger_threshold: i16,
}

impl ButtonExtractor {
    pub fn new(settings: &InputSettings) -> Self {
        let mut rules = BUTTON_RULES;
        if settings.legacy_right_stick_horizontal {
            warn!(
                "Legacy right stick mapping enabled: RightStickLeft/Right read the Y axis \
                 and collide with RightStickDown/Up"
            );
            rules[LogicalButton::RightStickLeft.index()] = tilt(Side::Right, StickAxis::Y, false);
            rules[LogicalButton::RightStickRight.index()] = tilt(Side::Right, StickAxis::Y, true);
        }

        Self {
            rules,
            left_deadzone: settings.left_thumb_deadzone,
            right_deadzone: settings.right_thumb_deadzone,
            trigger_threshold: settings.trigger_threshold,
        }
    }

    pub fn rule(&self, button: LogicalButton) -> ButtonRule {
        self.rules[button.index()]
    }

    pub fn is_pressed(&self, button: LogicalButton, sample: &RawControllerSample) -> bool {
        match self.rule(button) {
            ButtonRule::DpadFace(mask) => sample.dpad_face().contains(mask),
            ButtonRule::A(mask) => sample.buttons_a().contains(mask),
            ButtonRule::B(mask) => sample.buttons_b().contains(mask),
            ButtonRule::Trigger(side) => {
                let value = match side {
                    Side::Left => sample.left_trigger,
                    Side::Right => sample.right_trigger,
                };
                i16::from(value) > self.trigger_threshold
            }
            ButtonRule::StickTilt {
                stick,
                axis,
                positive,
            } => {
                let (position, deadzone) = match stick {
                    Side::Left => (sample.left_stick, self.left_deadzone),
                    Side::Right => (sample.right_stick, self.right_deadzone),
                };
                let value = i16::from(match axis {
                    StickAxis::X => position.x,
                    StickAxis::Y => position.y,
                });
                if positive {
                    value > deadzone
                } else {
                    value < -deadzone
                }
            }
        }
    }

    pub fn extract(&self, sample: &RawControllerSample) -> [bool; BUTTON_COUNT] {
        let mut states = [false; BUTTON_COUNT];
        for button in LogicalButton::ALL {
            states[button.index()] = self.is_pressed(button, sample);
        }
        states
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEdge {
    Pressed,
    Repeated,
    Released,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonState {
    pub pressed: bool,
    /// Only meaningful while pressed
    pub next_repeat_at: Option<DateTime<Local>>,
}

/// Last known logical state and repeat schedule for every button of a slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ButtonBank {
    buttons: [ButtonState; BUTTON_COUNT],
}

impl ButtonBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the current logical state of `button` and report the edge, if any.
    pub fn update(
        &mut self,
        button: LogicalButton,
        pressed: bool,
        now: DateTime<Local>,
        initial_repeat_delay: Duration,
        repeat_delay: Duration,
    ) -> Option<ButtonEdge> {
        let state = &mut self.buttons[button.index()];

        let edge = match (state.pressed, pressed) {
            (false, true) => {
                state.next_repeat_at = Some(now + initial_repeat_delay);
                Some(ButtonEdge::Pressed)
            }
            (true, false) => {
                state.next_repeat_at = None;
                Some(ButtonEdge::Released)
            }
            (true, true) => match state.next_repeat_at {
                Some(due) if now >= due => {
                    state.next_repeat_at = Some(now + repeat_delay);
                    Some(ButtonEdge::Repeated)
                }
                Some(_) => None,
                None => {
                    state.next_repeat_at = Some(now + repeat_delay);
                    None
                }
            },
            (false, false) => None,
        };

        state.pressed = pressed;
        edge
    }

    pub fn is_pressed(&self, button: LogicalButton) -> bool {
        self.buttons[button.index()].pressed
    }

    pub fn state(&self, button: LogicalButton) -> &ButtonState {
        &self.buttons[button.index()]
    }

    pub fn pressed_buttons(&self) -> Vec<LogicalButton> {
        LogicalButton::ALL
            .into_iter()
            .filter(|b| self.is_pressed(*b))
            .collect()
    }

    /// Everything unpressed, no repeat timers.
    pub fn reset(&mut self) {
        let held = self.pressed_buttons().len();
        if held > 0 {
            debug!("Resetting button bank with {} held buttons", held);
        }
        self.buttons = [ButtonState::default(); BUTTON_COUNT];
    }
}
