//! Edge-triggered diffing of raw samples against the last known logical state.
//!
//! Each tick the engine compares the freshly extracted button and axis values
//! of a slot with what it reported before and emits one event per qualifying
//! transition:
//!
//! - analog axes first (LX, LY, RX, RY, LT, RT), whenever the raw value changed
//!   or the stick is held outside its deadzone
//! - then buttons in table order: press, release, or a repeat once the
//!   per-button repeat timer has expired

use chrono::{DateTime, Duration, Local};
use nalgebra::Vector2;
use tracing::{debug, trace};

use super::analog::{AnalogAxis, AxisKind, GyroAxis};
use super::buttons::{ButtonBank, ButtonEdge, ButtonExtractor, LogicalButton};
use super::events::ControllerEvent;
use super::sample::RawControllerSample;
use crate::config::InputSettings;

/// Cached logical state of one slot's buttons and axes.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotInputState {
    buttons: ButtonBank,
    axes: [AnalogAxis; 6],
    gyro: [GyroAxis; 2],
}

impl SlotInputState {
    pub fn new(settings: &InputSettings) -> Self {
        let axes = AxisKind::ANALOG.map(|kind| {
            let deadzone = match kind {
                AxisKind::LeftX | AxisKind::LeftY => settings.left_thumb_deadzone,
                AxisKind::RightX | AxisKind::RightY => settings.right_thumb_deadzone,
                _ => settings.trigger_threshold,
            };
            AnalogAxis::new(kind, deadzone)
        });

        Self {
            buttons: ButtonBank::new(),
            axes,
            gyro: [GyroAxis::default(); 2],
        }
    }

    /// Unpressed buttons, centered axes, no repeat timers.
    pub fn reset_to_neutral(&mut self) {
        self.buttons.reset();
        self.axes.iter_mut().for_each(AnalogAxis::reset);
        self.gyro.iter_mut().for_each(GyroAxis::reset);
    }

    pub fn buttons(&self) -> &ButtonBank {
        &self.buttons
    }

    pub fn axis(&self, kind: AxisKind) -> Option<&AnalogAxis> {
        self.axes.iter().find(|axis| axis.kind() == kind)
    }

    pub fn gyro_axis(&self, kind: AxisKind) -> Option<&GyroAxis> {
        match kind {
            AxisKind::GyroX => Some(&self.gyro[0]),
            AxisKind::GyroY => Some(&self.gyro[1]),
            _ => None,
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.buttons.pressed_buttons().is_empty()
            && self.axes.iter().all(AnalogAxis::is_neutral)
            && self.gyro.iter().all(GyroAxis::is_neutral)
    }
}

fn seconds_to_duration(seconds: f32) -> Duration {
    Duration::microseconds((seconds.max(0.0) as f64 * 1_000_000.0).round() as i64)
}

#[derive(Debug, Clone)]
pub struct DiffEngine {
    extractor: ButtonExtractor,
    initial_repeat_delay: Duration,
    repeat_delay: Duration,
}

impl DiffEngine {
    pub fn new(settings: &InputSettings) -> Self {
        debug!(
            "Diff engine repeat delays: initial {}s, repeat {}s",
            settings.initial_repeat_delay, settings.repeat_delay
        );
        Self {
            extractor: ButtonExtractor::new(settings),
            initial_repeat_delay: seconds_to_duration(settings.initial_repeat_delay),
            repeat_delay: seconds_to_duration(settings.repeat_delay),
        }
    }

    pub fn extractor(&self) -> &ButtonExtractor {
        &self.extractor
    }

    pub fn initial_repeat_delay(&self) -> Duration {
        self.initial_repeat_delay
    }

    pub fn repeat_delay(&self) -> Duration {
        self.repeat_delay
    }

    pub fn evaluate(
        &self,
        slot: usize,
        state: &mut SlotInputState,
        sample: &RawControllerSample,
        now: DateTime<Local>,
    ) -> Vec<ControllerEvent> {
        let mut events = Vec::new();

        for axis in state.axes.iter_mut() {
            let raw = axis.kind().raw_from(sample);
            if let Some(value) = axis.update(raw) {
                events.push(ControllerEvent::AnalogChanged {
                    axis: axis.kind(),
                    slot,
                    value,
                });
            }
        }

        let pressed = self.extractor.extract(sample);
        for button in LogicalButton::ALL {
            let edge = state.buttons.update(
                button,
                pressed[button.index()],
                now,
                self.initial_repeat_delay,
                self.repeat_delay,
            );
            match edge {
                Some(ButtonEdge::Pressed) => {
                    debug!("Slot {} pressed {:?}", slot, button);
                    events.push(ControllerEvent::ButtonPressed {
                        button,
                        slot,
                        is_repeat: false,
                    });
                }
                Some(ButtonEdge::Repeated) => {
                    trace!("Slot {} repeat {:?}", slot, button);
                    events.push(ControllerEvent::ButtonPressed {
                        button,
                        slot,
                        is_repeat: true,
                    });
                }
                Some(ButtonEdge::Released) => {
                    debug!("Slot {} released {:?}", slot, button);
                    events.push(ControllerEvent::ButtonReleased { button, slot });
                }
                None => {}
            }
        }

        events
    }

    /// Report the motion pipeline's camera delta on the gyro axes.
    pub fn evaluate_gyro(
        &self,
        slot: usize,
        state: &mut SlotInputState,
        delta: &Vector2<f32>,
    ) -> Vec<ControllerEvent> {
        AxisKind::GYRO
            .into_iter()
            .zip(state.gyro.iter_mut())
            .zip([delta.x, delta.y])
            .filter_map(|((axis, cache), value)| {
                cache
                    .update(value)
                    .map(|value| ControllerEvent::AnalogChanged { axis, slot, value })
            })
            .collect()
    }

    /// Neutral events for everything still held or deflected, then a reset.
    pub fn release_all(&self, slot: usize, state: &mut SlotInputState) -> Vec<ControllerEvent> {
        let mut events = Vec::new();

        for axis in state.axes.iter().filter(|axis| !axis.is_neutral()) {
            events.push(ControllerEvent::AnalogChanged {
                axis: axis.kind(),
                slot,
                value: 0.0,
            });
        }
        for (axis, cache) in AxisKind::GYRO.into_iter().zip(state.gyro.iter()) {
            if !cache.is_neutral() {
                events.push(ControllerEvent::AnalogChanged {
                    axis,
                    slot,
                    value: 0.0,
                });
            }
        }
        for button in state.buttons.pressed_buttons() {
            events.push(ControllerEvent::ButtonReleased { button, slot });
        }

        if !events.is_empty() {
            debug!("Slot {} released {} held inputs", slot, events.len());
        }
        state.reset_to_neutral();
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::sample::{ButtonsA, DpadFaceButtons, StickSample};

    fn setup() -> (DiffEngine, SlotInputState) {
        let settings = InputSettings::default();
        (DiffEngine::new(&settings), SlotInputState::new(&settings))
    }

    fn count_presses(events: &[ControllerEvent], repeat: bool) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, ControllerEvent::ButtonPressed { is_repeat, .. } if *is_repeat == repeat))
            .count()
    }

    #[test]
    fn neutral_sample_on_neutral_state_is_silent() {
        let (engine, mut state) = setup();
        let events = engine.evaluate(0, &mut state, &RawControllerSample::default(), Local::now());
        assert!(events.is_empty());
    }

    #[test]
    fn analog_events_precede_buttons() {
        let (engine, mut state) = setup();
        let sample = RawControllerSample {
            buttons_and_dpad: DpadFaceButtons::CROSS.bits(),
            left_stick: StickSample { x: 50, y: 0 },
            ..Default::default()
        };
        let events = engine.evaluate(1, &mut state, &sample, Local::now());

        assert_eq!(events.len(), 3);
        match &events[0] {
            ControllerEvent::AnalogChanged { axis, slot, value } => {
                assert_eq!(*axis, AxisKind::LeftX);
                assert_eq!(*slot, 1);
                assert!((value - 0.394).abs() < 1e-3);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            events[1],
            ControllerEvent::ButtonPressed {
                button: LogicalButton::FaceButtonBottom,
                slot: 1,
                is_repeat: false
            }
        );
        // stick X past the deadzone also reads as a directional button
        assert_eq!(
            events[2],
            ControllerEvent::ButtonPressed {
                button: LogicalButton::LeftStickRight,
                slot: 1,
                is_repeat: false
            }
        );
        assert_eq!(state.axis(AxisKind::LeftX).map(AnalogAxis::last_raw), Some(50));
    }

    #[test]
    fn trigger_press_waits_for_repeat_delay() {
        let (engine, mut state) = setup();
        let t0 = Local::now();
        let sample = RawControllerSample {
            right_trigger: 40,
            ..Default::default()
        };

        let first = engine.evaluate(0, &mut state, &sample, t0);
        assert_eq!(count_presses(&first, false), 1);

        let held = engine.evaluate(0, &mut state, &sample, t0 + Duration::milliseconds(100));
        assert_eq!(count_presses(&held, false) + count_presses(&held, true), 0);

        let repeat = engine.evaluate(0, &mut state, &sample, t0 + Duration::milliseconds(200));
        assert_eq!(count_presses(&repeat, true), 1);
    }

    #[test]
    fn release_all_reports_every_held_input() {
        let (engine, mut state) = setup();
        let sample = RawControllerSample {
            buttons_a: (ButtonsA::LEFT_BUMPER | ButtonsA::RIGHT_BUMPER).bits(),
            buttons_and_dpad: DpadFaceButtons::TRIANGLE.bits(),
            right_stick: StickSample { x: 10, y: 0 },
            ..Default::default()
        };
        engine.evaluate(0, &mut state, &sample, Local::now());
        engine.evaluate_gyro(0, &mut state, &Vector2::new(0.1, 0.0));

        let events = engine.release_all(0, &mut state);
        let releases = events
            .iter()
            .filter(|e| matches!(e, ControllerEvent::ButtonReleased { .. }))
            .count();
        assert_eq!(releases, 3);
        assert!(events.contains(&ControllerEvent::AnalogChanged {
            axis: AxisKind::RightX,
            slot: 0,
            value: 0.0
        }));
        assert!(events.contains(&ControllerEvent::AnalogChanged {
            axis: AxisKind::GyroX,
            slot: 0,
            value: 0.0
        }));
        assert!(state.is_neutral());
        assert!(engine.release_all(0, &mut state).is_empty());
    }

    #[test]
    fn reset_to_neutral_forces_a_fresh_diff() {
        let (engine, mut state) = setup();
        let sample = RawControllerSample {
            buttons_a: ButtonsA::MENU.bits(),
            ..Default::default()
        };
        let now = Local::now();
        engine.evaluate(0, &mut state, &sample, now);
        assert!(engine.evaluate(0, &mut state, &sample, now).is_empty());

        state.reset_to_neutral();
        let events = engine.evaluate(0, &mut state, &sample, now);
        assert_eq!(
            events,
            vec![ControllerEvent::ButtonPressed {
                button: LogicalButton::SpecialRight,
                slot: 0,
                is_repeat: false
            }]
        );
    }

    #[test]
    fn gyro_delta_is_reported_while_moving() {
        let (engine, mut state) = setup();
        assert!(engine.evaluate_gyro(2, &mut state, &Vector2::zeros()).is_empty());

        let events = engine.evaluate_gyro(2, &mut state, &Vector2::new(0.0, -0.5));
        assert_eq!(
            events,
            vec![ControllerEvent::AnalogChanged {
                axis: AxisKind::GyroY,
                slot: 2,
                value: -0.5
            }]
        );
    }

    #[test]
    fn repeat_delays_convert_from_seconds() {
        let (engine, _) = setup();
        assert_eq!(engine.initial_repeat_delay(), Duration::milliseconds(200));
        assert_eq!(engine.repeat_delay(), Duration::milliseconds(100));
    }

    mod prop {
        use super::*;
        use crate::controller::analog::{normalize_stick, normalize_trigger};
        use proptest::prelude::*;

        fn arb_sample() -> impl Strategy<Value = RawControllerSample> {
            (
                any::<[u8; 3]>(),
                any::<[i8; 4]>(),
                any::<[u8; 2]>(),
            )
                .prop_map(|(buttons, sticks, triggers)| RawControllerSample {
                    buttons_and_dpad: buttons[0],
                    buttons_a: buttons[1],
                    buttons_b: buttons[2],
                    left_stick: StickSample {
                        x: sticks[0],
                        y: sticks[1],
                    },
                    right_stick: StickSample {
                        x: sticks[2],
                        y: sticks[3],
                    },
                    left_trigger: triggers[0],
                    right_trigger: triggers[1],
                    ..Default::default()
                })
        }

        // (sample, milliseconds since the previous tick)
        fn arb_ticks() -> impl Strategy<Value = Vec<(RawControllerSample, i64)>> {
            proptest::collection::vec((arb_sample(), 0i64..400), 1..40)
        }

        proptest! {
            #[test]
            fn each_button_has_at_most_one_edge_per_tick(ticks in arb_ticks()) {
                let (engine, mut state) = setup();
                let mut now = Local::now();

                for (sample, step) in ticks {
                    now = now + Duration::milliseconds(step);
                    let events = engine.evaluate(0, &mut state, &sample, now);

                    let mut pressed = Vec::new();
                    let mut released = Vec::new();
                    for event in &events {
                        match event {
                            ControllerEvent::ButtonPressed { button, .. } => {
                                prop_assert!(!pressed.contains(button), "{:?} pressed twice", button);
                                pressed.push(*button);
                            }
                            ControllerEvent::ButtonReleased { button, .. } => {
                                prop_assert!(!released.contains(button), "{:?} released twice", button);
                                released.push(*button);
                            }
                            _ => {}
                        }
                    }
                    for button in &pressed {
                        prop_assert!(!released.contains(button), "{:?} pressed and released", button);
                    }
                }
            }

            #[test]
            fn reported_analog_values_depend_only_on_raw(ticks in arb_ticks()) {
                let (engine, mut state) = setup();
                let mut now = Local::now();

                for (sample, step) in ticks {
                    now = now + Duration::milliseconds(step);
                    for event in engine.evaluate(0, &mut state, &sample, now) {
                        if let ControllerEvent::AnalogChanged { axis, value, .. } = event {
                            let raw = axis.raw_from(&sample);
                            let expected = if axis.is_trigger() {
                                normalize_trigger(raw)
                            } else {
                                normalize_stick(raw)
                            };
                            prop_assert_eq!(value, expected);
                            prop_assert!((-1.0..=1.0).contains(&value));
                        }
                    }

                    // a neutral state normalizes the same raw identically
                    let (_, mut fresh) = setup();
                    let replay = engine.evaluate(0, &mut fresh, &sample, now);
                    for event in replay {
                        if let ControllerEvent::AnalogChanged { axis, value, .. } = event {
                            let cached = state.axis(axis).map(|a| a.normalize(axis.raw_from(&sample)));
                            prop_assert_eq!(cached, Some(value));
                        }
                    }
                }
            }
        }
    }
}
