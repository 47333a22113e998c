//! Stutter controller: FUNC+STUTTER combos, capture/playback scheduling,
//! armed-state blinking.
//!
//! FUNC must already be held when STUTTER lands to enter capture mode;
//! STUTTER alone replays a parked loop. Four independently FREE/QUANTIZED
//! parameters: capture start, capture end, playback onset, playback
//! length.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::stutter::{StutterRequest, StutterShared, StutterState};
use crate::control::choke_ctl::step_mode;
use crate::control::quantize::QuantGrid;
use crate::timing::TimeKeeper;
use crate::trace::{Trace, TraceId};
use crate::types::{Command, CommandKind, EffectId, ScheduleMode};
use crate::visual::{stutter_state_bitmap, BitmapId, LedColor, VisualState};

/// Armed-state blink cadence: 4 Hz (250 ms on/off)
const BLINK_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StutterParam {
    Length,
    Onset,
    CaptureStart,
    CaptureEnd,
}

pub struct StutterController {
    effect: Arc<StutterShared>,
    timekeeper: Arc<TimeKeeper>,
    grid: Arc<QuantGrid>,
    trace: Arc<Trace>,
    parameter: StutterParam,

    /// FUNC currently held (must precede STUTTER for capture)
    func_held: bool,

    /// STUTTER currently held
    stutter_held: bool,

    last_blink: Instant,
    blink_on: bool,
    last_state: StutterState,
}

impl StutterController {
    pub fn new(
        effect: Arc<StutterShared>,
        timekeeper: Arc<TimeKeeper>,
        grid: Arc<QuantGrid>,
        trace: Arc<Trace>,
    ) -> Self {
        Self {
            effect,
            timekeeper,
            grid,
            trace,
            parameter: StutterParam::Onset,
            func_held: false,
            stutter_held: false,
            last_blink: Instant::now(),
            blink_on: false,
            last_state: StutterState::IdleNoLoop,
        }
    }

    pub fn length_bitmap(mode: ScheduleMode) -> BitmapId {
        match mode {
            ScheduleMode::Free => BitmapId::StutterLengthFree,
            ScheduleMode::Quantized => BitmapId::StutterLengthQuant,
        }
    }

    pub fn onset_bitmap(mode: ScheduleMode) -> BitmapId {
        match mode {
            ScheduleMode::Free => BitmapId::StutterOnsetFree,
            ScheduleMode::Quantized => BitmapId::StutterOnsetQuant,
        }
    }

    pub fn capture_start_bitmap(mode: ScheduleMode) -> BitmapId {
        match mode {
            ScheduleMode::Free => BitmapId::StutterCaptureStartFree,
            ScheduleMode::Quantized => BitmapId::StutterCaptureStartQuant,
        }
    }

    pub fn capture_end_bitmap(mode: ScheduleMode) -> BitmapId {
        match mode {
            ScheduleMode::Free => BitmapId::StutterCaptureEndFree,
            ScheduleMode::Quantized => BitmapId::StutterCaptureEndQuant,
        }
    }

    /// Handle FUNC and STUTTER presses. Everything stutter-related is
    /// intercepted; nothing falls through to the registry.
    pub fn handle_button_press(&mut self, cmd: &Command, visual: &mut VisualState) -> bool {
        if cmd.target == EffectId::Func {
            self.func_held = true;
            return true;
        }

        if cmd.target != EffectId::Stutter {
            return false;
        }
        if !matches!(cmd.kind, CommandKind::Enable | CommandKind::Toggle) {
            return false;
        }

        self.stutter_held = true;
        self.effect.set_stutter_held(true);

        let state = self.effect.state();

        if self.func_held {
            // FUNC+STUTTER: start (or re-start) a capture. An existing
            // loop is simply recaptured over.
            match self.effect.capture_start_mode() {
                ScheduleMode::Free => {
                    self.effect.request(StutterRequest::StartCapture);
                    self.trace.record(TraceId::StutterCaptureStart, 0);
                }
                ScheduleMode::Quantized => {
                    let at = self.grid.boundary_sample(&self.timekeeper);
                    self.effect.capture_start_at.schedule(at);
                    self.trace.record(TraceId::StutterCaptureStart, 1);
                }
            }

            visual.set_last_activated(EffectId::Stutter);
            visual.show_bitmap(BitmapId::StutterCapturing);
            return true;
        }

        // STUTTER alone: playback of a parked loop
        if state == StutterState::IdleNoLoop {
            // Nothing captured yet; swallow the press so the registry
            // cannot "enable" an empty loop
            return true;
        }

        if state == StutterState::IdleWithLoop {
            match self.effect.onset_mode() {
                ScheduleMode::Free => {
                    self.effect.request(StutterRequest::StartPlayback);
                    self.trace.record(TraceId::StutterPlay, 0);
                }
                ScheduleMode::Quantized => {
                    let at = self.grid.onset_sample(&self.timekeeper);
                    self.effect.playback_onset_at.schedule(at);
                    self.trace.record(TraceId::StutterPlay, 1);
                }
            }

            visual.set_last_activated(EffectId::Stutter);
            visual.show_bitmap(BitmapId::StutterPlaying);
        }

        // Presses in capturing/playing/armed states are ignored
        true
    }

    /// Handle FUNC and STUTTER releases.
    pub fn handle_button_release(&mut self, cmd: &Command, visual: &mut VisualState) -> bool {
        if cmd.target == EffectId::Func {
            self.func_held = false;

            // FUNC released mid-capture with STUTTER still down ends the
            // capture; the held STUTTER sends it straight to playback
            let state = self.effect.state();
            if matches!(state, StutterState::Capturing | StutterState::WaitCaptureEnd)
                && self.stutter_held
            {
                self.end_capture();
                visual.show_bitmap(stutter_state_bitmap(self.effect.state()));
            }
            return true;
        }

        if cmd.target != EffectId::Stutter {
            return false;
        }
        if cmd.kind != CommandKind::Disable {
            return false;
        }

        self.stutter_held = false;
        self.effect.set_stutter_held(false);

        match self.effect.state() {
            StutterState::WaitCaptureStart => {
                // Released before the armed capture began: cancel
                self.effect.capture_start_at.cancel();
                visual.set_last_activated(EffectId::None);
                visual.refresh();
            }

            StutterState::Capturing | StutterState::WaitCaptureEnd => {
                self.end_capture();
                visual.show_bitmap(stutter_state_bitmap(self.effect.state()));
            }

            StutterState::WaitPlaybackOnset => {
                // Released before playback began: cancel the armed onset
                self.effect.playback_onset_at.cancel();
                visual.show_bitmap(BitmapId::StutterIdleWithLoop);
            }

            StutterState::Playing => match self.effect.length_mode() {
                ScheduleMode::Free => {
                    self.effect.request(StutterRequest::StopPlayback);
                    self.trace.record(TraceId::StutterStop, 0);
                }
                ScheduleMode::Quantized => {
                    let at = self.grid.boundary_sample(&self.timekeeper);
                    self.effect.playback_stop_at.schedule(at);
                    self.trace.record(TraceId::StutterStop, 1);
                }
            },

            _ => {}
        }

        true
    }

    /// End the running capture now or at the next boundary, per the
    /// capture-end mode. The latched held flag picks the landing state
    /// when the end actually happens.
    fn end_capture(&mut self) {
        match self.effect.capture_end_mode() {
            ScheduleMode::Free => {
                self.effect.request(StutterRequest::EndCapture);
                self.trace.record(TraceId::StutterCaptureEnd, 0);
            }
            ScheduleMode::Quantized => {
                let at = self.grid.boundary_sample(&self.timekeeper);
                self.effect.capture_end_at.schedule(at);
                self.trace.record(TraceId::StutterCaptureEnd, 1);
            }
        }
    }

    /// LED blinking for armed states, solid colors otherwise, and
    /// display updates when the audio side changed state underneath us.
    pub fn update_visual_feedback(&mut self, visual: &mut VisualState) {
        let state = self.effect.state();
        let now = Instant::now();

        let blinking = matches!(
            state,
            StutterState::WaitCaptureStart | StutterState::WaitPlaybackOnset
        );

        if blinking {
            if now.duration_since(self.last_blink) >= BLINK_INTERVAL {
                self.blink_on = !self.blink_on;
                self.last_blink = now;
            }

            let color = if !self.blink_on {
                LedColor::Off
            } else if state == StutterState::WaitCaptureStart {
                LedColor::Red
            } else {
                LedColor::Blue
            };
            visual.set_led(EffectId::Stutter, color);
        } else {
            let color = match state {
                StutterState::IdleNoLoop => LedColor::Green,
                StutterState::IdleWithLoop => LedColor::White,
                StutterState::Capturing | StutterState::WaitCaptureEnd => LedColor::Red,
                StutterState::Playing | StutterState::WaitPlaybackLength => LedColor::Blue,
                _ => LedColor::Green,
            };
            visual.set_led(EffectId::Stutter, color);
        }

        // Scheduled transitions fire on the audio side; track them here
        if state != self.last_state {
            if !state.is_idle() {
                visual.set_last_activated(EffectId::Stutter);
                visual.show_bitmap(stutter_state_bitmap(state));
            } else if !self.last_state.is_idle() {
                // Fell back to idle: hand the display to whoever is next
                if visual.last_activated() == EffectId::Stutter {
                    visual.set_last_activated(EffectId::None);
                }
                visual.refresh();
            }
            self.last_state = state;
        }
    }

    pub fn current_parameter(&self) -> StutterParam {
        self.parameter
    }

    pub fn cycle_parameter(&mut self) -> BitmapId {
        self.parameter = match self.parameter {
            StutterParam::Onset => StutterParam::Length,
            StutterParam::Length => StutterParam::CaptureStart,
            StutterParam::CaptureStart => StutterParam::CaptureEnd,
            StutterParam::CaptureEnd => StutterParam::Onset,
        };
        self.parameter_bitmap()
    }

    pub fn adjust_parameter(&mut self, delta: i32) -> Option<BitmapId> {
        let (current, bitmap): (ScheduleMode, fn(ScheduleMode) -> BitmapId) = match self.parameter {
            StutterParam::Length => (self.effect.length_mode(), Self::length_bitmap),
            StutterParam::Onset => (self.effect.onset_mode(), Self::onset_bitmap),
            StutterParam::CaptureStart => {
                (self.effect.capture_start_mode(), Self::capture_start_bitmap)
            }
            StutterParam::CaptureEnd => (self.effect.capture_end_mode(), Self::capture_end_bitmap),
        };

        let next = step_mode(current, delta);
        if next == current {
            return None;
        }

        match self.parameter {
            StutterParam::Length => self.effect.set_length_mode(next),
            StutterParam::Onset => self.effect.set_onset_mode(next),
            StutterParam::CaptureStart => self.effect.set_capture_start_mode(next),
            StutterParam::CaptureEnd => self.effect.set_capture_end_mode(next),
        }

        Some(bitmap(next))
    }

    pub fn parameter_bitmap(&self) -> BitmapId {
        match self.parameter {
            StutterParam::Length => Self::length_bitmap(self.effect.length_mode()),
            StutterParam::Onset => Self::onset_bitmap(self.effect.onset_mode()),
            StutterParam::CaptureStart => {
                Self::capture_start_bitmap(self.effect.capture_start_mode())
            }
            StutterParam::CaptureEnd => Self::capture_end_bitmap(self.effect.capture_end_mode()),
        }
    }
}
