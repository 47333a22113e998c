//! Choke controller: button presses and releases become immediate or
//! scheduled mute transitions; encoder edits pick FREE/QUANTIZED modes.

use std::sync::Arc;

use crate::audio::choke::ChokeShared;
use crate::control::quantize::QuantGrid;
use crate::timing::TimeKeeper;
use crate::trace::{Trace, TraceId};
use crate::types::{Command, CommandKind, EffectId, ScheduleMode};
use crate::visual::{BitmapId, LedColor, VisualState};

/// Parameter selected for encoder editing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChokeParam {
    Length,
    Onset,
}

pub struct ChokeController {
    effect: Arc<ChokeShared>,
    timekeeper: Arc<TimeKeeper>,
    grid: Arc<QuantGrid>,
    trace: Arc<Trace>,
    parameter: ChokeParam,
}

impl ChokeController {
    pub fn new(
        effect: Arc<ChokeShared>,
        timekeeper: Arc<TimeKeeper>,
        grid: Arc<QuantGrid>,
        trace: Arc<Trace>,
    ) -> Self {
        Self {
            effect,
            timekeeper,
            grid,
            trace,
            parameter: ChokeParam::Length,
        }
    }

    pub fn length_bitmap(mode: ScheduleMode) -> BitmapId {
        match mode {
            ScheduleMode::Free => BitmapId::ChokeLengthFree,
            ScheduleMode::Quantized => BitmapId::ChokeLengthQuant,
        }
    }

    pub fn onset_bitmap(mode: ScheduleMode) -> BitmapId {
        match mode {
            ScheduleMode::Free => BitmapId::ChokeOnsetFree,
            ScheduleMode::Quantized => BitmapId::ChokeOnsetQuant,
        }
    }

    /// Intercept a press command. Returns true when handled here.
    pub fn handle_button_press(&mut self, cmd: &Command, visual: &mut VisualState) -> bool {
        if cmd.target != EffectId::Choke {
            return false;
        }
        if !matches!(cmd.kind, CommandKind::Enable | CommandKind::Toggle) {
            return false;
        }

        let length_mode = self.effect.length_mode();

        match self.effect.onset_mode() {
            ScheduleMode::Free => {
                self.effect.engage();
                self.trace.record(TraceId::ChokeEngage, 0);

                if length_mode == ScheduleMode::Quantized {
                    let duration = self.grid.quantized_duration(&self.timekeeper);
                    let release = self.timekeeper.sample_position() + duration as u64;
                    self.effect.release_at.schedule(release);
                }

                visual.set_led(EffectId::Choke, LedColor::Red);
                visual.set_last_activated(EffectId::Choke);
                visual.show_bitmap(BitmapId::ChokeActive);
            }
            ScheduleMode::Quantized => {
                let onset = self.grid.onset_sample(&self.timekeeper);
                self.effect.onset_at.schedule(onset);

                if length_mode == ScheduleMode::Quantized {
                    let duration = self.grid.quantized_duration(&self.timekeeper);
                    self.effect.release_at.schedule(onset + duration as u64);
                }
                // LED and display follow when the onset actually fires
            }
        }

        true
    }

    /// Intercept a release command. Returns false when the default
    /// disable path should still run.
    pub fn handle_button_release(&mut self, cmd: &Command) -> bool {
        if cmd.target != EffectId::Choke {
            return false;
        }
        if cmd.kind != CommandKind::Disable {
            return false;
        }

        if self.effect.length_mode() == ScheduleMode::Quantized {
            // Quantized length releases itself; absorb the button
            return true;
        }

        // A pending quantized onset dies with the button
        self.effect.onset_at.cancel();

        // Free length: let the registry disable the engine
        false
    }

    /// Edge-detect engine transitions that happened on the audio side
    /// (scheduled onset fired, scheduled release fired) and repaint.
    pub fn update_visual_feedback(&mut self, visual: &mut VisualState) {
        let enabled = self.effect.is_enabled();

        if enabled && visual.last_activated() != EffectId::Choke {
            // A scheduled onset fired since we last looked
            visual.set_led(EffectId::Choke, LedColor::Red);
            visual.set_last_activated(EffectId::Choke);
            visual.show_bitmap(BitmapId::ChokeActive);
            self.trace.record(TraceId::ChokeEngage, 1);
        }

        if !enabled
            && visual.last_activated() == EffectId::Choke
            && self.effect.length_mode() == ScheduleMode::Quantized
        {
            // Auto-release fired
            visual.set_led(EffectId::Choke, LedColor::Green);
            visual.set_last_activated(EffectId::None);
            visual.refresh();
            self.trace.record(TraceId::ChokeRelease, 1);
        }
    }

    pub fn current_parameter(&self) -> ChokeParam {
        self.parameter
    }

    /// Encoder button: cycle to the next parameter, returning its display
    pub fn cycle_parameter(&mut self) -> BitmapId {
        self.parameter = match self.parameter {
            ChokeParam::Length => ChokeParam::Onset,
            ChokeParam::Onset => ChokeParam::Length,
        };
        self.parameter_bitmap()
    }

    /// Encoder turn: step the selected parameter's mode. Returns the
    /// display to show when the value changed.
    pub fn adjust_parameter(&mut self, delta: i32) -> Option<BitmapId> {
        match self.parameter {
            ChokeParam::Length => {
                let current = self.effect.length_mode();
                let next = step_mode(current, delta);
                if next != current {
                    self.effect.set_length_mode(next);
                    return Some(Self::length_bitmap(next));
                }
            }
            ChokeParam::Onset => {
                let current = self.effect.onset_mode();
                let next = step_mode(current, delta);
                if next != current {
                    self.effect.set_onset_mode(next);
                    return Some(Self::onset_bitmap(next));
                }
            }
        }
        None
    }

    /// Display for the currently selected parameter
    pub fn parameter_bitmap(&self) -> BitmapId {
        match self.parameter {
            ChokeParam::Length => Self::length_bitmap(self.effect.length_mode()),
            ChokeParam::Onset => Self::onset_bitmap(self.effect.onset_mode()),
        }
    }
}

/// Step a two-value mode by an encoder delta, clamped at the ends
pub(crate) fn step_mode(current: ScheduleMode, delta: i32) -> ScheduleMode {
    let index = (current as u8 as i32 + delta).clamp(0, 1);
    ScheduleMode::from_u8(index as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spsc;
    use crate::visual::DISPLAY_QUEUE_LEN;

    struct Rig {
        controller: ChokeController,
        effect: Arc<ChokeShared>,
        timekeeper: Arc<TimeKeeper>,
        visual: VisualState,
    }

    fn rig() -> Rig {
        let timekeeper = Arc::new(TimeKeeper::new());
        timekeeper.set_samples_per_beat(22_050);
        let grid = Arc::new(QuantGrid::new(crate::types::Quant::Q16, 128));
        let effect = Arc::new(ChokeShared::new());
        let trace = Arc::new(Trace::new());

        let (display_tx, _display_rx) = spsc::channel(DISPLAY_QUEUE_LEN);
        let visual = VisualState::new(
            display_tx,
            effect.clone(),
            Arc::new(crate::audio::freeze::FreezeShared::new()),
            Arc::new(crate::audio::stutter::StutterShared::new()),
        );

        let controller =
            ChokeController::new(effect.clone(), timekeeper.clone(), grid, trace);
        Rig { controller, effect, timekeeper, visual }
    }

    fn press() -> Command {
        Command::new(CommandKind::Enable, EffectId::Choke)
    }

    fn release() -> Command {
        Command::new(CommandKind::Disable, EffectId::Choke)
    }

    #[test]
    fn test_ignores_other_effects() {
        let mut rig = rig();
        let cmd = Command::new(CommandKind::Enable, EffectId::Freeze);
        assert!(!rig.controller.handle_button_press(&cmd, &mut rig.visual));
    }

    #[test]
    fn test_free_onset_engages_immediately() {
        let mut rig = rig();
        assert!(rig.controller.handle_button_press(&press(), &mut rig.visual));
        assert!(rig.effect.is_enabled());
        assert_eq!(rig.visual.last_activated(), EffectId::Choke);
        assert_eq!(rig.visual.led(EffectId::Choke), LedColor::Red);
    }

    #[test]
    fn test_free_onset_quantized_length_schedules_release() {
        let mut rig = rig();
        rig.effect.set_length_mode(ScheduleMode::Quantized);
        rig.timekeeper.increment_samples(1_000);

        rig.controller.handle_button_press(&press(), &mut rig.visual);
        assert!(rig.effect.is_enabled());
        // Release one 1/16 (5,512 samples) after the press
        assert_eq!(rig.effect.release_at.get(), 1_000 + 5_512);
    }

    #[test]
    fn test_quantized_onset_schedules_with_lookahead() {
        let mut rig = rig();
        rig.effect.set_onset_mode(ScheduleMode::Quantized);
        rig.timekeeper.increment_tick();
        rig.timekeeper.increment_samples(1_000);

        rig.controller.handle_button_press(&press(), &mut rig.visual);
        assert!(!rig.effect.is_enabled());
        // One tick in: 4,594 to the boundary, minus the 128 lookahead
        assert_eq!(rig.effect.onset_at.get(), 1_000 + 4_594 - 128);
        // Display untouched until the onset fires
        assert_eq!(rig.visual.last_activated(), EffectId::None);
    }

    #[test]
    fn test_quantized_onset_and_length_schedule_both() {
        let mut rig = rig();
        rig.effect.set_onset_mode(ScheduleMode::Quantized);
        rig.effect.set_length_mode(ScheduleMode::Quantized);
        rig.timekeeper.increment_tick();

        rig.controller.handle_button_press(&press(), &mut rig.visual);
        let onset = rig.effect.onset_at.get();
        assert_eq!(rig.effect.release_at.get(), onset + 5_512);
    }

    #[test]
    fn test_release_absorbed_when_length_quantized() {
        let mut rig = rig();
        rig.effect.set_length_mode(ScheduleMode::Quantized);
        rig.controller.handle_button_press(&press(), &mut rig.visual);

        assert!(rig.controller.handle_button_release(&release()));
        // Still engaged: the scheduled release owns the ending
        assert!(rig.effect.is_enabled());
    }

    #[test]
    fn test_release_cancels_pending_onset() {
        let mut rig = rig();
        rig.effect.set_onset_mode(ScheduleMode::Quantized);
        rig.timekeeper.increment_tick();
        rig.controller.handle_button_press(&press(), &mut rig.visual);
        assert!(rig.effect.onset_at.is_scheduled());

        // Free length: falls through to the default disable
        assert!(!rig.controller.handle_button_release(&release()));
        assert!(!rig.effect.onset_at.is_scheduled());
    }

    #[test]
    fn test_visual_edge_detection_for_scheduled_onset() {
        let mut rig = rig();
        // Engine-side fire (as the audio callback would do)
        rig.effect.engage();

        rig.controller.update_visual_feedback(&mut rig.visual);
        assert_eq!(rig.visual.last_activated(), EffectId::Choke);
        assert_eq!(rig.visual.led(EffectId::Choke), LedColor::Red);
    }

    #[test]
    fn test_visual_edge_detection_for_auto_release() {
        let mut rig = rig();
        rig.effect.set_length_mode(ScheduleMode::Quantized);
        rig.effect.engage();
        rig.controller.update_visual_feedback(&mut rig.visual);

        // Audio side auto-released
        rig.effect.release();
        rig.controller.update_visual_feedback(&mut rig.visual);
        assert_eq!(rig.visual.last_activated(), EffectId::None);
        assert_eq!(rig.visual.led(EffectId::Choke), LedColor::Green);
    }

    #[test]
    fn test_parameter_cycle_and_adjust() {
        let mut rig = rig();
        assert_eq!(rig.controller.current_parameter(), ChokeParam::Length);

        assert_eq!(rig.controller.cycle_parameter(), BitmapId::ChokeOnsetFree);
        assert_eq!(rig.controller.current_parameter(), ChokeParam::Onset);

        assert_eq!(rig.controller.adjust_parameter(1), Some(BitmapId::ChokeOnsetQuant));
        assert_eq!(rig.effect.onset_mode(), ScheduleMode::Quantized);

        // Already at the end: no change, no display
        assert_eq!(rig.controller.adjust_parameter(1), None);

        assert_eq!(rig.controller.adjust_parameter(-1), Some(BitmapId::ChokeOnsetFree));
        assert_eq!(rig.effect.onset_mode(), ScheduleMode::Free);
    }
}
